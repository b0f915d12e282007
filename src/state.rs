use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use std::sync::Arc;

use crate::catalog::{DynCategoryRepository, SqliteCategoryRepository};
use crate::config::Config;
use crate::enrichment::EnrichmentQueue;
use crate::feed::FeedService;
use crate::provenance::{DynProvenanceRepository, SqliteProvenanceRepository};
use crate::storage::{DynBlobStore, LocalBlobStore};
use crate::wishes::{DynWishRepository, SqliteWishRepository};

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub wishes: DynWishRepository,
    pub provenance: DynProvenanceRepository,
    pub categories: DynCategoryRepository,
    pub feed: FeedService,
    pub blobs: DynBlobStore,
    /// `None` when no metadata service is configured.
    pub enrichment: Option<EnrichmentQueue>,
}

impl AppState {
    /// Wire the SQLite-backed repositories and local blob storage.
    pub fn new(db: DbPool, config: Config, enrichment: Option<EnrichmentQueue>) -> Self {
        let blobs = LocalBlobStore::new(config.uploads_path(), &config.storage.public_url);

        Self {
            wishes: Arc::new(SqliteWishRepository::new(db.clone())),
            provenance: Arc::new(SqliteProvenanceRepository::new(db.clone())),
            categories: Arc::new(SqliteCategoryRepository::new(db.clone())),
            feed: FeedService::new(db.clone(), config.search.clone()),
            blobs: Arc::new(blobs),
            enrichment,
            db,
            config,
        }
    }
}
