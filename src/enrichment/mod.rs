pub mod fetcher;
pub mod worker;

pub use fetcher::{FetchError, HttpMetadataFetcher, MetadataFetcher, PageMetadata};
pub use worker::{EnrichmentJob, EnrichmentQueue, EnrichmentWorker, JobStatus};
