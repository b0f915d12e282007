// Wish store - the wish row, its category links, its images and its index
// entry always change together inside one transaction.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::sync::Arc;

use crate::catalog;
use crate::db::models::{Wish, WishImage};
use crate::db::{
    self, immediate_transaction, placeholders, read_snapshot, timestamp, RepositoryError,
    RepositoryResult,
};
use crate::search;
use crate::state::DbPool;
use crate::wishes::rows::{self, WISH_COLUMNS};

/// Upper bound for list queries over a single user's wishes.
pub const LIST_LIMIT: i64 = 100;

#[async_trait]
pub trait WishRepository: Send + Sync {
    /// Insert the wish and its category links. A repeated copy of the same
    /// source by the same user fails with `AlreadyExists`.
    async fn create(&self, wish: &Wish, category_ids: &[String]) -> RepositoryResult<()>;

    /// Overwrite the mutable fields and replace the category set. With
    /// `publish` the wish also moves into the feed in the same transaction.
    async fn update(
        &self,
        wish: &Wish,
        category_ids: &[String],
        publish: bool,
    ) -> RepositoryResult<()>;

    /// Wish with images, categories and viewer-relative flags.
    async fn get_by_id(&self, viewer_id: Option<&str>, id: &str) -> RepositoryResult<Wish>;

    /// Owner-only delete of the wish and everything hanging off it.
    async fn delete(&self, user_id: &str, id: &str) -> RepositoryResult<()>;

    async fn add_image(&self, image: &WishImage) -> RepositoryResult<WishImage>;

    /// Write fetched name, price and currency, plus an optional first image,
    /// only if the wish is unchanged since `read_at`. Returns `false` when a
    /// newer edit won and nothing was written.
    async fn store_enrichment(
        &self,
        wish: &Wish,
        read_at: DateTime<Utc>,
        image: Option<&WishImage>,
    ) -> RepositoryResult<bool>;

    /// Remove the listed images of one wish; returns how many were removed.
    async fn remove_images(&self, wish_id: &str, image_ids: &[String]) -> RepositoryResult<usize>;

    /// The user's own wishes, newest first.
    async fn list_by_user(&self, user_id: &str) -> RepositoryResult<Vec<Wish>>;
}

pub struct SqliteWishRepository {
    pool: DbPool,
}

impl SqliteWishRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WishRepository for SqliteWishRepository {
    async fn create(&self, wish: &Wish, category_ids: &[String]) -> RepositoryResult<()> {
        let conn = self.pool.get()?;
        immediate_transaction(&conn, |conn| insert_wish(conn, wish, category_ids))?;

        tracing::debug!(wish_id = %wish.id, user_id = %wish.user_id, "Wish created");
        Ok(())
    }

    async fn update(
        &self,
        wish: &Wish,
        category_ids: &[String],
        publish: bool,
    ) -> RepositoryResult<()> {
        let conn = self.pool.get()?;

        immediate_transaction(&conn, |conn| {
            catalog::ensure_known(conn, category_ids)?;

            let updated = conn.execute(
                "UPDATE wishes SET
                   name = ?1,
                   url = ?2,
                   price = ?3,
                   currency = ?4,
                   notes = ?5,
                   is_fulfilled = ?6,
                   updated_at = ?7
                 WHERE id = ?8 AND user_id = ?9 AND deleted_at IS NULL",
                params![
                    wish.name,
                    wish.url,
                    wish.price,
                    wish.currency,
                    wish.notes,
                    wish.is_fulfilled,
                    timestamp(&wish.updated_at),
                    wish.id,
                    wish.user_id,
                ],
            )?;

            if updated == 0 {
                return Err(RepositoryError::NotFound(format!("wish {}", wish.id)));
            }

            replace_categories(conn, &wish.id, category_ids)?;
            if publish {
                publish_wish(conn, &wish.user_id, &wish.id)?;
            }
            search::index_wish(conn, &wish.id)
        })?;

        tracing::debug!(wish_id = %wish.id, publish, "Wish updated");
        Ok(())
    }

    async fn get_by_id(&self, viewer_id: Option<&str>, id: &str) -> RepositoryResult<Wish> {
        let conn = self.pool.get()?;
        read_snapshot(&conn, |conn| fetch_wish(conn, viewer_id, id))
    }

    async fn delete(&self, user_id: &str, id: &str) -> RepositoryResult<()> {
        let conn = self.pool.get()?;

        immediate_transaction(&conn, |conn| {
            let owner: Option<String> = conn
                .query_row(
                    "SELECT user_id FROM wishes WHERE id = ?1 AND deleted_at IS NULL",
                    params![id],
                    |row| row.get(0),
                )
                .optional()?;

            match owner {
                None => return Err(RepositoryError::NotFound(format!("wish {}", id))),
                Some(owner) if owner != user_id => {
                    return Err(RepositoryError::Forbidden(
                        "cannot delete another user's wish".into(),
                    ))
                }
                Some(_) => {}
            }

            conn.execute("DELETE FROM wish_images WHERE wish_id = ?1", params![id])?;
            conn.execute("DELETE FROM wish_categories WHERE wish_id = ?1", params![id])?;
            conn.execute("DELETE FROM user_bookmarks WHERE wish_id = ?1", params![id])?;
            search::remove_wish(conn, id)?;

            let deleted = conn.execute(
                "DELETE FROM wishes WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
            )?;
            if deleted == 0 {
                return Err(RepositoryError::NotFound(format!("wish {}", id)));
            }

            Ok(())
        })?;

        tracing::info!(wish_id = %id, user_id = %user_id, "Wish deleted");
        Ok(())
    }

    async fn add_image(&self, image: &WishImage) -> RepositoryResult<WishImage> {
        let conn = self.pool.get()?;
        insert_image(&conn, image)?;
        Ok(image.clone())
    }

    async fn store_enrichment(
        &self,
        wish: &Wish,
        read_at: DateTime<Utc>,
        image: Option<&WishImage>,
    ) -> RepositoryResult<bool> {
        let conn = self.pool.get()?;

        let stored = immediate_transaction(&conn, |conn| -> RepositoryResult<bool> {
            let updated = conn.execute(
                "UPDATE wishes SET name = ?1, price = ?2, currency = ?3, updated_at = ?4
                 WHERE id = ?5 AND updated_at = ?6 AND deleted_at IS NULL",
                params![
                    wish.name,
                    wish.price,
                    wish.currency,
                    timestamp(&wish.updated_at),
                    wish.id,
                    timestamp(&read_at),
                ],
            )?;
            if updated == 0 {
                return Ok(false);
            }

            if let Some(image) = image {
                let images: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM wish_images WHERE wish_id = ?1",
                    params![wish.id],
                    |row| row.get(0),
                )?;
                if images == 0 {
                    insert_image(conn, image)?;
                }
            }

            search::index_wish(conn, &wish.id)?;
            Ok(true)
        })?;

        if !stored {
            tracing::debug!(wish_id = %wish.id, "Wish changed since read, enrichment skipped");
        }
        Ok(stored)
    }

    async fn remove_images(&self, wish_id: &str, image_ids: &[String]) -> RepositoryResult<usize> {
        if image_ids.is_empty() {
            return Ok(0);
        }

        let conn = self.pool.get()?;
        let sql = format!(
            "DELETE FROM wish_images WHERE wish_id = ? AND id IN ({})",
            placeholders(image_ids.len())
        );
        let args = std::iter::once(wish_id).chain(image_ids.iter().map(String::as_str));
        let removed = conn.execute(&sql, params_from_iter(args))?;

        tracing::debug!(wish_id = %wish_id, removed, "Wish images removed");
        Ok(removed)
    }

    async fn list_by_user(&self, user_id: &str) -> RepositoryResult<Vec<Wish>> {
        let conn = self.pool.get()?;
        let sql = format!(
            "SELECT {} FROM wishes w
             WHERE w.user_id = ?1 AND w.deleted_at IS NULL
             ORDER BY w.created_at DESC
             LIMIT ?2",
            WISH_COLUMNS
        );

        let wishes = read_snapshot(&conn, |conn| {
            rows::query_wishes(conn, &sql, params![user_id, LIST_LIMIT])
        })?;
        Ok(wishes)
    }
}

/// Type alias for Arc-wrapped repository (for AppState)
pub type DynWishRepository = Arc<dyn WishRepository>;

/// Insert a wish row, its category links and its index entry. The caller
/// owns the transaction.
pub(crate) fn insert_wish(
    conn: &Connection,
    wish: &Wish,
    category_ids: &[String],
) -> RepositoryResult<()> {
    catalog::ensure_known(conn, category_ids)?;

    let inserted = conn.execute(
        "INSERT INTO wishes
           (id, user_id, name, url, price, currency, notes, is_fulfilled,
            published_at, source_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            wish.id,
            wish.user_id,
            wish.name,
            wish.url,
            wish.price,
            wish.currency,
            wish.notes,
            wish.is_fulfilled,
            wish.published_at.as_ref().map(timestamp),
            wish.source_id,
            timestamp(&wish.created_at),
            timestamp(&wish.updated_at),
        ],
    );

    match inserted {
        Ok(_) => {}
        Err(e) if db::is_unique_violation(&e) => {
            return Err(RepositoryError::AlreadyExists(match &wish.source_id {
                Some(source_id) => format!("wish {} was already copied", source_id),
                None => format!("wish {}", wish.id),
            }));
        }
        Err(e) => return Err(e.into()),
    }

    replace_categories(conn, &wish.id, category_ids)?;
    search::index_wish(conn, &wish.id)
}

pub(crate) fn insert_image(conn: &Connection, image: &WishImage) -> RepositoryResult<()> {
    conn.execute(
        "INSERT INTO wish_images (id, wish_id, url, width, height, position, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            image.id,
            image.wish_id,
            image.url,
            image.width,
            image.height,
            image.position,
            timestamp(&image.created_at),
        ],
    )?;
    Ok(())
}

/// Delete-then-insert of the whole category set.
fn replace_categories(
    conn: &Connection,
    wish_id: &str,
    category_ids: &[String],
) -> RepositoryResult<()> {
    conn.execute(
        "DELETE FROM wish_categories WHERE wish_id = ?1",
        params![wish_id],
    )?;

    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO wish_categories (wish_id, category_id) VALUES (?1, ?2)",
    )?;
    for category_id in category_ids {
        stmt.execute(params![wish_id, category_id])?;
    }

    Ok(())
}

/// Single wish read with images, categories and viewer flags.
/// Move a draft into the feed. Already published wishes keep their original
/// timestamp.
fn publish_wish(conn: &Connection, user_id: &str, id: &str) -> RepositoryResult<()> {
    let published = conn.execute(
        "UPDATE wishes SET published_at = ?1
         WHERE id = ?2 AND user_id = ?3 AND published_at IS NULL AND deleted_at IS NULL",
        params![db::now_timestamp(), id, user_id],
    )?;
    if published > 0 {
        tracing::debug!(wish_id = %id, "Wish published");
    }
    Ok(())
}

pub(crate) fn fetch_wish(
    conn: &Connection,
    viewer_id: Option<&str>,
    id: &str,
) -> RepositoryResult<Wish> {
    let sql = format!(
        "SELECT {},
                EXISTS (SELECT 1 FROM user_bookmarks ub
                        WHERE ub.user_id = ?1 AND ub.wish_id = w.id),
                (SELECT c.id FROM wishes c
                 WHERE c.user_id = ?1 AND c.source_id = w.id AND c.deleted_at IS NULL
                 LIMIT 1)
         FROM wishes w
         WHERE w.id = ?2 AND w.deleted_at IS NULL",
        WISH_COLUMNS
    );

    let wish = conn
        .query_row(&sql, params![viewer_id, id], |row| {
            let mut wish = rows::map_wish(row)?;
            wish.is_bookmarked = row.get(12)?;
            wish.copied_wish_id = row.get(13)?;
            Ok(wish)
        })
        .optional()?;

    let mut wish = wish.ok_or_else(|| RepositoryError::NotFound(format!("wish {}", id)))?;
    rows::hydrate(conn, std::slice::from_mut(&mut wish))?;
    Ok(wish)
}
