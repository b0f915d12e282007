// Provenance graph - copies, bookmarks, savers and the follow edges that
// decorate saver profiles.
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::Arc;
use uuid::Uuid;

use crate::db::models::{SaversPage, ShortUserProfile, Wish, WishImage};
use crate::db::{
    immediate_transaction, now_timestamp, read_snapshot, RepositoryError, RepositoryResult,
};
use crate::state::DbPool;
use crate::wishes::repository::{fetch_wish, insert_image, insert_wish};
use crate::wishes::{query_wishes, WISH_COLUMNS};

/// Upper bound for the bookmark list.
pub const BOOKMARKS_LIMIT: i64 = 100;

#[async_trait]
pub trait ProvenanceRepository: Send + Sync {
    /// Duplicate a published original into the target user's wishes.
    async fn copy(&self, source_id: &str, target_user_id: &str) -> RepositoryResult<Wish>;

    async fn bookmark(&self, user_id: &str, wish_id: &str) -> RepositoryResult<()>;

    async fn unbookmark(&self, user_id: &str, wish_id: &str) -> RepositoryResult<()>;

    /// Original creator first, then copiers by copy time, newest first.
    async fn list_savers(
        &self,
        wish_id: &str,
        limit: i64,
        offset: i64,
    ) -> RepositoryResult<SaversPage>;

    async fn list_bookmarked(&self, user_id: &str) -> RepositoryResult<Vec<Wish>>;

    async fn follow(&self, user_id: &str, target_id: &str) -> RepositoryResult<()>;

    async fn unfollow(&self, user_id: &str, target_id: &str) -> RepositoryResult<()>;

    async fn is_following(&self, user_id: &str, target_id: &str) -> RepositoryResult<bool>;
}

pub struct SqliteProvenanceRepository {
    pool: DbPool,
}

impl SqliteProvenanceRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProvenanceRepository for SqliteProvenanceRepository {
    async fn copy(&self, source_id: &str, target_user_id: &str) -> RepositoryResult<Wish> {
        let conn = self.pool.get()?;

        let copy = immediate_transaction(&conn, |conn| {
            let source = fetch_wish(conn, None, source_id)?;

            if !source.is_published() {
                return Err(RepositoryError::NotFound(format!("wish {}", source_id)));
            }
            if source.is_copy() {
                return Err(RepositoryError::InvalidInput(
                    "only original wishes can be copied".into(),
                ));
            }
            if source.user_id == target_user_id {
                return Err(RepositoryError::Forbidden(
                    "cannot copy your own wish".into(),
                ));
            }

            let copy = derive_copy(&source, target_user_id);
            insert_wish(conn, &copy, &source.category_ids())?;

            for image in &source.images {
                insert_image(
                    conn,
                    &WishImage {
                        id: Uuid::now_v7().to_string(),
                        wish_id: copy.id.clone(),
                        created_at: copy.created_at,
                        ..image.clone()
                    },
                )?;
            }

            fetch_wish(conn, Some(target_user_id), &copy.id)
        })?;

        tracing::info!(
            source_id = %source_id,
            copy_id = %copy.id,
            user_id = %target_user_id,
            "Wish copied"
        );
        Ok(copy)
    }

    async fn bookmark(&self, user_id: &str, wish_id: &str) -> RepositoryResult<()> {
        let conn = self.pool.get()?;

        immediate_transaction(&conn, |conn| {
            let owner = visible_owner(conn, wish_id)?;
            if owner == user_id {
                return Err(RepositoryError::Forbidden(
                    "cannot bookmark your own wish".into(),
                ));
            }

            conn.execute(
                "INSERT OR IGNORE INTO user_bookmarks (user_id, wish_id, created_at)
                 VALUES (?1, ?2, ?3)",
                params![user_id, wish_id, now_timestamp()],
            )?;
            Ok(())
        })?;

        tracing::debug!(user_id = %user_id, wish_id = %wish_id, "Wish bookmarked");
        Ok(())
    }

    async fn unbookmark(&self, user_id: &str, wish_id: &str) -> RepositoryResult<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "DELETE FROM user_bookmarks WHERE user_id = ?1 AND wish_id = ?2",
            params![user_id, wish_id],
        )?;
        Ok(())
    }

    async fn list_savers(
        &self,
        wish_id: &str,
        limit: i64,
        offset: i64,
    ) -> RepositoryResult<SaversPage> {
        let conn = self.pool.get()?;

        read_snapshot(&conn, |conn| {
            visible_owner(conn, wish_id)?;

            let copiers: i64 = conn.query_row(
                "SELECT COUNT(*) FROM wishes WHERE source_id = ?1 AND deleted_at IS NULL",
                params![wish_id],
                |row| row.get(0),
            )?;

            let mut stmt = conn.prepare(
                "SELECT u.id, u.username, u.name, u.avatar_url,
                        (SELECT COUNT(*) FROM followers f WHERE f.following_id = u.id)
                 FROM (
                     SELECT w.user_id AS user_id, 0 AS sort_order, w.created_at AS saved_at
                     FROM wishes w
                     WHERE w.id = ?1 AND w.deleted_at IS NULL
                     UNION ALL
                     SELECT c.user_id, 1, c.created_at
                     FROM wishes c
                     WHERE c.source_id = ?1 AND c.deleted_at IS NULL
                 ) s
                 JOIN users u ON u.id = s.user_id
                 ORDER BY s.sort_order ASC, s.saved_at DESC, u.id ASC
                 LIMIT ?2 OFFSET ?3",
            )?;

            let users = stmt
                .query_map(params![wish_id, limit, offset], |row| {
                    Ok(ShortUserProfile {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        name: row.get(2)?,
                        avatar_url: row.get(3)?,
                        followers: row.get(4)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(SaversPage {
                users,
                total: 1 + copiers,
            })
        })
    }

    async fn list_bookmarked(&self, user_id: &str) -> RepositoryResult<Vec<Wish>> {
        let conn = self.pool.get()?;
        let sql = format!(
            "SELECT {} FROM wishes w
             JOIN user_bookmarks ub ON ub.wish_id = w.id
             WHERE ub.user_id = ?1 AND w.deleted_at IS NULL
             ORDER BY ub.created_at DESC
             LIMIT ?2",
            WISH_COLUMNS
        );

        let mut wishes = read_snapshot(&conn, |conn| {
            query_wishes(conn, &sql, params![user_id, BOOKMARKS_LIMIT])
        })?;
        for wish in &mut wishes {
            wish.is_bookmarked = true;
        }
        Ok(wishes)
    }

    async fn follow(&self, user_id: &str, target_id: &str) -> RepositoryResult<()> {
        if user_id == target_id {
            return Err(RepositoryError::InvalidInput(
                "cannot follow yourself".into(),
            ));
        }

        let conn = self.pool.get()?;
        immediate_transaction(&conn, |conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS (SELECT 1 FROM users WHERE id = ?1)",
                params![target_id],
                |row| row.get(0),
            )?;
            if !exists {
                return Err(RepositoryError::NotFound(format!("user {}", target_id)));
            }

            conn.execute(
                "INSERT OR IGNORE INTO followers (follower_id, following_id, created_at)
                 VALUES (?1, ?2, ?3)",
                params![user_id, target_id, now_timestamp()],
            )?;
            Ok(())
        })?;

        tracing::debug!(follower = %user_id, following = %target_id, "User followed");
        Ok(())
    }

    async fn unfollow(&self, user_id: &str, target_id: &str) -> RepositoryResult<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "DELETE FROM followers WHERE follower_id = ?1 AND following_id = ?2",
            params![user_id, target_id],
        )?;
        Ok(())
    }

    async fn is_following(&self, user_id: &str, target_id: &str) -> RepositoryResult<bool> {
        let conn = self.pool.get()?;
        let following = conn.query_row(
            "SELECT EXISTS (SELECT 1 FROM followers WHERE follower_id = ?1 AND following_id = ?2)",
            params![user_id, target_id],
            |row| row.get(0),
        )?;
        Ok(following)
    }
}

pub type DynProvenanceRepository = Arc<dyn ProvenanceRepository>;

/// Owner of a published, live wish. Drafts read as absent.
fn visible_owner(conn: &Connection, wish_id: &str) -> RepositoryResult<String> {
    conn.query_row(
        "SELECT user_id FROM wishes
         WHERE id = ?1 AND published_at IS NOT NULL AND deleted_at IS NULL",
        params![wish_id],
        |row| row.get(0),
    )
    .optional()?
    .ok_or_else(|| RepositoryError::NotFound(format!("wish {}", wish_id)))
}

fn derive_copy(source: &Wish, target_user_id: &str) -> Wish {
    let now = Utc::now();
    let mut copy = Wish::new(Uuid::now_v7().to_string(), target_user_id);
    copy.name = source.name.clone();
    copy.url = source.url.clone();
    copy.price = source.price;
    copy.currency = source.currency.clone();
    copy.notes = source.notes.clone();
    copy.source_id = Some(source.id.clone());
    copy.published_at = Some(now);
    copy.created_at = now;
    copy.updated_at = now;
    copy
}
