// Category catalog - static reference data, read-only for everything else
use async_trait::async_trait;
use rusqlite::{params_from_iter, Connection};
use std::collections::HashSet;
use std::sync::Arc;

use crate::db::models::Category;
use crate::db::{placeholders, RepositoryError, RepositoryResult};
use crate::state::DbPool;

#[async_trait]
pub trait CategoryRepository: Send + Sync {
    async fn list(&self) -> RepositoryResult<Vec<Category>>;
}

pub struct SqliteCategoryRepository {
    pool: DbPool,
}

impl SqliteCategoryRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CategoryRepository for SqliteCategoryRepository {
    async fn list(&self) -> RepositoryResult<Vec<Category>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare("SELECT id, name, image_url FROM categories ORDER BY id")?;

        let categories = stmt
            .query_map([], |row| {
                Ok(Category {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    image_url: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(categories)
    }
}

pub type DynCategoryRepository = Arc<dyn CategoryRepository>;

/// Reject category ids that are not in the catalog, so a bad id surfaces
/// as invalid input instead of a foreign key failure mid-transaction.
pub fn ensure_known(conn: &Connection, category_ids: &[String]) -> RepositoryResult<()> {
    if category_ids.is_empty() {
        return Ok(());
    }

    let unique: HashSet<&str> = category_ids.iter().map(String::as_str).collect();
    let sql = format!(
        "SELECT id FROM categories WHERE id IN ({})",
        placeholders(unique.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let found: HashSet<String> = stmt
        .query_map(params_from_iter(unique.iter()), |row| row.get(0))?
        .collect::<Result<_, _>>()?;

    let mut missing: Vec<&str> = unique
        .into_iter()
        .filter(|id| !found.contains(*id))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        missing.sort_unstable();
        Err(RepositoryError::InvalidInput(format!(
            "unknown categories: {}",
            missing.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[tokio::test]
    async fn lists_seeded_categories_in_id_order() {
        let (pool, _tmp) = db::test_pool();
        let repo = SqliteCategoryRepository::new(pool);

        let categories = repo.list().await.unwrap();
        assert!(!categories.is_empty());

        let ids: Vec<&str> = categories.iter().map(|c| c.id.as_str()).collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        assert_eq!(ids, sorted);
        assert!(ids.contains(&"books"));
    }

    #[test]
    fn ensure_known_accepts_existing_ids() {
        let (pool, _tmp) = db::test_pool();
        let conn = pool.get().unwrap();
        ensure_known(&conn, &["books".into(), "toys".into(), "books".into()]).unwrap();
        ensure_known(&conn, &[]).unwrap();
    }

    #[test]
    fn ensure_known_reports_missing_ids() {
        let (pool, _tmp) = db::test_pool();
        let conn = pool.get().unwrap();
        let err = ensure_known(&conn, &["books".into(), "spaceships".into()]).unwrap_err();
        match err {
            RepositoryError::InvalidInput(msg) => assert!(msg.contains("spaceships")),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
