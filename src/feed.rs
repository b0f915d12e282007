// Public feed and autocomplete, composed from the wish store and the search index
use rusqlite::params_from_iter;
use rusqlite::types::Value;
use std::collections::HashSet;

use crate::config::SearchConfig;
use crate::db::models::{AutocompleteSuggestion, Wish};
use crate::db::{placeholders, read_snapshot, RepositoryResult};
use crate::search;
use crate::state::DbPool;
use crate::wishes::{query_wishes, WISH_COLUMNS};

#[derive(Clone)]
pub struct FeedService {
    pool: DbPool,
    config: SearchConfig,
}

impl FeedService {
    pub fn new(pool: DbPool, config: SearchConfig) -> Self {
        Self { pool, config }
    }

    /// Published originals, newest first. A signed-in viewer never sees
    /// their own wishes and gets bookmark flags on the rest.
    pub async fn public_feed(
        &self,
        viewer_id: Option<&str>,
        search_text: Option<&str>,
    ) -> RepositoryResult<Vec<Wish>> {
        let mut sql = format!(
            "SELECT {} FROM wishes w
             WHERE w.published_at IS NOT NULL
               AND w.source_id IS NULL
               AND w.deleted_at IS NULL",
            WISH_COLUMNS
        );
        let mut args: Vec<Value> = Vec::new();

        if let Some(viewer_id) = viewer_id {
            sql.push_str(" AND w.user_id != ?");
            args.push(Value::Text(viewer_id.to_string()));
        }
        if let Some(filter) = search_text.and_then(search::feed_filter) {
            sql.push_str(" AND ");
            sql.push_str(filter.clause);
            args.push(Value::Text(filter.arg));
        }
        sql.push_str(" ORDER BY w.created_at DESC LIMIT ?");
        args.push(Value::Integer(self.config.feed_limit as i64));

        let conn = self.pool.get()?;
        let wishes = read_snapshot(&conn, |conn| {
            let mut wishes = query_wishes(conn, &sql, params_from_iter(args))?;

            if let Some(viewer_id) = viewer_id {
                let bookmarked = bookmarked_among(conn, viewer_id, &wishes)?;
                for wish in &mut wishes {
                    wish.is_bookmarked = bookmarked.contains(&wish.id);
                }
            }

            Ok::<_, rusqlite::Error>(wishes)
        })?;

        tracing::debug!(
            viewer = ?viewer_id,
            search = ?search_text,
            results = wishes.len(),
            "Feed served"
        );
        Ok(wishes)
    }

    /// Name suggestions, capped by configuration whatever the caller asks for.
    pub async fn autocomplete(
        &self,
        prefix: &str,
        requested: Option<usize>,
    ) -> RepositoryResult<Vec<AutocompleteSuggestion>> {
        let limit = self.effective_limit(requested);
        let conn = self.pool.get()?;
        search::autocomplete(&conn, prefix, limit)
    }

    fn effective_limit(&self, requested: Option<usize>) -> usize {
        let cap = self.config.autocomplete_limit;
        requested.map_or(cap, |n| n.min(cap))
    }
}

fn bookmarked_among(
    conn: &rusqlite::Connection,
    user_id: &str,
    wishes: &[Wish],
) -> rusqlite::Result<HashSet<String>> {
    if wishes.is_empty() {
        return Ok(HashSet::new());
    }

    let sql = format!(
        "SELECT wish_id FROM user_bookmarks WHERE user_id = ? AND wish_id IN ({})",
        placeholders(wishes.len())
    );
    let args = std::iter::once(user_id).chain(wishes.iter().map(|w| w.id.as_str()));

    let mut stmt = conn.prepare(&sql)?;
    let ids = stmt
        .query_map(params_from_iter(args), |row| row.get(0))?
        .collect::<Result<HashSet<String>, _>>()?;
    Ok(ids)
}
