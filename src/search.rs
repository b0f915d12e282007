// Full-text index over wishes, maintained inside the caller's write transaction.
use rusqlite::{params, Connection};

use crate::db::models::AutocompleteSuggestion;
use crate::db::{immediate_transaction, RepositoryResult};

const INDEX_SELECT: &str = "
    SELECT w.id,
           COALESCE(w.name, ''),
           COALESCE(w.notes, ''),
           COALESCE((SELECT group_concat(c.name, ' ')
                     FROM wish_categories wc
                     JOIN categories c ON c.id = wc.category_id
                     WHERE wc.wish_id = w.id), '')
    FROM wishes w
    WHERE w.deleted_at IS NULL";

/// Refresh the index entry for one wish. Must run on the same connection and
/// inside the same transaction as the write that changed the wish or its
/// category links.
pub fn index_wish(conn: &Connection, wish_id: &str) -> RepositoryResult<()> {
    remove_wish(conn, wish_id)?;
    conn.execute(
        &format!(
            "INSERT INTO wishes_fts (wish_id, name, notes, category_names) {} AND w.id = ?1",
            INDEX_SELECT
        ),
        params![wish_id],
    )?;
    Ok(())
}

pub fn remove_wish(conn: &Connection, wish_id: &str) -> RepositoryResult<()> {
    conn.execute("DELETE FROM wishes_fts WHERE wish_id = ?1", params![wish_id])?;
    Ok(())
}

/// Repopulate the whole index. The caller owns the transaction.
pub fn rebuild(conn: &Connection) -> RepositoryResult<usize> {
    conn.execute("DELETE FROM wishes_fts", [])?;
    let indexed = conn.execute(
        &format!(
            "INSERT INTO wishes_fts (wish_id, name, notes, category_names) {}",
            INDEX_SELECT
        ),
        [],
    )?;
    Ok(indexed)
}

/// The index and the live wishes table disagree on row count.
pub fn is_stale(conn: &Connection) -> RepositoryResult<bool> {
    let (indexed, live): (i64, i64) = conn.query_row(
        "SELECT (SELECT COUNT(*) FROM wishes_fts),
                (SELECT COUNT(*) FROM wishes WHERE deleted_at IS NULL)",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    Ok(indexed != live)
}

/// Rebuild the index when it has drifted from the wishes table. Returns the
/// number of rows indexed, or `None` when the index was already current.
pub fn rebuild_if_stale(conn: &Connection) -> RepositoryResult<Option<usize>> {
    immediate_transaction(conn, |conn| {
        if !is_stale(conn)? {
            return Ok(None);
        }
        rebuild(conn).map(Some)
    })
}

/// Turn free user input into an FTS5 prefix query restricted to the name
/// column: every alphanumeric run becomes a quoted term and the last one
/// gets a `*`. Returns `None` when nothing searchable is left.
pub fn prefix_query(input: &str) -> Option<String> {
    let terms: Vec<&str> = input
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();

    let (last, rest) = terms.split_last()?;
    let mut query = String::from("name : (");
    for term in rest {
        query.push('"');
        query.push_str(term);
        query.push_str("\" ");
    }
    query.push('"');
    query.push_str(last);
    query.push_str("\"*)");
    Some(query)
}

/// Name suggestions for published originals, shortest first.
pub fn autocomplete(
    conn: &Connection,
    prefix: &str,
    limit: usize,
) -> RepositoryResult<Vec<AutocompleteSuggestion>> {
    let Some(query) = prefix_query(prefix) else {
        return Ok(Vec::new());
    };
    if limit == 0 {
        return Ok(Vec::new());
    }

    let mut stmt = conn.prepare(
        "SELECT suggestion, COUNT(*) AS count
         FROM (SELECT DISTINCT w.id, LOWER(w.name) AS suggestion
               FROM wishes_fts
               JOIN wishes w ON w.id = wishes_fts.wish_id
               WHERE wishes_fts MATCH ?1
                 AND w.published_at IS NOT NULL
                 AND w.source_id IS NULL
                 AND w.deleted_at IS NULL
                 AND w.name IS NOT NULL)
         GROUP BY suggestion
         ORDER BY LENGTH(suggestion), suggestion
         LIMIT ?2",
    )?;

    let suggestions = stmt
        .query_map(params![query, limit as i64], |row| {
            Ok(AutocompleteSuggestion {
                text: row.get(0)?,
                count: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(suggestions)
}

/// SQL fragment plus its bound argument narrowing a feed query to wishes
/// whose name equals the search text, ignoring case.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedFilter {
    pub clause: &'static str,
    pub arg: String,
}

pub fn feed_filter(search: &str) -> Option<FeedFilter> {
    let search = search.trim();
    if search.is_empty() {
        return None;
    }
    Some(FeedFilter {
        clause: "LOWER(w.name) = LOWER(?)",
        arg: search.to_string(),
    })
}
