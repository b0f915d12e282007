// Row mapping and the typed join-and-group step for images and categories
use rusqlite::{params_from_iter, Connection, Row};
use std::collections::HashMap;

use crate::db::models::{Category, Wish, WishImage};
use crate::db::placeholders;

/// Column list matching `map_wish`. Callers alias the wishes table as `w`.
pub const WISH_COLUMNS: &str = "w.id, w.user_id, w.name, w.url, w.price, w.currency, w.notes,
    w.is_fulfilled, w.published_at, w.source_id, w.created_at, w.updated_at";

pub fn map_wish(row: &Row<'_>) -> rusqlite::Result<Wish> {
    Ok(Wish {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        url: row.get(3)?,
        price: row.get(4)?,
        currency: row.get(5)?,
        notes: row.get(6)?,
        is_fulfilled: row.get(7)?,
        published_at: row.get(8)?,
        source_id: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
        images: Vec::new(),
        categories: Vec::new(),
        is_bookmarked: false,
        copied_wish_id: None,
    })
}

pub fn map_image(row: &Row<'_>) -> rusqlite::Result<WishImage> {
    Ok(WishImage {
        id: row.get(0)?,
        wish_id: row.get(1)?,
        url: row.get(2)?,
        width: row.get(3)?,
        height: row.get(4)?,
        position: row.get(5)?,
        created_at: row.get(6)?,
    })
}

/// Images for the given wishes, each list ordered by position and then
/// insertion order.
pub fn load_images(
    conn: &Connection,
    wish_ids: &[&str],
) -> rusqlite::Result<HashMap<String, Vec<WishImage>>> {
    let mut grouped: HashMap<String, Vec<WishImage>> = HashMap::new();
    if wish_ids.is_empty() {
        return Ok(grouped);
    }

    let sql = format!(
        "SELECT id, wish_id, url, width, height, position, created_at
         FROM wish_images
         WHERE wish_id IN ({})
         ORDER BY position ASC, rowid ASC",
        placeholders(wish_ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(wish_ids.iter()), map_image)?;

    for image in rows {
        let image = image?;
        grouped.entry(image.wish_id.clone()).or_default().push(image);
    }

    Ok(grouped)
}

pub fn load_categories(
    conn: &Connection,
    wish_ids: &[&str],
) -> rusqlite::Result<HashMap<String, Vec<Category>>> {
    let mut grouped: HashMap<String, Vec<Category>> = HashMap::new();
    if wish_ids.is_empty() {
        return Ok(grouped);
    }

    let sql = format!(
        "SELECT wc.wish_id, c.id, c.name, c.image_url
         FROM wish_categories wc
         JOIN categories c ON c.id = wc.category_id
         WHERE wc.wish_id IN ({})
         ORDER BY c.id",
        placeholders(wish_ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(wish_ids.iter()), |row| {
        Ok((
            row.get::<_, String>(0)?,
            Category {
                id: row.get(1)?,
                name: row.get(2)?,
                image_url: row.get(3)?,
            },
        ))
    })?;

    for row in rows {
        let (wish_id, category) = row?;
        grouped.entry(wish_id).or_default().push(category);
    }

    Ok(grouped)
}

/// Attach images and categories to already-loaded wish rows.
pub fn hydrate(conn: &Connection, wishes: &mut [Wish]) -> rusqlite::Result<()> {
    let ids: Vec<&str> = wishes.iter().map(|w| w.id.as_str()).collect();
    let mut images = load_images(conn, &ids)?;
    let mut categories = load_categories(conn, &ids)?;

    for wish in wishes.iter_mut() {
        wish.images = images.remove(&wish.id).unwrap_or_default();
        wish.categories = categories.remove(&wish.id).unwrap_or_default();
    }

    Ok(())
}

/// Run a wish query and hydrate every row.
pub fn query_wishes<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> rusqlite::Result<Vec<Wish>> {
    let mut stmt = conn.prepare(sql)?;
    let mut wishes = stmt
        .query_map(params, map_wish)?
        .collect::<Result<Vec<_>, _>>()?;
    hydrate(conn, &mut wishes)?;
    Ok(wishes)
}
