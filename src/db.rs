use crate::models::{AlbumInfo, Item, TrackInfo};
use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

const SCHEMA: &str = include_str!("../db/schema.sql");

const ITEM_COLUMNS: &str = "id, title, artist, album, isrc, tidal_id, tidal_track_id, tidal_album_id, tidal_artist_id, tidal_duration, tidal_track_popularity, tidal_alb_popularity, tidal_updated";

pub fn open_or_create(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let conn = Connection::open(path)?;
    run_migrations(&conn)?;
    Ok(conn)
}

pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

fn row_to_item(r: &Row) -> rusqlite::Result<Item> {
    Ok(Item {
        id: r.get(0)?,
        title: r.get(1)?,
        artist: r.get(2)?,
        album: r.get(3)?,
        isrc: r.get(4)?,
        tidal_id: r.get(5)?,
        tidal_track_id: r.get(6)?,
        tidal_album_id: r.get(7)?,
        tidal_artist_id: r.get(8)?,
        tidal_duration: r.get(9)?,
        tidal_track_popularity: r.get(10)?,
        tidal_alb_popularity: r.get(11)?,
        tidal_updated: r.get(12)?,
    })
}

/// Insert a bare item and return its id.
pub fn add_item(conn: &Connection, title: &str, artist: &str, album: &str) -> Result<i64> {
    conn.execute(
        "INSERT INTO items (title, artist, album) VALUES (?1, ?2, ?3)",
        params![title, artist, album],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_item(conn: &Connection, id: i64) -> Result<Option<Item>> {
    let sql = format!("SELECT {} FROM items WHERE id = ?1 LIMIT 1", ITEM_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let row = stmt.query_row(params![id], row_to_item).optional()?;
    Ok(row)
}

/// Items whose title, artist or album contain `query` (case-insensitive),
/// or every item when no query is given. Ordered by id.
pub fn query_items(conn: &Connection, query: Option<&str>) -> Result<Vec<Item>> {
    let pattern = query
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(|q| format!("%{}%", escape_like(q)));
    let sql = format!(
        "SELECT {} FROM items WHERE ?1 IS NULL OR title LIKE ?1 ESCAPE '\\' OR artist LIKE ?1 ESCAPE '\\' OR album LIKE ?1 ESCAPE '\\' ORDER BY id ASC",
        ITEM_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![pattern], row_to_item)?;
    let mut v = Vec::new();
    for r in rows {
        v.push(r?);
    }
    Ok(v)
}

/// `%` and `_` in user text match literally.
fn escape_like(q: &str) -> String {
    let mut out = String::with_capacity(q.len());
    for c in q.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Write the Tidal fields of a matched track onto an item.
pub fn apply_track_info(conn: &Connection, id: i64, info: &TrackInfo) -> Result<()> {
    conn.execute(
        "UPDATE items SET tidal_id = ?2, tidal_track_id = ?2, tidal_artist_id = ?3, tidal_duration = ?4, tidal_track_popularity = ?5, isrc = COALESCE(?6, isrc), tidal_updated = ?7, tidal_album_id = COALESCE(?8, tidal_album_id) WHERE id = ?1",
        params![
            id,
            info.tidal_track_id,
            info.tidal_artist_id,
            info.length.map(|l| l as i64),
            info.tidal_track_popularity,
            info.isrc,
            info.tidal_updated,
            info.tidal_album_id
        ],
    )?;
    Ok(())
}

/// Write the album-level Tidal fields onto an item.
pub fn apply_album_info(conn: &Connection, id: i64, info: &AlbumInfo) -> Result<()> {
    conn.execute(
        "UPDATE items SET tidal_album_id = ?2, tidal_alb_popularity = ?3, tidal_updated = ?4 WHERE id = ?1",
        params![id, info.tidal_album_id, info.tidal_alb_popularity, info.tidal_updated],
    )?;
    Ok(())
}

/// Store a freshly fetched track popularity.
pub fn store_popularity(conn: &Connection, id: i64, popularity: i64, updated: i64) -> Result<()> {
    conn.execute(
        "UPDATE items SET tidal_track_popularity = ?2, tidal_updated = ?3 WHERE id = ?1",
        params![id, popularity, updated],
    )?;
    Ok(())
}
