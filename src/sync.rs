//! Commands that write Tidal data back into the local collection.

use crate::api::Provider;
use crate::db;
use crate::models::{Item, TrackInfo};
use crate::source::TidalSource;
use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome counts of a popularity sync.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl SyncReport {
    /// Error when any item failed, so callers exit non-zero after a normal return.
    pub fn check(&self) -> Result<()> {
        if self.failed > 0 {
            return Err(anyhow!("{} item(s) failed to sync", self.failed));
        }
        Ok(())
    }
}

/// Refresh `tidal_track_popularity` for items in the collection.
///
/// Items without a Tidal track id are skipped, as are items that already
/// carry a popularity unless `force` is set. A failed lookup is logged and
/// counted; it never aborts the run.
pub async fn sync_popularity(
    db_path: &Path,
    provider: Arc<dyn Provider>,
    query: Option<&str>,
    force: bool,
) -> Result<SyncReport> {
    let path = db_path.to_path_buf();
    let query_owned = query.map(|q| q.to_string());
    let items: Vec<Item> = tokio::task::spawn_blocking(move || -> Result<Vec<Item>, anyhow::Error> {
        let conn = db::open_or_create(&path)?;
        db::query_items(&conn, query_owned.as_deref())
    })
    .await??;

    info!(
        "Syncing Tidal popularity for {} item(s) via {}",
        items.len(),
        provider.name()
    );

    let mut report = SyncReport::default();
    for item in items {
        let track_id = match item.tidal_track_id {
            Some(id) => id,
            None => {
                debug!("Skipping item {} ({}): no tidal_track_id", item.id, item.title);
                report.skipped += 1;
                continue;
            }
        };
        if item.tidal_track_popularity.is_some() && !force {
            debug!("Popularity already present for item {} ({})", item.id, item.title);
            report.skipped += 1;
            continue;
        }

        let track = match provider.track(track_id).await {
            Ok(t) => t,
            Err(e) => {
                warn!("Failed to fetch Tidal track {} for item {}: {}", track_id, item.id, e);
                report.failed += 1;
                continue;
            }
        };
        let popularity = match track.popularity {
            Some(p) => p,
            None => {
                debug!("Tidal track {} has no popularity", track_id);
                report.skipped += 1;
                continue;
            }
        };

        store(db_path.to_path_buf(), item.id, popularity).await?;
        info!("{} - {}: popularity {}", item.artist, item.title, popularity);
        report.updated += 1;
    }

    info!(
        "Popularity sync done: {} updated, {} skipped, {} failed",
        report.updated, report.skipped, report.failed
    );
    Ok(report)
}

async fn store(db_path: PathBuf, id: i64, popularity: i64) -> Result<()> {
    let updated = chrono::Utc::now().timestamp();
    tokio::task::spawn_blocking(move || -> Result<(), anyhow::Error> {
        let conn = rusqlite::Connection::open(db_path)?;
        db::store_popularity(&conn, id, popularity, updated)
    })
    .await??;
    Ok(())
}

/// Look up a stored item on Tidal and apply the top track candidate's fields.
/// With `with_album` the album is fetched too and its popularity stored.
/// Returns the applied candidate, or `None` when Tidal had no match.
pub async fn match_item(
    db_path: &Path,
    source: &TidalSource,
    item_id: i64,
    with_album: bool,
) -> Result<Option<TrackInfo>> {
    let path = db_path.to_path_buf();
    let item = tokio::task::spawn_blocking(move || -> Result<Option<Item>, anyhow::Error> {
        let conn = db::open_or_create(&path)?;
        db::get_item(&conn, item_id)
    })
    .await??
    .ok_or_else(|| anyhow!("no item with id {}", item_id))?;

    let candidate = match source
        .item_candidates(&item.artist, &item.title)
        .await
        .into_iter()
        .next()
    {
        Some(c) => c,
        None => {
            info!("No Tidal match for {} - {}", item.artist, item.title);
            return Ok(None);
        }
    };

    let album = match (with_album, candidate.tidal_album_id) {
        (true, Some(album_id)) => match source.album_for_id(album_id).await {
            Ok(a) => Some(a),
            Err(e) => {
                warn!("Failed to fetch Tidal album {}: {}", album_id, e);
                None
            }
        },
        _ => None,
    };

    let path = db_path.to_path_buf();
    let applied = candidate.clone();
    tokio::task::spawn_blocking(move || -> Result<(), anyhow::Error> {
        let conn = rusqlite::Connection::open(path)?;
        db::apply_track_info(&conn, item_id, &applied)?;
        if let Some(album) = &album {
            db::apply_album_info(&conn, item_id, album)?;
        }
        Ok(())
    })
    .await??;

    info!(
        "Matched item {} to Tidal track {:?}",
        item_id, candidate.tidal_track_id
    );
    Ok(Some(candidate))
}
