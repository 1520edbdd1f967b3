//! Translation of Tidal records into the catalog's album/track shapes.

use crate::api::tidal::{TidalAlbum, TidalTrack};
use crate::models::{AlbumInfo, TrackInfo, DATA_SOURCE};
use crate::util::unescape_quotes;
use chrono::{Datelike, NaiveDate};
use std::collections::BTreeMap;

/// Map a Tidal track. `updated` is the lookup time in epoch seconds.
pub fn track_info(track: &TidalTrack, updated: i64) -> TrackInfo {
    let artist_id = track.artist.as_ref().map(|a| a.id);
    TrackInfo {
        title: unescape_quotes(&track.title),
        track_id: Some(track.id),
        tidal_track_id: Some(track.id),
        artist: track.artist.as_ref().map(|a| a.name.clone()),
        artist_id,
        tidal_artist_id: artist_id,
        album: track.album.as_ref().map(|a| unescape_quotes(&a.title)),
        tidal_album_id: track.album.as_ref().map(|a| a.id),
        length: track.duration,
        index: None,
        medium: track.volume_number,
        medium_index: track.track_number,
        medium_total: None,
        isrc: track.isrc.clone().filter(|s| !s.is_empty()),
        explicit: track.explicit,
        tidal_track_popularity: track.popularity,
        data_source: DATA_SOURCE.to_string(),
        tidal_updated: updated,
    }
}

/// Map a Tidal album and its tracks. `cover_art_url` must already be validated.
pub fn album_info(
    album: &TidalAlbum,
    tracks: &[TidalTrack],
    cover_art_url: Option<String>,
    updated: i64,
) -> AlbumInfo {
    let mut infos: Vec<TrackInfo> = tracks
        .iter()
        .enumerate()
        .map(|(i, t)| {
            let mut info = track_info(t, updated);
            info.index = Some(i as u32 + 1);
            info
        })
        .collect();

    let mut medium_totals: BTreeMap<Option<u32>, u32> = BTreeMap::new();
    for t in &infos {
        *medium_totals.entry(t.medium).or_insert(0) += 1;
    }
    for t in infos.iter_mut() {
        t.medium_total = medium_totals.get(&t.medium).copied();
    }
    let mediums = medium_totals.keys().filter_map(|m| *m).max();

    let (year, month, day) = match album.release_date.as_deref().and_then(release_date_parts) {
        Some((y, m, d)) => (Some(y), Some(m), Some(d)),
        None => (None, None, None),
    };

    let artist_id = album.artist.as_ref().map(|a| a.id);
    AlbumInfo {
        album: unescape_quotes(&album.title),
        album_id: album.id,
        tidal_album_id: album.id,
        artist: album.artist.as_ref().map(|a| a.name.clone()),
        artist_id,
        tidal_artist_id: artist_id,
        tidal_alb_popularity: album.popularity,
        explicit: album.explicit,
        isrc: album.isrc.clone().filter(|s| !s.is_empty()),
        tracks: infos,
        year,
        month,
        day,
        mediums,
        label: album.copyright.clone().filter(|s| !s.is_empty()),
        cover_art_url,
        data_source: DATA_SOURCE.to_string(),
        tidal_updated: updated,
    }
}

/// Split a `YYYY-MM-DD` release date (time suffix allowed) into its parts.
pub fn release_date_parts(date: &str) -> Option<(i32, u32, u32)> {
    let day_part = date.get(..10).unwrap_or(date);
    let d = NaiveDate::parse_from_str(day_part, "%Y-%m-%d").ok()?;
    Some((d.year(), d.month(), d.day()))
}

/// True when the bytes decode as an image.
pub fn is_decodable_image(bytes: &[u8]) -> bool {
    image::load_from_memory(bytes).is_ok()
}
