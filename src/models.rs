use serde::{Deserialize, Serialize};

/// Name recorded as `data_source` on every info object produced here.
pub const DATA_SOURCE: &str = "Tidal";

/// Track metadata in the catalog's generic shape, plus Tidal-specific fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackInfo {
    pub title: String,
    pub track_id: Option<i64>,
    pub tidal_track_id: Option<i64>,
    pub artist: Option<String>,
    pub artist_id: Option<i64>,
    pub tidal_artist_id: Option<i64>,
    pub album: Option<String>,
    pub tidal_album_id: Option<i64>,
    /// Length in seconds.
    pub length: Option<u64>,
    /// 1-based position on the whole release.
    pub index: Option<u32>,
    pub medium: Option<u32>,
    pub medium_index: Option<u32>,
    pub medium_total: Option<u32>,
    pub isrc: Option<String>,
    pub explicit: bool,
    pub tidal_track_popularity: Option<i64>,
    pub data_source: String,
    /// Epoch seconds of the lookup.
    pub tidal_updated: i64,
}

/// Album metadata in the catalog's generic shape, plus Tidal-specific fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlbumInfo {
    pub album: String,
    pub album_id: i64,
    pub tidal_album_id: i64,
    pub artist: Option<String>,
    pub artist_id: Option<i64>,
    pub tidal_artist_id: Option<i64>,
    pub tidal_alb_popularity: Option<i64>,
    pub explicit: bool,
    pub isrc: Option<String>,
    pub tracks: Vec<TrackInfo>,
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub day: Option<u32>,
    pub mediums: Option<u32>,
    pub label: Option<String>,
    pub cover_art_url: Option<String>,
    pub data_source: String,
    pub tidal_updated: i64,
}

/// Weighted penalties accumulated while comparing a candidate to local data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Distance {
    penalties: Vec<(String, f64)>,
}

impl Distance {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: &str, weight: f64) {
        self.penalties.push((key.to_string(), weight));
    }

    pub fn get(&self, key: &str) -> f64 {
        self.penalties
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, w)| *w)
            .sum()
    }

    pub fn total(&self) -> f64 {
        self.penalties.iter().map(|(_, w)| *w).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.penalties.is_empty()
    }
}

/// Storage type of an extra item field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Integer,
    Date,
}

/// A track in the local collection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Item {
    pub id: i64,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub isrc: Option<String>,
    pub tidal_id: Option<i64>,
    pub tidal_track_id: Option<i64>,
    pub tidal_album_id: Option<i64>,
    pub tidal_artist_id: Option<i64>,
    pub tidal_duration: Option<i64>,
    pub tidal_track_popularity: Option<i64>,
    pub tidal_alb_popularity: Option<i64>,
    pub tidal_updated: Option<i64>,
}
