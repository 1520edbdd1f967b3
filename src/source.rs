use crate::api::{Provider, SearchKind};
use crate::mapper;
use crate::models::{AlbumInfo, Distance, FieldType, TrackInfo, DATA_SOURCE};
use crate::util::normalize_query;
use anyhow::Result;
use std::sync::Arc;
use tracing::debug;

/// Extra item fields this source writes to the collection.
pub const ITEM_FIELDS: &[(&str, FieldType)] = &[
    ("tidal_duration", FieldType::Integer),
    ("tidal_id", FieldType::Integer),
    ("tidal_album_id", FieldType::Integer),
    ("tidal_track_id", FieldType::Integer),
    ("tidal_artist_id", FieldType::Integer),
    ("tidal_track_popularity", FieldType::Integer),
    ("tidal_alb_popularity", FieldType::Integer),
    ("tidal_updated", FieldType::Date),
];

/// Tidal as a metadata source for the autotagger: candidate search, lookups
/// by id, and the source penalty applied to Tidal matches.
pub struct TidalSource {
    provider: Arc<dyn Provider>,
    source_weight: f64,
    image_size: u32,
}

impl TidalSource {
    pub fn new(provider: Arc<dyn Provider>, source_weight: f64, image_size: u32) -> Self {
        Self {
            provider,
            source_weight,
            image_size,
        }
    }

    pub fn item_fields(&self) -> &'static [(&'static str, FieldType)] {
        ITEM_FIELDS
    }

    /// Album candidates for a release. When various artists are likely only
    /// the release title is searched.
    pub async fn candidates(&self, artist: &str, release: &str, va_likely: bool) -> Vec<AlbumInfo> {
        let query = if va_likely {
            release.to_string()
        } else {
            format!("{} {}", release, artist)
        };
        match self.get_albums(&query).await {
            Ok(albums) => albums,
            Err(e) => {
                debug!("Tidal Search Error: {}", e);
                Vec::new()
            }
        }
    }

    /// Track candidates for a single item.
    pub async fn item_candidates(&self, artist: &str, title: &str) -> Vec<TrackInfo> {
        let query = format!("{} {}", title, artist);
        match self.get_tracks(&query).await {
            Ok(tracks) => tracks,
            Err(e) => {
                debug!("Tidal Search Error: {}", e);
                Vec::new()
            }
        }
    }

    /// Search albums and return the top hit, fully mapped.
    pub async fn get_albums(&self, query: &str) -> Result<Vec<AlbumInfo>> {
        let query = normalize_query(query);
        debug!("Searching Tidal for: {}", query);
        let hit = match self.provider.search_top_hit(&query, SearchKind::Album).await {
            Ok(hit) => hit,
            Err(e) => {
                debug!("Invalid Search Error: {}", e);
                return Ok(Vec::new());
            }
        };
        let mut albums = Vec::new();
        if let Some(id) = hit {
            albums.push(self.album_for_id(id).await?);
        }
        Ok(albums)
    }

    /// Search tracks and return the top hit, fully mapped.
    pub async fn get_tracks(&self, query: &str) -> Result<Vec<TrackInfo>> {
        let query = normalize_query(query);
        debug!("Searching Tidal for: {}", query);
        let hit = match self.provider.search_top_hit(&query, SearchKind::Track).await {
            Ok(hit) => hit,
            Err(e) => {
                debug!("Invalid Search Error: {}", e);
                return Ok(Vec::new());
            }
        };
        let mut tracks = Vec::new();
        if let Some(id) = hit {
            tracks.push(self.track_for_id(id).await?);
        }
        Ok(tracks)
    }

    pub async fn album_for_id(&self, id: i64) -> Result<AlbumInfo> {
        debug!("Searching for album {}", id);
        let album = self.provider.album(id).await?;
        let tracks = self.provider.album_tracks(id).await?;
        let cover_art_url = match album.cover.as_deref() {
            Some(cover) if !cover.is_empty() => self.valid_cover_url(cover).await,
            _ => None,
        };
        let info = mapper::album_info(&album, &tracks, cover_art_url, now());
        debug!("ISRC: {:?}", info.isrc);
        Ok(info)
    }

    pub async fn track_for_id(&self, id: i64) -> Result<TrackInfo> {
        debug!("Searching for track {}", id);
        let track = self.provider.track(id).await?;
        Ok(mapper::track_info(&track, now()))
    }

    /// Source penalty for an album match.
    pub fn album_distance(&self, info: &AlbumInfo) -> Distance {
        self.source_distance(&info.data_source)
    }

    /// Source penalty for a single-track match.
    pub fn track_distance(&self, info: &TrackInfo) -> Distance {
        self.source_distance(&info.data_source)
    }

    fn source_distance(&self, data_source: &str) -> Distance {
        let mut dist = Distance::new();
        if data_source == DATA_SOURCE {
            dist.add("source", self.source_weight);
        }
        dist
    }

    /// Cover URL, kept only if the image downloads and decodes.
    async fn valid_cover_url(&self, cover: &str) -> Option<String> {
        let url = self.provider.image_url(cover, self.image_size);
        match self.provider.fetch_image(&url).await {
            Ok(bytes) if mapper::is_decodable_image(&bytes) => Some(url),
            Ok(_) => {
                debug!("Invalid Image URL: {} does not decode as an image", url);
                None
            }
            Err(e) => {
                debug!("Invalid Image URL: {}", e);
                None
            }
        }
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}
