use super::tidal::{TidalAlbum, TidalTrack};
use super::{Provider, SearchKind};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::info;

/// A simple in-memory provider used in tests and offline runs.
/// Searches always resolve to the configured top hit and are recorded.
#[derive(Default)]
pub struct MockProvider {
    albums: HashMap<i64, (TidalAlbum, Vec<TidalTrack>)>,
    tracks: HashMap<i64, TidalTrack>,
    album_hit: Option<i64>,
    track_hit: Option<i64>,
    image: Option<Vec<u8>>,
    fail_search: bool,
    searches: Mutex<Vec<(String, SearchKind)>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an album; it becomes the top hit for album searches.
    pub fn with_album(mut self, album: TidalAlbum, tracks: Vec<TidalTrack>) -> Self {
        self.album_hit = Some(album.id);
        self.albums.insert(album.id, (album, tracks));
        self
    }

    /// Register a track; it becomes the top hit for track searches.
    pub fn with_track(mut self, track: TidalTrack) -> Self {
        self.track_hit = Some(track.id);
        self.tracks.insert(track.id, track);
        self
    }

    /// Bytes returned for every image download.
    pub fn with_image(mut self, bytes: Vec<u8>) -> Self {
        self.image = Some(bytes);
        self
    }

    pub fn failing_search(mut self) -> Self {
        self.fail_search = true;
        self
    }

    /// Queries received so far, in order.
    pub fn searches(&self) -> Vec<(String, SearchKind)> {
        self.searches.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn is_authenticated(&self) -> bool {
        false
    }

    async fn search_top_hit(&self, query: &str, kind: SearchKind) -> Result<Option<i64>> {
        info!("MockProvider: search {:?} {}", kind, query);
        if let Ok(mut s) = self.searches.lock() {
            s.push((query.to_string(), kind));
        }
        if self.fail_search {
            return Err(anyhow!("mock search failure"));
        }
        Ok(match kind {
            SearchKind::Album => self.album_hit,
            SearchKind::Track => self.track_hit,
        })
    }

    async fn album(&self, id: i64) -> Result<TidalAlbum> {
        self.albums
            .get(&id)
            .map(|(a, _)| a.clone())
            .ok_or_else(|| anyhow!("album {} not found", id))
    }

    async fn album_tracks(&self, id: i64) -> Result<Vec<TidalTrack>> {
        self.albums
            .get(&id)
            .map(|(_, t)| t.clone())
            .ok_or_else(|| anyhow!("album {} not found", id))
    }

    async fn track(&self, id: i64) -> Result<TidalTrack> {
        self.tracks
            .get(&id)
            .cloned()
            .ok_or_else(|| anyhow!("track {} not found", id))
    }

    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>> {
        self.image
            .clone()
            .ok_or_else(|| anyhow!("no image at {}", url))
    }
}
