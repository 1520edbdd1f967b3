pub mod mock;
pub mod tidal;
pub mod tidal_auth;

use anyhow::Result;
use tidal::{TidalAlbum, TidalTrack};

/// Base URL of the public Tidal image CDN.
pub const IMAGE_BASE: &str = "https://resources.tidal.com/images";

/// Result type filter for a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchKind {
    Album,
    Track,
}

impl SearchKind {
    /// Value used for the `types` search parameter and in `topHit.type`.
    pub fn as_param(&self) -> &'static str {
        match self {
            SearchKind::Album => "ALBUMS",
            SearchKind::Track => "TRACKS",
        }
    }
}

/// Provider trait: the lookups the metadata source needs.
/// Implementations: tidal::TidalProvider and mock::MockProvider.
#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    /// Search for `query` restricted to `kind` and return the id of the top hit, if any.
    async fn search_top_hit(&self, query: &str, kind: SearchKind) -> Result<Option<i64>>;

    /// Fetch a full album record.
    async fn album(&self, id: i64) -> Result<TidalAlbum>;

    /// Fetch the tracks of an album in release order.
    async fn album_tracks(&self, id: i64) -> Result<Vec<TidalTrack>>;

    /// Fetch a full track record.
    async fn track(&self, id: i64) -> Result<TidalTrack>;

    /// Download raw image bytes.
    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>>;

    /// URL of a square cover image for a cover UUID.
    fn image_url(&self, cover: &str, size: u32) -> String {
        cover_url(IMAGE_BASE, cover, size)
    }

    /// Return the provider's name (for logging)
    fn name(&self) -> &str;

    /// Return true if the provider holds credentials it can use
    fn is_authenticated(&self) -> bool;
}

/// Cover UUIDs map to CDN paths by replacing dashes with slashes.
pub fn cover_url(base: &str, cover: &str, size: u32) -> String {
    format!(
        "{}/{}/{}x{}.jpg",
        base.trim_end_matches('/'),
        cover.replace('-', "/"),
        size,
        size
    )
}
