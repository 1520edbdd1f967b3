use super::tidal_auth::{save_session, Session, TidalAuth};
use super::{cover_url, Provider, SearchKind, IMAGE_BASE};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TidalArtist {
    pub id: i64,
    #[serde(default)]
    pub name: String,
}

/// Album reference embedded in a track.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TidalAlbumRef {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    pub cover: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TidalAlbum {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    /// Seconds.
    pub duration: Option<u64>,
    pub number_of_tracks: Option<u32>,
    pub number_of_volumes: Option<u32>,
    /// `YYYY-MM-DD`.
    pub release_date: Option<String>,
    pub copyright: Option<String>,
    #[serde(default)]
    pub explicit: bool,
    pub popularity: Option<i64>,
    pub cover: Option<String>,
    pub upc: Option<String>,
    pub isrc: Option<String>,
    pub artist: Option<TidalArtist>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TidalTrack {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    /// Seconds.
    pub duration: Option<u64>,
    pub track_number: Option<u32>,
    pub volume_number: Option<u32>,
    pub popularity: Option<i64>,
    pub isrc: Option<String>,
    #[serde(default)]
    pub explicit: bool,
    pub copyright: Option<String>,
    pub artist: Option<TidalArtist>,
    pub album: Option<TidalAlbumRef>,
}

#[derive(Deserialize)]
struct ItemsPage<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

/// Tidal provider over the v1 REST API. Every request carries the session's
/// authorization header and the account's country code.
pub struct TidalProvider {
    client: Client,
    auth: TidalAuth,
    api_base: String,
    image_base: String,
    country_code: String,
    session: tokio::sync::Mutex<Session>,
    /// Refreshed tokens are written back here when set.
    session_path: Option<PathBuf>,
}

impl TidalProvider {
    pub fn new(auth: TidalAuth, session: Session, session_path: Option<PathBuf>) -> Self {
        let country_code = session
            .country_code
            .clone()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| "US".into());
        Self {
            client: Client::new(),
            api_base: auth.api_base().to_string(),
            image_base: std::env::var("TIDAL_IMAGE_BASE").unwrap_or_else(|_| IMAGE_BASE.into()),
            auth,
            country_code,
            session: tokio::sync::Mutex::new(session),
            session_path,
        }
    }

    pub fn with_country_code(mut self, country_code: &str) -> Self {
        if !country_code.trim().is_empty() {
            self.country_code = country_code.trim().to_string();
        }
        self
    }

    pub fn with_image_base(mut self, image_base: &str) -> Self {
        self.image_base = image_base.trim_end_matches('/').to_string();
        self
    }

    pub fn country_code(&self) -> &str {
        &self.country_code
    }

    /// Authorization header value, refreshing the token when it is about to expire.
    pub async fn get_bearer(&self) -> Result<String> {
        let mut lock = self.session.lock().await;
        if lock.expires_within(30) && lock.refresh_token.is_some() {
            log::debug!("Tidal token near expiry, attempting refresh");
            let mut cur = lock.clone();
            match self.auth.refresh(&mut cur).await {
                Ok(()) => {
                    if let Some(path) = &self.session_path {
                        if let Err(e) = save_session(path, &cur) {
                            log::warn!("Failed to persist refreshed tidal session: {}", e);
                        }
                    }
                    *lock = cur;
                }
                Err(e) => log::warn!("Tidal token refresh failed: {}", e),
            }
        }
        Ok(lock.authorization())
    }

    async fn get_json<T: DeserializeOwned>(&self, path_and_query: &str) -> Result<T> {
        let sep = if path_and_query.contains('?') { '&' } else { '?' };
        let url = format!(
            "{}{}{}countryCode={}",
            self.api_base, path_and_query, sep, self.country_code
        );
        let bearer = self.get_bearer().await?;
        let resp = self
            .client
            .get(&url)
            .header(AUTHORIZATION, &bearer)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let txt = resp.text().await.unwrap_or_default();
            return Err(anyhow!("tidal GET {} failed: {} => {}", path_and_query, status, txt));
        }
        Ok(resp.json::<T>().await?)
    }
}

#[async_trait]
impl Provider for TidalProvider {
    fn name(&self) -> &str {
        "tidal"
    }

    fn is_authenticated(&self) -> bool {
        self.session
            .try_lock()
            .map(|s| !s.access_token.is_empty())
            .unwrap_or(true)
    }

    async fn search_top_hit(&self, query: &str, kind: SearchKind) -> Result<Option<i64>> {
        let path = format!(
            "/search?query={}&types={}&limit=10",
            urlencoding::encode(query),
            kind.as_param()
        );
        let j: serde_json::Value = self.get_json(&path).await?;
        let top = &j["topHit"];
        if top.is_null() {
            return Ok(None);
        }
        // The top hit is restricted by `types`, but guard against a mismatched shape.
        if let Some(t) = top["type"].as_str() {
            if t != kind.as_param() {
                log::debug!("Ignoring tidal top hit of type {} for {:?}", t, kind);
                return Ok(None);
            }
        }
        let id = top["value"]["id"]
            .as_i64()
            .or_else(|| top["value"]["id"].as_str().and_then(|s| s.parse().ok()));
        Ok(id)
    }

    async fn album(&self, id: i64) -> Result<TidalAlbum> {
        self.get_json(&format!("/albums/{}", id)).await
    }

    async fn album_tracks(&self, id: i64) -> Result<Vec<TidalTrack>> {
        let page: ItemsPage<TidalTrack> = self
            .get_json(&format!("/albums/{}/tracks?limit=100", id))
            .await?;
        Ok(page.items)
    }

    async fn track(&self, id: i64) -> Result<TidalTrack> {
        self.get_json(&format!("/tracks/{}", id)).await
    }

    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(anyhow!("image download failed: {} => {}", url, status));
        }
        Ok(resp.bytes().await?.to_vec())
    }

    fn image_url(&self, cover: &str, size: u32) -> String {
        cover_url(&self.image_base, cover, size)
    }
}
