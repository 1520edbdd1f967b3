use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Penalty added to the match distance of every Tidal candidate.
    #[serde(default = "default_source_weight")]
    pub source_weight: f64,

    /// Where the OAuth token set is persisted. Relative paths are resolved
    /// against the application config directory.
    #[serde(default = "default_session_file")]
    pub session_file: PathBuf,

    // OAuth client registration used for device login and token refresh
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,

    /// Overrides the country code reported by the session.
    #[serde(default)]
    pub country_code: Option<String>,

    #[serde(default = "default_image_size")]
    pub image_size: u32,

    // path to the local collection database
    #[serde(default = "default_library_path")]
    pub library_path: PathBuf,

    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

fn default_source_weight() -> f64 { 0.5 }
fn default_session_file() -> PathBuf { "tidal.json".into() }
fn default_image_size() -> u32 { 1280 }
fn default_library_path() -> PathBuf { app_dir().join("library.db") }
fn default_log_dir() -> PathBuf { app_dir().join("logs") }

impl Default for Config {
    fn default() -> Self {
        Self {
            source_weight: default_source_weight(),
            session_file: default_session_file(),
            client_id: String::new(),
            client_secret: String::new(),
            country_code: None,
            image_size: default_image_size(),
            library_path: default_library_path(),
            log_dir: default_log_dir(),
        }
    }
}

/// Per-user application directory, e.g. `~/.config/tidal-tag-source`.
pub fn app_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tidal-tag-source")
}

impl Config {
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let s = std::fs::read_to_string(path)?;
        let cfg: Config = toml::from_str(&s)?;
        Ok(cfg)
    }

    /// Absolute location of the session file.
    pub fn session_path(&self) -> PathBuf {
        if self.session_file.is_absolute() {
            self.session_file.clone()
        } else {
            app_dir().join(&self.session_file)
        }
    }

    /// Client id from config, falling back to `TIDAL_CLIENT_ID`.
    pub fn resolved_client_id(&self) -> String {
        if self.client_id.trim().is_empty() {
            std::env::var("TIDAL_CLIENT_ID").unwrap_or_default()
        } else {
            self.client_id.trim().to_string()
        }
    }

    pub fn resolved_client_secret(&self) -> String {
        if self.client_secret.trim().is_empty() {
            std::env::var("TIDAL_CLIENT_SECRET").unwrap_or_default()
        } else {
            self.client_secret.trim().to_string()
        }
    }
}
