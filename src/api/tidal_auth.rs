use anyhow::{anyhow, Context, Result};
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";
const SCOPE: &str = "r_usr w_usr w_sub";
const MAX_EXPIRES_IN: i64 = 365 * 24 * 3600;

/// Token set as persisted on disk. Kept flat so other tools can read it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredSession {
    pub token_type: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Epoch seconds, fractional.
    pub expiry_time: f64,
}

/// An authorized session against the Tidal API.
#[derive(Clone, Debug, PartialEq)]
pub struct Session {
    pub token_type: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expiry_time: DateTime<Utc>,
    pub country_code: Option<String>,
    pub user_id: Option<i64>,
}

impl Session {
    pub fn authorization(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }

    /// True when the access token expires within `margin_secs`.
    pub fn expires_within(&self, margin_secs: i64) -> bool {
        Utc::now().timestamp() + margin_secs >= self.expiry_time.timestamp()
    }

    fn to_stored(&self) -> StoredSession {
        StoredSession {
            token_type: self.token_type.clone(),
            access_token: self.access_token.clone(),
            refresh_token: self.refresh_token.clone(),
            expiry_time: self.expiry_time.timestamp_millis() as f64 / 1000.0,
        }
    }

    fn from_stored(st: StoredSession) -> Self {
        let millis = (st.expiry_time * 1000.0).round() as i64;
        let expiry_time = Utc
            .timestamp_millis_opt(millis)
            .single()
            .unwrap_or_else(Utc::now);
        Self {
            token_type: st.token_type,
            access_token: st.access_token,
            refresh_token: st.refresh_token.filter(|t| !t.is_empty()),
            expiry_time,
            country_code: None,
            user_id: None,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeviceAuthorization {
    device_code: String,
    user_code: String,
    verification_uri_complete: Option<String>,
    verification_uri: Option<String>,
    expires_in: i64,
    #[serde(default = "default_interval")]
    interval: u64,
}

fn default_interval() -> u64 {
    2
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default = "default_token_type")]
    token_type: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
    #[serde(default)]
    user: Option<TokenUser>,
}

fn default_token_type() -> String {
    "Bearer".into()
}

fn default_expires_in() -> i64 {
    3600
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenUser {
    user_id: Option<i64>,
    country_code: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionInfo {
    user_id: Option<i64>,
    country_code: Option<String>,
}

/// OAuth helper for the Tidal device login flow and session persistence.
///
/// Base URLs default to the public endpoints and can be overridden with
/// `TIDAL_API_BASE` / `TIDAL_AUTH_BASE` or `with_base_urls` (tests).
#[derive(Clone, Debug)]
pub struct TidalAuth {
    client: Client,
    client_id: String,
    client_secret: String,
    api_base: String,
    auth_base: String,
}

impl TidalAuth {
    pub fn new(client_id: String, client_secret: String) -> Self {
        Self {
            client: Client::new(),
            client_id,
            client_secret,
            api_base: std::env::var("TIDAL_API_BASE")
                .unwrap_or_else(|_| "https://api.tidal.com/v1".into()),
            auth_base: std::env::var("TIDAL_AUTH_BASE")
                .unwrap_or_else(|_| "https://auth.tidal.com".into()),
        }
    }

    pub fn with_base_urls(mut self, api_base: &str, auth_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self.auth_base = auth_base.trim_end_matches('/').to_string();
        self
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Load a persisted session and check it against the service.
    ///
    /// Returns `Ok(None)` when the file is missing, unreadable as JSON, or
    /// the tokens are rejected. A refreshed token set is written back.
    pub async fn load_session(&self, path: &Path) -> Result<Option<Session>> {
        debug!("Loading tidal session from {}", path.display());
        let raw = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("reading {}", path.display()));
            }
        };
        let stored: StoredSession = match serde_json::from_str(&raw) {
            Ok(s) => s,
            Err(e) => {
                warn!("Tidal session file {} is corrupted: {}", path.display(), e);
                return Ok(None);
            }
        };

        let mut session = Session::from_stored(stored);
        let mut refreshed = false;
        // At most one refresh per load, successful or not.
        let mut refresh_attempted = false;

        if session.expires_within(0) && session.refresh_token.is_some() {
            debug!("Stored tidal token expired, attempting refresh");
            refresh_attempted = true;
            match self.refresh(&mut session).await {
                Ok(()) => refreshed = true,
                Err(e) => warn!("Tidal token refresh failed: {}", e),
            }
        }

        let mut valid = self.validate(&mut session).await?;
        if !valid && !refresh_attempted && session.refresh_token.is_some() {
            debug!("Tidal rejected stored token, attempting refresh");
            match self.refresh(&mut session).await {
                Ok(()) => {
                    refreshed = true;
                    valid = self.validate(&mut session).await?;
                }
                Err(e) => warn!("Tidal token refresh failed: {}", e),
            }
        }

        if !valid {
            return Ok(None);
        }
        if refreshed {
            save_session(path, &session)?;
        }
        Ok(Some(session))
    }

    /// Check the token set against `GET /sessions`, filling in account details.
    pub async fn validate(&self, session: &mut Session) -> Result<bool> {
        let url = format!("{}/sessions", self.api_base);
        let resp = self
            .client
            .get(&url)
            .header(AUTHORIZATION, session.authorization())
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let txt = resp.text().await.unwrap_or_default();
            debug!("Tidal session check failed: {} => {}", status, txt);
            return Ok(false);
        }
        let info: SessionInfo = resp.json().await?;
        session.user_id = info.user_id;
        session.country_code = info.country_code;
        Ok(true)
    }

    /// Exchange the refresh token for a new access token.
    pub async fn refresh(&self, session: &mut Session) -> Result<()> {
        let refresh_token = session
            .refresh_token
            .clone()
            .ok_or_else(|| anyhow!("no refresh token"))?;
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
            ("client_id", self.client_id.as_str()),
            ("scope", SCOPE),
        ];
        let url = format!("{}/v1/oauth2/token", self.auth_base);
        let mut req = self.client.post(&url).form(&params);
        if !self.client_secret.is_empty() {
            let auth_header = format!(
                "Basic {}",
                base64::engine::general_purpose::STANDARD
                    .encode(format!("{}:{}", self.client_id, self.client_secret))
            );
            req = req.header(AUTHORIZATION, auth_header);
        }
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!(
                "Failed to refresh tidal token: {} - {}",
                status,
                body
            ));
        }
        let tr: TokenResponse = resp.json().await?;
        session.access_token = tr.access_token;
        session.token_type = tr.token_type;
        session.expiry_time = expiry_after(tr.expires_in);
        if let Some(rt) = tr.refresh_token.filter(|t| !t.is_empty()) {
            session.refresh_token = Some(rt);
        }
        Ok(())
    }

    /// Interactive device login: print a link for the user and poll until
    /// the login is approved, denied, or the code expires.
    pub async fn login_oauth_simple(&self) -> Result<Session> {
        if self.client_id.trim().is_empty() {
            return Err(anyhow!(
                "no Tidal client_id configured; set client_id in the config or TIDAL_CLIENT_ID"
            ));
        }
        let url = format!("{}/v1/oauth2/device_authorization", self.auth_base);
        let resp = self
            .client
            .post(&url)
            .form(&[("client_id", self.client_id.as_str()), ("scope", SCOPE)])
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let txt = resp.text().await.unwrap_or_default();
            return Err(anyhow!("device authorization failed: {} => {}", status, txt));
        }
        let device: DeviceAuthorization = resp.json().await?;

        let link = device
            .verification_uri_complete
            .as_deref()
            .or(device.verification_uri.as_deref())
            .map(absolute_link)
            .transpose()?
            .ok_or_else(|| anyhow!("no verification link in device authorization response"))?;
        println!(
            "Visit {} to log in (code {}), the code will expire in {} seconds.",
            link, device.user_code, device.expires_in
        );

        let deadline = Utc::now().timestamp() + device.expires_in;
        let token_url = format!("{}/v1/oauth2/token", self.auth_base);
        loop {
            tokio::time::sleep(Duration::from_secs(device.interval)).await;
            if Utc::now().timestamp() > deadline {
                return Err(anyhow!("device code expired before login completed"));
            }
            let params = [
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("device_code", device.device_code.as_str()),
                ("grant_type", DEVICE_CODE_GRANT),
                ("scope", SCOPE),
            ];
            let resp = self.client.post(&token_url).form(&params).send().await?;
            let status = resp.status();
            if status.is_success() {
                let tr: TokenResponse = resp.json().await?;
                info!("Tidal login approved");
                let (user_id, country_code) = match tr.user {
                    Some(u) => (u.user_id, u.country_code),
                    None => (None, None),
                };
                return Ok(Session {
                    token_type: tr.token_type,
                    access_token: tr.access_token,
                    refresh_token: tr.refresh_token.filter(|t| !t.is_empty()),
                    expiry_time: expiry_after(tr.expires_in),
                    country_code,
                    user_id,
                });
            }

            let body: serde_json::Value = resp.json().await.unwrap_or_default();
            let error = body["error"].as_str().unwrap_or("");
            if status == StatusCode::BAD_REQUEST && error == "authorization_pending" {
                debug!("Waiting for Tidal login approval");
                continue;
            }
            return Err(anyhow!("tidal login failed: {} => {}", status, body));
        }
    }
}

/// Expiry `expires_in` seconds from now. Out-of-range values clamp to a year.
fn expiry_after(expires_in: i64) -> DateTime<Utc> {
    let secs = expires_in.clamp(0, MAX_EXPIRES_IN);
    let now = Utc::now();
    chrono::Duration::try_seconds(secs)
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(now)
}

/// Verification links come back without a scheme.
fn absolute_link(raw: &str) -> Result<Url> {
    match Url::parse(raw) {
        Ok(u) => Ok(u),
        Err(_) => Url::parse(&format!("https://{}", raw))
            .map_err(|e| anyhow!("invalid verification link {:?}: {}", raw, e)),
    }
}

/// Write the token set as pretty-printed flat JSON.
pub fn save_session(path: &Path, session: &Session) -> Result<()> {
    debug!("Saving tidal session to {}", path.display());
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(&session.to_stored())?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

/// Load the persisted session, falling back to an interactive login whose
/// result is persisted for next time.
pub async fn establish_session(auth: &TidalAuth, path: &Path) -> Result<Session> {
    if let Some(session) = auth.load_session(path).await? {
        return Ok(session);
    }
    debug!("JSON file corrupted or does not exist, performing simple OAuth login.");
    let session = auth.login_oauth_simple().await?;
    save_session(path, &session)?;
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_round_trip_keeps_expiry_to_the_millisecond() {
        let st = StoredSession {
            token_type: "Bearer".into(),
            access_token: "a".into(),
            refresh_token: Some("r".into()),
            expiry_time: 1_700_000_000.25,
        };
        let session = Session::from_stored(st.clone());
        assert_eq!(session.expiry_time.timestamp(), 1_700_000_000);
        assert_eq!(session.to_stored(), st);
    }

    #[test]
    fn empty_refresh_token_is_treated_as_missing() {
        let session = Session::from_stored(StoredSession {
            token_type: "Bearer".into(),
            access_token: "a".into(),
            refresh_token: Some(String::new()),
            expiry_time: 0.0,
        });
        assert!(session.refresh_token.is_none());
        assert!(session.expires_within(0));
        assert_eq!(session.authorization(), "Bearer a");
    }

    #[test]
    fn absurd_expires_in_is_clamped() {
        let now = Utc::now();
        let far = expiry_after(i64::MAX);
        assert!(far > now);
        assert!(far <= Utc::now() + chrono::Duration::days(366));
        assert!(expiry_after(-5) <= Utc::now());
        let hour = expiry_after(3600) - now;
        assert!(hour.num_seconds() >= 3599 && hour.num_seconds() <= 3601);
    }

    #[test]
    fn verification_link_gets_scheme() {
        assert_eq!(
            absolute_link("link.tidal.com/ABCDE").unwrap().as_str(),
            "https://link.tidal.com/ABCDE"
        );
        assert_eq!(
            absolute_link("https://link.tidal.com/X").unwrap().as_str(),
            "https://link.tidal.com/X"
        );
    }
}
