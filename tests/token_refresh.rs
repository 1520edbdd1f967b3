use mockito::{Matcher, Server};
use serde_json::json;
use std::path::Path;
use tempfile::tempdir;
use tidal_tag_source::api::tidal_auth::TidalAuth;

fn write_session_file(path: &Path, access: &str, refresh: Option<&str>, expiry_time: f64) {
    let body = json!({
        "token_type": "Bearer",
        "access_token": access,
        "refresh_token": refresh,
        "expiry_time": expiry_time,
    });
    std::fs::write(path, body.to_string()).unwrap();
}

fn future_expiry() -> f64 {
    (chrono::Utc::now().timestamp() + 3600) as f64
}

#[test]
fn valid_stored_session_is_accepted() {
    let mut server = Server::new();
    let base = server.url();
    let _m = server
        .mock("GET", "/sessions")
        .match_header("authorization", "Bearer valid")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"sessionId": "s1", "userId": 42, "countryCode": "NO"}).to_string())
        .create();

    let td = tempdir().unwrap();
    let path = td.path().join("tidal.json");
    write_session_file(&path, "valid", Some("refresh-1"), future_expiry());

    let auth = TidalAuth::new("cid".into(), String::new()).with_base_urls(&base, &base);
    let rt = tokio::runtime::Runtime::new().unwrap();
    let session = rt
        .block_on(auth.load_session(&path))
        .expect("load")
        .expect("session");
    assert_eq!(session.access_token, "valid");
    assert_eq!(session.refresh_token.as_deref(), Some("refresh-1"));
    assert_eq!(session.country_code.as_deref(), Some("NO"));
    assert_eq!(session.user_id, Some(42));
}

#[test]
fn expired_session_is_refreshed_and_written_back() {
    let mut server = Server::new();
    let base = server.url();
    let _m_token = server
        .mock("POST", "/v1/oauth2/token")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
            Matcher::UrlEncoded("refresh_token".into(), "refresh-1".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"access_token": "new-access", "token_type": "Bearer", "expires_in": 3600}).to_string())
        .create();
    let _m_session = server
        .mock("GET", "/sessions")
        .match_header("authorization", "Bearer new-access")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"sessionId": "s1", "userId": 7, "countryCode": "SE"}).to_string())
        .create();

    let td = tempdir().unwrap();
    let path = td.path().join("tidal.json");
    write_session_file(&path, "old", Some("refresh-1"), 1000.0);

    let auth = TidalAuth::new("cid".into(), "secret".into()).with_base_urls(&base, &base);
    let rt = tokio::runtime::Runtime::new().unwrap();
    let session = rt
        .block_on(auth.load_session(&path))
        .expect("load")
        .expect("session");
    assert_eq!(session.access_token, "new-access");
    // the refresh response carried no refresh token, so the old one is kept
    assert_eq!(session.refresh_token.as_deref(), Some("refresh-1"));
    assert_eq!(session.country_code.as_deref(), Some("SE"));

    let stored: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(stored["access_token"], "new-access");
    assert_eq!(stored["refresh_token"], "refresh-1");
    assert!(stored["expiry_time"].as_f64().unwrap() > chrono::Utc::now().timestamp() as f64);
}

#[test]
fn rejected_token_triggers_one_refresh() {
    let mut server = Server::new();
    let base = server.url();
    let _m_old = server
        .mock("GET", "/sessions")
        .match_header("authorization", "Bearer old")
        .with_status(401)
        .with_header("content-type", "application/json")
        .with_body(json!({"status": 401, "subStatus": 11003, "userMessage": "The token has expired."}).to_string())
        .create();
    let _m_token = server
        .mock("POST", "/v1/oauth2/token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"access_token": "fresh", "refresh_token": "refresh-2", "token_type": "Bearer", "expires_in": 600}).to_string())
        .create();
    let _m_new = server
        .mock("GET", "/sessions")
        .match_header("authorization", "Bearer fresh")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"sessionId": "s2", "userId": 1, "countryCode": "US"}).to_string())
        .create();

    let td = tempdir().unwrap();
    let path = td.path().join("tidal.json");
    write_session_file(&path, "old", Some("refresh-1"), future_expiry());

    let auth = TidalAuth::new("cid".into(), String::new()).with_base_urls(&base, &base);
    let rt = tokio::runtime::Runtime::new().unwrap();
    let session = rt
        .block_on(auth.load_session(&path))
        .expect("load")
        .expect("session");
    assert_eq!(session.access_token, "fresh");
    assert_eq!(session.refresh_token.as_deref(), Some("refresh-2"));
}

#[test]
fn failed_refresh_and_rejected_token_yield_no_session() {
    let mut server = Server::new();
    let base = server.url();
    let _m_token = server
        .mock("POST", "/v1/oauth2/token")
        .with_status(400)
        .with_header("content-type", "application/json")
        .with_body(json!({"error": "invalid_client"}).to_string())
        .expect(1)
        .create();
    let _m_session = server
        .mock("GET", "/sessions")
        .with_status(401)
        .with_body("{}")
        .create();

    let td = tempdir().unwrap();
    let path = td.path().join("tidal.json");
    write_session_file(&path, "old", Some("refresh-1"), 1000.0);
    let before = std::fs::read_to_string(&path).unwrap();

    let auth = TidalAuth::new(String::new(), String::new()).with_base_urls(&base, &base);
    let rt = tokio::runtime::Runtime::new().unwrap();
    let res = rt.block_on(auth.load_session(&path)).expect("load");
    assert!(res.is_none());
    // the rejected refresh token is not retried after the 401
    _m_token.assert();
    // nothing is written when the session could not be restored
    assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
}

#[test]
fn huge_expires_in_does_not_abort_refresh() {
    let mut server = Server::new();
    let base = server.url();
    let _m_token = server
        .mock("POST", "/v1/oauth2/token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({"access_token": "fresh", "token_type": "Bearer", "expires_in": i64::MAX})
                .to_string(),
        )
        .create();
    let _m_session = server
        .mock("GET", "/sessions")
        .match_header("authorization", "Bearer fresh")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"userId": 7, "countryCode": "SE"}).to_string())
        .create();

    let td = tempdir().unwrap();
    let path = td.path().join("tidal.json");
    write_session_file(&path, "old", Some("refresh-1"), 1000.0);

    let auth = TidalAuth::new("cid".into(), String::new()).with_base_urls(&base, &base);
    let rt = tokio::runtime::Runtime::new().unwrap();
    let session = rt
        .block_on(auth.load_session(&path))
        .expect("load")
        .expect("session");
    assert_eq!(session.access_token, "fresh");
    assert!(!session.expires_within(0));
}

#[test]
fn rejected_token_without_refresh_token_yields_no_session() {
    let mut server = Server::new();
    let base = server.url();
    let _m_session = server
        .mock("GET", "/sessions")
        .with_status(401)
        .with_body("{}")
        .create();

    let td = tempdir().unwrap();
    let path = td.path().join("tidal.json");
    write_session_file(&path, "old", None, future_expiry());

    let auth = TidalAuth::new("cid".into(), String::new()).with_base_urls(&base, &base);
    let rt = tokio::runtime::Runtime::new().unwrap();
    assert!(rt.block_on(auth.load_session(&path)).expect("load").is_none());
}
