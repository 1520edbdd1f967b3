use std::fs::File;
use std::io::Write;
use tempfile::tempdir;

use tidal_tag_source::config::Config;
use tidal_tag_source::db;
use tidal_tag_source::models::TrackInfo;

#[test]
fn config_from_path_parses_toml() {
    let td = tempdir().unwrap();
    let cfg_path = td.path().join("cfg.toml");
    let mut f = File::create(&cfg_path).unwrap();
    let toml = r#"
source_weight = 0.8
session_file = "/tmp/tidal-session.json"
client_id = "abc"
library_path = "/tmp/library.db"
log_dir = "/tmp"
"#;
    f.write_all(toml.as_bytes()).unwrap();
    let cfg = Config::from_path(&cfg_path).expect("parse config");
    assert_eq!(cfg.source_weight, 0.8);
    assert_eq!(cfg.session_path().to_str().unwrap(), "/tmp/tidal-session.json");
    assert_eq!(cfg.resolved_client_id(), "abc");
    assert_eq!(cfg.library_path.to_str().unwrap(), "/tmp/library.db");
    assert_eq!(cfg.image_size, 1280);
}

#[test]
fn empty_config_uses_defaults() {
    let td = tempdir().unwrap();
    let cfg_path = td.path().join("cfg.toml");
    File::create(&cfg_path).unwrap();
    let cfg = Config::from_path(&cfg_path).expect("parse config");
    assert_eq!(cfg.source_weight, 0.5);
    assert!(cfg.session_path().ends_with("tidal.json"));
    assert!(cfg.country_code.is_none());
}

#[test]
fn run_migrations_creates_items_table() {
    let td = tempdir().unwrap();
    let db_path = td.path().join("test.db");
    let conn = rusqlite::Connection::open(&db_path).unwrap();
    db::run_migrations(&conn).expect("run migrations");
    // running twice is harmless
    db::run_migrations(&conn).expect("run migrations again");
    let mut stmt = conn
        .prepare("SELECT name FROM sqlite_master WHERE type='table' AND name='items'")
        .unwrap();
    let mut rows = stmt.query([]).unwrap();
    let found = rows.next().unwrap().is_some();
    assert!(found, "items table should exist after migrations");
}

#[test]
fn query_items_filters_by_substring() {
    let td = tempdir().unwrap();
    let conn = db::open_or_create(&td.path().join("nested/library.db")).unwrap();
    db::add_item(&conn, "Come Together", "The Beatles", "Abbey Road").unwrap();
    db::add_item(&conn, "Time", "Pink Floyd", "The Dark Side of the Moon").unwrap();
    db::add_item(&conn, "Something", "The Beatles", "Abbey Road").unwrap();

    assert_eq!(db::query_items(&conn, None).unwrap().len(), 3);
    assert_eq!(db::query_items(&conn, Some("  ")).unwrap().len(), 3);
    let beatles = db::query_items(&conn, Some("beatles")).unwrap();
    assert_eq!(beatles.len(), 2);
    assert_eq!(beatles[0].title, "Come Together");
    let moon = db::query_items(&conn, Some("Moon")).unwrap();
    assert_eq!(moon.len(), 1);
    assert_eq!(moon[0].artist, "Pink Floyd");
}

#[test]
fn query_items_treats_wildcards_literally() {
    let td = tempdir().unwrap();
    let conn = db::open_or_create(&td.path().join("library.db")).unwrap();
    db::add_item(&conn, "Abc", "", "").unwrap();
    db::add_item(&conn, "100% Pure", "", "").unwrap();
    db::add_item(&conn, "snake_case", "", "").unwrap();
    db::add_item(&conn, "back\\slash", "", "").unwrap();

    assert!(db::query_items(&conn, Some("a_c")).unwrap().is_empty());
    let pct = db::query_items(&conn, Some("%")).unwrap();
    assert_eq!(pct.len(), 1);
    assert_eq!(pct[0].title, "100% Pure");
    let underscore = db::query_items(&conn, Some("_")).unwrap();
    assert_eq!(underscore.len(), 1);
    assert_eq!(underscore[0].title, "snake_case");
    let slash = db::query_items(&conn, Some("\\")).unwrap();
    assert_eq!(slash.len(), 1);
    assert_eq!(slash[0].title, "back\\slash");
}

#[test]
fn apply_track_info_and_store_popularity() {
    let td = tempdir().unwrap();
    let conn = db::open_or_create(&td.path().join("library.db")).unwrap();
    let id = db::add_item(&conn, "Time", "Pink Floyd", "DSOTM").unwrap();

    let info = TrackInfo {
        title: "Time".into(),
        tidal_track_id: Some(1001),
        tidal_artist_id: Some(9),
        tidal_album_id: Some(500),
        length: Some(413),
        isrc: Some("GBN9Y1100085".into()),
        tidal_track_popularity: Some(55),
        data_source: "Tidal".into(),
        tidal_updated: 1_700_000_000,
        ..Default::default()
    };
    db::apply_track_info(&conn, id, &info).unwrap();
    let item = db::get_item(&conn, id).unwrap().expect("item");
    assert_eq!(item.tidal_id, Some(1001));
    assert_eq!(item.tidal_track_id, Some(1001));
    assert_eq!(item.tidal_album_id, Some(500));
    assert_eq!(item.tidal_duration, Some(413));
    assert_eq!(item.isrc.as_deref(), Some("GBN9Y1100085"));
    assert_eq!(item.tidal_track_popularity, Some(55));

    db::store_popularity(&conn, id, 61, 1_700_000_100).unwrap();
    let item = db::get_item(&conn, id).unwrap().expect("item");
    assert_eq!(item.tidal_track_popularity, Some(61));
    assert_eq!(item.tidal_updated, Some(1_700_000_100));

    assert!(db::get_item(&conn, id + 100).unwrap().is_none());
}
