use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tidal_tag_source as lib;
use lib::api::tidal::TidalProvider;
use lib::api::tidal_auth::{establish_session, TidalAuth};
use lib::api::Provider;
use lib::config::Config;
use lib::source::TidalSource;
use tracing::subscriber as tracing_subscriber_global;
use tracing_appender::rolling::RollingFileAppender;
use tracing_log::LogTracer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "tidal-tag-source", version)]
struct Cli {
    /// Path to config TOML
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in to Tidal (device login) unless a valid session is stored
    Auth,
    /// Check the stored session without logging in
    AuthTest,
    /// Search the top album hit for a release
    AlbumSearch {
        #[arg(long, default_value = "")]
        artist: String,
        #[arg(long)]
        release: String,
        /// Various artists release: search by title only
        #[arg(long)]
        va: bool,
    },
    /// Search the top track hit for a title
    TrackSearch {
        #[arg(long, default_value = "")]
        artist: String,
        #[arg(long)]
        title: String,
    },
    /// Fetch an album by Tidal id
    Album { id: i64 },
    /// Fetch a track by Tidal id
    Track { id: i64 },
    /// Add an item to the local collection
    AddItem {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        artist: String,
        #[arg(long, default_value = "")]
        album: String,
    },
    /// Match a collection item on Tidal and store its Tidal fields
    MatchItem {
        id: i64,
        /// Also fetch the album and store its popularity
        #[arg(long)]
        album: bool,
    },
    /// Refresh track popularity for collection items
    Sync {
        /// Refetch even when a popularity is already stored
        #[arg(long, short)]
        force: bool,
        /// Only items whose title, artist or album contain this text
        query: Option<String>,
    },
    /// Validate config file and exit
    ConfigValidate,
}

fn resolve_config(explicit: Option<&PathBuf>) -> Result<(Config, Option<PathBuf>)> {
    let path = match explicit {
        Some(p) => Some(p.clone()),
        None => {
            let default_path = lib::config::app_dir().join("config.toml");
            default_path.exists().then_some(default_path)
        }
    };
    match path {
        Some(p) => {
            let cfg = Config::from_path(&p)
                .with_context(|| format!("loading config from {}", p.display()))?;
            Ok((cfg, Some(p)))
        }
        None => Ok((Config::default(), None)),
    }
}

fn init_logging(cfg: &Config) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    // Logs go to both stdout and a daily-rotated file in cfg.log_dir.
    let _ = LogTracer::init();
    std::fs::create_dir_all(&cfg.log_dir)
        .with_context(|| format!("creating log dir {}", cfg.log_dir.display()))?;
    let file_appender: RollingFileAppender =
        tracing_appender::rolling::daily(&cfg.log_dir, "tidal-tag-source.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // Honor RUST_LOG if set, otherwise default to info.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = fmt::layer().with_writer(non_blocking);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer);

    tracing_subscriber_global::set_global_default(subscriber)
        .context("failed to set global tracing subscriber")?;
    Ok(guard)
}

fn auth_for(cfg: &Config) -> TidalAuth {
    TidalAuth::new(cfg.resolved_client_id(), cfg.resolved_client_secret())
}

/// Load (or interactively create) the session and wrap it in a provider.
async fn connect(cfg: &Config) -> Result<Arc<TidalProvider>> {
    let auth = auth_for(cfg);
    let session_path = cfg.session_path();
    let session = establish_session(&auth, &session_path)
        .await
        .context("establishing tidal session")?;
    let mut provider = TidalProvider::new(auth, session, Some(session_path));
    if let Some(cc) = &cfg.country_code {
        provider = provider.with_country_code(cc);
    }
    Ok(Arc::new(provider))
}

fn source_for(cfg: &Config, provider: Arc<TidalProvider>) -> TidalSource {
    TidalSource::new(provider, cfg.source_weight, cfg.image_size)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (cfg, cfg_path) = resolve_config(cli.config.as_ref())?;

    if let Commands::ConfigValidate = cli.command {
        match cfg_path {
            Some(p) => println!("OK ({})", p.display()),
            None => println!("OK (defaults)"),
        }
        return Ok(());
    }

    let _guard = init_logging(&cfg)?;

    match cli.command {
        Commands::ConfigValidate => {}
        Commands::Auth => {
            let provider = connect(&cfg).await?;
            println!(
                "Tidal session ready (country {}), stored at {}",
                provider.country_code(),
                cfg.session_path().display()
            );
        }
        Commands::AuthTest => {
            let auth = auth_for(&cfg);
            let path = cfg.session_path();
            match auth.load_session(&path).await? {
                Some(session) => {
                    println!(
                        "Tidal session OK: user {:?}, country {:?}, expires {}",
                        session.user_id, session.country_code, session.expiry_time
                    );
                }
                None => {
                    return Err(anyhow!(
                        "no valid tidal session at {}; run `auth` first",
                        path.display()
                    ));
                }
            }
        }
        Commands::AlbumSearch { artist, release, va } => {
            let source = source_for(&cfg, connect(&cfg).await?);
            let albums = source.candidates(&artist, &release, va).await;
            if albums.is_empty() {
                println!("No Tidal album found.");
            }
            for album in &albums {
                print_json(album)?;
                println!("distance: {}", source.album_distance(album).total());
            }
        }
        Commands::TrackSearch { artist, title } => {
            let source = source_for(&cfg, connect(&cfg).await?);
            let tracks = source.item_candidates(&artist, &title).await;
            if tracks.is_empty() {
                println!("No Tidal track found.");
            }
            for track in &tracks {
                print_json(track)?;
                println!("distance: {}", source.track_distance(track).total());
            }
        }
        Commands::Album { id } => {
            let source = source_for(&cfg, connect(&cfg).await?);
            let album = source
                .album_for_id(id)
                .await
                .with_context(|| format!("fetching album {}", id))?;
            print_json(&album)?;
        }
        Commands::Track { id } => {
            let source = source_for(&cfg, connect(&cfg).await?);
            let track = source
                .track_for_id(id)
                .await
                .with_context(|| format!("fetching track {}", id))?;
            print_json(&track)?;
        }
        Commands::AddItem { title, artist, album } => {
            let conn = lib::db::open_or_create(&cfg.library_path)
                .with_context(|| format!("opening {}", cfg.library_path.display()))?;
            let id = lib::db::add_item(&conn, &title, &artist, &album)?;
            println!("Added item {}", id);
        }
        Commands::MatchItem { id, album } => {
            let source = source_for(&cfg, connect(&cfg).await?);
            match lib::sync::match_item(&cfg.library_path, &source, id, album).await? {
                Some(track) => print_json(&track)?,
                None => println!("No Tidal match for item {}.", id),
            }
        }
        Commands::Sync { force, query } => {
            let provider = connect(&cfg).await?;
            if !provider.is_authenticated() {
                return Err(anyhow!("Tidal provider is not authenticated. Run auth first."));
            }
            let report = lib::sync::sync_popularity(
                &cfg.library_path,
                provider,
                query.as_deref(),
                force,
            )
            .await
            .context("syncing popularity")?;
            println!(
                "Updated {} item(s), skipped {}, failed {}.",
                report.updated, report.skipped, report.failed
            );
            report.check()?;
        }
    }

    Ok(())
}
