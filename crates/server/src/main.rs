use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shelfie_core::{
    config::{LibrqbitConfig, MediaServerBackend, TorrentClientBackend},
    load_config, validate_config, Config, DownloadManager, EpisodeResolver, FsPlacer,
    LibraryNotifier, LibraryRoots, LibrqbitClient, ManagerConfig, MetadataSource, Organizer,
    PlexNotifier, SessionRegistry, SqliteSessionStore, TmdbSource, TorrentClient,
};
use shelfie_server::{api::create_router, state::AppState};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("SHELFIE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Database path: {:?}", config.database.path);

    // Session store and registry, restored from the previous run
    let store = Arc::new(
        SqliteSessionStore::new(&config.database.path)
            .context("Failed to create session store")?,
    );
    let registry = SessionRegistry::open(store, &config.sessions)
        .await
        .context("Failed to restore sessions")?;
    info!(
        active = registry.active_count().await,
        "Session registry restored"
    );

    let torrent_client = create_torrent_client(&config).await?;
    let resolver = create_resolver(&config);
    let notifier = create_notifier(&config);

    let organizer = Organizer::new(
        resolver,
        Arc::new(FsPlacer::new(config.placer.clone())),
        notifier,
        LibraryRoots::from(&config.library),
    );

    let manager = Arc::new(DownloadManager::new(
        Arc::new(registry),
        torrent_client,
        Arc::new(organizer),
        ManagerConfig::from(&config),
    ));
    manager.start().await;
    info!("Download manager started");

    let state = Arc::new(AppState::new(config.clone(), Arc::clone(&manager)));
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Pause transfers and persist sessions so the next start resumes them
    info!("Server shutting down...");
    manager.shutdown().await;
    info!("Download manager stopped");

    Ok(())
}

async fn create_torrent_client(config: &Config) -> Result<Arc<dyn TorrentClient>> {
    let librqbit_config = match &config.torrent_client {
        Some(tc_config) => match tc_config.backend {
            TorrentClientBackend::Librqbit => tc_config
                .librqbit
                .clone()
                .context("librqbit backend selected but no librqbit config provided")?,
        },
        None => {
            info!("No torrent client configured, using embedded librqbit defaults");
            LibrqbitConfig {
                download_path: config.library.staging_path.display().to_string(),
                persistence_path: None,
                listen_port: None,
                enable_dht: true,
            }
        }
    };

    info!(
        "Initializing embedded librqbit client (download path: {})",
        librqbit_config.download_path
    );
    let client = LibrqbitClient::new(&librqbit_config)
        .await
        .context("Failed to initialize librqbit client")?;
    Ok(Arc::new(client))
}

fn create_resolver(config: &Config) -> EpisodeResolver {
    let Some(tmdb_config) = &config.metadata.tmdb else {
        info!("No metadata source configured, episode titles will not be resolved");
        return EpisodeResolver::disabled();
    };

    match TmdbSource::new(tmdb_config.clone()) {
        Ok(source) => {
            info!("Initializing TMDB metadata source");
            let source: Arc<dyn MetadataSource> = Arc::new(source);
            EpisodeResolver::new(source, Duration::from_secs(config.metadata.timeout_secs))
        }
        Err(e) => {
            warn!("Failed to create TMDB source, episode titles disabled: {}", e);
            EpisodeResolver::disabled()
        }
    }
}

fn create_notifier(config: &Config) -> Option<Arc<dyn LibraryNotifier>> {
    let media_server = match &config.media_server {
        Some(m) => m,
        None => {
            info!("No media server configured");
            return None;
        }
    };

    match media_server.backend {
        MediaServerBackend::Plex => {
            let plex_config = match &media_server.plex {
                Some(p) => p.clone(),
                None => {
                    error!("Plex backend selected but no plex config provided");
                    return None;
                }
            };
            info!("Initializing Plex notifier at {}", plex_config.url);
            match PlexNotifier::new(plex_config) {
                Ok(notifier) => Some(Arc::new(notifier)),
                Err(e) => {
                    error!("Failed to create Plex notifier: {}", e);
                    None
                }
            }
        }
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
