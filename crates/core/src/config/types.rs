use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::metadata::TmdbConfig;
use crate::notifier::PlexConfig;
use crate::placer::PlacerConfig;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    pub library: LibraryConfig,
    #[serde(default)]
    pub torrent_client: Option<TorrentClientConfig>,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub media_server: Option<MediaServerConfig>,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub placer: PlacerConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("shelfie.db")
}

/// Library roots scanned by the media server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LibraryConfig {
    /// Root for movies.
    pub movies_root: PathBuf,
    /// Root for TV shows.
    pub tv_root: PathBuf,
    /// Where unclassified downloads are dropped as-is.
    pub unsorted_root: PathBuf,
    /// Default staging directory for new downloads.
    #[serde(default = "default_staging_path")]
    pub staging_path: PathBuf,
}

fn default_staging_path() -> PathBuf {
    PathBuf::from("downloads")
}

/// Torrent client configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TorrentClientConfig {
    /// Backend type
    pub backend: TorrentClientBackend,
    /// librqbit-specific configuration (required when backend = "librqbit")
    #[serde(default)]
    pub librqbit: Option<LibrqbitConfig>,
}

/// Available torrent client backends
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TorrentClientBackend {
    Librqbit,
}

/// Embedded librqbit configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LibrqbitConfig {
    /// Directory the session downloads into when a torrent has no explicit output folder.
    pub download_path: String,
    /// Where librqbit keeps its own session state (optional).
    #[serde(default)]
    pub persistence_path: Option<String>,
    /// TCP listen port (optional, librqbit picks one otherwise).
    #[serde(default)]
    pub listen_port: Option<u16>,
    #[serde(default = "default_true")]
    pub enable_dht: bool,
}

fn default_true() -> bool {
    true
}

/// Episode metadata lookup configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetadataConfig {
    /// Per-attempt timeout for a season lookup, in seconds.
    #[serde(default = "default_metadata_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub tmdb: Option<TmdbConfig>,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_metadata_timeout(),
            tmdb: None,
        }
    }
}

fn default_metadata_timeout() -> u64 {
    10
}

/// Media server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MediaServerConfig {
    pub backend: MediaServerBackend,
    #[serde(default)]
    pub plex: Option<PlexConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MediaServerBackend {
    Plex,
}

/// Download session behaviour
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionsConfig {
    /// How often each session polls the torrent engine (milliseconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Keep finished (done/cancelled) sessions queryable and persisted.
    /// Failed sessions are always kept until cleared.
    #[serde(default = "default_true")]
    pub keep_history: bool,
    /// Maximum active sessions per requester (0 = unlimited).
    #[serde(default)]
    pub max_active_per_user: usize,
    /// Timeout for fetching `.torrent` files from a URL, in seconds.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            keep_history: true,
            max_active_per_user: 0,
            fetch_timeout_secs: default_fetch_timeout(),
        }
    }
}

fn default_poll_interval() -> u64 {
    3000
}

fn default_fetch_timeout() -> u64 {
    30
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub library: LibraryConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub torrent_client: Option<TorrentClientConfig>,
    pub metadata: SanitizedMetadataConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_server: Option<SanitizedMediaServerConfig>,
    pub sessions: SessionsConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedMetadataConfig {
    pub timeout_secs: u64,
    pub tmdb_configured: bool,
}

/// Sanitized Plex config (token hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedMediaServerConfig {
    pub backend: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub token_configured: bool,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            database: config.database.clone(),
            library: config.library.clone(),
            torrent_client: config.torrent_client.clone(),
            metadata: SanitizedMetadataConfig {
                timeout_secs: config.metadata.timeout_secs,
                tmdb_configured: config
                    .metadata
                    .tmdb
                    .as_ref()
                    .is_some_and(|t| !t.api_key.is_empty()),
            },
            media_server: config
                .media_server
                .as_ref()
                .map(|m| SanitizedMediaServerConfig {
                    backend: match m.backend {
                        MediaServerBackend::Plex => "plex".to_string(),
                    },
                    url: m.plex.as_ref().map(|p| p.url.clone()),
                    token_configured: m.plex.as_ref().is_some_and(|p| !p.token.is_empty()),
                }),
            sessions: config.sessions.clone(),
        }
    }
}
