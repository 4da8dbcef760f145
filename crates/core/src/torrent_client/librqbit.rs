//! librqbit embedded torrent client implementation.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use librqbit::{
    AddTorrent as RqbitAddTorrent, AddTorrentOptions, AddTorrentResponse, ManagedTorrent, Session,
    SessionOptions, SessionPersistenceConfig,
};
use tracing::{debug, info, warn};

use super::{
    AddTorrentRequest, AddTorrentResult, TorrentClient, TorrentClientError, TorrentFile,
    TorrentInfo, TorrentState,
};
use crate::config::LibrqbitConfig;

/// How long to wait for magnet metadata before giving up on `add_torrent`.
const ADD_TIMEOUT: Duration = Duration::from_secs(60);

/// Embedded librqbit torrent client.
pub struct LibrqbitClient {
    session: Arc<Session>,
}

impl LibrqbitClient {
    /// Create a new librqbit client from configuration.
    pub async fn new(config: &LibrqbitConfig) -> Result<Self, TorrentClientError> {
        let download_path = PathBuf::from(&config.download_path);

        if !download_path.exists() {
            std::fs::create_dir_all(&download_path).map_err(|e| {
                TorrentClientError::ConnectionFailed(format!(
                    "Failed to create download directory: {}",
                    e
                ))
            })?;
        }

        let mut opts = SessionOptions::default();

        if !config.enable_dht {
            opts.disable_dht = true;
        }

        // Range, not RangeInclusive
        if let Some(port) = config.listen_port {
            opts.listen_port_range = Some(port..(port + 1));
        }

        if let Some(ref persistence_path) = config.persistence_path {
            let persistence_dir = PathBuf::from(persistence_path);
            if !persistence_dir.exists() {
                std::fs::create_dir_all(&persistence_dir).map_err(|e| {
                    TorrentClientError::ConnectionFailed(format!(
                        "Failed to create persistence directory: {}",
                        e
                    ))
                })?;
            }
            opts.persistence = Some(SessionPersistenceConfig::Json {
                folder: Some(persistence_dir),
            });
        }

        info!(
            download_path = %download_path.display(),
            dht_enabled = !opts.disable_dht,
            "Initializing librqbit session"
        );

        let session = Session::new_with_opts(download_path, opts)
            .await
            .map_err(|e| {
                TorrentClientError::ConnectionFailed(format!(
                    "Failed to initialize librqbit session: {}",
                    e
                ))
            })?;

        if let Some(port) = session.tcp_listen_port() {
            info!(port = port, "librqbit listening on TCP port");
        }

        Ok(Self { session })
    }

    fn format_hash(hash: &librqbit_core::Id20) -> String {
        hash.as_string()
    }

    fn torrent_to_info(torrent: &Arc<ManagedTorrent>) -> TorrentInfo {
        let hash = Self::format_hash(&torrent.info_hash());
        let stats = torrent.stats();

        let name = torrent
            .name()
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("torrent-{}", &hash[..8]));

        let state = Self::map_state(&stats.state, torrent.is_paused(), stats.finished);

        let progress = if stats.total_bytes > 0 {
            stats.progress_bytes as f64 / stats.total_bytes as f64
        } else {
            0.0
        };

        let (download_speed, peers) = stats
            .live
            .as_ref()
            .map(|live| {
                // librqbit's "mbps" field holds MiB/s
                let dl_speed = (live.download_speed.mbps * 1024.0 * 1024.0) as u64;
                (dl_speed, live.snapshot.peer_stats.live as u32)
            })
            .unwrap_or((0, 0));

        let eta_secs = if state == TorrentState::Downloading && download_speed > 0 {
            let remaining = stats.total_bytes.saturating_sub(stats.progress_bytes);
            Some(remaining / download_speed)
        } else {
            None
        };

        TorrentInfo {
            hash,
            name,
            state,
            progress,
            size_bytes: stats.total_bytes,
            downloaded_bytes: stats.progress_bytes,
            download_speed,
            peers,
            eta_secs,
            error: stats.error.clone(),
        }
    }

    fn map_state(
        state: &librqbit::TorrentStatsState,
        is_paused: bool,
        is_finished: bool,
    ) -> TorrentState {
        use librqbit::TorrentStatsState;

        if is_paused {
            return TorrentState::Paused;
        }

        match state {
            TorrentStatsState::Initializing => TorrentState::Checking,
            TorrentStatsState::Live => {
                if is_finished {
                    TorrentState::Seeding
                } else {
                    TorrentState::Downloading
                }
            }
            TorrentStatsState::Paused => TorrentState::Paused,
            TorrentStatsState::Error => TorrentState::Error,
        }
    }

    fn find_torrent(&self, hash: &str) -> Option<Arc<ManagedTorrent>> {
        let hash_lower = hash.to_lowercase();

        self.session.with_torrents(|iter| {
            for (_, torrent) in iter {
                if Self::format_hash(&torrent.info_hash()) == hash_lower {
                    return Some(torrent.clone());
                }
            }
            None
        })
    }

    fn require_torrent(&self, hash: &str) -> Result<Arc<ManagedTorrent>, TorrentClientError> {
        self.find_torrent(hash)
            .ok_or_else(|| TorrentClientError::TorrentNotFound(hash.to_string()))
    }
}

#[async_trait]
impl TorrentClient for LibrqbitClient {
    fn name(&self) -> &str {
        "librqbit"
    }

    async fn add_torrent(
        &self,
        request: AddTorrentRequest,
    ) -> Result<AddTorrentResult, TorrentClientError> {
        let output_folder = request.download_path().map(str::to_string);
        let (add_torrent, paused) = match request {
            AddTorrentRequest::Magnet { uri, paused, .. } => {
                (RqbitAddTorrent::from_url(uri), paused)
            }
            AddTorrentRequest::TorrentFile { data, paused, .. } => {
                (RqbitAddTorrent::from_bytes(data), paused)
            }
        };

        // Files already in the output folder (a resumed session) are rechecked, not refused.
        let opts = AddTorrentOptions {
            paused,
            output_folder,
            overwrite: true,
            ..Default::default()
        };

        // DHT lookup can take forever for rare magnets
        let response = tokio::time::timeout(ADD_TIMEOUT, self.session.add_torrent(add_torrent, Some(opts)))
            .await
            .map_err(|_| TorrentClientError::Timeout)?
            .map_err(|e| TorrentClientError::ApiError(format!("Failed to add torrent: {}", e)))?;

        match response {
            AddTorrentResponse::Added(_, handle) => {
                let hash = Self::format_hash(&handle.info_hash());
                let name = handle.name().map(|s| s.to_string());
                debug!(hash = %hash, name = ?name, "Torrent added");
                Ok(AddTorrentResult { hash, name })
            }
            AddTorrentResponse::AlreadyManaged(_, handle) => {
                let hash = Self::format_hash(&handle.info_hash());
                let name = handle.name().map(|s| s.to_string());
                debug!(hash = %hash, "Torrent already managed by engine");
                Ok(AddTorrentResult { hash, name })
            }
            AddTorrentResponse::ListOnly(_) => Err(TorrentClientError::ApiError(
                "Torrent was added in list-only mode".to_string(),
            )),
        }
    }

    async fn get_torrent(&self, hash: &str) -> Result<TorrentInfo, TorrentClientError> {
        let torrent = self.require_torrent(hash)?;
        Ok(Self::torrent_to_info(&torrent))
    }

    async fn list_files(&self, hash: &str) -> Result<Vec<TorrentFile>, TorrentClientError> {
        let torrent = self.require_torrent(hash)?;

        torrent
            .with_metadata(|meta| {
                meta.file_infos
                    .iter()
                    .map(|f| {
                        TorrentFile::new(
                            f.relative_filename.to_string_lossy().replace('\\', "/"),
                            f.len,
                        )
                    })
                    .collect::<Vec<_>>()
            })
            .map_err(|e| {
                TorrentClientError::ApiError(format!("Torrent metadata not available: {}", e))
            })
    }

    async fn remove_torrent(
        &self,
        hash: &str,
        delete_files: bool,
    ) -> Result<(), TorrentClientError> {
        let torrent = self.require_torrent(hash)?;

        self.session
            .delete(torrent.id().into(), delete_files)
            .await
            .map_err(|e| {
                TorrentClientError::ApiError(format!("Failed to remove torrent: {}", e))
            })?;

        debug!(hash = %hash, delete_files = delete_files, "Torrent removed");
        Ok(())
    }

    async fn pause_torrent(&self, hash: &str) -> Result<(), TorrentClientError> {
        let torrent = self.require_torrent(hash)?;

        if torrent.is_paused() {
            return Ok(());
        }

        self.session
            .pause(&torrent)
            .await
            .map_err(|e| TorrentClientError::ApiError(format!("Failed to pause torrent: {}", e)))?;

        debug!(hash = %hash, "Torrent paused");
        Ok(())
    }

    async fn resume_torrent(&self, hash: &str) -> Result<(), TorrentClientError> {
        let torrent = self.require_torrent(hash)?;

        if !torrent.is_paused() {
            return Ok(());
        }

        self.session.unpause(&torrent).await.map_err(|e| {
            warn!(hash = %hash, error = %e, "Failed to resume torrent");
            TorrentClientError::ApiError(format!("Failed to resume torrent: {}", e))
        })?;

        debug!(hash = %hash, "Torrent resumed");
        Ok(())
    }
}
