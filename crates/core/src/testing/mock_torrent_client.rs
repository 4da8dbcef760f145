//! Mock torrent client for testing.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::torrent_client::{
    torrent_ref_from_bytes, torrent_ref_from_magnet, AddTorrentRequest, AddTorrentResult,
    TorrentClient, TorrentClientError, TorrentFile, TorrentInfo, TorrentSource, TorrentState,
};

/// A recorded torrent addition for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedAddTorrent {
    /// The request that was made.
    pub request: AddTorrentRequest,
    /// When the request was made.
    pub timestamp: chrono::DateTime<Utc>,
}

/// Internal state for a mock torrent.
#[derive(Debug, Clone)]
struct MockTorrentState {
    info: TorrentInfo,
    files: Vec<TorrentFile>,
    paused: bool,
}

/// Mock implementation of the TorrentClient trait.
///
/// Provides controllable behavior for testing:
/// - Track added, removed and paused torrents for assertions
/// - Control torrent progress/state/files
/// - Simulate failures
///
/// # Example
///
/// ```rust,ignore
/// let client = MockTorrentClient::new();
/// client.add_torrent(AddTorrentRequest::magnet(magnet)).await?;
///
/// client.set_files(&hash, vec![TorrentFile::new("Show.S01E01.mkv", 1024)]).await;
/// client.set_progress(&hash, 1.0).await; // Complete
/// ```
#[derive(Debug)]
pub struct MockTorrentClient {
    /// Recorded add_torrent calls.
    added: Arc<RwLock<Vec<RecordedAddTorrent>>>,
    /// Recorded remove_torrent calls as `(hash, delete_files)`.
    removed: Arc<RwLock<Vec<(String, bool)>>>,
    /// Current torrent states by hash.
    torrents: Arc<RwLock<HashMap<String, MockTorrentState>>>,
    /// If set, the next operation will fail with this error.
    next_error: Arc<RwLock<Option<TorrentClientError>>>,
    /// Number of upcoming `get_torrent` calls that fail with a connection error.
    failing_polls: Arc<RwLock<u32>>,
}

impl Default for MockTorrentClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTorrentClient {
    /// Create a new mock torrent client.
    pub fn new() -> Self {
        Self {
            added: Arc::new(RwLock::new(Vec::new())),
            removed: Arc::new(RwLock::new(Vec::new())),
            torrents: Arc::new(RwLock::new(HashMap::new())),
            next_error: Arc::new(RwLock::new(None)),
            failing_polls: Arc::new(RwLock::new(0)),
        }
    }

    /// Get all recorded add_torrent calls.
    pub async fn added_torrents(&self) -> Vec<RecordedAddTorrent> {
        self.added.read().await.clone()
    }

    /// Get all recorded remove_torrent calls.
    pub async fn removed_torrents(&self) -> Vec<(String, bool)> {
        self.removed.read().await.clone()
    }

    /// Set the progress for a torrent (0.0 to 1.0).
    ///
    /// When progress reaches 1.0, the torrent state changes to Seeding.
    pub async fn set_progress(&self, hash: &str, progress: f64) {
        let mut torrents = self.torrents.write().await;
        if let Some(torrent) = torrents.get_mut(hash) {
            let progress = progress.clamp(0.0, 1.0);
            torrent.info.progress = progress;
            torrent.info.downloaded_bytes = (torrent.info.size_bytes as f64 * progress) as u64;

            if progress >= 1.0 {
                torrent.info.state = TorrentState::Seeding;
                torrent.info.eta_secs = None;
            } else {
                torrent.info.state = if torrent.paused {
                    TorrentState::Paused
                } else {
                    TorrentState::Downloading
                };
            }
        }
    }

    /// Set the state for a torrent directly.
    pub async fn set_state(&self, hash: &str, state: TorrentState) {
        let mut torrents = self.torrents.write().await;
        if let Some(torrent) = torrents.get_mut(hash) {
            torrent.info.state = state;
        }
    }

    /// Put a torrent in the engine's error state.
    pub async fn set_error(&self, hash: &str, message: &str) {
        let mut torrents = self.torrents.write().await;
        if let Some(torrent) = torrents.get_mut(hash) {
            torrent.info.state = TorrentState::Error;
            torrent.info.error = Some(message.to_string());
        }
    }

    /// Set the file list for a torrent. Total size follows the files.
    pub async fn set_files(&self, hash: &str, files: Vec<TorrentFile>) {
        let mut torrents = self.torrents.write().await;
        if let Some(torrent) = torrents.get_mut(hash) {
            torrent.info.size_bytes = files.iter().map(|f| f.size_bytes).sum();
            torrent.files = files;
        }
    }

    /// Configure the next operation to fail with the given error.
    pub async fn set_next_error(&self, error: TorrentClientError) {
        *self.next_error.write().await = Some(error);
    }

    /// Make the next `count` polls fail as if the engine were unreachable.
    pub async fn fail_polls(&self, count: u32) {
        *self.failing_polls.write().await = count;
    }

    /// Drop a torrent as if it had been removed outside the application.
    pub async fn forget(&self, hash: &str) {
        self.torrents.write().await.remove(hash);
    }

    /// Check if a torrent exists.
    pub async fn has_torrent(&self, hash: &str) -> bool {
        self.torrents.read().await.contains_key(hash)
    }

    /// Whether a torrent is currently paused.
    pub async fn is_paused(&self, hash: &str) -> bool {
        self.torrents
            .read()
            .await
            .get(hash)
            .is_some_and(|t| t.paused)
    }

    /// Pre-populate a torrent (for restore tests).
    pub async fn add_mock_torrent(&self, info: TorrentInfo, files: Vec<TorrentFile>) {
        let hash = info.hash.clone();
        self.torrents.write().await.insert(
            hash,
            MockTorrentState {
                paused: info.state == TorrentState::Paused,
                info,
                files,
            },
        );
    }

    /// Take the next error if set.
    async fn take_error(&self) -> Option<TorrentClientError> {
        self.next_error.write().await.take()
    }
}

#[async_trait]
impl TorrentClient for MockTorrentClient {
    fn name(&self) -> &str {
        "mock"
    }

    async fn add_torrent(
        &self,
        request: AddTorrentRequest,
    ) -> Result<AddTorrentResult, TorrentClientError> {
        if let Some(err) = self.take_error().await {
            return Err(err);
        }

        // Record the request
        self.added.write().await.push(RecordedAddTorrent {
            request: request.clone(),
            timestamp: Utc::now(),
        });

        let hash = match &request {
            AddTorrentRequest::Magnet { uri, .. } => torrent_ref_from_magnet(uri)?,
            AddTorrentRequest::TorrentFile { data, .. } => torrent_ref_from_bytes(data)?,
        }
        .to_string();

        let mut torrents = self.torrents.write().await;
        if let Some(existing) = torrents.get(&hash) {
            return Ok(AddTorrentResult {
                hash,
                name: Some(existing.info.name.clone()),
            });
        }

        let name = match &request {
            AddTorrentRequest::Magnet { uri, .. } => TorrentSource::Magnet(uri.clone()).display_name(),
            AddTorrentRequest::TorrentFile { data, .. } => {
                TorrentSource::TorrentFile { data: data.clone() }.display_name()
            }
        }
        .unwrap_or_else(|| format!("Mock Torrent {}", &hash[..8]));
        let info = TorrentInfo {
            hash: hash.clone(),
            name: name.clone(),
            state: TorrentState::Downloading,
            progress: 0.0,
            size_bytes: 100 * 1024 * 1024, // 100 MB default
            downloaded_bytes: 0,
            download_speed: 1024 * 1024, // 1 MB/s
            peers: 5,
            eta_secs: Some(100),
            error: None,
        };

        torrents.insert(
            hash.clone(),
            MockTorrentState {
                info,
                files: Vec::new(),
                paused: request.is_paused(),
            },
        );

        Ok(AddTorrentResult {
            hash,
            name: Some(name),
        })
    }

    async fn get_torrent(&self, hash: &str) -> Result<TorrentInfo, TorrentClientError> {
        {
            let mut failing = self.failing_polls.write().await;
            if *failing > 0 {
                *failing -= 1;
                return Err(TorrentClientError::ConnectionFailed(
                    "mock engine unreachable".to_string(),
                ));
            }
        }
        if let Some(err) = self.take_error().await {
            return Err(err);
        }

        self.torrents
            .read()
            .await
            .get(hash)
            .map(|t| t.info.clone())
            .ok_or_else(|| TorrentClientError::TorrentNotFound(hash.to_string()))
    }

    async fn list_files(&self, hash: &str) -> Result<Vec<TorrentFile>, TorrentClientError> {
        if let Some(err) = self.take_error().await {
            return Err(err);
        }

        self.torrents
            .read()
            .await
            .get(hash)
            .map(|t| t.files.clone())
            .ok_or_else(|| TorrentClientError::TorrentNotFound(hash.to_string()))
    }

    async fn remove_torrent(&self, hash: &str, delete_files: bool) -> Result<(), TorrentClientError> {
        if let Some(err) = self.take_error().await {
            return Err(err);
        }

        self.removed
            .write()
            .await
            .push((hash.to_string(), delete_files));

        if self.torrents.write().await.remove(hash).is_none() {
            return Err(TorrentClientError::TorrentNotFound(hash.to_string()));
        }
        Ok(())
    }

    async fn pause_torrent(&self, hash: &str) -> Result<(), TorrentClientError> {
        if let Some(err) = self.take_error().await {
            return Err(err);
        }

        let mut torrents = self.torrents.write().await;
        let torrent = torrents
            .get_mut(hash)
            .ok_or_else(|| TorrentClientError::TorrentNotFound(hash.to_string()))?;
        torrent.paused = true;
        if torrent.info.state == TorrentState::Downloading {
            torrent.info.state = TorrentState::Paused;
        }
        Ok(())
    }

    async fn resume_torrent(&self, hash: &str) -> Result<(), TorrentClientError> {
        if let Some(err) = self.take_error().await {
            return Err(err);
        }

        let mut torrents = self.torrents.write().await;
        let torrent = torrents
            .get_mut(hash)
            .ok_or_else(|| TorrentClientError::TorrentNotFound(hash.to_string()))?;
        torrent.paused = false;
        if torrent.info.state == TorrentState::Paused {
            torrent.info.state = TorrentState::Downloading;
        }
        Ok(())
    }
}
