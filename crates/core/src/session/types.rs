//! Session types and the download state machine.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::StoreError;
use crate::torrent_client::{TorrentClientError, TorrentRef, TorrentSource};

/// Lifecycle state of a download session.
///
/// ```text
/// Queued -> Downloading -> Organizing -> Done
///    |           |              |
///    |           +-> Failed <---+
///    +-----------+-> Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Registered, not yet accepted by the engine.
    Queued,
    /// The engine is transferring data.
    Downloading,
    /// Transfer complete; classify, name, move and notify in progress.
    Organizing,
    /// The primary file is in the library.
    Done,
    /// The transfer or the move failed.
    Failed,
    /// Cancelled by the caller; partial data removed.
    Cancelled,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Queued => "queued",
            SessionState::Downloading => "downloading",
            SessionState::Organizing => "organizing",
            SessionState::Done => "done",
            SessionState::Failed => "failed",
            SessionState::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(SessionState::Queued),
            "downloading" => Some(SessionState::Downloading),
            "organizing" => Some(SessionState::Organizing),
            "done" => Some(SessionState::Done),
            "failed" => Some(SessionState::Failed),
            "cancelled" => Some(SessionState::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Done | SessionState::Failed | SessionState::Cancelled
        )
    }

    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Whether a session in `self` may move to `next`.
    ///
    /// Staying in the same non-terminal state is allowed so that `last_error`
    /// can be recorded without a state change.
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (a, b) if *a == b => a.is_active(),
            (Queued, Downloading | Cancelled) => true,
            (Downloading, Organizing | Failed | Cancelled) => true,
            (Organizing, Done | Failed) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One torrent's journey from submission to the library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadSession {
    pub torrent_ref: TorrentRef,
    pub requested_by: String,
    /// Staging directory the engine writes into.
    pub save_path: PathBuf,
    pub state: SessionState,
    /// Transfer progress in `[0, 1]`.
    pub progress: f64,
    pub added_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Torrent display name once known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Library path of the organized file, recorded before the move starts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_path: Option<PathBuf>,
    /// Staging file being moved to `target_path`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_path: Option<PathBuf>,
    /// What was submitted, kept so the engine can be handed the torrent again.
    #[serde(skip)]
    pub source: Option<TorrentSource>,
}

impl DownloadSession {
    /// A fresh `Queued` session.
    pub fn new(torrent_ref: TorrentRef, meta: NewSession) -> Self {
        let now = Utc::now();
        Self {
            torrent_ref,
            requested_by: meta.requested_by,
            save_path: meta.save_path,
            state: SessionState::Queued,
            progress: 0.0,
            added_at: now,
            updated_at: now,
            last_error: None,
            name: meta.name,
            target_path: None,
            source_path: None,
            source: meta.source,
        }
    }
}

/// Caller-supplied attributes of a new session.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub requested_by: String,
    pub save_path: PathBuf,
    pub name: Option<String>,
    pub source: Option<TorrentSource>,
}

/// Immutable progress view published to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub torrent_ref: TorrentRef,
    pub state: SessionState,
    pub progress: f64,
    /// Bytes per second.
    pub download_speed: u64,
    pub peers: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<&DownloadSession> for ProgressSnapshot {
    fn from(session: &DownloadSession) -> Self {
        Self {
            torrent_ref: session.torrent_ref.clone(),
            state: session.state,
            progress: session.progress,
            download_speed: 0,
            peers: 0,
            name: session.name.clone(),
            last_error: session.last_error.clone(),
            updated_at: session.updated_at,
        }
    }
}

/// Transfer statistics reported by one engine poll.
#[derive(Debug, Clone, Default)]
pub struct ProgressUpdate {
    pub progress: f64,
    pub download_speed: u64,
    pub peers: u32,
    pub name: Option<String>,
}

/// Errors from session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Torrent {0} already has a session")]
    DuplicateTorrent(TorrentRef),

    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Cannot move session {torrent_ref} from {from} to {to}")]
    InvalidTransition {
        torrent_ref: TorrentRef,
        from: SessionState,
        to: SessionState,
    },

    #[error("{requested_by} already has {limit} active download(s)")]
    LimitReached { requested_by: String, limit: usize },

    #[error("Invalid torrent source: {0}")]
    InvalidSource(String),

    #[error("Session {0} is still active")]
    NotFinished(TorrentRef),

    #[error("Session {0} has already finished")]
    AlreadyFinished(TorrentRef),

    #[error("Torrent engine error: {0}")]
    Engine(#[from] TorrentClientError),

    #[error("Session store error: {0}")]
    Store(#[from] StoreError),

    #[error("Staging directory error: {0}")]
    Io(#[from] std::io::Error),
}
