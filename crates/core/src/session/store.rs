//! Durable session storage.

use thiserror::Error;

use super::DownloadSession;
use crate::torrent_client::TorrentRef;

/// Error type for session storage.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

/// Durable record of every session, one row per `TorrentRef`.
///
/// Calls are synchronous; the backing store is expected to be local.
pub trait SessionStore: Send + Sync {
    /// Insert or replace the row for `session.torrent_ref`.
    fn upsert(&self, session: &DownloadSession) -> Result<(), StoreError>;

    /// Delete the row for `torrent_ref`. Deleting a missing row is not an error.
    fn delete(&self, torrent_ref: &TorrentRef) -> Result<(), StoreError>;

    /// Every persisted session, oldest first.
    fn load_all(&self) -> Result<Vec<DownloadSession>, StoreError>;
}
