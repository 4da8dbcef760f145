//! Types for the download manager.

use std::path::PathBuf;
use std::time::Instant;

use thiserror::Error;

use crate::content::{ContentKind, ParsedContent};
use crate::metadata::ResolvedEpisode;
use crate::notifier::NotifyResult;
use crate::placer::{FilePlacement, PlacedFile, PlacerError};
use crate::torrent_client::{TorrentClientError, TorrentSource};

/// A request to start a download.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub source: TorrentSource,
    pub requested_by: String,
    /// Base staging directory; the configured one when `None`.
    pub save_path: Option<PathBuf>,
}

impl SubmitRequest {
    pub fn new(source: TorrentSource, requested_by: impl Into<String>) -> Self {
        Self {
            source,
            requested_by: requested_by.into(),
            save_path: None,
        }
    }

    pub fn with_save_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.save_path = Some(path.into());
        self
    }
}

/// Fatal failures of the organization pipeline.
///
/// An unclassifiable name, an unresolved episode title, or an unreachable
/// media server are not errors; they show up in [`OrganizeOutcome`].
#[derive(Debug, Error)]
pub enum OrganizeError {
    #[error("Torrent has no files to organize")]
    NoFiles,

    #[error("Could not list torrent files: {0}")]
    Engine(#[from] TorrentClientError),

    #[error("Could not read staging directory: {0}")]
    Staging(#[from] std::io::Error),

    #[error("Filesystem move failed: {0}")]
    FilesystemMoveFailed(#[from] PlacerError),

    /// Shutdown was requested between pipeline steps.
    #[error("Organization interrupted")]
    Interrupted,
}

/// Where a session's primary file goes, decided but not yet moved.
#[derive(Debug, Clone)]
pub struct PlannedMove {
    pub kind: ContentKind,
    /// `None` when rebuilt from a placement recorded by an earlier run.
    pub parsed: Option<ParsedContent>,
    pub resolved: Option<ResolvedEpisode>,
    pub placement: FilePlacement,
    pub(super) started: Instant,
}

/// Result of a successful organization.
#[derive(Debug, Clone)]
pub struct OrganizeOutcome {
    pub kind: ContentKind,
    pub parsed: Option<ParsedContent>,
    /// Present for TV episodes.
    pub resolved: Option<ResolvedEpisode>,
    pub placed: PlacedFile,
    /// `None` when no notifier is configured or the content is unclassified.
    pub notified: Option<NotifyResult>,
}

impl OrganizeOutcome {
    /// Non-fatal problem worth keeping on the session.
    pub fn warning(&self) -> Option<String> {
        match self.notified {
            Some(result) if !result.is_ok() => Some(format!(
                "media server notification failed: {}",
                result.as_str()
            )),
            _ => None,
        }
    }
}
