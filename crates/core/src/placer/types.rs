//! Types for the placer module.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Checksum algorithm used to verify copies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumType {
    /// SHA-256 checksum.
    #[default]
    Sha256,
    /// MD5 checksum (faster but less secure).
    Md5,
}

/// A single file to place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePlacement {
    /// File in the staging area.
    pub source: PathBuf,
    /// Final library path.
    pub destination: PathBuf,
}

impl FilePlacement {
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
        }
    }
}

/// How a file reached its destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceOutcome {
    /// Renamed in place (same filesystem).
    Moved,
    /// Copied, verified, and the source removed.
    Copied,
    /// The destination already held this file; nothing was written.
    AlreadyPlaced,
}

impl PlaceOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaceOutcome::Moved => "moved",
            PlaceOutcome::Copied => "copied",
            PlaceOutcome::AlreadyPlaced => "already_placed",
        }
    }
}

/// A successfully placed file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacedFile {
    /// Final path.
    pub destination: PathBuf,
    /// Size in bytes.
    pub size_bytes: u64,
    /// Checksum of the placed data, when one was computed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    pub outcome: PlaceOutcome,
}
