//! Types for library notification.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which library a rescan targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LibraryKind {
    Movie,
    Tv,
}

impl LibraryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LibraryKind::Movie => "movie",
            LibraryKind::Tv => "tv",
        }
    }
}

/// Outcome of a rescan request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyResult {
    /// The media server accepted the request.
    Ok,
    /// The media server could not be reached.
    Unreachable,
    /// The media server answered with an error status.
    Rejected,
}

impl NotifyResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotifyResult::Ok => "ok",
            NotifyResult::Unreachable => "unreachable",
            NotifyResult::Rejected => "rejected",
        }
    }

    pub fn is_ok(&self) -> bool {
        *self == NotifyResult::Ok
    }
}

/// Errors from a single notification attempt.
#[derive(Debug, Error)]
pub enum NotifierError {
    /// Connection refused, DNS failure, timeout.
    #[error("Media server unreachable: {0}")]
    Unreachable(String),

    /// Non-success HTTP status.
    #[error("Media server rejected request: HTTP {status}")]
    Rejected { status: u16 },

    /// Client not configured.
    #[error("Notifier not configured: {0}")]
    NotConfigured(String),
}

impl From<&NotifierError> for NotifyResult {
    fn from(e: &NotifierError) -> Self {
        match e {
            NotifierError::Unreachable(_) => NotifyResult::Unreachable,
            NotifierError::Rejected { .. } | NotifierError::NotConfigured(_) => {
                NotifyResult::Rejected
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_maps_to_result() {
        assert_eq!(
            NotifyResult::from(&NotifierError::Unreachable("refused".into())),
            NotifyResult::Unreachable
        );
        assert_eq!(
            NotifyResult::from(&NotifierError::Rejected { status: 401 }),
            NotifyResult::Rejected
        );
    }

    #[test]
    fn test_as_str() {
        assert_eq!(LibraryKind::Tv.as_str(), "tv");
        assert_eq!(NotifyResult::Unreachable.as_str(), "unreachable");
        assert!(NotifyResult::Ok.is_ok());
    }
}
