//! Types for episode metadata.

use serde::{Deserialize, Serialize};

/// One episode row of a season listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeListing {
    pub episode_number: u32,
    /// Title as delivered by the source (may carry markup).
    pub title: String,
}

impl EpisodeListing {
    pub fn new(episode_number: u32, title: impl Into<String>) -> Self {
        Self {
            episode_number,
            title: title.into(),
        }
    }
}

/// Whether an episode title was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStatus {
    Resolved,
    Unresolved,
}

/// Outcome of an episode title lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedEpisode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode_title: Option<String>,
    pub status: ResolutionStatus,
}

impl ResolvedEpisode {
    pub fn resolved(title: impl Into<String>) -> Self {
        Self {
            episode_title: Some(title.into()),
            status: ResolutionStatus::Resolved,
        }
    }

    pub fn unresolved() -> Self {
        Self {
            episode_title: None,
            status: ResolutionStatus::Unresolved,
        }
    }

    /// The title, only when resolved.
    pub fn title(&self) -> Option<&str> {
        match self.status {
            ResolutionStatus::Resolved => self.episode_title.as_deref(),
            ResolutionStatus::Unresolved => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.status == ResolutionStatus::Resolved
    }
}
