//! Episode metadata lookup.
//!
//! `MetadataSource` is the seam to whatever knows episode titles (TMDB in
//! production). `EpisodeResolver` wraps a source with a timeout, one retry,
//! and markup cleanup, and never fails: anything that goes wrong is
//! `Unresolved`.

mod resolver;
mod tmdb;
mod types;

pub use resolver::{strip_markup, EpisodeResolver};
pub use tmdb::{TmdbConfig, TmdbSource};
pub use types::*;

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur when talking to a metadata source.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Rate limit exceeded.
    #[error("Rate limit exceeded, please wait before retrying")]
    RateLimitExceeded,

    /// Show or season does not exist.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// API returned an error.
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    /// Failed to parse response.
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// Client not configured (missing API key, etc.).
    #[error("Client not configured: {0}")]
    NotConfigured(String),

    /// The lookup did not finish in time.
    #[error("Lookup timed out")]
    Timeout,
}

impl MetadataError {
    /// Whether a second attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            MetadataError::HttpError(_)
            | MetadataError::RateLimitExceeded
            | MetadataError::Timeout => true,
            MetadataError::ApiError { status, .. } => *status >= 500,
            MetadataError::NotFound(_)
            | MetadataError::ParseError(_)
            | MetadataError::NotConfigured(_) => false,
        }
    }
}

/// A source of per-season episode listings.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Source name for logging.
    fn name(&self) -> &str;

    /// List the episodes of one season of a show.
    async fn lookup_season(
        &self,
        show: &str,
        season: u32,
    ) -> Result<Vec<EpisodeListing>, MetadataError>;
}
