//! Plex Media Server notifier.
//!
//! Triggers `GET <url>/library/sections/<section>/refresh` authenticated with
//! the `X-Plex-Token` header.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{LibraryKind, LibraryNotifier, NotifierError, NotifyResult};
use crate::metrics;

/// Number of attempts when Plex is unreachable (the first try plus one retry).
const MAX_ATTEMPTS: u32 = 2;

/// Plex connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlexConfig {
    /// Base URL, e.g. `http://plex.local:32400`.
    pub url: String,
    /// `X-Plex-Token` value.
    pub token: String,
    /// Library section id for movies.
    pub movie_section: String,
    /// Library section id for TV shows.
    pub tv_section: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    10
}

/// `LibraryNotifier` for Plex.
pub struct PlexNotifier {
    client: Client,
    base_url: String,
    token: String,
    movie_section: String,
    tv_section: String,
}

impl PlexNotifier {
    pub fn new(config: PlexConfig) -> Result<Self, NotifierError> {
        if config.url.is_empty() {
            return Err(NotifierError::NotConfigured(
                "Plex URL is required".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| NotifierError::NotConfigured(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            token: config.token,
            movie_section: config.movie_section,
            tv_section: config.tv_section,
        })
    }

    fn section(&self, kind: LibraryKind) -> &str {
        match kind {
            LibraryKind::Movie => &self.movie_section,
            LibraryKind::Tv => &self.tv_section,
        }
    }

    fn refresh_url(&self, kind: LibraryKind) -> String {
        format!(
            "{}/library/sections/{}/refresh",
            self.base_url,
            self.section(kind)
        )
    }

    async fn refresh(&self, kind: LibraryKind) -> Result<(), NotifierError> {
        let started = Instant::now();

        let result = self
            .client
            .get(self.refresh_url(kind))
            .header("X-Plex-Token", &self.token)
            .send()
            .await;

        let outcome = match result {
            Ok(response) if response.status().is_success() => Ok(()),
            Ok(response) => Err(NotifierError::Rejected {
                status: response.status().as_u16(),
            }),
            Err(e) => Err(NotifierError::Unreachable(e.to_string())),
        };

        metrics::record_external_call(
            "plex",
            "refresh",
            started.elapsed().as_secs_f64(),
            outcome.is_ok(),
        );
        outcome
    }
}

#[async_trait]
impl LibraryNotifier for PlexNotifier {
    fn name(&self) -> &str {
        "plex"
    }

    async fn notify(&self, kind: LibraryKind) -> NotifyResult {
        let mut attempt = 1;
        let result = loop {
            match self.refresh(kind).await {
                Ok(()) => break NotifyResult::Ok,
                Err(e @ NotifierError::Unreachable(_)) if attempt < MAX_ATTEMPTS => {
                    debug!(library = kind.as_str(), attempt, error = %e, "Retrying Plex refresh");
                    attempt += 1;
                }
                Err(e) => {
                    warn!(library = kind.as_str(), error = %e, "Plex refresh failed");
                    break NotifyResult::from(&e);
                }
            }
        };

        if result.is_ok() {
            info!(
                library = kind.as_str(),
                section = self.section(kind),
                "Plex library refresh requested"
            );
        }

        metrics::NOTIFIER_OUTCOMES
            .with_label_values(&[kind.as_str(), result.as_str()])
            .inc();

        result
    }
}
