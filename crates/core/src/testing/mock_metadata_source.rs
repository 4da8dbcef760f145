//! Mock metadata source for testing.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::metadata::{EpisodeListing, MetadataError, MetadataSource};

/// Mock implementation of the MetadataSource trait.
///
/// Seasons are keyed by show name (case-insensitive) and season number.
/// Unknown seasons answer `NotFound`.
#[derive(Debug, Default)]
pub struct MockMetadataSource {
    seasons: Arc<RwLock<HashMap<(String, u32), Vec<EpisodeListing>>>>,
    /// Number of upcoming lookups that fail with a retryable error.
    failures: Arc<RwLock<u32>>,
    calls: Arc<RwLock<u32>>,
    delay: Arc<RwLock<Option<Duration>>>,
}

impl MockMetadataSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the episode listing of one season.
    pub async fn set_season(&self, show: &str, season: u32, episodes: Vec<EpisodeListing>) {
        self.seasons
            .write()
            .await
            .insert((show.to_lowercase(), season), episodes);
    }

    /// Make the next `count` lookups fail with an HTTP 503.
    pub async fn fail_next(&self, count: u32) {
        *self.failures.write().await = count;
    }

    /// Delay every lookup.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = Some(delay);
    }

    /// Number of lookups made so far.
    pub async fn call_count(&self) -> u32 {
        *self.calls.read().await
    }
}

#[async_trait]
impl MetadataSource for MockMetadataSource {
    fn name(&self) -> &str {
        "mock"
    }

    async fn lookup_season(
        &self,
        show: &str,
        season: u32,
    ) -> Result<Vec<EpisodeListing>, MetadataError> {
        *self.calls.write().await += 1;

        let delay = *self.delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        {
            let mut failures = self.failures.write().await;
            if *failures > 0 {
                *failures -= 1;
                return Err(MetadataError::ApiError {
                    status: 503,
                    message: "mock outage".to_string(),
                });
            }
        }

        self.seasons
            .read()
            .await
            .get(&(show.to_lowercase(), season))
            .cloned()
            .ok_or_else(|| MetadataError::NotFound(format!("{} season {}", show, season)))
    }
}
