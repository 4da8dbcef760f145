//! TMDB (The Movie Database) episode source.
//!
//! TMDB requires an API key for access.
//! A season lookup is two calls: search the show by name, then fetch the season.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{EpisodeListing, MetadataError, MetadataSource};
use crate::metrics;

/// TMDB API client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TmdbConfig {
    /// TMDB API key (required).
    pub api_key: String,
    /// Base URL (default: https://api.themoviedb.org/3).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Language for episode titles, e.g. "en-US".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// TMDB-backed `MetadataSource`.
pub struct TmdbSource {
    client: Client,
    base_url: String,
    api_key: String,
    language: Option<String>,
}

impl TmdbSource {
    /// Create a new TMDB source.
    pub fn new(config: TmdbConfig) -> Result<Self, MetadataError> {
        if config.api_key.is_empty() {
            return Err(MetadataError::NotConfigured(
                "TMDB API key is required".to_string(),
            ));
        }

        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        let base_url = config
            .base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| "https://api.themoviedb.org/3".to_string());

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key,
            language: config.language,
        })
    }

    fn query_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("api_key", self.api_key.clone())];
        if let Some(ref language) = self.language {
            params.push(("language", language.clone()));
        }
        params
    }

    /// Search for TV shows by name.
    async fn search_tv(&self, query: &str) -> Result<Vec<TmdbTvResult>, MetadataError> {
        let url = format!("{}/search/tv", self.base_url);

        debug!("TMDB TV search: query='{}'", query);

        let started = Instant::now();
        let result: Result<Vec<TmdbTvResult>, MetadataError> = async {
            let response = self
                .client
                .get(&url)
                .query(&self.query_params())
                .query(&[("query", query)])
                .send()
                .await?;

            let response = check_status(response, || format!("TV search '{}'", query)).await?;

            let search_result: TmdbSearchResponse<TmdbTvResult> =
                response.json().await.map_err(|e| {
                    MetadataError::ParseError(format!("Failed to parse TV search response: {}", e))
                })?;

            Ok(search_result.results)
        }
        .await;

        metrics::record_external_call(
            "tmdb",
            "search_tv",
            started.elapsed().as_secs_f64(),
            result.is_ok(),
        );
        result
    }

    /// Get one season of a show.
    async fn get_tv_season(
        &self,
        tmdb_id: u32,
        season: u32,
    ) -> Result<TmdbSeasonDetails, MetadataError> {
        let url = format!("{}/tv/{}/season/{}", self.base_url, tmdb_id, season);

        debug!("TMDB get season: series={}, season={}", tmdb_id, season);

        let started = Instant::now();
        let result: Result<TmdbSeasonDetails, MetadataError> = async {
            let response = self
                .client
                .get(&url)
                .query(&self.query_params())
                .send()
                .await?;

            let response =
                check_status(response, || format!("TV series {} season {}", tmdb_id, season))
                    .await?;

            response.json::<TmdbSeasonDetails>().await.map_err(|e| {
                MetadataError::ParseError(format!("Failed to parse season response: {}", e))
            })
        }
        .await;

        metrics::record_external_call(
            "tmdb",
            "get_season",
            started.elapsed().as_secs_f64(),
            result.is_ok(),
        );
        result
    }
}

#[async_trait]
impl MetadataSource for TmdbSource {
    fn name(&self) -> &str {
        "tmdb"
    }

    async fn lookup_season(
        &self,
        show: &str,
        season: u32,
    ) -> Result<Vec<EpisodeListing>, MetadataError> {
        let results = self.search_tv(show).await?;

        let series = pick_series(show, &results)
            .ok_or_else(|| MetadataError::NotFound(format!("TV show '{}'", show)))?;

        debug!(show = %show, tmdb_id = series.id, matched = %series.name, "TMDB show matched");

        let details = self.get_tv_season(series.id, season).await?;

        Ok(details.episodes.into_iter().map(Into::into).collect())
    }
}

/// Map non-success statuses to typed errors.
async fn check_status(
    response: Response,
    what: impl FnOnce() -> String,
) -> Result<Response, MetadataError> {
    let status = response.status();
    if status == 401 {
        return Err(MetadataError::NotConfigured(
            "Invalid TMDB API key".to_string(),
        ));
    }
    if status == 404 {
        return Err(MetadataError::NotFound(what()));
    }
    if status == 429 {
        return Err(MetadataError::RateLimitExceeded);
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(MetadataError::ApiError {
            status: status.as_u16(),
            message: body,
        });
    }
    Ok(response)
}

/// Prefer an exact (case-insensitive) name match, else TMDB's top result.
fn pick_series<'a>(show: &str, results: &'a [TmdbTvResult]) -> Option<&'a TmdbTvResult> {
    let wanted = show.trim().to_lowercase();
    results
        .iter()
        .find(|r| {
            r.name.to_lowercase() == wanted
                || r.original_name
                    .as_ref()
                    .is_some_and(|n| n.to_lowercase() == wanted)
        })
        .or_else(|| results.first())
}

// ============================================================================
// TMDB API Response Types (private)
// ============================================================================

#[derive(Debug, Deserialize)]
struct TmdbSearchResponse<T> {
    results: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct TmdbTvResult {
    id: u32,
    name: String,
    original_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TmdbSeasonDetails {
    #[serde(default)]
    episodes: Vec<TmdbEpisodeResult>,
}

#[derive(Debug, Deserialize)]
struct TmdbEpisodeResult {
    episode_number: u32,
    #[serde(default)]
    name: String,
}

// ============================================================================
// Conversions
// ============================================================================

impl From<TmdbEpisodeResult> for EpisodeListing {
    fn from(e: TmdbEpisodeResult) -> Self {
        EpisodeListing::new(e.episode_number, e.name)
    }
}
