//! Episode title resolution on top of a `MetadataSource`.

use std::sync::Arc;
use std::time::Duration;

use regex_lite::Regex;
use tracing::{debug, warn};

use super::{MetadataError, MetadataSource, ResolvedEpisode};
use crate::metrics;

/// Number of lookup attempts (the first try plus one retry).
const MAX_ATTEMPTS: u32 = 2;

/// Resolves canonical episode titles. Never fails: every problem is `Unresolved`.
#[derive(Clone)]
pub struct EpisodeResolver {
    source: Option<Arc<dyn MetadataSource>>,
    timeout: Duration,
}

impl EpisodeResolver {
    pub fn new(source: Arc<dyn MetadataSource>, timeout: Duration) -> Self {
        Self {
            source: Some(source),
            timeout,
        }
    }

    /// A resolver with no source; every lookup is `Unresolved`.
    pub fn disabled() -> Self {
        Self {
            source: None,
            timeout: Duration::ZERO,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.source.is_some()
    }

    /// Look up the title of `show` season `season` episode `episode`.
    pub async fn resolve(&self, show: &str, season: u32, episode: u32) -> ResolvedEpisode {
        let Some(source) = self.source.as_ref() else {
            return ResolvedEpisode::unresolved();
        };

        let resolved = match self.lookup_with_retry(source.as_ref(), show, season).await {
            Ok(listings) => listings
                .into_iter()
                .find(|l| l.episode_number == episode)
                .map(|l| strip_markup(&l.title))
                .filter(|title| !title.is_empty())
                .map(ResolvedEpisode::resolved)
                .unwrap_or_else(|| {
                    debug!(show = %show, season, episode, "Episode missing from season listing");
                    ResolvedEpisode::unresolved()
                }),
            Err(e) => {
                warn!(
                    show = %show,
                    season,
                    episode,
                    source = source.name(),
                    error = %e,
                    "Episode lookup failed"
                );
                ResolvedEpisode::unresolved()
            }
        };

        metrics::RESOLVER_OUTCOMES
            .with_label_values(&[if resolved.is_resolved() {
                "resolved"
            } else {
                "unresolved"
            }])
            .inc();

        resolved
    }

    async fn lookup_with_retry(
        &self,
        source: &dyn MetadataSource,
        show: &str,
        season: u32,
    ) -> Result<Vec<super::EpisodeListing>, MetadataError> {
        let mut attempt = 1;
        loop {
            let result = match tokio::time::timeout(self.timeout, source.lookup_season(show, season))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(MetadataError::Timeout),
            };

            match result {
                Ok(listings) => return Ok(listings),
                Err(e) if attempt < MAX_ATTEMPTS && e.is_retryable() => {
                    debug!(show = %show, season, attempt, error = %e, "Retrying episode lookup");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Remove HTML tags, decode common entities, and trim.
pub fn strip_markup(text: &str) -> String {
    let without_tags = match Regex::new(r"<[^>]*>") {
        Ok(re) => re.replace_all(text, "").into_owned(),
        Err(_) => text.to_string(),
    };

    decode_entities(&without_tags)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn decode_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let candidate = &rest[amp..];
        let decoded = candidate.find(';').filter(|&end| end <= 10).and_then(|end| {
            let entity = &candidate[1..end];
            decode_entity(entity).map(|c| (c, end + 1))
        });
        match decoded {
            Some((c, consumed)) => {
                out.push(c);
                rest = &candidate[consumed..];
            }
            None => {
                out.push('&');
                rest = &candidate[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        _ => {
            let code = if let Some(hex) = entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
            {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                entity.strip_prefix('#')?.parse::<u32>().ok()?
            };
            char::from_u32(code)
        }
    }
}
