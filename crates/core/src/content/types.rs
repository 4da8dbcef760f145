//! Types produced by the content classifier.

use serde::{Deserialize, Serialize};

/// What a download turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Movie,
    TvEpisode,
    Unknown,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Movie => "movie",
            ContentKind::TvEpisode => "tv_episode",
            ContentKind::Unknown => "unknown",
        }
    }
}

/// Classification result for one torrent.
///
/// `season` and `episode` are set exactly when `kind` is `TvEpisode`;
/// the constructors below are the only way the classifier builds one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedContent {
    pub kind: ContentKind,
    /// Cleaned title (show name for episodes).
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode: Option<u32>,
    /// Name the classification was made from.
    pub raw_name: String,
    /// Torrent-relative path of the file to organize.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_file: Option<String>,
}

impl ParsedContent {
    pub fn movie(title: impl Into<String>, year: u16, raw_name: impl Into<String>) -> Self {
        Self {
            kind: ContentKind::Movie,
            title: title.into(),
            year: Some(year),
            season: None,
            episode: None,
            raw_name: raw_name.into(),
            primary_file: None,
        }
    }

    pub fn episode(
        title: impl Into<String>,
        season: u32,
        episode: u32,
        raw_name: impl Into<String>,
    ) -> Self {
        Self {
            kind: ContentKind::TvEpisode,
            title: title.into(),
            year: None,
            season: Some(season),
            episode: Some(episode),
            raw_name: raw_name.into(),
            primary_file: None,
        }
    }

    pub fn unknown(title: impl Into<String>, raw_name: impl Into<String>) -> Self {
        Self {
            kind: ContentKind::Unknown,
            title: title.into(),
            year: None,
            season: None,
            episode: None,
            raw_name: raw_name.into(),
            primary_file: None,
        }
    }

    /// Attach the file that will be organized.
    pub fn with_primary_file(mut self, path: Option<String>) -> Self {
        self.primary_file = path;
        self
    }
}
