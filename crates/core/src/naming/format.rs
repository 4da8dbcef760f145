use std::path::{Path, PathBuf};

use crate::config::LibraryConfig;
use crate::content::{is_video_file, ContentKind, ParsedContent};
use crate::metadata::ResolvedEpisode;

/// Library roots the formatter places files under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryRoots {
    pub movies: PathBuf,
    pub tv: PathBuf,
    pub unsorted: PathBuf,
}

impl From<&LibraryConfig> for LibraryRoots {
    fn from(config: &LibraryConfig) -> Self {
        Self {
            movies: config.movies_root.clone(),
            tv: config.tv_root.clone(),
            unsorted: config.unsorted_root.clone(),
        }
    }
}

/// Compute the canonical library path for a classified download.
///
/// - Movie: `<movies>/<Title> (<Year>)/<Title> (<Year>).<ext>`
/// - TV: `<tv>/<Show>/Season <SS>/s<SS>e<EE> - <Episode Title>.<ext>`
///   (without ` - <Episode Title>` when unresolved)
/// - Unknown: `<unsorted>/<original file name>`
pub fn format_target(
    parsed: &ParsedContent,
    resolved: Option<&ResolvedEpisode>,
    roots: &LibraryRoots,
) -> PathBuf {
    let ext = extension(parsed);

    match (parsed.kind, parsed.season, parsed.episode) {
        (ContentKind::TvEpisode, Some(season), Some(episode)) => {
            let code = format!("s{:02}e{:02}", season, episode);
            let stem = match resolved.and_then(|r| r.title()) {
                Some(title) => format!("{} - {}", code, title),
                None => code,
            };
            roots
                .tv
                .join(sanitize_segment(&parsed.title))
                .join(format!("Season {:02}", season))
                .join(file_name(&stem, &ext))
        }
        (ContentKind::Movie, _, _) => {
            let folder = match parsed.year {
                Some(year) => format!("{} ({})", parsed.title, year),
                None => parsed.title.clone(),
            };
            roots
                .movies
                .join(sanitize_segment(&folder))
                .join(file_name(&folder, &ext))
        }
        _ => {
            let original = parsed
                .primary_file
                .as_deref()
                .and_then(|p| Path::new(p).file_name())
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| parsed.raw_name.clone());
            roots.unsorted.join(sanitize_segment(&original))
        }
    }
}

/// Make a string safe to use as one path segment.
///
/// Reserved characters (`< > : " / \ | ? *`) and control characters become
/// `_`, trailing whitespace and periods are dropped, and an empty result is `_`.
pub fn sanitize_segment(segment: &str) -> String {
    let replaced: String = segment
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let trimmed = replaced.trim_end_matches(|c: char| c.is_whitespace() || c == '.');
    if trimmed.is_empty() {
        "_".to_string()
    } else {
        trimmed.to_string()
    }
}

fn file_name(stem: &str, ext: &Option<String>) -> String {
    let stem = sanitize_segment(stem);
    match ext {
        Some(ext) => format!("{}.{}", stem, ext),
        None => stem,
    }
}

/// Lowercased extension of the primary file, else of the raw name if it is a video name.
fn extension(parsed: &ParsedContent) -> Option<String> {
    let from_path = |p: &str| {
        Path::new(p)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .filter(|e| !e.is_empty())
    };

    match parsed.primary_file.as_deref() {
        Some(path) => from_path(path),
        None if is_video_file(&parsed.raw_name) => from_path(&parsed.raw_name),
        None => None,
    }
}
