//! Name-based classification of downloads.
//!
//! Rules are tried in order; the first that matches wins. Everything here is
//! pure and best-effort: a name that matches nothing is `Unknown`, never an error.

use std::path::Path;

use regex_lite::Regex;

use super::types::{ContentKind, ParsedContent};
use crate::torrent_client::TorrentFile;

/// Extensions treated as playable video.
pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mkv", "mp4", "avi", "m4v", "mov", "wmv", "ts", "m2ts", "webm", "mpg", "mpeg", "flv",
];

/// Release tokens that end a title (source, codec, audio, edition tags).
const RELEASE_TOKENS: &[&str] = &[
    "4k", "uhd", "hdr", "hdr10", "dv", "sdr", "x264", "x265", "h264", "h265", "h.264", "h.265",
    "hevc", "avc", "xvid", "divx", "10bit", "8bit", "web-dl", "webdl", "webrip", "web-rip",
    "bluray", "blu-ray", "bdrip", "brrip", "bdremux", "remux", "dvdrip", "dvdscr", "dvd",
    "hdtv", "hdrip", "hdcam", "cam", "ts-rip", "proper", "repack", "internal", "aac", "ac3",
    "dts", "ddp5", "dd5", "eac3", "atmos", "truehd", "multi", "subbed", "dubbed",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rule {
    /// `S02E05`, `S02.E05`, `2x05`.
    TvMarker,
    /// A separator-bounded year between 1900 and 2099.
    MovieYear,
}

const RULES: [Rule; 2] = [Rule::TvMarker, Rule::MovieYear];

impl Rule {
    fn apply(self, name: &str) -> Option<ParsedContent> {
        match self {
            Rule::TvMarker => match_tv_marker(name),
            Rule::MovieYear => match_movie_year(name),
        }
    }
}

/// Classify a torrent from its display name and file list.
///
/// An empty `raw_name` falls back to the primary file's stem. When the
/// torrent name itself says nothing (e.g. `Some Show Season 2`), the primary
/// file's name gets a second chance.
pub fn classify(raw_name: &str, files: &[TorrentFile]) -> ParsedContent {
    let primary = primary_file(files);
    let primary_stem = primary.map(|f| file_stem(&f.path));

    let name = if raw_name.trim().is_empty() {
        primary_stem.clone().unwrap_or_default()
    } else {
        strip_video_extension(raw_name.trim()).to_string()
    };

    let mut parsed = classify_name(&name);

    if parsed.kind == ContentKind::Unknown {
        if let Some(stem) = primary_stem.filter(|s| *s != name) {
            let from_file = classify_name(&stem);
            if from_file.kind != ContentKind::Unknown {
                parsed = from_file;
            }
        }
    }

    // A marker at the very start ("S01E01.mkv") leaves no show name.
    if parsed.kind == ContentKind::TvEpisode && parsed.title.is_empty() {
        parsed = match primary.and_then(|f| show_from_directories(&f.path)) {
            Some(show) => ParsedContent { title: show, ..parsed },
            None => unknown(&name),
        };
    }

    if !raw_name.trim().is_empty() {
        parsed.raw_name = raw_name.trim().to_string();
    }

    parsed.with_primary_file(primary.map(|f| f.path.clone()))
}

fn classify_name(name: &str) -> ParsedContent {
    RULES
        .iter()
        .find_map(|rule| rule.apply(name))
        .unwrap_or_else(|| unknown(name))
}

fn unknown(name: &str) -> ParsedContent {
    let title = clean_title(name);
    let title = if title.is_empty() { name.to_string() } else { title };
    ParsedContent::unknown(title, name)
}

/// Show name from the directories holding `path`, nearest first.
/// `Season 2`-style folders are skipped.
fn show_from_directories(path: &str) -> Option<String> {
    let season_folder = Regex::new(r"(?i)^(?:season|series|s)\s*\d{1,2}$").ok()?;
    Path::new(path)
        .parent()?
        .iter()
        .rev()
        .map(|dir| dir.to_string_lossy())
        .find_map(|dir| {
            let title = match match_tv_marker(&dir) {
                Some(parsed) => parsed.title,
                None => clean_title(&dir),
            };
            (!title.is_empty() && !season_folder.is_match(&title)).then_some(title)
        })
}

fn match_tv_marker(name: &str) -> Option<ParsedContent> {
    const PATTERNS: [&str; 2] = [
        r"(?i)(?:^|[^a-z0-9])s(\d{1,2})[\s._-]*e(\d{1,3})(?:[^0-9]|$)",
        r"(?i)(?:^|[^a-z0-9])(\d{1,2})x(\d{2,3})(?:[^0-9a-z]|$)",
    ];

    let (start, season, episode) = PATTERNS
        .iter()
        .filter_map(|pattern| {
            let caps = Regex::new(pattern).ok()?.captures(name)?;
            let start = caps.get(0)?.start();
            let season = caps.get(1)?.as_str().parse::<u32>().ok()?;
            let episode = caps.get(2)?.as_str().parse::<u32>().ok()?;
            Some((start, season, episode))
        })
        .min_by_key(|(start, _, _)| *start)?;

    Some(ParsedContent::episode(
        clean_title(&name[..start]),
        season,
        episode,
        name,
    ))
}

fn match_movie_year(name: &str) -> Option<ParsedContent> {
    let digits = Regex::new(r"\d+").ok()?;

    digits
        .find_iter(name)
        .filter(|m| m.as_str().len() == 4)
        .filter(|m| {
            is_year_boundary(name[..m.start()].chars().next_back())
                && is_year_boundary(name[m.end()..].chars().next())
        })
        .filter_map(|m| {
            let year = m.as_str().parse::<u16>().ok()?;
            if !(1900..=2099).contains(&year) {
                return None;
            }
            let title = clean_title(&name[..m.start()]);
            (!title.is_empty()).then(|| ParsedContent::movie(title, year, name))
        })
        .last()
}

fn is_year_boundary(c: Option<char>) -> bool {
    match c {
        None => true,
        Some(c) => {
            c.is_whitespace() || matches!(c, '.' | '_' | '-' | '(' | ')' | '[' | ']' | '{' | '}')
        }
    }
}

/// Turn a release name fragment into a human title.
///
/// Drops `[...]`/`{...}` annotations and a trailing video extension,
/// normalizes separators to single spaces, and cuts at the first release
/// token (`1080p`, `x264`, `WEB-DL`, ...).
pub fn clean_title(raw: &str) -> String {
    let stripped = strip_brackets(strip_video_extension(raw.trim()));

    // Names that only use hyphens as separators ("Show-Name-2019").
    let hyphen_only = !stripped.contains(['.', '_', ' ', '\t']);
    let is_separator = |c: char| {
        c == '.' || c == '_' || c.is_whitespace() || (hyphen_only && c == '-')
    };

    let tokens: Vec<&str> = stripped
        .split(is_separator)
        .map(|t| t.trim_matches(|c: char| matches!(c, '-' | '(' | ')' | '[' | ']' | '{' | '}')))
        .filter(|t| !t.is_empty())
        .collect();

    let end = tokens
        .iter()
        .skip(1)
        .position(|t| is_release_token(t))
        .map(|i| i + 1)
        .unwrap_or(tokens.len());

    tokens[..end].join(" ")
}

fn strip_brackets(s: &str) -> String {
    match Regex::new(r"\[[^\]]*\]|\{[^}]*\}") {
        Ok(re) => re.replace_all(s, " ").into_owned(),
        Err(_) => s.to_string(),
    }
}

fn is_release_token(token: &str) -> bool {
    let lower = token.to_ascii_lowercase();
    if RELEASE_TOKENS.contains(&lower.as_str()) {
        return true;
    }
    // 480p, 720p, 1080p, 2160p
    match lower.strip_suffix(['p', 'i']) {
        Some(digits) => (3..=4).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit()),
        None => false,
    }
}

fn strip_video_extension(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && is_video_extension(ext) => stem,
        _ => name,
    }
}

fn is_video_extension(ext: &str) -> bool {
    VIDEO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
}

/// Whether a torrent-relative path names a video file.
pub fn is_video_file(path: &str) -> bool {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(is_video_extension)
}

/// All video files of a torrent.
pub fn video_files(files: &[TorrentFile]) -> Vec<&TorrentFile> {
    files.iter().filter(|f| is_video_file(&f.path)).collect()
}

/// The file to organize: the largest video file, else the largest file.
/// Ties go to the lexicographically smaller path.
pub fn primary_file(files: &[TorrentFile]) -> Option<&TorrentFile> {
    largest(video_files(files)).or_else(|| largest(files.iter().collect()))
}

fn largest(candidates: Vec<&TorrentFile>) -> Option<&TorrentFile> {
    candidates.into_iter().max_by(|a, b| {
        a.size_bytes
            .cmp(&b.size_bytes)
            .then_with(|| b.path.cmp(&a.path))
    })
}

fn file_stem(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}
