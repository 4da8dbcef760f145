//! Testing utilities and mock implementations.
//!
//! Mock implementations of the external service traits, so sessions can be
//! driven end to end without a torrent engine, TMDB, or Plex.
//!
//! # Example
//!
//! ```rust,ignore
//! use shelfie_core::testing::{fixtures, MockMetadataSource, MockNotifier, MockTorrentClient};
//!
//! let client = MockTorrentClient::new();
//! let source = MockMetadataSource::new();
//!
//! source.set_season("The Show", 2, vec![EpisodeListing::new(5, "Episode Five")]).await;
//! client.set_progress(&fixtures::hash(1), 1.0).await;
//! ```

mod mock_metadata_source;
mod mock_notifier;
mod mock_torrent_client;

pub use mock_metadata_source::MockMetadataSource;
pub use mock_notifier::MockNotifier;
pub use mock_torrent_client::{MockTorrentClient, RecordedAddTorrent};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::{Path, PathBuf};

    use crate::torrent_client::{TorrentInfo, TorrentRef, TorrentSource, TorrentState};

    /// A deterministic 40-hex info-hash.
    pub fn hash(n: u32) -> String {
        format!("{:040x}", n)
    }

    pub fn torrent_ref(n: u32) -> TorrentRef {
        TorrentRef::parse(&hash(n)).expect("fixture hash is valid hex")
    }

    /// A magnet URI for `hash` with a display name.
    pub fn magnet(hash: &str, name: &str) -> String {
        format!(
            "magnet:?xt=urn:btih:{}&dn={}",
            hash,
            urlencoding::encode(name)
        )
    }

    pub fn magnet_source(n: u32, name: &str) -> TorrentSource {
        TorrentSource::Magnet(magnet(&hash(n), name))
    }

    /// Engine view of a torrent with reasonable defaults.
    pub fn torrent_info(hash: &str, name: &str, progress: f64) -> TorrentInfo {
        TorrentInfo {
            hash: hash.to_string(),
            name: name.to_string(),
            state: if progress >= 1.0 {
                TorrentState::Seeding
            } else {
                TorrentState::Downloading
            },
            progress,
            size_bytes: 1024 * 1024,
            downloaded_bytes: (1024.0 * 1024.0 * progress) as u64,
            download_speed: 0,
            peers: 0,
            eta_secs: None,
            error: None,
        }
    }

    /// Write `contents` to `dir/relative`, creating parent directories.
    pub fn write_file(dir: &Path, relative: &str, contents: &[u8]) -> PathBuf {
        let path = dir.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create fixture directory");
        }
        std::fs::write(&path, contents).expect("write fixture file");
        path
    }
}
