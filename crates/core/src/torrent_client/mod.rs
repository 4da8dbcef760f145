//! Torrent engine abstraction.
//!
//! `TorrentClient` is the seam between download sessions and the engine that
//! actually moves bytes. The embedded librqbit backend is the production
//! implementation; tests use `testing::MockTorrentClient`.

mod librqbit;
mod source;
mod types;

pub use librqbit::LibrqbitClient;
pub use source::*;
pub use types::*;
