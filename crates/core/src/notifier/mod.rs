//! Media server notification.
//!
//! After a file lands in the library the media server is asked to rescan the
//! matching library section. Failures here never undo a placement.

mod plex;
mod types;

pub use plex::{PlexConfig, PlexNotifier};
pub use types::*;

use async_trait::async_trait;

/// Something that can be told to rescan a library.
#[async_trait]
pub trait LibraryNotifier: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Ask the media server to scan the library holding `kind`.
    async fn notify(&self, kind: LibraryKind) -> NotifyResult;
}
