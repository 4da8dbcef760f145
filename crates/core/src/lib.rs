pub mod config;
pub mod content;
pub mod metadata;
pub mod metrics;
pub mod naming;
pub mod notifier;
pub mod orchestrator;
pub mod placer;
pub mod session;
pub mod testing;
pub mod torrent_client;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use content::{classify, ContentKind, ParsedContent};
pub use metadata::{EpisodeResolver, MetadataSource, ResolvedEpisode, TmdbSource};
pub use naming::{format_target, LibraryRoots};
pub use notifier::{LibraryKind, LibraryNotifier, NotifyResult, PlexNotifier};
pub use orchestrator::{DownloadManager, ManagerConfig, Organizer, SubmitRequest};
pub use placer::{FsPlacer, Placer};
pub use session::{
    DownloadSession, ProgressSnapshot, SessionError, SessionRegistry, SessionState,
    SqliteSessionStore,
};
pub use torrent_client::{LibrqbitClient, TorrentClient, TorrentRef, TorrentSource};
