//! Download orchestration.
//!
//! The manager drives sessions through the state machine:
//! - **Submit**: derive the ref, register the session, hand the torrent to the engine
//! - **Monitor**: one task per active session polls the engine
//! - **Organize**: classify, resolve, name, place, notify (inside the session's task)

mod config;
mod manager;
mod monitor;
mod organizer;
mod types;

pub use config::ManagerConfig;
pub use manager::DownloadManager;
pub use organizer::Organizer;
pub use types::{OrganizeError, OrganizeOutcome, PlannedMove, SubmitRequest};
