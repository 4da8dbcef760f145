//! Download sessions: the state machine, the registry that owns them, and
//! their durable record.

mod registry;
mod sqlite_store;
mod store;
mod types;

pub use registry::SessionRegistry;
pub use sqlite_store::SqliteSessionStore;
pub use store::{SessionStore, StoreError};
pub use types::*;
