//! Download manager configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::config::Config;

/// Runtime settings for the download manager.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// How often each session polls the engine.
    pub poll_interval: Duration,
    /// Base staging directory when a submission names none.
    pub staging_path: PathBuf,
}

impl ManagerConfig {
    pub fn new(staging_path: impl Into<PathBuf>) -> Self {
        Self {
            poll_interval: Duration::from_millis(3000),
            staging_path: staging_path.into(),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

impl From<&Config> for ManagerConfig {
    fn from(config: &Config) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.sessions.poll_interval_ms),
            staging_path: config.library.staging_path.clone(),
        }
    }
}
