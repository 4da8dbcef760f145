use std::sync::Arc;
use std::time::Duration;

use shelfie_core::{Config, DownloadManager, SanitizedConfig};

/// Shared application state
pub struct AppState {
    config: Config,
    manager: Arc<DownloadManager>,
    /// Fetches `.torrent` files submitted by URL.
    http: reqwest::Client,
}

impl AppState {
    pub fn new(config: Config, manager: Arc<DownloadManager>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.sessions.fetch_timeout_secs))
            .build()
            .unwrap_or_default();

        Self {
            config,
            manager,
            http,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn manager(&self) -> &DownloadManager {
        self.manager.as_ref()
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }
}
