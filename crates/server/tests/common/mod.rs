//! Common test utilities for API testing with mocks.
//!
//! This module provides a test fixture that creates an in-process router
//! backed by a real session registry and download manager, with mock
//! implementations for the torrent engine, TMDB and Plex.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use shelfie_core::{
    load_config_from_str,
    testing::{MockMetadataSource, MockNotifier, MockTorrentClient},
    DownloadManager, EpisodeResolver, FsPlacer, LibraryRoots, ManagerConfig, Organizer,
    SessionRegistry, SqliteSessionStore,
};
use shelfie_server::{api::create_router, state::AppState};

/// Re-export fixtures for test convenience
pub use shelfie_core::testing::fixtures;

/// Test fixture for API testing with mock dependencies.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_submit() {
///     let fixture = TestFixture::new().await;
///
///     let response = fixture.post("/api/v1/downloads", json!({
///         "source": { "magnet": fixtures::magnet(&fixtures::hash(1), "Show") },
///         "requested_by": "alice"
///     })).await;
///
///     assert_eq!(response.status, 201);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Mock torrent client - control downloads
    pub torrent_client: Arc<MockTorrentClient>,
    /// Mock metadata source - configure episode listings
    pub metadata: Arc<MockMetadataSource>,
    /// Mock notifier - inspect library rescans
    pub notifier: Arc<MockNotifier>,
    pub manager: Arc<DownloadManager>,
    pub staging: PathBuf,
    pub library: PathBuf,
    /// Temporary directory for the database, staging area and library
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    /// Create a new test fixture with default settings.
    pub async fn new() -> Self {
        Self::with_config(TestConfig::default()).await
    }

    /// Create a test fixture with custom configuration.
    pub async fn with_config(test_config: TestConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let root = temp_dir.path();
        let staging = root.join("staging");
        let library = root.join("library");

        let config = load_config_from_str(&format!(
            r#"
[server]
host = "127.0.0.1"
port = 8080

[database]
path = "{db}"

[library]
movies_root = "{lib}/Movies"
tv_root = "{lib}/TV"
unsorted_root = "{lib}/Unsorted"
staging_path = "{staging}"

[metadata.tmdb]
api_key = "secret-tmdb-key"

[sessions]
poll_interval_ms = 20
max_active_per_user = {limit}
"#,
            db = root.join("test.db").display(),
            lib = library.display(),
            staging = staging.display(),
            limit = test_config.max_active_per_user,
        ))
        .expect("Failed to parse test config");

        let torrent_client = Arc::new(MockTorrentClient::new());
        let metadata = Arc::new(MockMetadataSource::new());
        let notifier = Arc::new(MockNotifier::new());

        let store = Arc::new(
            SqliteSessionStore::new(&config.database.path)
                .expect("Failed to create session store"),
        );
        let registry = SessionRegistry::open(store, &config.sessions)
            .await
            .expect("Failed to open registry");

        let organizer = Organizer::new(
            EpisodeResolver::new(metadata.clone(), Duration::from_millis(200)),
            Arc::new(FsPlacer::with_defaults()),
            Some(notifier.clone()),
            LibraryRoots::from(&config.library),
        );

        let manager = Arc::new(DownloadManager::new(
            Arc::new(registry),
            torrent_client.clone(),
            Arc::new(organizer),
            ManagerConfig::from(&config),
        ));
        manager.start().await;

        let state = Arc::new(AppState::new(config, Arc::clone(&manager)));
        let router = create_router(state);

        Self {
            router,
            torrent_client,
            metadata,
            notifier,
            manager,
            staging,
            library,
            temp_dir,
        }
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a POST request without a body.
    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.request("POST", path, None).await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None).await
    }

    /// Send a POST request with raw string body (for testing malformed JSON).
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();

        self.send(request).await.0
    }

    /// Send a GET request and return the raw text body.
    pub async fn get_text(&self, path: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();

        let (response, bytes) = self.send(request).await;
        (response.status, String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Poll a download until it reaches `state`.
    pub async fn wait_for_state(&self, torrent_ref: &str, state: &str) -> Value {
        let path = format!("/api/v1/downloads/{}", torrent_ref);
        let start = std::time::Instant::now();
        loop {
            let response = self.get(&path).await;
            if response.body["state"] == state {
                return response.body;
            }
            if start.elapsed() > Duration::from_secs(5) {
                panic!(
                    "Timed out waiting for state {}, last response {:?}",
                    state, response
                );
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Send a request to the test server.
    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();
        self.send(request).await.0
    }

    async fn send(&self, request: Request<Body>) -> (TestResponse, Vec<u8>) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        (TestResponse { status, body }, body_bytes.to_vec())
    }
}

/// Configuration for test fixture.
#[derive(Debug, Clone, Default)]
pub struct TestConfig {
    /// Maximum active downloads per requester (0 = unlimited)
    pub max_active_per_user: usize,
}

impl TestConfig {
    pub fn with_user_limit(limit: usize) -> Self {
        Self {
            max_active_per_user: limit,
        }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}
