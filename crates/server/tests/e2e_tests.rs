//! End-to-end tests with mocked external dependencies.
//!
//! These tests run the full API stack in-process with mock implementations
//! for the torrent engine, TMDB and Plex, and a real filesystem library.

mod common;

use axum::http::StatusCode;
use base64::Engine;
use serde_json::json;
use shelfie_core::{metadata::EpisodeListing, notifier::LibraryKind, torrent_client::TorrentFile};

use common::{fixtures, TestConfig, TestFixture};

const EPISODE: &str = "The.Show.Name.S02E05.1080p.WEB.mkv";

fn magnet_body(n: u32, name: &str, user: &str) -> serde_json::Value {
    json!({
        "source": { "magnet": fixtures::magnet(&fixtures::hash(n), name) },
        "requested_by": user
    })
}

// =============================================================================
// Basic API Tests
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let fixture = TestFixture::new().await;
    let response = fixture.get("/api/v1/health").await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["status"], "ok");
    assert_eq!(response.body["active_sessions"], 0);
}

#[tokio::test]
async fn test_config_endpoint_hides_secrets() {
    let fixture = TestFixture::new().await;
    let response = fixture.get("/api/v1/config").await;

    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["metadata"]["tmdb_configured"], true);
    assert_eq!(response.body["sessions"]["poll_interval_ms"], 20);
    assert!(!response.body.to_string().contains("secret-tmdb-key"));
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let fixture = TestFixture::new().await;
    fixture.get("/api/v1/health").await;

    let (status, text) = fixture.get_text("/api/v1/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(text.contains("shelfie_http_requests_total"));
}

// =============================================================================
// Submission
// =============================================================================

#[tokio::test]
async fn test_submit_magnet() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post("/api/v1/downloads", magnet_body(1, EPISODE, "alice"))
        .await;

    assert_status!(response, StatusCode::CREATED);
    assert_eq!(response.body["torrent_ref"], fixtures::hash(1));
    assert_eq!(response.body["requested_by"], "alice");
    assert_eq!(response.body["state"], "downloading");
    assert_eq!(response.body["name"], EPISODE);
    assert_eq!(
        response.body["save_path"],
        fixture.staging.join(fixtures::hash(1)).display().to_string()
    );
    assert_eq!(fixture.torrent_client.added_torrents().await.len(), 1);
}

#[tokio::test]
async fn test_submit_duplicate_returns_conflict() {
    let fixture = TestFixture::new().await;

    let first = fixture
        .post("/api/v1/downloads", magnet_body(1, EPISODE, "alice"))
        .await;
    assert_status!(first, StatusCode::CREATED);

    let second = fixture
        .post("/api/v1/downloads", magnet_body(1, EPISODE, "bob"))
        .await;
    assert_status!(second, StatusCode::CONFLICT);
    assert!(second.body["error"].as_str().unwrap().contains("already"));
}

#[tokio::test]
async fn test_submit_over_user_limit_returns_429() {
    let fixture = TestFixture::with_config(TestConfig::with_user_limit(1)).await;

    let first = fixture
        .post("/api/v1/downloads", magnet_body(1, EPISODE, "alice"))
        .await;
    assert_status!(first, StatusCode::CREATED);

    let second = fixture
        .post("/api/v1/downloads", magnet_body(2, "Other.Show.S01E01.mkv", "alice"))
        .await;
    assert_status!(second, StatusCode::TOO_MANY_REQUESTS);

    // Another requester is not affected
    let third = fixture
        .post("/api/v1/downloads", magnet_body(2, "Other.Show.S01E01.mkv", "bob"))
        .await;
    assert_status!(third, StatusCode::CREATED);
}

#[tokio::test]
async fn test_submit_invalid_magnet_returns_400() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post(
            "/api/v1/downloads",
            json!({
                "source": { "magnet": "magnet:?dn=no-hash" },
                "requested_by": "alice"
            }),
        )
        .await;

    assert_status!(response, StatusCode::BAD_REQUEST);
    assert!(fixture.torrent_client.added_torrents().await.is_empty());
}

#[tokio::test]
async fn test_submit_invalid_base64_returns_400() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post(
            "/api/v1/downloads",
            json!({
                "source": { "torrent_base64": "not base64!!" },
                "requested_by": "alice"
            }),
        )
        .await;

    assert_status!(response, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_submit_garbage_torrent_file_returns_400() {
    let fixture = TestFixture::new().await;
    let encoded = base64::engine::general_purpose::STANDARD.encode(b"definitely not bencode");

    let response = fixture
        .post(
            "/api/v1/downloads",
            json!({
                "source": { "torrent_base64": encoded },
                "requested_by": "alice"
            }),
        )
        .await;

    assert_status!(response, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_submit_unsupported_url_returns_400() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post(
            "/api/v1/downloads",
            json!({
                "source": { "url": "ftp://example.com/file.torrent" },
                "requested_by": "alice"
            }),
        )
        .await;

    assert_status!(response, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_submit_magnet_as_url() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post(
            "/api/v1/downloads",
            json!({
                "source": { "url": fixtures::magnet(&fixtures::hash(4), EPISODE) },
                "requested_by": "alice"
            }),
        )
        .await;

    assert_status!(response, StatusCode::CREATED);
    assert_eq!(response.body["torrent_ref"], fixtures::hash(4));
}

#[tokio::test]
async fn test_submit_malformed_json_returns_client_error() {
    let fixture = TestFixture::new().await;
    let response = fixture.post_raw("/api/v1/downloads", "{not json").await;
    assert!(response.status.is_client_error());
}

#[tokio::test]
async fn test_submit_empty_requester_returns_400() {
    let fixture = TestFixture::new().await;
    let response = fixture
        .post("/api/v1/downloads", magnet_body(1, EPISODE, "  "))
        .await;
    assert_status!(response, StatusCode::BAD_REQUEST);
}

// =============================================================================
// Queries
// =============================================================================

#[tokio::test]
async fn test_list_downloads_filters_by_requester() {
    let fixture = TestFixture::new().await;
    fixture
        .post("/api/v1/downloads", magnet_body(1, EPISODE, "alice"))
        .await;
    fixture
        .post("/api/v1/downloads", magnet_body(2, "Great.Movie.2021.mkv", "bob"))
        .await;

    let all = fixture.get("/api/v1/downloads").await;
    assert_status!(all, StatusCode::OK);
    assert_eq!(all.body["total"], 2);

    let bob = fixture.get("/api/v1/downloads?requested_by=bob").await;
    assert_eq!(bob.body["total"], 1);
    assert_eq!(bob.body["downloads"][0]["torrent_ref"], fixtures::hash(2));
}

#[tokio::test]
async fn test_get_download_reports_progress() {
    let fixture = TestFixture::new().await;
    fixture
        .post("/api/v1/downloads", magnet_body(1, EPISODE, "alice"))
        .await;
    fixture
        .torrent_client
        .set_progress(&fixtures::hash(1), 0.5)
        .await;

    let path = format!("/api/v1/downloads/{}", fixtures::hash(1));
    let start = std::time::Instant::now();
    loop {
        let response = fixture.get(&path).await;
        assert_status!(response, StatusCode::OK);
        if response.body["progress"] == 0.5 {
            assert!(response.body["download_speed"].is_u64());
            break;
        }
        assert!(start.elapsed() < std::time::Duration::from_secs(5));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn test_get_unknown_download_returns_404() {
    let fixture = TestFixture::new().await;
    let response = fixture
        .get(&format!("/api/v1/downloads/{}", fixtures::hash(99)))
        .await;
    assert_status!(response, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_get_malformed_ref_returns_400() {
    let fixture = TestFixture::new().await;
    let response = fixture.get("/api/v1/downloads/not-a-hash").await;
    assert_status!(response, StatusCode::BAD_REQUEST);
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test]
async fn test_download_is_organized_into_library() {
    let fixture = TestFixture::new().await;
    fixture
        .metadata
        .set_season("The Show Name", 2, vec![EpisodeListing::new(5, "Episode Five")])
        .await;

    let response = fixture
        .post("/api/v1/downloads", magnet_body(1, EPISODE, "alice"))
        .await;
    assert_status!(response, StatusCode::CREATED);

    let hash = fixtures::hash(1);
    let save_path = fixture.staging.join(&hash);
    fixtures::write_file(&save_path, EPISODE, b"episode");
    fixture
        .torrent_client
        .set_files(&hash, vec![TorrentFile::new(EPISODE, 7)])
        .await;
    fixture.torrent_client.set_progress(&hash, 1.0).await;

    let done = fixture.wait_for_state(&hash, "done").await;
    let expected = fixture
        .library
        .join("TV/The Show Name/Season 02/s02e05 - Episode Five.mkv");
    assert_eq!(done["target_path"], expected.display().to_string());
    assert_eq!(done["progress"], 1.0);
    assert!(expected.exists());
    assert_eq!(fixture.notifier.notifications().await, vec![LibraryKind::Tv]);
}

#[tokio::test]
async fn test_cancel_and_clear() {
    let fixture = TestFixture::new().await;
    let hash = fixtures::hash(1);
    let path = format!("/api/v1/downloads/{}", hash);

    fixture
        .post("/api/v1/downloads", magnet_body(1, EPISODE, "alice"))
        .await;

    // Clearing an active download is refused
    let clear = fixture.post_empty(&format!("{}/clear", path)).await;
    assert_status!(clear, StatusCode::CONFLICT);

    let cancel = fixture.delete(&path).await;
    assert_status!(cancel, StatusCode::OK);
    assert_eq!(cancel.body["state"], "cancelled");
    assert_eq!(
        fixture.torrent_client.removed_torrents().await,
        vec![(hash.clone(), true)]
    );

    // Cancelling twice is a conflict
    let again = fixture.delete(&path).await;
    assert_status!(again, StatusCode::CONFLICT);

    let clear = fixture.post_empty(&format!("{}/clear", path)).await;
    assert_status!(clear, StatusCode::OK);
    assert_status!(fixture.get(&path).await, StatusCode::NOT_FOUND);

    // The same torrent can be submitted again
    let resubmit = fixture
        .post("/api/v1/downloads", magnet_body(1, EPISODE, "alice"))
        .await;
    assert_status!(resubmit, StatusCode::CREATED);
}

#[tokio::test]
async fn test_cancel_unknown_download_returns_404() {
    let fixture = TestFixture::new().await;
    let response = fixture
        .delete(&format!("/api/v1/downloads/{}", fixtures::hash(42)))
        .await;
    assert_status!(response, StatusCode::NOT_FOUND);
}
