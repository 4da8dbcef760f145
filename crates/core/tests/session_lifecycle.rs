//! Session lifecycle integration tests.
//!
//! These tests drive sessions through the download manager with a mock
//! engine and a real filesystem:
//! queued -> downloading -> organizing -> done | failed | cancelled

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use shelfie_core::{
    config::SessionsConfig,
    metadata::EpisodeListing,
    notifier::{LibraryKind, NotifyResult},
    session::{DownloadSession, NewSession, SessionStore},
    testing::{fixtures, MockMetadataSource, MockNotifier, MockTorrentClient},
    torrent_client::{TorrentFile, TorrentSource},
    DownloadManager, EpisodeResolver, FsPlacer, LibraryRoots, ManagerConfig, Organizer,
    SessionError, SessionRegistry, SessionState, SqliteSessionStore, SubmitRequest, TorrentRef,
};

const EPISODE: &str = "The.Show.Name.S02E05.1080p.WEB.mkv";

/// Test helper to create all dependencies for manager testing.
struct TestHarness {
    store: Arc<SqliteSessionStore>,
    client: Arc<MockTorrentClient>,
    source: Arc<MockMetadataSource>,
    notifier: Arc<MockNotifier>,
    roots: LibraryRoots,
    staging: PathBuf,
    _temp_dir: TempDir,
}

impl TestHarness {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = Arc::new(
            SqliteSessionStore::new(&temp_dir.path().join("sessions.db"))
                .expect("Failed to create session store"),
        );

        Self {
            store,
            client: Arc::new(MockTorrentClient::new()),
            source: Arc::new(MockMetadataSource::new()),
            notifier: Arc::new(MockNotifier::new()),
            roots: LibraryRoots {
                movies: temp_dir.path().join("Movies"),
                tv: temp_dir.path().join("TV"),
                unsorted: temp_dir.path().join("Unsorted"),
            },
            staging: temp_dir.path().join("staging"),
            _temp_dir: temp_dir,
        }
    }

    async fn manager(&self, sessions: SessionsConfig) -> DownloadManager {
        let registry = SessionRegistry::open(self.store.clone(), &sessions)
            .await
            .expect("Failed to open registry");

        let organizer = Organizer::new(
            EpisodeResolver::new(self.source.clone(), Duration::from_millis(200)),
            Arc::new(FsPlacer::with_defaults()),
            Some(self.notifier.clone()),
            self.roots.clone(),
        );

        let manager = DownloadManager::new(
            Arc::new(registry),
            self.client.clone(),
            Arc::new(organizer),
            ManagerConfig::new(&self.staging).with_poll_interval(Duration::from_millis(20)),
        );
        manager.start().await;
        manager
    }

    async fn default_manager(&self) -> DownloadManager {
        self.manager(SessionsConfig::default()).await
    }

    /// Pretend the engine finished: write the payload and report completion.
    async fn finish_download(&self, session: &DownloadSession, relative: &str, contents: &[u8]) {
        let hash = session.torrent_ref.as_str();
        fixtures::write_file(&session.save_path, relative, contents);
        self.client
            .set_files(hash, vec![TorrentFile::new(relative, contents.len() as u64)])
            .await;
        self.client.set_progress(hash, 1.0).await;
    }

    async fn wait_for_state(
        &self,
        manager: &DownloadManager,
        torrent_ref: &TorrentRef,
        expected: SessionState,
    ) -> DownloadSession {
        let start = std::time::Instant::now();
        loop {
            let session = manager.get(torrent_ref).await;
            if let Some(session) = session.as_ref().filter(|s| s.state == expected) {
                return session.clone();
            }
            if start.elapsed() > Duration::from_secs(5) {
                panic!("Timed out waiting for {:?}, last seen {:?}", expected, session);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

fn tv_source(n: u32) -> TorrentSource {
    fixtures::magnet_source(n, EPISODE)
}

fn read(path: &Path) -> Vec<u8> {
    std::fs::read(path).expect("Failed to read file")
}

#[tokio::test]
async fn test_tv_episode_full_lifecycle() {
    let h = TestHarness::new();
    h.source
        .set_season("The Show Name", 2, vec![EpisodeListing::new(5, "Episode Five")])
        .await;
    let manager = h.default_manager().await;

    let session = manager
        .submit(SubmitRequest::new(tv_source(1), "alice"))
        .await
        .unwrap();
    assert_eq!(session.state, SessionState::Downloading);
    assert_eq!(session.save_path, h.staging.join(fixtures::hash(1)));
    assert_eq!(session.name.as_deref(), Some(EPISODE));

    let added = h.client.added_torrents().await;
    assert_eq!(added.len(), 1);
    assert_eq!(
        added[0].request.download_path(),
        session.save_path.to_str()
    );

    h.finish_download(&session, EPISODE, b"episode five").await;
    let done = h
        .wait_for_state(&manager, &session.torrent_ref, SessionState::Done)
        .await;

    let expected = h
        .roots
        .tv
        .join("The Show Name/Season 02/s02e05 - Episode Five.mkv");
    assert_eq!(done.target_path.as_deref(), Some(expected.as_path()));
    assert_eq!(done.progress, 1.0);
    assert!(done.last_error.is_none());
    assert_eq!(read(&expected), b"episode five");
    assert!(!session.save_path.join(EPISODE).exists());
    assert_eq!(h.notifier.notifications().await, vec![LibraryKind::Tv]);
    // Stops seeding without deleting anything
    assert_eq!(
        h.client.removed_torrents().await,
        vec![(fixtures::hash(1), false)]
    );

    let rows = h.store.load_all().unwrap();
    assert_eq!(rows[0].state, SessionState::Done);
}

#[tokio::test]
async fn test_unresolved_title_and_unreachable_plex_still_done() {
    let h = TestHarness::new();
    h.source.fail_next(100).await;
    h.notifier.set_result(NotifyResult::Unreachable).await;
    let manager = h.default_manager().await;

    let session = manager
        .submit(SubmitRequest::new(tv_source(1), "alice"))
        .await
        .unwrap();
    h.finish_download(&session, EPISODE, b"x").await;
    let done = h
        .wait_for_state(&manager, &session.torrent_ref, SessionState::Done)
        .await;

    assert_eq!(
        done.target_path,
        Some(h.roots.tv.join("The Show Name/Season 02/s02e05.mkv"))
    );
    assert!(done
        .last_error
        .as_deref()
        .is_some_and(|e| e.contains("unreachable")));
}

#[tokio::test]
async fn test_movie_with_custom_save_path() {
    let h = TestHarness::new();
    let manager = h.default_manager().await;
    let custom = h.staging.join("custom");

    let session = manager
        .submit(
            SubmitRequest::new(
                fixtures::magnet_source(2, "Great.Movie.2021.1080p.BluRay"),
                "bob",
            )
            .with_save_path(&custom),
        )
        .await
        .unwrap();
    assert_eq!(session.save_path, custom.join(fixtures::hash(2)));

    h.finish_download(
        &session,
        "Great.Movie.2021.1080p.BluRay/Great.Movie.2021.1080p.BluRay.mkv",
        b"movie",
    )
    .await;
    let done = h
        .wait_for_state(&manager, &session.torrent_ref, SessionState::Done)
        .await;

    assert_eq!(
        done.target_path,
        Some(h.roots.movies.join("Great Movie (2021)/Great Movie (2021).mkv"))
    );
    assert_eq!(h.notifier.notifications().await, vec![LibraryKind::Movie]);
}

#[tokio::test]
async fn test_duplicate_submission_rejected() {
    let h = TestHarness::new();
    let manager = h.default_manager().await;

    let first = manager
        .submit(SubmitRequest::new(tv_source(1), "alice"))
        .await
        .unwrap();
    let err = manager
        .submit(SubmitRequest::new(tv_source(1), "bob"))
        .await
        .unwrap_err();

    assert!(matches!(err, SessionError::DuplicateTorrent(_)));
    assert_eq!(h.client.added_torrents().await.len(), 1);
    let current = manager.get(&first.torrent_ref).await.unwrap();
    assert_eq!(current.requested_by, "alice");
}

#[tokio::test]
async fn test_per_user_limit() {
    let h = TestHarness::new();
    let manager = h
        .manager(SessionsConfig {
            max_active_per_user: 1,
            ..SessionsConfig::default()
        })
        .await;

    manager
        .submit(SubmitRequest::new(tv_source(1), "alice"))
        .await
        .unwrap();
    let err = manager
        .submit(SubmitRequest::new(tv_source(2), "alice"))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::LimitReached { .. }));
}

#[tokio::test]
async fn test_invalid_source() {
    let h = TestHarness::new();
    let manager = h.default_manager().await;

    let err = manager
        .submit(SubmitRequest::new(
            TorrentSource::Magnet("magnet:?dn=nothing".to_string()),
            "alice",
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::InvalidSource(_)));
    assert!(manager.list(None).await.is_empty());
}

#[tokio::test]
async fn test_engine_rejection_rolls_back() {
    let h = TestHarness::new();
    let manager = h.default_manager().await;
    h.client
        .set_next_error(shelfie_core::torrent_client::TorrentClientError::ApiError(
            "disk full".to_string(),
        ))
        .await;

    let err = manager
        .submit(SubmitRequest::new(tv_source(1), "alice"))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Engine(_)));
    assert!(manager.get(&fixtures::torrent_ref(1)).await.is_none());
    assert!(h.store.load_all().unwrap().is_empty());

    // Retrying works once the engine recovers
    manager
        .submit(SubmitRequest::new(tv_source(1), "alice"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_cancel_deletes_partial_data() {
    let h = TestHarness::new();
    let manager = h.default_manager().await;

    let session = manager
        .submit(SubmitRequest::new(tv_source(1), "alice"))
        .await
        .unwrap();
    fixtures::write_file(&session.save_path, "partial.mkv", b"half");
    h.client.set_progress(session.torrent_ref.as_str(), 0.5).await;

    let cancelled = manager.cancel(&session.torrent_ref).await.unwrap();
    assert_eq!(cancelled.state, SessionState::Cancelled);
    assert!(!session.save_path.exists());
    assert_eq!(
        h.client.removed_torrents().await,
        vec![(fixtures::hash(1), true)]
    );

    let err = manager.cancel(&session.torrent_ref).await.unwrap_err();
    assert!(matches!(err, SessionError::AlreadyFinished(_)));
}

#[tokio::test]
async fn test_clear_allows_resubmission() {
    let h = TestHarness::new();
    let manager = h.default_manager().await;
    let r = fixtures::torrent_ref(1);

    manager
        .submit(SubmitRequest::new(tv_source(1), "alice"))
        .await
        .unwrap();
    assert!(matches!(
        manager.clear(&r).await,
        Err(SessionError::NotFinished(_))
    ));

    manager.cancel(&r).await.unwrap();
    manager.clear(&r).await.unwrap();
    assert!(manager.get(&r).await.is_none());

    manager
        .submit(SubmitRequest::new(tv_source(1), "alice"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_move_collision_fails_and_keeps_staging() {
    let h = TestHarness::new();
    let manager = h.default_manager().await;
    let occupied = h.roots.tv.join("The Show Name/Season 02");
    fixtures::write_file(&occupied, "s02e05.mkv", b"someone else's file");

    let session = manager
        .submit(SubmitRequest::new(tv_source(1), "alice"))
        .await
        .unwrap();
    h.finish_download(&session, EPISODE, b"our episode").await;
    let failed = h
        .wait_for_state(&manager, &session.torrent_ref, SessionState::Failed)
        .await;

    assert!(failed
        .last_error
        .as_deref()
        .is_some_and(|e| e.contains("move failed")));
    assert_eq!(read(&session.save_path.join(EPISODE)), b"our episode");
    assert_eq!(read(&occupied.join("s02e05.mkv")), b"someone else's file");
    assert!(h.notifier.notifications().await.is_empty());
}

#[tokio::test]
async fn test_transient_engine_errors_keep_downloading() {
    let h = TestHarness::new();
    let manager = h.default_manager().await;

    let session = manager
        .submit(SubmitRequest::new(tv_source(1), "alice"))
        .await
        .unwrap();
    h.client.fail_polls(u32::MAX).await;

    let start = std::time::Instant::now();
    loop {
        let current = manager.get(&session.torrent_ref).await.unwrap();
        if current.last_error.is_some() {
            assert_eq!(current.state, SessionState::Downloading);
            break;
        }
        assert!(start.elapsed() < Duration::from_secs(5), "no error recorded");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    h.client.fail_polls(0).await;
    h.finish_download(&session, EPISODE, b"x").await;
    let done = h
        .wait_for_state(&manager, &session.torrent_ref, SessionState::Done)
        .await;
    assert!(done.last_error.is_none());
}

#[tokio::test]
async fn test_engine_error_state_fails_session() {
    let h = TestHarness::new();
    let manager = h.default_manager().await;

    let session = manager
        .submit(SubmitRequest::new(tv_source(1), "alice"))
        .await
        .unwrap();
    h.client
        .set_error(session.torrent_ref.as_str(), "no space left on device")
        .await;

    let failed = h
        .wait_for_state(&manager, &session.torrent_ref, SessionState::Failed)
        .await;
    assert_eq!(failed.last_error.as_deref(), Some("no space left on device"));
    // Failed sessions stay queryable and persisted
    assert_eq!(h.store.load_all().unwrap()[0].state, SessionState::Failed);
}

#[tokio::test]
async fn test_vanished_torrent_fails_session() {
    let h = TestHarness::new();
    let manager = h.default_manager().await;

    let session = manager
        .submit(SubmitRequest::new(tv_source(1), "alice"))
        .await
        .unwrap();
    h.client.forget(session.torrent_ref.as_str()).await;

    h.wait_for_state(&manager, &session.torrent_ref, SessionState::Failed)
        .await;
}

#[tokio::test]
async fn test_restore_organizing_session_completes() {
    let h = TestHarness::new();
    h.source
        .set_season("The Show Name", 2, vec![EpisodeListing::new(5, "Episode Five")])
        .await;

    // A session persisted mid-organization by a previous process; the engine
    // no longer knows the torrent, so files come from the staging directory.
    let r = fixtures::torrent_ref(9);
    let mut record = DownloadSession::new(
        r.clone(),
        NewSession {
            requested_by: "alice".to_string(),
            save_path: h.staging.join(r.as_str()),
            name: Some(EPISODE.to_string()),
            source: None,
        },
    );
    record.state = SessionState::Organizing;
    record.progress = 1.0;
    h.store.upsert(&record).unwrap();
    fixtures::write_file(&record.save_path, EPISODE, b"restored");

    let manager = h.default_manager().await;
    let done = h.wait_for_state(&manager, &r, SessionState::Done).await;

    let expected = h
        .roots
        .tv
        .join("The Show Name/Season 02/s02e05 - Episode Five.mkv");
    assert_eq!(done.target_path, Some(expected.clone()));
    assert_eq!(read(&expected), b"restored");
}

#[tokio::test]
async fn test_reorganizing_already_moved_file_is_idempotent() {
    let h = TestHarness::new();
    let r = fixtures::torrent_ref(3);
    let save_path = h.staging.join(r.as_str());

    // The previous run moved the file but crashed before recording Done.
    let target = h.roots.movies.join("Great Movie (2021)/Great Movie (2021).mkv");
    fixtures::write_file(target.parent().unwrap(), "Great Movie (2021).mkv", b"movie");
    std::fs::create_dir_all(&save_path).unwrap();

    let mut record = DownloadSession::new(
        r.clone(),
        NewSession {
            requested_by: "alice".to_string(),
            save_path,
            name: Some("Great.Movie.2021.mkv".to_string()),
            source: None,
        },
    );
    record.state = SessionState::Organizing;
    h.store.upsert(&record).unwrap();
    h.client
        .add_mock_torrent(
            fixtures::torrent_info(r.as_str(), "Great.Movie.2021.mkv", 1.0),
            vec![TorrentFile::new("Great.Movie.2021.mkv", 5)],
        )
        .await;

    let manager = h.default_manager().await;
    let done = h.wait_for_state(&manager, &r, SessionState::Done).await;

    assert_eq!(done.target_path, Some(target.clone()));
    assert_eq!(read(&target), b"movie");
}

/// A session persisted mid-organization after its move was recorded: the file
/// is already in the library and the engine no longer knows the torrent.
fn moved_movie_record(h: &TestHarness, r: &TorrentRef) -> (DownloadSession, PathBuf) {
    let save_path = h.staging.join(r.as_str());
    let target = h.roots.movies.join("Great Movie (2021)/Great Movie (2021).mkv");
    fixtures::write_file(target.parent().unwrap(), "Great Movie (2021).mkv", b"movie");
    std::fs::create_dir_all(&save_path).unwrap();

    let mut record = DownloadSession::new(
        r.clone(),
        NewSession {
            requested_by: "alice".to_string(),
            save_path: save_path.clone(),
            name: Some("Great.Movie.2021".to_string()),
            source: None,
        },
    );
    record.state = SessionState::Organizing;
    record.progress = 1.0;
    record.source_path = Some(save_path.join("Great.Movie.2021/Great.Movie.2021.mkv"));
    record.target_path = Some(target.clone());
    (record, target)
}

#[tokio::test]
async fn test_recorded_move_completes_with_empty_staging() {
    let h = TestHarness::new();
    let r = fixtures::torrent_ref(5);
    let (record, target) = moved_movie_record(&h, &r);
    h.store.upsert(&record).unwrap();

    let manager = h.default_manager().await;
    let done = h.wait_for_state(&manager, &r, SessionState::Done).await;

    assert_eq!(done.target_path, Some(target.clone()));
    assert!(done.last_error.is_none());
    assert_eq!(read(&target), b"movie");
    assert_eq!(h.notifier.notifications().await, vec![LibraryKind::Movie]);
}

#[tokio::test]
async fn test_recorded_move_ignores_leftover_staging_files() {
    let h = TestHarness::new();
    let r = fixtures::torrent_ref(6);
    let (record, target) = moved_movie_record(&h, &r);
    fixtures::write_file(&record.save_path, "Great.Movie.2021/sample.mkv", b"sample");
    h.store.upsert(&record).unwrap();

    let manager = h.default_manager().await;
    let done = h.wait_for_state(&manager, &r, SessionState::Done).await;

    assert_eq!(done.target_path, Some(target.clone()));
    assert_eq!(read(&target), b"movie");
    assert_eq!(
        read(&record.save_path.join("Great.Movie.2021/sample.mkv")),
        b"sample"
    );
}

#[tokio::test]
async fn test_organizing_records_the_move_before_placing() {
    let h = TestHarness::new();
    let manager = h.default_manager().await;
    let target = h.roots.movies.join("Great Movie (2021)/Great Movie (2021).mkv");
    fixtures::write_file(target.parent().unwrap(), "Great Movie (2021).mkv", b"other");

    let session = manager
        .submit(SubmitRequest::new(
            fixtures::magnet_source(2, "Great.Movie.2021.mkv"),
            "bob",
        ))
        .await
        .unwrap();
    h.finish_download(&session, "Great.Movie.2021.mkv", b"movie").await;
    h.wait_for_state(&manager, &session.torrent_ref, SessionState::Failed)
        .await;

    let row = &h.store.load_all().unwrap()[0];
    assert_eq!(
        row.source_path,
        Some(session.save_path.join("Great.Movie.2021.mkv"))
    );
    assert_eq!(row.target_path, Some(target));
}

#[tokio::test]
async fn test_restart_re_adds_torrent_the_engine_forgot() {
    let h = TestHarness::new();
    let session = {
        let manager = h.default_manager().await;
        let session = manager
            .submit(SubmitRequest::new(tv_source(1), "alice"))
            .await
            .unwrap();
        manager.shutdown().await;
        session
    };
    let hash = session.torrent_ref.as_str();
    // A fresh engine without its own persistence
    h.client.forget(hash).await;

    let manager = h.default_manager().await;
    assert!(h.client.has_torrent(hash).await);
    let added = h.client.added_torrents().await;
    assert_eq!(added.len(), 2);
    assert_eq!(added[1].request.download_path(), session.save_path.to_str());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        manager.get(&session.torrent_ref).await.unwrap().state,
        SessionState::Downloading
    );

    h.finish_download(&session, EPISODE, b"complete").await;
    h.wait_for_state(&manager, &session.torrent_ref, SessionState::Done)
        .await;
}

#[tokio::test]
async fn test_restored_queued_session_fails_through_downloading() {
    let h = TestHarness::new();
    let r = fixtures::torrent_ref(7);
    let record = DownloadSession::new(
        r.clone(),
        NewSession {
            requested_by: "alice".to_string(),
            save_path: h.staging.join(r.as_str()),
            name: None,
            source: None,
        },
    );
    h.store.upsert(&record).unwrap();
    h.client
        .add_mock_torrent(fixtures::torrent_info(r.as_str(), "Broken", 0.1), Vec::new())
        .await;
    h.client.set_error(r.as_str(), "disk full").await;

    let manager = h.default_manager().await;
    let failed = h.wait_for_state(&manager, &r, SessionState::Failed).await;
    assert_eq!(failed.last_error.as_deref(), Some("disk full"));
}

#[tokio::test]
async fn test_shutdown_pauses_and_restart_resumes() {
    let h = TestHarness::new();
    let session = {
        let manager = h.default_manager().await;
        let session = manager
            .submit(SubmitRequest::new(tv_source(1), "alice"))
            .await
            .unwrap();
        fixtures::write_file(&session.save_path, "partial.mkv", b"half");
        h.client.set_progress(session.torrent_ref.as_str(), 0.4).await;

        manager.shutdown().await;
        session
    };

    let hash = session.torrent_ref.as_str();
    assert!(h.client.is_paused(hash).await);
    assert!(session.save_path.join("partial.mkv").exists());
    let rows = h.store.load_all().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].state, SessionState::Downloading);

    // Next process
    let manager = h.default_manager().await;
    assert!(!h.client.is_paused(hash).await);
    h.finish_download(&session, EPISODE, b"complete").await;
    h.wait_for_state(&manager, &session.torrent_ref, SessionState::Done)
        .await;
}

#[tokio::test]
async fn test_progress_subscription() {
    let h = TestHarness::new();
    let manager = h.default_manager().await;

    let session = manager
        .submit(SubmitRequest::new(tv_source(1), "alice"))
        .await
        .unwrap();
    let mut rx = manager.subscribe(&session.torrent_ref).await.unwrap();
    h.client.set_progress(session.torrent_ref.as_str(), 0.25).await;

    let start = std::time::Instant::now();
    loop {
        tokio::time::timeout(Duration::from_secs(5), rx.changed())
            .await
            .expect("no progress published")
            .unwrap();
        if rx.borrow().progress == 0.25 {
            break;
        }
        assert!(start.elapsed() < Duration::from_secs(5));
    }
    assert_eq!(rx.borrow().state, SessionState::Downloading);
}

#[tokio::test]
async fn test_list_filters_by_requester() {
    let h = TestHarness::new();
    let manager = h.default_manager().await;

    manager
        .submit(SubmitRequest::new(tv_source(1), "alice"))
        .await
        .unwrap();
    manager
        .submit(SubmitRequest::new(tv_source(2), "bob"))
        .await
        .unwrap();

    assert_eq!(manager.list(None).await.len(), 2);
    let alice = manager.list(Some("alice")).await;
    assert_eq!(alice.len(), 1);
    assert_eq!(alice[0].torrent_ref, fixtures::torrent_ref(1));
}
