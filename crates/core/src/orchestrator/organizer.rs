//! The organization pipeline: classify, resolve, name, place, notify.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::types::{OrganizeError, OrganizeOutcome, PlannedMove};
use crate::content::{classify, video_files, ContentKind};
use crate::metadata::EpisodeResolver;
use crate::metrics;
use crate::naming::{format_target, LibraryRoots};
use crate::notifier::{LibraryKind, LibraryNotifier};
use crate::placer::{FilePlacement, Placer};
use crate::session::DownloadSession;
use crate::torrent_client::TorrentFile;

/// Turns a finished download into a library file.
pub struct Organizer {
    resolver: EpisodeResolver,
    placer: Arc<dyn Placer>,
    notifier: Option<Arc<dyn LibraryNotifier>>,
    roots: LibraryRoots,
}

impl Organizer {
    pub fn new(
        resolver: EpisodeResolver,
        placer: Arc<dyn Placer>,
        notifier: Option<Arc<dyn LibraryNotifier>>,
        roots: LibraryRoots,
    ) -> Self {
        Self {
            resolver,
            placer,
            notifier,
            roots,
        }
    }

    pub fn roots(&self) -> &LibraryRoots {
        &self.roots
    }

    /// Organize the primary file of `session`: [`plan`](Self::plan) then
    /// [`execute`](Self::execute).
    pub async fn organize(
        &self,
        session: &DownloadSession,
        raw_name: &str,
        files: &[TorrentFile],
        interrupt: &CancellationToken,
    ) -> Result<OrganizeOutcome, OrganizeError> {
        let planned = self.plan(session, raw_name, files, interrupt).await?;
        self.execute(session, planned).await
    }

    /// Classify, resolve and name: everything up to the move.
    ///
    /// `files` are relative to `session.save_path`. `interrupt` is checked
    /// between steps.
    pub async fn plan(
        &self,
        session: &DownloadSession,
        raw_name: &str,
        files: &[TorrentFile],
        interrupt: &CancellationToken,
    ) -> Result<PlannedMove, OrganizeError> {
        let started = Instant::now();
        let torrent_ref = &session.torrent_ref;

        let parsed = classify(raw_name, files);
        let primary = parsed.primary_file.clone().ok_or(OrganizeError::NoFiles)?;

        let videos = video_files(files).len();
        if videos > 1 {
            warn!(
                torrent_ref = %torrent_ref,
                videos,
                primary = %primary,
                "Several video files; only the primary one is organized"
            );
        }
        if parsed.kind == ContentKind::Unknown {
            info!(torrent_ref = %torrent_ref, name = %raw_name, "Unclassified content, sending to unsorted");
        }
        checkpoint(interrupt)?;

        let resolved = match (parsed.kind, parsed.season, parsed.episode) {
            (ContentKind::TvEpisode, Some(season), Some(episode)) => {
                let resolved = self.resolver.resolve(&parsed.title, season, episode).await;
                if !resolved.is_resolved() {
                    info!(
                        torrent_ref = %torrent_ref,
                        show = %parsed.title,
                        season,
                        episode,
                        "Episode title unresolved, naming without it"
                    );
                }
                Some(resolved)
            }
            _ => None,
        };
        checkpoint(interrupt)?;

        let target = format_target(&parsed, resolved.as_ref(), &self.roots);
        Ok(PlannedMove {
            kind: parsed.kind,
            placement: FilePlacement::new(session.save_path.join(&primary), target),
            parsed: Some(parsed),
            resolved,
            started,
        })
    }

    /// Rebuild the plan of a move recorded by an earlier run.
    ///
    /// The content kind is recovered from the library root the destination
    /// lies under.
    pub fn replan(&self, placement: FilePlacement) -> PlannedMove {
        PlannedMove {
            kind: self.kind_of(&placement.destination),
            parsed: None,
            resolved: None,
            placement,
            started: Instant::now(),
        }
    }

    /// Place the file and notify the media server. The move always runs to
    /// completion once started.
    pub async fn execute(
        &self,
        session: &DownloadSession,
        planned: PlannedMove,
    ) -> Result<OrganizeOutcome, OrganizeError> {
        let torrent_ref = &session.torrent_ref;
        let placed = self.placer.place(&planned.placement).await?;
        metrics::MOVES
            .with_label_values(&[placed.outcome.as_str()])
            .inc();
        info!(
            torrent_ref = %torrent_ref,
            kind = planned.kind.as_str(),
            destination = %placed.destination.display(),
            outcome = placed.outcome.as_str(),
            "File placed in library"
        );

        let library = match planned.kind {
            ContentKind::Movie => Some(LibraryKind::Movie),
            ContentKind::TvEpisode => Some(LibraryKind::Tv),
            ContentKind::Unknown => None,
        };
        let notified = match (library, self.notifier.as_ref()) {
            (Some(kind), Some(notifier)) => Some(notifier.notify(kind).await),
            _ => None,
        };

        metrics::ORGANIZE_DURATION
            .with_label_values(&[planned.kind.as_str()])
            .observe(planned.started.elapsed().as_secs_f64());

        Ok(OrganizeOutcome {
            kind: planned.kind,
            parsed: planned.parsed,
            resolved: planned.resolved,
            placed,
            notified,
        })
    }

    /// The most specific library root containing `destination`.
    fn kind_of(&self, destination: &Path) -> ContentKind {
        [
            (&self.roots.movies, ContentKind::Movie),
            (&self.roots.tv, ContentKind::TvEpisode),
            (&self.roots.unsorted, ContentKind::Unknown),
        ]
        .into_iter()
        .filter(|(root, _)| destination.starts_with(root))
        .max_by_key(|(root, _)| root.components().count())
        .map(|(_, kind)| kind)
        .unwrap_or(ContentKind::Unknown)
    }
}

fn checkpoint(interrupt: &CancellationToken) -> Result<(), OrganizeError> {
    if interrupt.is_cancelled() {
        Err(OrganizeError::Interrupted)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    use super::*;
    use crate::metadata::{EpisodeListing, ResolutionStatus};
    use crate::notifier::NotifyResult;
    use crate::placer::{FsPlacer, PlaceOutcome, PlacerError};
    use crate::session::NewSession;
    use crate::testing::{fixtures, MockMetadataSource, MockNotifier};

    struct Harness {
        _dir: tempfile::TempDir,
        staging: PathBuf,
        roots: LibraryRoots,
        source: Arc<MockMetadataSource>,
        notifier: Arc<MockNotifier>,
    }

    impl Harness {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let staging = dir.path().join("staging");
            let roots = LibraryRoots {
                movies: dir.path().join("Movies"),
                tv: dir.path().join("TV"),
                unsorted: dir.path().join("Unsorted"),
            };
            Self {
                staging,
                roots,
                _dir: dir,
                source: Arc::new(MockMetadataSource::new()),
                notifier: Arc::new(MockNotifier::new()),
            }
        }

        fn organizer(&self) -> Organizer {
            Organizer::new(
                EpisodeResolver::new(self.source.clone(), Duration::from_millis(200)),
                Arc::new(FsPlacer::with_defaults()),
                Some(self.notifier.clone()),
                self.roots.clone(),
            )
        }

        fn session(&self) -> DownloadSession {
            DownloadSession::new(
                fixtures::torrent_ref(1),
                NewSession {
                    requested_by: "alice".to_string(),
                    save_path: self.staging.clone(),
                    name: None,
                    source: None,
                },
            )
        }

        fn stage(&self, relative: &str, contents: &[u8]) -> TorrentFile {
            fixtures::write_file(&self.staging, relative, contents);
            TorrentFile::new(relative, contents.len() as u64)
        }
    }

    fn exists(path: &Path) -> bool {
        path.exists()
    }

    #[tokio::test]
    async fn test_tv_episode_resolved_and_notified() {
        let h = Harness::new();
        h.source
            .set_season(
                "The Show Name",
                2,
                vec![EpisodeListing::new(5, "Episode Five")],
            )
            .await;
        let name = "The.Show.Name.S02E05.1080p.WEB.mkv";
        let files = vec![h.stage(name, b"episode data")];

        let outcome = h
            .organizer()
            .organize(&h.session(), name, &files, &CancellationToken::new())
            .await
            .unwrap();

        let expected = h
            .roots
            .tv
            .join("The Show Name/Season 02/s02e05 - Episode Five.mkv");
        assert_eq!(outcome.placed.destination, expected);
        assert_eq!(std::fs::read(&expected).unwrap(), b"episode data");
        assert!(!exists(&h.staging.join(name)));
        assert_eq!(
            outcome.resolved.as_ref().map(|r| r.status),
            Some(ResolutionStatus::Resolved)
        );
        assert_eq!(outcome.notified, Some(NotifyResult::Ok));
        assert_eq!(h.notifier.notifications().await, vec![LibraryKind::Tv]);
        assert!(outcome.warning().is_none());
    }

    #[tokio::test]
    async fn test_unresolved_episode_named_without_title() {
        let h = Harness::new();
        h.source.fail_next(10).await;
        let name = "The.Show.Name.S02E05.1080p.WEB.mkv";
        let files = vec![h.stage(name, b"x")];

        let outcome = h
            .organizer()
            .organize(&h.session(), name, &files, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            outcome.placed.destination,
            h.roots.tv.join("The Show Name/Season 02/s02e05.mkv")
        );
    }

    #[tokio::test]
    async fn test_movie_in_folder() {
        let h = Harness::new();
        let files = vec![
            h.stage("Great.Movie.2021.1080p.BluRay/Great.Movie.2021.1080p.BluRay.mkv", b"movie"),
            h.stage("Great.Movie.2021.1080p.BluRay/sample.mkv", b"s"),
            h.stage("Great.Movie.2021.1080p.BluRay/info.nfo", b"nfo"),
        ];

        let outcome = h
            .organizer()
            .organize(
                &h.session(),
                "Great.Movie.2021.1080p.BluRay",
                &files,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(
            outcome.placed.destination,
            h.roots.movies.join("Great Movie (2021)/Great Movie (2021).mkv")
        );
        assert_eq!(h.notifier.notifications().await, vec![LibraryKind::Movie]);
        // Only the primary file moves
        assert!(exists(&h.staging.join("Great.Movie.2021.1080p.BluRay/sample.mkv")));
    }

    #[tokio::test]
    async fn test_unknown_goes_to_unsorted_without_notify() {
        let h = Harness::new();
        let files = vec![h.stage("Holiday Video.avi", b"holiday")];

        let outcome = h
            .organizer()
            .organize(&h.session(), "random stuff", &files, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            outcome.placed.destination,
            h.roots.unsorted.join("Holiday Video.avi")
        );
        assert!(outcome.notified.is_none());
        assert!(h.notifier.notifications().await.is_empty());
    }

    #[tokio::test]
    async fn test_notifier_failure_is_a_warning() {
        let h = Harness::new();
        h.notifier.set_result(NotifyResult::Unreachable).await;
        let name = "Great.Movie.2021.mkv";
        let files = vec![h.stage(name, b"movie")];

        let outcome = h
            .organizer()
            .organize(&h.session(), name, &files, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.notified, Some(NotifyResult::Unreachable));
        assert_eq!(
            outcome.warning().as_deref(),
            Some("media server notification failed: unreachable")
        );
    }

    #[tokio::test]
    async fn test_second_run_is_idempotent() {
        let h = Harness::new();
        let name = "Great.Movie.2021.mkv";
        let files = vec![h.stage(name, b"movie")];
        let organizer = h.organizer();

        let first = organizer
            .organize(&h.session(), name, &files, &CancellationToken::new())
            .await
            .unwrap();
        let second = organizer
            .organize(&h.session(), name, &files, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(first.placed.destination, second.placed.destination);
        assert_eq!(second.placed.outcome, PlaceOutcome::AlreadyPlaced);
        assert_eq!(std::fs::read(&second.placed.destination).unwrap(), b"movie");
    }

    #[tokio::test]
    async fn test_recorded_move_after_completion_is_already_placed() {
        let h = Harness::new();
        let name = "Great.Movie.2021.mkv";
        let files = vec![h.stage(name, b"movie")];
        let organizer = h.organizer();

        let planned = organizer
            .plan(&h.session(), name, &files, &CancellationToken::new())
            .await
            .unwrap();
        let placement = planned.placement.clone();
        organizer.execute(&h.session(), planned).await.unwrap();
        assert!(!exists(&placement.source));

        let replanned = organizer.replan(placement.clone());
        assert_eq!(replanned.kind, ContentKind::Movie);
        let outcome = organizer.execute(&h.session(), replanned).await.unwrap();

        assert_eq!(outcome.placed.outcome, PlaceOutcome::AlreadyPlaced);
        assert_eq!(outcome.placed.destination, placement.destination);
        assert!(outcome.parsed.is_none());
        assert_eq!(
            h.notifier.notifications().await,
            vec![LibraryKind::Movie, LibraryKind::Movie]
        );
    }

    #[test]
    fn test_replan_recovers_kind_from_library_root() {
        let h = Harness::new();
        let organizer = h.organizer();
        let replan = |destination: PathBuf| organizer.replan(FilePlacement::new("/staging/x", destination)).kind;

        assert_eq!(
            replan(h.roots.tv.join("Show/Season 01/s01e01.mkv")),
            ContentKind::TvEpisode
        );
        assert_eq!(
            replan(h.roots.movies.join("Film (2020)/Film (2020).mkv")),
            ContentKind::Movie
        );
        assert_eq!(replan(h.roots.unsorted.join("clip.avi")), ContentKind::Unknown);
        assert_eq!(replan(PathBuf::from("/elsewhere/clip.avi")), ContentKind::Unknown);
    }

    #[tokio::test]
    async fn test_collision_fails_and_keeps_staging() {
        let h = Harness::new();
        let name = "Great.Movie.2021.mkv";
        let files = vec![h.stage(name, b"new movie")];
        let target = h.roots.movies.join("Great Movie (2021)/Great Movie (2021).mkv");
        fixtures::write_file(target.parent().unwrap(), "Great Movie (2021).mkv", b"other");

        let err = h
            .organizer()
            .organize(&h.session(), name, &files, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            OrganizeError::FilesystemMoveFailed(PlacerError::DestinationExists { .. })
        ));
        assert_eq!(std::fs::read(h.staging.join(name)).unwrap(), b"new movie");
        assert_eq!(std::fs::read(&target).unwrap(), b"other");
        assert!(h.notifier.notifications().await.is_empty());
    }

    #[tokio::test]
    async fn test_no_files() {
        let h = Harness::new();
        let err = h
            .organizer()
            .organize(&h.session(), "", &[], &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, OrganizeError::NoFiles));
    }

    #[tokio::test]
    async fn test_interrupted_before_move() {
        let h = Harness::new();
        let name = "Great.Movie.2021.mkv";
        let files = vec![h.stage(name, b"movie")];
        let interrupt = CancellationToken::new();
        interrupt.cancel();

        let err = h
            .organizer()
            .organize(&h.session(), name, &files, &interrupt)
            .await
            .unwrap_err();

        assert!(matches!(err, OrganizeError::Interrupted));
        assert!(exists(&h.staging.join(name)));
    }
}
