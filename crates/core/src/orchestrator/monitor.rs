//! Per-session monitor task.
//!
//! Polls the engine until the transfer completes, then runs the organizer.
//! Exits quietly when its token is cancelled, leaving the session in its
//! current persisted state.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::organizer::Organizer;
use super::types::{OrganizeError, PlannedMove};
use crate::placer::FilePlacement;
use crate::session::{DownloadSession, ProgressUpdate, SessionError, SessionRegistry, SessionState};
use crate::torrent_client::{TorrentClient, TorrentClientError, TorrentFile, TorrentRef, TorrentState};

#[derive(Clone)]
pub(super) struct SessionMonitor {
    pub(super) registry: Arc<SessionRegistry>,
    pub(super) client: Arc<dyn TorrentClient>,
    pub(super) organizer: Arc<Organizer>,
    pub(super) poll_interval: Duration,
}

impl SessionMonitor {
    pub(super) async fn run(self, torrent_ref: TorrentRef, cancel: CancellationToken) {
        let Some(session) = self.registry.get(&torrent_ref).await else {
            return;
        };

        let result = match session.state {
            SessionState::Queued | SessionState::Downloading => {
                self.watch_transfer(&torrent_ref, session.state, &cancel).await
            }
            SessionState::Organizing => self.organize(&torrent_ref, &cancel).await,
            _ => Ok(()),
        };

        if let Err(e) = result {
            error!(torrent_ref = %torrent_ref, error = %e, "Session monitor stopped");
        }
    }

    async fn watch_transfer(
        &self,
        torrent_ref: &TorrentRef,
        mut state: SessionState,
        cancel: &CancellationToken,
    ) -> Result<(), SessionError> {
        let mut erroring = false;

        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }

            match self.client.get_torrent(torrent_ref.as_str()).await {
                Ok(info) if info.state == TorrentState::Error => {
                    let reason = info
                        .error
                        .unwrap_or_else(|| "torrent engine reported an error".to_string());
                    error!(torrent_ref = %torrent_ref, error = %reason, "Transfer failed");
                    return self.fail_transfer(torrent_ref, state, reason).await;
                }
                Ok(info) => {
                    if state == SessionState::Queued || erroring {
                        state = SessionState::Downloading;
                        erroring = false;
                        self.registry.transition(torrent_ref, state, None).await?;
                    }

                    self.registry
                        .update_progress(
                            torrent_ref,
                            ProgressUpdate {
                                progress: info.progress,
                                download_speed: info.download_speed,
                                peers: info.peers,
                                name: Some(info.name.clone()),
                            },
                        )
                        .await?;

                    if info.is_complete() {
                        if cancel.is_cancelled() {
                            return Ok(());
                        }
                        info!(torrent_ref = %torrent_ref, name = %info.name, "Download complete");
                        self.registry
                            .transition(torrent_ref, SessionState::Organizing, None)
                            .await?;
                        return self.organize(torrent_ref, cancel).await;
                    }
                }
                Err(TorrentClientError::TorrentNotFound(_)) => {
                    error!(torrent_ref = %torrent_ref, "Torrent disappeared from the engine");
                    return self
                        .fail_transfer(
                            torrent_ref,
                            state,
                            "torrent is no longer known to the engine".to_string(),
                        )
                        .await;
                }
                Err(e) => {
                    warn!(torrent_ref = %torrent_ref, error = %e, "Engine poll failed");
                    erroring = true;
                    self.registry
                        .transition(torrent_ref, state, Some(e.to_string()))
                        .await?;
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    /// `Failed` is only reachable from `Downloading`; a queued session the
    /// engine reported on passes through it first.
    async fn fail_transfer(
        &self,
        torrent_ref: &TorrentRef,
        state: SessionState,
        reason: String,
    ) -> Result<(), SessionError> {
        if state == SessionState::Queued {
            self.registry
                .transition(torrent_ref, SessionState::Downloading, None)
                .await?;
        }
        self.registry
            .transition(torrent_ref, SessionState::Failed, Some(reason))
            .await?;
        Ok(())
    }

    async fn organize(
        &self,
        torrent_ref: &TorrentRef,
        cancel: &CancellationToken,
    ) -> Result<(), SessionError> {
        let session = self
            .registry
            .get(torrent_ref)
            .await
            .ok_or_else(|| SessionError::NotFound(torrent_ref.to_string()))?;

        let planned = match recorded_move(&session).await {
            Some(placement) => {
                info!(
                    torrent_ref = %torrent_ref,
                    destination = %placement.destination.display(),
                    "Resuming recorded move"
                );
                self.organizer.replan(placement)
            }
            None => match self.plan(&session, cancel).await {
                Ok(planned) => {
                    self.registry
                        .record_placement(
                            torrent_ref,
                            planned.placement.source.clone(),
                            planned.placement.destination.clone(),
                        )
                        .await?;
                    planned
                }
                Err(OrganizeError::Interrupted) => {
                    info!(torrent_ref = %torrent_ref, "Organization interrupted, will resume on restart");
                    return Ok(());
                }
                Err(e) => return self.fail(torrent_ref, e).await,
            },
        };

        match self.organizer.execute(&session, planned).await {
            Ok(outcome) => {
                let warning = outcome.warning();
                self.registry
                    .complete(torrent_ref, outcome.placed.destination.clone(), warning)
                    .await?;
                // The library copy is final; stop seeding but keep any leftover staging files.
                match self.client.remove_torrent(torrent_ref.as_str(), false).await {
                    Ok(()) | Err(TorrentClientError::TorrentNotFound(_)) => {}
                    Err(e) => {
                        warn!(torrent_ref = %torrent_ref, error = %e, "Failed to remove finished torrent")
                    }
                }
                Ok(())
            }
            Err(e) => self.fail(torrent_ref, e).await,
        }
    }

    async fn plan(
        &self,
        session: &DownloadSession,
        cancel: &CancellationToken,
    ) -> Result<PlannedMove, OrganizeError> {
        let files = self
            .files(&session.torrent_ref, &session.save_path, cancel)
            .await?;
        let raw_name = session.name.clone().unwrap_or_default();
        self.organizer
            .plan(session, &raw_name, &files, cancel)
            .await
    }

    async fn fail(&self, torrent_ref: &TorrentRef, e: OrganizeError) -> Result<(), SessionError> {
        error!(torrent_ref = %torrent_ref, error = %e, "Organization failed");
        self.registry
            .transition(torrent_ref, SessionState::Failed, Some(e.to_string()))
            .await?;
        Ok(())
    }

    /// Files of the torrent relative to `save_path`.
    ///
    /// Asks the engine first and falls back to scanning the staging
    /// directory when the engine no longer knows the torrent.
    async fn files(
        &self,
        torrent_ref: &TorrentRef,
        save_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<Vec<TorrentFile>, OrganizeError> {
        loop {
            match self.client.list_files(torrent_ref.as_str()).await {
                Ok(files) if !files.is_empty() => return Ok(files),
                Ok(_) | Err(TorrentClientError::TorrentNotFound(_)) => {
                    debug!(torrent_ref = %torrent_ref, "Listing files from staging directory");
                    return Ok(scan_staging(save_path).await?);
                }
                Err(e) if e.is_transient() => {
                    warn!(torrent_ref = %torrent_ref, error = %e, "Could not list files, retrying");
                }
                Err(e) => return Err(e.into()),
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(OrganizeError::Interrupted),
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }
}

/// The move recorded by an earlier run, if it can still be finished or
/// already was: its source or its target is on disk.
async fn recorded_move(session: &DownloadSession) -> Option<FilePlacement> {
    let (Some(source), Some(target)) = (&session.source_path, &session.target_path) else {
        return None;
    };
    let source_present = tokio::fs::try_exists(source).await.unwrap_or(false);
    let target_present = tokio::fs::try_exists(target).await.unwrap_or(false);
    (source_present || target_present).then(|| FilePlacement::new(source, target))
}

/// Every regular file under `root`, as `/`-separated relative paths.
pub(super) async fn scan_staging(root: &Path) -> std::io::Result<Vec<TorrentFile>> {
    let mut files = Vec::new();
    let mut pending: Vec<PathBuf> = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            let path = entry.path();
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() {
                let Ok(relative) = path.strip_prefix(root) else {
                    continue;
                };
                let relative = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                let size = entry.metadata().await?.len();
                files.push(TorrentFile::new(relative, size));
            }
        }
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;

    #[tokio::test]
    async fn test_scan_staging() {
        let dir = tempfile::tempdir().unwrap();
        fixtures::write_file(dir.path(), "Show.S01E01/episode.mkv", b"video");
        fixtures::write_file(dir.path(), "Show.S01E01/Subs/en.srt", b"sub");
        fixtures::write_file(dir.path(), "readme.txt", b"r");

        let files = scan_staging(dir.path()).await.unwrap();
        let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["Show.S01E01/Subs/en.srt", "Show.S01E01/episode.mkv", "readme.txt"]
        );
        assert_eq!(files[1].size_bytes, 5);
    }

    #[tokio::test]
    async fn test_scan_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(scan_staging(&dir.path().join("nope")).await.is_err());
    }
}
