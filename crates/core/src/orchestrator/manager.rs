//! Download manager: the caller-facing entry point for sessions.
//!
//! Each active session gets one monitor task. Tasks are cancelled
//! cooperatively through per-session child tokens of the manager's
//! shutdown token.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::config::ManagerConfig;
use super::monitor::SessionMonitor;
use super::organizer::Organizer;
use super::types::SubmitRequest;
use crate::metrics;
use crate::session::{
    DownloadSession, NewSession, ProgressSnapshot, SessionError, SessionRegistry, SessionState,
};
use crate::torrent_client::{TorrentClient, TorrentClientError, TorrentRef};

struct MonitorTask {
    id: u64,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

type TaskMap = Arc<Mutex<HashMap<TorrentRef, MonitorTask>>>;

/// Submits, monitors, cancels and restores download sessions.
pub struct DownloadManager {
    registry: Arc<SessionRegistry>,
    client: Arc<dyn TorrentClient>,
    organizer: Arc<Organizer>,
    config: ManagerConfig,

    // Runtime state
    running: AtomicBool,
    tasks: TaskMap,
    next_task_id: AtomicU64,
    shutdown: CancellationToken,
}

impl DownloadManager {
    pub fn new(
        registry: Arc<SessionRegistry>,
        client: Arc<dyn TorrentClient>,
        organizer: Arc<Organizer>,
        config: ManagerConfig,
    ) -> Self {
        Self {
            registry,
            client,
            organizer,
            config,
            running: AtomicBool::new(false),
            tasks: Arc::new(Mutex::new(HashMap::new())),
            next_task_id: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Resume monitoring of every active session in the registry.
    ///
    /// Transfers paused by a previous shutdown are resumed, and re-added when
    /// the engine no longer knows them. `Organizing` sessions finish a recorded
    /// move or re-run the pipeline from the start.
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Download manager already running");
            return;
        }

        let sessions = self.registry.list_active().await;
        info!(sessions = sessions.len(), "Starting download manager");

        for session in sessions {
            if session.state != SessionState::Organizing {
                self.resume_transfer(&session).await;
            }
            self.spawn_monitor(session.torrent_ref).await;
        }
    }

    /// Resume a paused transfer, handing the torrent to the engine again
    /// from its recorded source when the engine has forgotten it.
    async fn resume_transfer(&self, session: &DownloadSession) {
        let torrent_ref = &session.torrent_ref;
        match self.client.resume_torrent(torrent_ref.as_str()).await {
            Ok(()) => debug!(torrent_ref = %torrent_ref, "Transfer resumed"),
            Err(TorrentClientError::TorrentNotFound(_)) => {
                let Some(source) = &session.source else {
                    warn!(torrent_ref = %torrent_ref, "Engine lost the torrent and no source was recorded");
                    return;
                };
                if let Err(e) = tokio::fs::create_dir_all(&session.save_path).await {
                    warn!(torrent_ref = %torrent_ref, error = %e, "Could not recreate staging directory");
                }
                let request = source.to_request(&session.save_path.to_string_lossy());
                match self.client.add_torrent(request).await {
                    Ok(_) => info!(torrent_ref = %torrent_ref, "Torrent re-added to the engine"),
                    // The monitor fails the session when it cannot find the torrent.
                    Err(e) => warn!(torrent_ref = %torrent_ref, error = %e, "Could not re-add torrent"),
                }
            }
            // The monitor decides what other engine errors mean.
            Err(e) => debug!(torrent_ref = %torrent_ref, error = %e, "Resume failed"),
        }
    }

    /// Register a new download and hand it to the engine.
    pub async fn submit(&self, request: SubmitRequest) -> Result<DownloadSession, SessionError> {
        let result = self.try_submit(request).await;
        let label = match &result {
            Ok(_) => "accepted",
            Err(SessionError::DuplicateTorrent(_)) => "duplicate",
            Err(SessionError::LimitReached { .. }) => "limit_reached",
            Err(SessionError::InvalidSource(_)) => "invalid",
            Err(SessionError::Engine(_)) => "engine_error",
            Err(_) => "error",
        };
        metrics::SUBMISSIONS.with_label_values(&[label]).inc();
        result
    }

    async fn try_submit(&self, request: SubmitRequest) -> Result<DownloadSession, SessionError> {
        let torrent_ref = request
            .source
            .torrent_ref()
            .map_err(|e| SessionError::InvalidSource(e.to_string()))?;

        let base = request
            .save_path
            .unwrap_or_else(|| self.config.staging_path.clone());
        let save_path = base.join(torrent_ref.as_str());

        self.registry
            .add(
                torrent_ref.clone(),
                NewSession {
                    requested_by: request.requested_by,
                    save_path: save_path.clone(),
                    name: request.source.display_name(),
                    source: Some(request.source.clone()),
                },
            )
            .await?;

        if let Err(e) = tokio::fs::create_dir_all(&save_path).await {
            self.registry.remove(&torrent_ref).await?;
            return Err(e.into());
        }

        let engine_request = request.source.to_request(&save_path.to_string_lossy());
        match self.client.add_torrent(engine_request).await {
            Ok(added) => {
                if added.hash != torrent_ref.as_str() {
                    warn!(
                        torrent_ref = %torrent_ref,
                        engine_hash = %added.hash,
                        "Engine reported a different info-hash"
                    );
                }
            }
            Err(e) => {
                error!(torrent_ref = %torrent_ref, error = %e, "Engine rejected torrent");
                self.registry.remove(&torrent_ref).await?;
                let _ = tokio::fs::remove_dir(&save_path).await;
                return Err(e.into());
            }
        }

        let session = self
            .registry
            .transition(&torrent_ref, SessionState::Downloading, None)
            .await?;
        self.spawn_monitor(torrent_ref).await;
        Ok(session)
    }

    pub async fn get(&self, torrent_ref: &TorrentRef) -> Option<DownloadSession> {
        self.registry.get(torrent_ref).await
    }

    /// All sessions, optionally only those of one requester.
    pub async fn list(&self, requested_by: Option<&str>) -> Vec<DownloadSession> {
        let mut sessions = self.registry.list().await;
        if let Some(user) = requested_by {
            sessions.retain(|s| s.requested_by == user);
        }
        sessions
    }

    pub async fn subscribe(
        &self,
        torrent_ref: &TorrentRef,
    ) -> Option<watch::Receiver<ProgressSnapshot>> {
        self.registry.subscribe(torrent_ref).await
    }

    /// Cancel a queued or downloading session and delete its partial data.
    pub async fn cancel(&self, torrent_ref: &TorrentRef) -> Result<DownloadSession, SessionError> {
        let session = self
            .registry
            .get(torrent_ref)
            .await
            .ok_or_else(|| SessionError::NotFound(torrent_ref.to_string()))?;
        check_cancellable(&session)?;

        self.stop_monitor(torrent_ref).await;

        // The monitor may have reached organization before it saw the token.
        let session = self
            .registry
            .get(torrent_ref)
            .await
            .ok_or_else(|| SessionError::NotFound(torrent_ref.to_string()))?;
        if let Err(e) = check_cancellable(&session) {
            if session.state == SessionState::Organizing {
                self.spawn_monitor(torrent_ref.clone()).await;
            }
            return Err(e);
        }

        match self.client.remove_torrent(torrent_ref.as_str(), true).await {
            Ok(()) | Err(TorrentClientError::TorrentNotFound(_)) => {}
            Err(e) => warn!(torrent_ref = %torrent_ref, error = %e, "Engine remove failed"),
        }
        remove_staging(torrent_ref, &session.save_path).await;

        let cancelled = self
            .registry
            .transition(torrent_ref, SessionState::Cancelled, None)
            .await?;
        info!(torrent_ref = %torrent_ref, "Download cancelled");
        Ok(cancelled)
    }

    /// Drop a finished session.
    pub async fn clear(&self, torrent_ref: &TorrentRef) -> Result<DownloadSession, SessionError> {
        self.registry.clear(torrent_ref).await
    }

    /// Stop every monitor, pause transfers, and flush the registry.
    ///
    /// Files and persisted sessions are kept so the next start resumes them.
    pub async fn shutdown(&self) {
        info!("Stopping download manager");
        self.running.store(false, Ordering::SeqCst);
        self.shutdown.cancel();

        let tasks: Vec<(TorrentRef, MonitorTask)> = self.tasks.lock().await.drain().collect();
        let (refs, handles): (Vec<_>, Vec<_>) =
            tasks.into_iter().map(|(r, task)| (r, task.handle)).unzip();
        for (torrent_ref, result) in refs.iter().zip(join_all(handles).await) {
            if let Err(e) = result {
                warn!(torrent_ref = %torrent_ref, error = %e, "Monitor task ended abnormally");
            }
        }

        for session in self.registry.list_active().await {
            if matches!(session.state, SessionState::Queued | SessionState::Downloading) {
                if let Err(e) = self.client.pause_torrent(session.torrent_ref.as_str()).await {
                    warn!(torrent_ref = %session.torrent_ref, error = %e, "Failed to pause transfer");
                }
            }
        }

        if let Err(e) = self.registry.flush().await {
            error!(error = %e, "Failed to flush session registry");
        }
        info!("Download manager stopped");
    }

    async fn spawn_monitor(&self, torrent_ref: TorrentRef) {
        if self.shutdown.is_cancelled() {
            return;
        }

        // Held across spawn + insert so the task's own cleanup runs after the insert.
        let mut tasks = self.tasks.lock().await;
        if tasks.contains_key(&torrent_ref) {
            return;
        }

        let id = self.next_task_id.fetch_add(1, Ordering::Relaxed);
        let cancel = self.shutdown.child_token();
        let monitor = SessionMonitor {
            registry: self.registry.clone(),
            client: self.client.clone(),
            organizer: self.organizer.clone(),
            poll_interval: self.config.poll_interval,
        };
        let task_map = self.tasks.clone();
        let task_ref = torrent_ref.clone();
        let task_cancel = cancel.clone();

        let handle = tokio::spawn(async move {
            monitor.run(task_ref.clone(), task_cancel).await;
            let mut tasks = task_map.lock().await;
            if tasks.get(&task_ref).is_some_and(|t| t.id == id) {
                tasks.remove(&task_ref);
            }
        });

        tasks.insert(torrent_ref, MonitorTask { id, cancel, handle });
    }

    async fn stop_monitor(&self, torrent_ref: &TorrentRef) {
        let task = self.tasks.lock().await.remove(torrent_ref);
        if let Some(task) = task {
            task.cancel.cancel();
            if let Err(e) = task.handle.await {
                warn!(torrent_ref = %torrent_ref, error = %e, "Monitor task ended abnormally");
            }
        }
    }
}

fn check_cancellable(session: &DownloadSession) -> Result<(), SessionError> {
    match session.state {
        SessionState::Queued | SessionState::Downloading => Ok(()),
        state if state.is_terminal() => {
            Err(SessionError::AlreadyFinished(session.torrent_ref.clone()))
        }
        state => Err(SessionError::InvalidTransition {
            torrent_ref: session.torrent_ref.clone(),
            from: state,
            to: SessionState::Cancelled,
        }),
    }
}

async fn remove_staging(torrent_ref: &TorrentRef, save_path: &Path) {
    match tokio::fs::remove_dir_all(save_path).await {
        Ok(()) => debug!(torrent_ref = %torrent_ref, path = %save_path.display(), "Staging removed"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(
            torrent_ref = %torrent_ref,
            path = %save_path.display(),
            error = %e,
            "Failed to remove staging directory"
        ),
    }
}
