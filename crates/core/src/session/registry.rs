//! In-memory session registry backed by a durable store.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, info};

use super::{
    DownloadSession, NewSession, ProgressSnapshot, ProgressUpdate, SessionError, SessionState,
    SessionStore, StoreError,
};
use crate::config::SessionsConfig;
use crate::metrics;
use crate::torrent_client::TorrentRef;

/// One active session.
struct SessionEntry {
    /// Immutable copy used for per-user counting without taking the entry lock.
    requested_by: String,
    session: Mutex<DownloadSession>,
    progress: watch::Sender<ProgressSnapshot>,
}

impl SessionEntry {
    fn new(session: DownloadSession) -> Self {
        let (progress, _) = watch::channel(ProgressSnapshot::from(&session));
        Self {
            requested_by: session.requested_by.clone(),
            session: Mutex::new(session),
            progress,
        }
    }
}

/// Owns every session: the active set, the finished set, and their durable record.
///
/// A `TorrentRef` is present in at most one of the two sets. Each active
/// session has its own lock; state changes hold it across the store write,
/// and the map locks are only held for lookups and insertions.
pub struct SessionRegistry {
    store: Arc<dyn SessionStore>,
    active: RwLock<HashMap<TorrentRef, Arc<SessionEntry>>>,
    finished: RwLock<HashMap<TorrentRef, DownloadSession>>,
    keep_history: bool,
    max_active_per_user: usize,
}

impl SessionRegistry {
    /// An empty registry writing to `store`.
    pub fn new(store: Arc<dyn SessionStore>, config: &SessionsConfig) -> Self {
        Self {
            store,
            active: RwLock::new(HashMap::new()),
            finished: RwLock::new(HashMap::new()),
            keep_history: config.keep_history,
            max_active_per_user: config.max_active_per_user,
        }
    }

    /// Build the registry from everything persisted in `store`.
    pub async fn open(
        store: Arc<dyn SessionStore>,
        config: &SessionsConfig,
    ) -> Result<Self, StoreError> {
        let records = store.load_all()?;
        let registry = Self::new(store, config);
        let restored = registry.restore(records).await?;
        info!(
            active = restored.len(),
            finished = registry.finished.read().await.len(),
            "Session registry loaded"
        );
        Ok(registry)
    }

    /// Register a new `Queued` session.
    ///
    /// Fails with `DuplicateTorrent` if the ref is active or finished and not
    /// yet cleared, and with `LimitReached` if the requester is at the
    /// per-user active limit. The existing session is left untouched.
    pub async fn add(
        &self,
        torrent_ref: TorrentRef,
        meta: NewSession,
    ) -> Result<DownloadSession, SessionError> {
        let session = DownloadSession::new(torrent_ref.clone(), meta);
        let entry = Arc::new(SessionEntry::new(session.clone()));
        // Held until persisted so readers of the new entry wait for the write.
        let guard = entry.session.lock().await;

        {
            let mut active = self.active.write().await;
            if active.contains_key(&torrent_ref)
                || self.finished.read().await.contains_key(&torrent_ref)
            {
                return Err(SessionError::DuplicateTorrent(torrent_ref));
            }
            if self.max_active_per_user > 0 {
                let count = active
                    .values()
                    .filter(|e| e.requested_by == session.requested_by)
                    .count();
                if count >= self.max_active_per_user {
                    return Err(SessionError::LimitReached {
                        requested_by: session.requested_by.clone(),
                        limit: self.max_active_per_user,
                    });
                }
            }
            active.insert(torrent_ref.clone(), entry.clone());
        }

        if let Err(e) = self.store.upsert(&guard) {
            drop(guard);
            self.active.write().await.remove(&torrent_ref);
            return Err(e.into());
        }
        drop(guard);

        metrics::ACTIVE_SESSIONS.inc();
        info!(
            torrent_ref = %torrent_ref,
            requested_by = %session.requested_by,
            save_path = %session.save_path.display(),
            "Session added"
        );
        Ok(session)
    }

    /// Current view of a session, active or finished.
    pub async fn get(&self, torrent_ref: &TorrentRef) -> Option<DownloadSession> {
        if let Some(entry) = self.entry(torrent_ref).await {
            return Some(entry.session.lock().await.clone());
        }
        self.finished.read().await.get(torrent_ref).cloned()
    }

    /// Evict a session from either set and delete its durable record.
    pub async fn remove(
        &self,
        torrent_ref: &TorrentRef,
    ) -> Result<Option<DownloadSession>, SessionError> {
        let entry = self.active.write().await.remove(torrent_ref);
        let removed = match entry {
            Some(entry) => {
                metrics::ACTIVE_SESSIONS.dec();
                let session = entry.session.lock().await.clone();
                Some(session)
            }
            None => self.finished.write().await.remove(torrent_ref),
        };

        if removed.is_some() {
            self.store.delete(torrent_ref)?;
            debug!(torrent_ref = %torrent_ref, "Session removed");
        }
        Ok(removed)
    }

    /// Drop a finished session so its ref can be submitted again.
    pub async fn clear(&self, torrent_ref: &TorrentRef) -> Result<DownloadSession, SessionError> {
        if self.active.read().await.contains_key(torrent_ref) {
            return Err(SessionError::NotFinished(torrent_ref.clone()));
        }
        let session = self
            .finished
            .write()
            .await
            .remove(torrent_ref)
            .ok_or_else(|| SessionError::NotFound(torrent_ref.to_string()))?;
        self.store.delete(torrent_ref)?;
        info!(torrent_ref = %torrent_ref, state = %session.state, "Session cleared");
        Ok(session)
    }

    /// Move a session to `to`, recording `last_error` (which replaces any previous one).
    pub async fn transition(
        &self,
        torrent_ref: &TorrentRef,
        to: SessionState,
        last_error: Option<String>,
    ) -> Result<DownloadSession, SessionError> {
        self.apply(torrent_ref, to, |session| session.last_error = last_error)
            .await
    }

    /// Record a successful organization: `Organizing -> Done` with the library path.
    pub async fn complete(
        &self,
        torrent_ref: &TorrentRef,
        target_path: PathBuf,
        warning: Option<String>,
    ) -> Result<DownloadSession, SessionError> {
        self.apply(torrent_ref, SessionState::Done, |session| {
            session.progress = 1.0;
            session.target_path = Some(target_path);
            session.last_error = warning;
        })
        .await
    }

    /// Record where an `Organizing` session's file is about to move.
    ///
    /// Persisted before the move so a restart can tell an interrupted move
    /// from one that already finished.
    pub async fn record_placement(
        &self,
        torrent_ref: &TorrentRef,
        source_path: PathBuf,
        target_path: PathBuf,
    ) -> Result<DownloadSession, SessionError> {
        self.apply(torrent_ref, SessionState::Organizing, |session| {
            session.source_path = Some(source_path);
            session.target_path = Some(target_path);
        })
        .await
    }

    /// Record an engine poll without changing state.
    pub async fn update_progress(
        &self,
        torrent_ref: &TorrentRef,
        update: ProgressUpdate,
    ) -> Result<(), SessionError> {
        let entry = self
            .entry(torrent_ref)
            .await
            .ok_or_else(|| SessionError::NotFound(torrent_ref.to_string()))?;

        let mut session = entry.session.lock().await;
        let mut next = session.clone();
        next.progress = update.progress.clamp(0.0, 1.0);
        if let Some(name) = update.name.filter(|n| !n.is_empty()) {
            next.name = Some(name);
        }

        if next.progress != session.progress || next.name != session.name {
            next.updated_at = Utc::now();
            self.store.upsert(&next)?;
            *session = next;
        }

        let mut snapshot = ProgressSnapshot::from(&*session);
        snapshot.download_speed = update.download_speed;
        snapshot.peers = update.peers;
        entry.progress.send_replace(snapshot);
        Ok(())
    }

    /// Every session, active and finished, oldest first.
    pub async fn list(&self) -> Vec<DownloadSession> {
        let entries: Vec<Arc<SessionEntry>> = self.active.read().await.values().cloned().collect();
        let mut sessions = Vec::with_capacity(entries.len());
        for entry in entries {
            sessions.push(entry.session.lock().await.clone());
        }
        sessions.extend(self.finished.read().await.values().cloned());
        sessions.sort_by(|a, b| {
            a.added_at
                .cmp(&b.added_at)
                .then_with(|| a.torrent_ref.cmp(&b.torrent_ref))
        });
        sessions
    }

    /// Active sessions only.
    pub async fn list_active(&self) -> Vec<DownloadSession> {
        let mut sessions = self.list().await;
        sessions.retain(|s| s.state.is_active());
        sessions
    }

    /// Number of active sessions.
    pub async fn active_count(&self) -> usize {
        self.active.read().await.len()
    }

    /// Watch an active session's progress. `None` once the session has finished.
    pub async fn subscribe(&self, torrent_ref: &TorrentRef) -> Option<watch::Receiver<ProgressSnapshot>> {
        self.entry(torrent_ref)
            .await
            .map(|entry| entry.progress.subscribe())
    }

    /// The registry's durable record: every session it holds.
    pub async fn snapshot(&self) -> Vec<DownloadSession> {
        self.list().await
    }

    /// Rebuild sessions from a durable record.
    ///
    /// Active records become active entries, terminal ones go to the finished
    /// set. Refs already present are skipped. Returns the restored active
    /// sessions so their monitoring can resume.
    pub async fn restore(
        &self,
        records: Vec<DownloadSession>,
    ) -> Result<Vec<DownloadSession>, StoreError> {
        let mut restored = Vec::new();
        for session in records {
            let mut active = self.active.write().await;
            let mut finished = self.finished.write().await;
            if active.contains_key(&session.torrent_ref)
                || finished.contains_key(&session.torrent_ref)
            {
                debug!(torrent_ref = %session.torrent_ref, "Skipping already known session");
                continue;
            }
            drop(finished);
            drop(active);

            self.store.upsert(&session)?;

            if session.state.is_active() {
                self.active.write().await.insert(
                    session.torrent_ref.clone(),
                    Arc::new(SessionEntry::new(session.clone())),
                );
                metrics::ACTIVE_SESSIONS.inc();
                info!(
                    torrent_ref = %session.torrent_ref,
                    state = %session.state,
                    "Session restored"
                );
                restored.push(session);
            } else {
                self.finished
                    .write()
                    .await
                    .insert(session.torrent_ref.clone(), session);
            }
        }
        Ok(restored)
    }

    /// Write every active session to the store.
    pub async fn flush(&self) -> Result<(), StoreError> {
        let entries: Vec<Arc<SessionEntry>> = self.active.read().await.values().cloned().collect();
        for entry in entries {
            let session = entry.session.lock().await;
            self.store.upsert(&session)?;
        }
        Ok(())
    }

    async fn entry(&self, torrent_ref: &TorrentRef) -> Option<Arc<SessionEntry>> {
        self.active.read().await.get(torrent_ref).cloned()
    }

    async fn apply<F>(
        &self,
        torrent_ref: &TorrentRef,
        to: SessionState,
        update: F,
    ) -> Result<DownloadSession, SessionError>
    where
        F: FnOnce(&mut DownloadSession),
    {
        let Some(entry) = self.entry(torrent_ref).await else {
            return Err(match self.finished.read().await.get(torrent_ref) {
                Some(session) => SessionError::InvalidTransition {
                    torrent_ref: torrent_ref.clone(),
                    from: session.state,
                    to,
                },
                None => SessionError::NotFound(torrent_ref.to_string()),
            });
        };

        let mut session = entry.session.lock().await;
        let from = session.state;
        if !from.can_transition_to(to) {
            return Err(SessionError::InvalidTransition {
                torrent_ref: torrent_ref.clone(),
                from,
                to,
            });
        }

        let mut next = session.clone();
        update(&mut next);
        next.state = to;
        next.updated_at = Utc::now();

        let keep = !to.is_terminal() || to == SessionState::Failed || self.keep_history;
        if keep {
            self.store.upsert(&next)?;
        } else {
            self.store.delete(torrent_ref)?;
        }
        *session = next.clone();
        entry.progress.send_replace(ProgressSnapshot::from(&next));
        drop(session);

        if from != to {
            info!(
                torrent_ref = %torrent_ref,
                from = %from,
                to = %to,
                error = next.last_error.as_deref().unwrap_or(""),
                "Session state changed"
            );
        }

        if to.is_terminal() {
            let mut active = self.active.write().await;
            if active.remove(torrent_ref).is_some() {
                metrics::ACTIVE_SESSIONS.dec();
            }
            if keep {
                self.finished
                    .write()
                    .await
                    .insert(torrent_ref.clone(), next.clone());
            }
            metrics::SESSIONS_FINISHED
                .with_label_values(&[to.as_str()])
                .inc();
        }

        Ok(next)
    }
}
