//! SQLite-backed session store implementation.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection};

use super::{DownloadSession, SessionState, SessionStore, StoreError};
use crate::torrent_client::{TorrentRef, TorrentSource};

const COLUMNS: &str = "torrent_ref, requested_by, save_path, state, progress, added_at, \
                       updated_at, last_error, name, target_path, source_path, \
                       source_magnet, source_torrent";

/// SQLite-backed session store.
pub struct SqliteSessionStore {
    conn: Mutex<Connection>,
}

impl SqliteSessionStore {
    /// Open (or create) the database file and its tables.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite session store (useful for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                torrent_ref TEXT PRIMARY KEY,
                requested_by TEXT NOT NULL,
                save_path TEXT NOT NULL,
                state TEXT NOT NULL,
                progress REAL NOT NULL DEFAULT 0,
                added_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                last_error TEXT,
                name TEXT,
                target_path TEXT,
                source_path TEXT,
                source_magnet TEXT,
                source_torrent BLOB
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_requested_by ON sessions(requested_by);
            CREATE INDEX IF NOT EXISTS idx_sessions_state ON sessions(state);
            "#,
        )?;

        // Databases written before these columns existed; errors mean the column is there.
        for column in ["source_path TEXT", "source_magnet TEXT", "source_torrent BLOB"] {
            let _ = conn.execute(&format!("ALTER TABLE sessions ADD COLUMN {}", column), []);
        }
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("connection lock poisoned".to_string()))
    }

    fn row_to_session(row: &rusqlite::Row) -> rusqlite::Result<DownloadSession> {
        let torrent_ref: String = row.get(0)?;
        let state: String = row.get(3)?;
        let added_at: String = row.get(5)?;
        let updated_at: String = row.get(6)?;
        let target_path: Option<String> = row.get(9)?;
        let source_path: Option<String> = row.get(10)?;
        let source_magnet: Option<String> = row.get(11)?;
        let source_torrent: Option<Vec<u8>> = row.get(12)?;

        let torrent_ref = TorrentRef::parse(&torrent_ref)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))?;
        let state = SessionState::parse(&state).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                3,
                Type::Text,
                format!("unknown session state: {}", state).into(),
            )
        })?;

        Ok(DownloadSession {
            torrent_ref,
            requested_by: row.get(1)?,
            save_path: PathBuf::from(row.get::<_, String>(2)?),
            state,
            progress: row.get(4)?,
            added_at: parse_timestamp(&added_at),
            updated_at: parse_timestamp(&updated_at),
            last_error: row.get(7)?,
            name: row.get(8)?,
            target_path: target_path.map(PathBuf::from),
            source_path: source_path.map(PathBuf::from),
            source: match (source_magnet, source_torrent) {
                (Some(uri), _) => Some(TorrentSource::Magnet(uri)),
                (None, Some(data)) => Some(TorrentSource::TorrentFile { data }),
                (None, None) => None,
            },
        })
    }
}

// Timestamps are only ever written by this store; fall back to now if one is unreadable.
fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

impl SessionStore for SqliteSessionStore {
    fn upsert(&self, session: &DownloadSession) -> Result<(), StoreError> {
        let (source_magnet, source_torrent) = match &session.source {
            Some(TorrentSource::Magnet(uri)) => (Some(uri.as_str()), None),
            Some(TorrentSource::TorrentFile { data }) => (None, Some(data.as_slice())),
            None => (None, None),
        };
        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT INTO sessions ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(torrent_ref) DO UPDATE SET
                    requested_by = excluded.requested_by,
                    save_path = excluded.save_path,
                    state = excluded.state,
                    progress = excluded.progress,
                    updated_at = excluded.updated_at,
                    last_error = excluded.last_error,
                    name = excluded.name,
                    target_path = excluded.target_path,
                    source_path = excluded.source_path,
                    source_magnet = excluded.source_magnet,
                    source_torrent = excluded.source_torrent",
                COLUMNS
            ),
            params![
                session.torrent_ref.as_str(),
                session.requested_by,
                session.save_path.to_string_lossy(),
                session.state.as_str(),
                session.progress,
                session.added_at.to_rfc3339(),
                session.updated_at.to_rfc3339(),
                session.last_error,
                session.name,
                session
                    .target_path
                    .as_ref()
                    .map(|p| p.to_string_lossy().into_owned()),
                session
                    .source_path
                    .as_ref()
                    .map(|p| p.to_string_lossy().into_owned()),
                source_magnet,
                source_torrent,
            ],
        )?;
        Ok(())
    }

    fn delete(&self, torrent_ref: &TorrentRef) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM sessions WHERE torrent_ref = ?",
            params![torrent_ref.as_str()],
        )?;
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<DownloadSession>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM sessions ORDER BY added_at ASC",
            COLUMNS
        ))?;
        let sessions = stmt
            .query_map([], Self::row_to_session)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sessions)
    }
}
