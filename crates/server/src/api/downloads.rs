//! Download session API handlers.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use base64::Engine;
use serde::{Deserialize, Serialize};
use shelfie_core::{
    DownloadSession, SessionError, SessionState, SubmitRequest, TorrentRef, TorrentSource,
};
use tracing::{info, warn};

use crate::state::AppState;

// ============================================================================
// Request/Response types
// ============================================================================

/// Where the torrent comes from. Exactly one key is expected.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceBody {
    Magnet(String),
    /// HTTP(S) link to a `.torrent` file.
    Url(String),
    /// Standard base64 of the `.torrent` file contents.
    TorrentBase64(String),
}

#[derive(Debug, Deserialize)]
pub struct SubmitDownloadBody {
    pub source: SourceBody,
    pub requested_by: String,
    /// Base directory for the download; the configured staging path otherwise.
    #[serde(default)]
    pub save_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
pub struct ListDownloadsParams {
    #[serde(default)]
    pub requested_by: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DownloadResponse {
    pub torrent_ref: String,
    pub requested_by: String,
    pub state: SessionState,
    pub progress: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub save_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Bytes per second, from the latest engine poll.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_speed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peers: Option<u32>,
    pub added_at: String,
    pub updated_at: String,
}

impl From<DownloadSession> for DownloadResponse {
    fn from(session: DownloadSession) -> Self {
        Self {
            torrent_ref: session.torrent_ref.to_string(),
            requested_by: session.requested_by,
            state: session.state,
            progress: session.progress,
            name: session.name,
            save_path: session.save_path.display().to_string(),
            target_path: session.target_path.map(|p| p.display().to_string()),
            last_error: session.last_error,
            download_speed: None,
            peers: None,
            added_at: session.added_at.to_rfc3339(),
            updated_at: session.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ListDownloadsResponse {
    pub downloads: Vec<DownloadResponse>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

fn session_error(e: SessionError) -> Response {
    let status = match &e {
        SessionError::DuplicateTorrent(_)
        | SessionError::NotFinished(_)
        | SessionError::AlreadyFinished(_)
        | SessionError::InvalidTransition { .. } => StatusCode::CONFLICT,
        SessionError::LimitReached { .. } => StatusCode::TOO_MANY_REQUESTS,
        SessionError::InvalidSource(_) => StatusCode::BAD_REQUEST,
        SessionError::NotFound(_) => StatusCode::NOT_FOUND,
        SessionError::Engine(_) => StatusCode::BAD_GATEWAY,
        SessionError::Store(_) | SessionError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error(status, e.to_string())
}

fn parse_ref(raw: &str) -> Result<TorrentRef, Response> {
    TorrentRef::parse(raw).map_err(|e| error(StatusCode::BAD_REQUEST, e.to_string()))
}

/// Turn the request body's source into raw torrent input.
async fn resolve_source(state: &AppState, source: SourceBody) -> Result<TorrentSource, Response> {
    match source {
        SourceBody::Magnet(uri) => Ok(TorrentSource::Magnet(uri)),
        SourceBody::TorrentBase64(encoded) => base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map(|data| TorrentSource::TorrentFile { data })
            .map_err(|e| error(StatusCode::BAD_REQUEST, format!("Invalid base64: {}", e))),
        SourceBody::Url(url) if url.starts_with("magnet:") => Ok(TorrentSource::Magnet(url)),
        SourceBody::Url(url) => {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(error(
                    StatusCode::BAD_REQUEST,
                    format!("Unsupported URL: {}", url),
                ));
            }
            fetch_torrent(state, &url).await.map_err(|e| {
                warn!(url = %url, error = %e, "Failed to fetch torrent file");
                error(
                    StatusCode::BAD_REQUEST,
                    format!("Failed to fetch torrent file: {}", e),
                )
            })
        }
    }
}

async fn fetch_torrent(state: &AppState, url: &str) -> Result<TorrentSource, reqwest::Error> {
    let data = state
        .http()
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .bytes()
        .await?;
    Ok(TorrentSource::TorrentFile {
        data: data.to_vec(),
    })
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/v1/downloads
pub async fn submit_download(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SubmitDownloadBody>,
) -> Response {
    if body.requested_by.trim().is_empty() {
        return error(StatusCode::BAD_REQUEST, "requested_by must not be empty");
    }

    let source = match resolve_source(&state, body.source).await {
        Ok(source) => source,
        Err(response) => return response,
    };

    let mut request = SubmitRequest::new(source, body.requested_by);
    if let Some(path) = body.save_path {
        request = request.with_save_path(path);
    }

    match state.manager().submit(request).await {
        Ok(session) => {
            info!(
                torrent_ref = %session.torrent_ref,
                requested_by = %session.requested_by,
                "Download submitted via API"
            );
            (StatusCode::CREATED, Json(DownloadResponse::from(session))).into_response()
        }
        Err(e) => session_error(e),
    }
}

/// GET /api/v1/downloads
pub async fn list_downloads(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListDownloadsParams>,
) -> Json<ListDownloadsResponse> {
    let downloads: Vec<DownloadResponse> = state
        .manager()
        .list(params.requested_by.as_deref())
        .await
        .into_iter()
        .map(DownloadResponse::from)
        .collect();

    Json(ListDownloadsResponse {
        total: downloads.len(),
        downloads,
    })
}

/// GET /api/v1/downloads/{torrent_ref}
///
/// Includes live transfer statistics while the session is active.
pub async fn get_download(
    State(state): State<Arc<AppState>>,
    Path(raw): Path<String>,
) -> Response {
    let torrent_ref = match parse_ref(&raw) {
        Ok(r) => r,
        Err(response) => return response,
    };

    let Some(session) = state.manager().get(&torrent_ref).await else {
        return error(
            StatusCode::NOT_FOUND,
            format!("Download not found: {}", torrent_ref),
        );
    };

    let active = session.state.is_active();
    let mut response = DownloadResponse::from(session);
    if active {
        if let Some(rx) = state.manager().subscribe(&torrent_ref).await {
            let snapshot = rx.borrow();
            response.download_speed = Some(snapshot.download_speed);
            response.peers = Some(snapshot.peers);
        }
    }

    Json(response).into_response()
}

/// DELETE /api/v1/downloads/{torrent_ref}
///
/// Cancels an active download and deletes its partial data.
pub async fn cancel_download(
    State(state): State<Arc<AppState>>,
    Path(raw): Path<String>,
) -> Response {
    let torrent_ref = match parse_ref(&raw) {
        Ok(r) => r,
        Err(response) => return response,
    };

    match state.manager().cancel(&torrent_ref).await {
        Ok(session) => Json(DownloadResponse::from(session)).into_response(),
        Err(e) => session_error(e),
    }
}

/// POST /api/v1/downloads/{torrent_ref}/clear
///
/// Forgets a finished download so its torrent can be submitted again.
pub async fn clear_download(
    State(state): State<Arc<AppState>>,
    Path(raw): Path<String>,
) -> Response {
    let torrent_ref = match parse_ref(&raw) {
        Ok(r) => r,
        Err(response) => return response,
    };

    match state.manager().clear(&torrent_ref).await {
        Ok(session) => Json(DownloadResponse::from(session)).into_response(),
        Err(e) => session_error(e),
    }
}
