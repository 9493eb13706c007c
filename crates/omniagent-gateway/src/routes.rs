use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::sse::{KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::info;

use omniagent_core::types::SessionId;

use crate::middleware::Authenticated;
use crate::protocol::{
    history_entry, sse_event, ApiError, ChatRequest, HistoryQuery, SessionsQuery, ANONYMOUS_USER,
};
use crate::state::{AppState, Engine};

/// GET /api/health
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let engine = match &state.engine {
        Engine::Ready(_) => "ready",
        Engine::Unavailable(_) => "unavailable",
    };
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "engine": engine,
    }))
}

/// POST /stream_chat/
///
/// Streams the run as server-sent events. A client disconnect drops the
/// stream, which cancels the run.
pub async fn stream_chat(
    _auth: Authenticated,
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<axum::response::sse::Event, Infallible>>>, ApiError> {
    let orchestrator = state.orchestrator()?;
    if req.message.trim().is_empty() {
        return Err(ApiError::bad_request("message must not be empty"));
    }

    let session_id = req
        .session_id
        .filter(|s| !s.is_empty())
        .map(SessionId::from)
        .unwrap_or_default();
    let user_id = req.user_id.unwrap_or_else(|| ANONYMOUS_USER.to_string());
    info!(session = %session_id, user = %user_id, "Chat request");

    let events = orchestrator
        .run(session_id, user_id, req.message, CancellationToken::new())
        .map(|ev| Ok::<_, Infallible>(sse_event(&ev)));

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// GET /api/sessions?user_id=..&offset=..&limit=..
pub async fn list_sessions(
    _auth: Authenticated,
    State(state): State<Arc<AppState>>,
    Query(query): Query<SessionsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let orchestrator = state.orchestrator()?;
    let user_id = query.user_id.as_deref().unwrap_or(ANONYMOUS_USER);
    let sessions = orchestrator
        .list_sessions(user_id, query.offset, query.limit)
        .await
        .map_err(ApiError::internal)?;
    Ok(Json(serde_json::json!({ "sessions": sessions })))
}

/// GET /api/sessions/{id}/history?limit=..
pub async fn session_history(
    _auth: Authenticated,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let orchestrator = state.orchestrator()?;
    let messages = orchestrator
        .history(&SessionId::from(id.as_str()), query.limit)
        .await
        .map_err(ApiError::internal)?;
    let entries: Vec<_> = messages.iter().map(history_entry).collect();
    Ok(Json(serde_json::json!({
        "session_id": id,
        "messages": entries,
    })))
}

/// DELETE /api/sessions/{id}
pub async fn delete_session(
    _auth: Authenticated,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let orchestrator = state.orchestrator()?;
    orchestrator
        .delete_session(&SessionId::from(id.as_str()))
        .await
        .map_err(ApiError::internal)?;
    Ok(Json(serde_json::json!({ "deleted": id })))
}
