use axum::http::StatusCode;
use axum::response::sse::Event;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use omniagent_core::types::{ChatMessage, RunEvent};

pub const ANONYMOUS_USER: &str = "anonymous";

/// Body of `POST /stream_chat/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Omit to start a new session.
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct SessionsQuery {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_page")]
    pub limit: usize,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_history")]
    pub limit: usize,
}

fn default_page() -> usize {
    20
}

fn default_history() -> usize {
    50
}

/// Flattened view of a stored message.
#[derive(Debug, Serialize)]
pub struct HistoryEntry {
    pub role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

pub fn history_entry(msg: &ChatMessage) -> HistoryEntry {
    HistoryEntry {
        role: msg.role.as_str(),
        name: msg.name.clone(),
        text: msg.text(),
        timestamp: msg.timestamp.map(|t| t.to_rfc3339()),
    }
}

/// SSE frame for a run event: `event:` is the kind, `data:` the JSON body.
pub fn sse_event(ev: &RunEvent) -> Event {
    let event = Event::default().event(ev.kind());
    match serde_json::to_string(ev) {
        Ok(json) => event.data(json),
        Err(e) => event.data(serde_json::json!({ "error": e.to_string() }).to_string()),
    }
}

/// JSON error response: `{"error": "..."}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized")
    }

    pub fn unavailable(reason: &str) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            format!("configuration error: {}", reason),
        )
    }

    pub fn internal(err: impl std::fmt::Display) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_defaults() {
        let req: ChatRequest = serde_json::from_str(r#"{"message":"price of ETH?"}"#).unwrap();
        assert!(req.session_id.is_none());
        assert!(req.user_id.is_none());
        assert_eq!(req.message, "price of ETH?");
    }

    #[test]
    fn test_history_entry_flattens_text() {
        let entry = history_entry(&ChatMessage::named("feed_explorer_agent", "Top posts"));
        assert_eq!(entry.role, "assistant");
        assert_eq!(entry.name.as_deref(), Some("feed_explorer_agent"));
        assert_eq!(entry.text, "Top posts");
    }
}
