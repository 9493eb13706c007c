use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;

use omniagent_core::config::GatewayConfig;

use crate::routes;
use crate::state::{AppState, Engine};

/// Build the HTTP router over shared state.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Chat
        .route("/stream_chat", post(routes::stream_chat))
        .route("/stream_chat/", post(routes::stream_chat))
        // REST API
        .route("/api/health", get(routes::health))
        .route("/api/sessions", get(routes::list_sessions))
        .route(
            "/api/sessions/{id}",
            axum::routing::delete(routes::delete_session),
        )
        .route("/api/sessions/{id}/history", get(routes::session_history))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// HTTP + SSE gateway server built on axum.
pub struct GatewayServer {
    state: Arc<AppState>,
}

impl GatewayServer {
    pub fn new(config: GatewayConfig, engine: Engine) -> Self {
        Self {
            state: Arc::new(AppState::new(config, engine)),
        }
    }

    /// Run the gateway server until the cancellation token is triggered.
    pub async fn run(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let app = router(self.state.clone());

        let bind = &self.state.config.bind;
        let listener = TcpListener::bind(bind).await?;
        info!(bind = %bind, "Gateway listening");
        if let Engine::Unavailable(reason) = &self.state.engine {
            tracing::warn!(reason = %reason, "Chat engine unavailable; chat routes will return 503");
        }

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        info!("Gateway shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use omniagent_agent::{Orchestrator, TeamBuilder, MARKET_ANALYSIS_AGENT};
    use omniagent_core::config::ModelConfig;
    use omniagent_core::traits::HistoryStore;
    use omniagent_llm::ChatModel;
    use omniagent_memory::SqliteStore;
    use omniagent_test_utils::{has_member_output, test_config, MockLlm, MockResponse};
    use tower::ServiceExt;

    fn engine() -> Engine {
        let llm = MockLlm::new().with_handler(|messages, tools| {
            if tools.iter().any(|t| t.name == "route") {
                if has_member_output(messages) {
                    MockResponse::route("FINISH")
                } else {
                    MockResponse::route(MARKET_ANALYSIS_AGENT)
                }
            } else {
                MockResponse::text("ETH is trading at $3,000.")
            }
        });
        let config = test_config();
        let model = ChatModel::new(Arc::new(llm), ModelConfig::default());
        let team = TeamBuilder::new(&config, model).build().unwrap();
        let store: Arc<dyn HistoryStore> = Arc::new(SqliteStore::in_memory().unwrap());
        Engine::Ready(Arc::new(Orchestrator::new(team, store, &config.session)))
    }

    fn app(token: Option<&str>, engine: Engine) -> Router {
        let config = GatewayConfig {
            bind: "127.0.0.1:0".to_string(),
            token: token.map(|s| s.to_string()),
        };
        router(Arc::new(AppState::new(config, engine)))
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn chat(body: &str) -> Request<Body> {
        Request::post("/stream_chat/")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = app(None, Engine::Unavailable("no provider".into()))
            .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["engine"], "unavailable");
    }

    #[tokio::test]
    async fn test_stream_chat_emits_events() {
        let response = app(None, engine())
            .oneshot(chat(r#"{"session_id":"s1","user_id":"u1","message":"price of ETH?"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response
            .headers()
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("text/event-stream"));

        let body = body_text(response).await;
        let started = body.find("run_started").unwrap();
        let routed = body.find("routed").unwrap();
        let complete = body.find("run_complete").unwrap();
        assert!(started < routed && routed < complete);
        assert!(body.contains("ETH is trading at $3,000."));
    }

    #[tokio::test]
    async fn test_history_and_delete() {
        let app = app(None, engine());
        let response = app
            .clone()
            .oneshot(chat(r#"{"session_id":"s2","user_id":"u2","message":"price of ETH?"}"#))
            .await
            .unwrap();
        body_text(response).await;

        let response = app
            .clone()
            .oneshot(
                Request::get("/api/sessions/s2/history")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[0]["text"], "price of ETH?");
        assert!(messages
            .iter()
            .any(|m| m["name"] == MARKET_ANALYSIS_AGENT));

        let response = app
            .clone()
            .oneshot(
                Request::get("/api/sessions?user_id=u2")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["sessions"][0]["session_id"], "s2");
        assert_eq!(body["sessions"][0]["title"], "price of ETH?");

        let response = app
            .clone()
            .oneshot(
                Request::delete("/api/sessions/s2")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(
                Request::get("/api/sessions/s2/history")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert!(body["messages"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_engine_returns_503() {
        let response = app(None, Engine::Unavailable("no model provider configured".into()))
            .oneshot(chat(r#"{"message":"hi"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert!(body["error"]
            .as_str()
            .unwrap()
            .starts_with("configuration error:"));
    }

    #[tokio::test]
    async fn test_empty_message_rejected() {
        let response = app(None, engine())
            .oneshot(chat(r#"{"message":"   "}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_token_required() {
        let app = app(Some("secret"), engine());
        let response = app
            .clone()
            .oneshot(Request::get("/api/sessions").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .oneshot(
                Request::get("/api/sessions")
                    .header("authorization", "Bearer secret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
