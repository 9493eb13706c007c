use std::sync::Arc;

use omniagent_agent::Orchestrator;
use omniagent_core::config::GatewayConfig;

use crate::protocol::ApiError;

/// The chat engine, or why it could not be built.
pub enum Engine {
    Ready(Arc<Orchestrator>),
    /// Construction failed (typically no model provider). Requests get 503.
    Unavailable(String),
}

/// Shared application state for axum handlers.
pub struct AppState {
    pub config: GatewayConfig,
    pub engine: Engine,
}

impl AppState {
    pub fn new(config: GatewayConfig, engine: Engine) -> Self {
        Self { config, engine }
    }

    pub fn orchestrator(&self) -> Result<&Arc<Orchestrator>, ApiError> {
        match &self.engine {
            Engine::Ready(orchestrator) => Ok(orchestrator),
            Engine::Unavailable(reason) => Err(ApiError::unavailable(reason)),
        }
    }
}
