pub mod completion;
pub mod providers;
pub mod registry;
pub mod retry;
pub mod streaming;

use std::sync::Arc;

use omniagent_core::config::ModelConfig;
use omniagent_core::traits::LlmClient;

pub use completion::ChatModel;
pub use providers::{GeminiClient, OpenAiClient};
pub use registry::{resolve_model, ProviderRegistry};
pub use retry::RetryingClient;

/// Create an LLM client based on the provider name.
pub fn create_client(config: &ModelConfig) -> Arc<dyn LlmClient> {
    match config.provider_name() {
        "gemini" | "google" => Arc::new(GeminiClient::new()),
        // Everything else speaks the OpenAI chat completions protocol
        _ => Arc::new(OpenAiClient::new()),
    }
}

/// Create a client for `config`, wrapped in [`RetryingClient`] when retry
/// settings or fallback models are present.
pub fn build_client(config: &ModelConfig, fallbacks: &[ModelConfig]) -> Arc<dyn LlmClient> {
    let primary = create_client(config);
    if config.retry.is_none() && fallbacks.is_empty() {
        return primary;
    }

    let fallbacks = fallbacks
        .iter()
        .map(|fb| (fb.clone(), create_client(fb)))
        .collect();
    Arc::new(RetryingClient::new(
        primary,
        fallbacks,
        config.retry.clone().unwrap_or_default(),
    ))
}
