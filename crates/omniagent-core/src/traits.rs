use futures::future::BoxFuture;
use futures::stream::BoxStream;

use crate::config::ModelConfig;
use crate::error::Result;
use crate::types::*;

/// Streaming chat client for one provider.
pub trait LlmClient: Send + Sync + 'static {
    /// Send a chat request and receive a stream of deltas.
    fn chat_stream(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
        tools: &[ToolDefinition],
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>>;
}

/// A named capability a sub-agent can invoke.
pub trait Tool: Send + Sync + 'static {
    /// Tool name (used in LLM tool calls).
    fn name(&self) -> &str;

    /// Human-readable description the model uses to decide applicability.
    fn description(&self) -> &str;

    /// JSON Schema for tool input.
    fn input_schema(&self) -> serde_json::Value;

    /// Execute the tool with given input and context.
    fn execute(
        &self,
        input: serde_json::Value,
        ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>>;

    /// Timeout in seconds for this tool.
    fn timeout_secs(&self) -> u64 {
        30
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}

/// Chat history persistence backend.
pub trait HistoryStore: Send + Sync + 'static {
    /// Record the session row if it does not exist yet.
    fn ensure_session(
        &self,
        sid: &SessionId,
        user_id: &str,
        title: &str,
    ) -> BoxFuture<'_, Result<()>>;

    /// Append one message. Each append is atomic.
    fn append(&self, sid: &SessionId, msg: &ChatMessage) -> BoxFuture<'_, Result<()>>;

    /// Load the most recent `limit` live messages, oldest first.
    fn load(&self, sid: &SessionId, limit: usize) -> BoxFuture<'_, Result<Vec<ChatMessage>>>;

    /// Hide a session and its messages without removing rows.
    fn soft_delete(&self, sid: &SessionId) -> BoxFuture<'_, Result<()>>;

    /// Live sessions for a user, newest first.
    fn list_sessions(
        &self,
        user_id: &str,
        offset: usize,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<SessionSummary>>>;
}
