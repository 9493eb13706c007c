use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique session identifier.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role in a conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }

    /// Parse a stored role name. Unknown names read as `User`.
    pub fn parse(s: &str) -> Self {
        match s {
            "system" => Self::System,
            "assistant" => Self::Assistant,
            "tool" => Self::Tool,
            _ => Self::User,
        }
    }
}

/// A single content block in a message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },

    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: String,
        is_error: bool,
    },
}

/// A chat message in the conversation.
///
/// `name` identifies the producer of an assistant message (the sub-agent
/// that wrote it). Messages appended to a `ConversationState` only ever
/// carry text blocks; tool blocks stay inside a sub-agent's own turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: Vec<ContentBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ChatMessage {
    fn text_message(role: Role, text: impl Into<String>, name: Option<String>) -> Self {
        Self {
            role,
            content: vec![ContentBlock::Text { text: text.into() }],
            name,
            timestamp: Some(Utc::now()),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::text_message(Role::System, text, None)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::text_message(Role::User, text, None)
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self::text_message(Role::Assistant, text, None)
    }

    /// An assistant message attributed to a named producer.
    pub fn named(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::text_message(Role::Assistant, text, Some(name.into()))
    }

    pub fn tool_results(results: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::Tool,
            content: results,
            name: None,
            timestamp: Some(Utc::now()),
        }
    }

    /// Extract all text content from this message.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// Extract all tool use blocks from this message.
    pub fn tool_uses(&self) -> Vec<(&str, &str, &serde_json::Value)> {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolUse { id, name, input } => {
                    Some((id.as_str(), name.as_str(), input))
                }
                _ => None,
            })
            .collect()
    }
}

/// Stop reason from the LLM.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
}

/// A streaming delta from the LLM.
#[derive(Debug, Clone)]
pub enum StreamDelta {
    /// A chunk of text content.
    TextDelta(String),

    /// Start of a tool use block.
    ToolUseStart {
        index: usize,
        id: String,
        name: String,
    },

    /// A chunk of tool use input JSON.
    ToolInputDelta { index: usize, delta: String },

    /// The response is complete.
    Stop(StopReason),

    /// Usage information.
    Usage {
        input_tokens: u64,
        output_tokens: u64,
    },
}

/// A tool call requested by the model, with its raw argument text.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl ToolCall {
    /// Parse the argument text. An empty string means "no arguments".
    pub fn parse_input(&self) -> std::result::Result<serde_json::Value, serde_json::Error> {
        if self.arguments.trim().is_empty() {
            return Ok(serde_json::Value::Object(Default::default()));
        }
        serde_json::from_str(&self.arguments)
    }
}

/// A fully collected model response.
#[derive(Debug, Clone, Default)]
pub struct Completion {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub stop_reason: Option<StopReason>,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Result of a tool execution.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

/// Tool definition for sending to the LLM.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Context passed to tools during execution.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub session_id: SessionId,
    /// Name of the sub-agent invoking the tool.
    pub agent: String,
}

/// A chat session row as listed by the history store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub user_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

/// Progress of a workflow run, streamed to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    RunStarted {
        session_id: SessionId,
    },
    NodeStarted {
        node: String,
    },
    /// The supervisor picked the next node (or `FINISH`).
    Routed {
        to: String,
    },
    TextDelta {
        node: String,
        text: String,
    },
    ToolStart {
        node: String,
        tool: String,
        input: serde_json::Value,
    },
    ToolEnd {
        node: String,
        tool: String,
        content: String,
        is_error: bool,
    },
    /// A message was appended to the conversation state.
    Message {
        message: ChatMessage,
    },
    Fallback {
        reason: String,
    },
    RunComplete {
        session_id: SessionId,
        answer: String,
        iterations: usize,
    },
    RunError {
        error: String,
    },
}

impl RunEvent {
    /// Short event name, used as the SSE `event:` field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => "run_started",
            Self::NodeStarted { .. } => "node_started",
            Self::Routed { .. } => "routed",
            Self::TextDelta { .. } => "text_delta",
            Self::ToolStart { .. } => "tool_start",
            Self::ToolEnd { .. } => "tool_end",
            Self::Message { .. } => "message",
            Self::Fallback { .. } => "fallback",
            Self::RunComplete { .. } => "run_complete",
            Self::RunError { .. } => "run_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_message() {
        let msg = ChatMessage::named("market_analysis_agent", "ETH is $3,000");
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.name.as_deref(), Some("market_analysis_agent"));
        assert_eq!(msg.text(), "ETH is $3,000");
    }

    #[test]
    fn test_tool_call_empty_arguments() {
        let call = ToolCall {
            id: "1".into(),
            name: "block_stat".into(),
            arguments: "  ".into(),
        };
        assert_eq!(call.parse_input().unwrap(), serde_json::json!({}));
    }

    #[test]
    fn test_tool_call_malformed_arguments() {
        let call = ToolCall {
            id: "1".into(),
            name: "price".into(),
            arguments: "{\"symbol\": ".into(),
        };
        assert!(call.parse_input().is_err());
    }

    #[test]
    fn test_run_event_serialization_tag() {
        let ev = RunEvent::Routed {
            to: "market_analysis_agent".into(),
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "routed");
        assert_eq!(json["to"], "market_analysis_agent");
        assert_eq!(ev.kind(), "routed");
    }

    #[test]
    fn test_role_parse() {
        assert_eq!(Role::parse("assistant"), Role::Assistant);
        assert_eq!(Role::parse("tool"), Role::Tool);
        assert_eq!(Role::parse("whatever"), Role::User);
        assert_eq!(Role::Assistant.as_str(), "assistant");
    }
}
