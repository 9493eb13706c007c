//! Mocks and fixtures shared by the OmniAgent test suites.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use serde_json::{json, Value};

use omniagent_core::config::{AppConfig, ModelConfig};
use omniagent_core::error::{OmniError, Result};
use omniagent_core::traits::{LlmClient, Tool};
use omniagent_core::types::*;

// ── MockLlm ─────────────────────────────────────────────────────

/// One canned model reply.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Plain text answer.
    Text(String),
    /// Optional text plus tool calls as `(name, raw argument text)`.
    ToolCalls {
        text: String,
        calls: Vec<(String, String)>,
    },
    /// The request itself fails.
    Error(String),
    /// The stream yields some text and then a protocol parse error.
    ParseError(String),
}

impl MockResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn tool_calls(calls: Vec<(&str, &str)>) -> Self {
        Self::ToolCalls {
            text: String::new(),
            calls: calls
                .into_iter()
                .map(|(n, a)| (n.to_string(), a.to_string()))
                .collect(),
        }
    }

    pub fn tool_call(name: &str, args: Value) -> Self {
        Self::ToolCalls {
            text: String::new(),
            calls: vec![(name.to_string(), args.to_string())],
        }
    }

    /// A supervisor decision delivered through the `route` function.
    pub fn route(label: &str) -> Self {
        Self::tool_call("route", json!({ "next": label }))
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(message.into())
    }

    pub fn parse_error(partial_text: impl Into<String>) -> Self {
        Self::ParseError(partial_text.into())
    }
}

/// A request the mock received.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<String>,
}

impl RecordedCall {
    /// Whether this call came from the supervisor (it offers `route`).
    pub fn is_routing(&self) -> bool {
        self.tools.iter().any(|t| t == "route")
    }

    pub fn system_prompt(&self) -> String {
        self.messages
            .iter()
            .find(|m| m.role == Role::System)
            .map(|m| m.text())
            .unwrap_or_default()
    }
}

type Handler = Box<dyn Fn(&[ChatMessage], &[ToolDefinition]) -> MockResponse + Send + Sync>;

/// Scripted or handler-driven [`LlmClient`].
///
/// With a handler, every request is answered by calling it. Otherwise
/// replies are popped from the script in order; an empty script is an error.
#[derive(Default)]
pub struct MockLlm {
    script: Mutex<VecDeque<MockResponse>>,
    handler: Option<Handler>,
    calls: Mutex<Vec<RecordedCall>>,
    delay: Option<Duration>,
}

impl MockLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_responses(self, responses: Vec<MockResponse>) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.extend(responses);
        }
        self
    }

    pub fn with_handler(
        mut self,
        handler: impl Fn(&[ChatMessage], &[ToolDefinition]) -> MockResponse + Send + Sync + 'static,
    ) -> Self {
        self.handler = Some(Box::new(handler));
        self
    }

    /// Sleep before answering each request.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn next_response(&self, messages: &[ChatMessage], tools: &[ToolDefinition]) -> MockResponse {
        if let Some(handler) = &self.handler {
            return handler(messages, tools);
        }
        self.script
            .lock()
            .ok()
            .and_then(|mut s| s.pop_front())
            .unwrap_or_else(|| MockResponse::Error("MockLlm: script exhausted".into()))
    }
}

fn text_deltas(text: &str) -> Vec<Result<StreamDelta>> {
    // Split on spaces so consumers see several deltas.
    text.split_inclusive(' ')
        .map(|chunk| Ok(StreamDelta::TextDelta(chunk.to_string())))
        .collect()
}

impl LlmClient for MockLlm {
    fn chat_stream(
        &self,
        _config: &ModelConfig,
        messages: Vec<ChatMessage>,
        tools: &[ToolDefinition],
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
        let tools = tools.to_vec();
        Box::pin(async move {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            let response = self.next_response(&messages, &tools);
            let call_no = {
                let mut calls = self
                    .calls
                    .lock()
                    .map_err(|_| OmniError::LlmRequest("MockLlm: poisoned".into()))?;
                calls.push(RecordedCall {
                    messages,
                    tools: tools.iter().map(|t| t.name.clone()).collect(),
                });
                calls.len()
            };

            let mut deltas = Vec::new();
            match response {
                MockResponse::Text(text) => {
                    deltas.extend(text_deltas(&text));
                    deltas.push(Ok(StreamDelta::Stop(StopReason::EndTurn)));
                }
                MockResponse::ToolCalls { text, calls } => {
                    deltas.extend(text_deltas(&text));
                    for (index, (name, args)) in calls.into_iter().enumerate() {
                        deltas.push(Ok(StreamDelta::ToolUseStart {
                            index,
                            id: format!("call_{}_{}", call_no, index),
                            name,
                        }));
                        deltas.push(Ok(StreamDelta::ToolInputDelta { index, delta: args }));
                    }
                    deltas.push(Ok(StreamDelta::Stop(StopReason::ToolUse)));
                }
                MockResponse::Error(message) => return Err(OmniError::LlmRequest(message)),
                MockResponse::ParseError(partial) => {
                    deltas.extend(text_deltas(&partial));
                    deltas.push(Err(OmniError::LlmParse("malformed tool call chunk".into())));
                }
            }
            deltas.push(Ok(StreamDelta::Usage {
                input_tokens: 10,
                output_tokens: 5,
            }));

            Ok(Box::pin(futures::stream::iter(deltas)) as BoxStream<'_, Result<StreamDelta>>)
        })
    }
}

// ── Tools ───────────────────────────────────────────────────────

/// Returns a fixed response and records every input it receives.
pub struct StaticTool {
    name: String,
    description: String,
    response: String,
    inputs: Arc<Mutex<Vec<Value>>>,
}

impl StaticTool {
    pub fn new(name: &str, response: &str) -> Self {
        Self {
            name: name.to_string(),
            description: format!("Test tool {}", name),
            response: response.to_string(),
            inputs: Arc::default(),
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    /// Shared handle to the recorded inputs; take it before registering.
    pub fn inputs(&self) -> Arc<Mutex<Vec<Value>>> {
        self.inputs.clone()
    }
}

impl Tool for StaticTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    fn execute(&self, input: Value, _ctx: ToolContext) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            if let Ok(mut inputs) = self.inputs.lock() {
                inputs.push(input);
            }
            Ok(ToolResult::success(self.response.clone()))
        })
    }
}

/// Always fails with an upstream error.
pub struct FailingTool {
    name: String,
}

impl FailingTool {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl Tool for FailingTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "A tool whose upstream service is down"
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    fn execute(&self, _input: Value, _ctx: ToolContext) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            Err(OmniError::ToolExecution {
                tool: self.name.clone(),
                message: "HTTP 503: upstream unavailable".into(),
            })
        })
    }
}

/// Sleeps longer than its own timeout.
pub struct SlowTool {
    name: String,
    sleep_secs: u64,
    timeout_secs: u64,
}

impl SlowTool {
    pub fn new(name: &str, sleep_secs: u64, timeout_secs: u64) -> Self {
        Self {
            name: name.to_string(),
            sleep_secs,
            timeout_secs,
        }
    }
}

impl Tool for SlowTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "A tool that takes too long"
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }

    fn execute(&self, _input: Value, _ctx: ToolContext) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_secs(self.sleep_secs)).await;
            Ok(ToolResult::success("finally"))
        })
    }
}

// ── Fixtures ────────────────────────────────────────────────────

/// A config with an OpenAI key and short timeouts, suitable for mocks.
pub fn test_config() -> AppConfig {
    let mut config: AppConfig = toml::from_str(
        r#"
        [model]
        model_id = "gpt-4o"

        [providers]
        openai_api_key = "sk-test"

        [workflow]
        max_iterations = 3
        node_timeout_secs = 5
        supervisor_attempts = 2

        [agent]
        max_turns = 4

        [session]
        cache_capacity = 16
        cache_ttl_secs = 60
        "#,
    )
    .expect("fixture config parses");
    config.database.path = ":memory:".into();
    config
}

pub fn test_context(agent: &str) -> ToolContext {
    ToolContext {
        session_id: SessionId::from("test-session"),
        agent: agent.to_string(),
    }
}

/// Last user text in a request, for handler-based mocks.
pub fn last_user_text(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.text())
        .unwrap_or_default()
}

/// Whether any named member output already exists in the request.
pub fn has_member_output(messages: &[ChatMessage]) -> bool {
    messages
        .iter()
        .any(|m| m.role == Role::Assistant && m.name.is_some())
}
