//! A model plus a fixed tool list, answering from the shared state.

use futures::future::BoxFuture;
use serde_json::Value;
use tracing::{debug, info, warn};

use omniagent_core::config::AgentConfig;
use omniagent_core::error::{OmniError, Result};
use omniagent_core::types::{
    ChatMessage, ContentBlock, Role, RunEvent, ToolCall, ToolContext, ToolResult,
};
use omniagent_core::{ConversationState, StateUpdate};
use omniagent_llm::ChatModel;
use omniagent_tools::ToolRegistry;

use crate::graph::{NodeContext, NodeExecutor};

/// One specialist on the team.
///
/// Each run is a bounded tool-calling loop: the model sees the system
/// prompt and the conversation, may call tools over several turns, and the
/// last text it produces becomes this agent's named message. Protocol
/// problems (bad tool arguments, unknown tools, unparseable streams, empty
/// answers) are turned into text here and never leave the agent.
pub struct SubAgent {
    name: String,
    model: ChatModel,
    tools: ToolRegistry,
    system_prompt: String,
    config: AgentConfig,
}

impl SubAgent {
    pub fn new(
        name: impl Into<String>,
        model: ChatModel,
        tools: ToolRegistry,
        system_prompt: impl Into<String>,
        config: AgentConfig,
    ) -> Self {
        Self {
            name: name.into(),
            model,
            tools,
            system_prompt: system_prompt.into(),
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Produce this agent's answer for the current state.
    pub async fn answer(&self, state: &ConversationState, ctx: &NodeContext) -> Result<String> {
        let definitions = self.tools.definitions();
        let tool_ctx = ToolContext {
            session_id: ctx.session_id.clone(),
            agent: self.name.clone(),
        };

        let mut messages = Vec::with_capacity(state.len() + 1);
        messages.push(ChatMessage::system(&self.system_prompt));
        messages.extend(state.messages().iter().cloned());

        let mut failed_tools: Vec<String> = Vec::new();
        let mut last_text = String::new();

        for turn in 0..self.config.max_turns {
            let mut streamed = String::new();
            let result = {
                let events = &ctx.events;
                let node = &self.name;
                let on_text = |t: &str| {
                    streamed.push_str(t);
                    events.emit(RunEvent::TextDelta {
                        node: node.clone(),
                        text: t.to_string(),
                    });
                };
                tokio::select! {
                    _ = ctx.cancel.cancelled() => return Err(OmniError::Cancelled),
                    r = self.model.complete(messages.clone(), &definitions, on_text) => r,
                }
            };

            let completion = match result {
                Ok(c) => c,
                Err(OmniError::LlmParse(e)) => {
                    warn!(agent = %self.name, turn, error = %e, "Unparseable model output, answering with what arrived");
                    let text = if streamed.trim().is_empty() {
                        last_text
                    } else {
                        streamed
                    };
                    return Ok(finalize(text, &failed_tools));
                }
                Err(e) => return Err(e),
            };

            debug!(
                agent = %self.name,
                turn,
                tool_calls = completion.tool_calls.len(),
                "Agent turn complete"
            );

            if !completion.text.trim().is_empty() {
                last_text = completion.text.clone();
            }
            if completion.tool_calls.is_empty() {
                return Ok(finalize(completion.text, &failed_tools));
            }

            let inputs: Vec<std::result::Result<Value, String>> = completion
                .tool_calls
                .iter()
                .map(|c| {
                    c.parse_input()
                        .map_err(|e| format!("Invalid JSON arguments for {}: {}", c.name, e))
                })
                .collect();

            let mut content = Vec::with_capacity(completion.tool_calls.len() + 1);
            if !completion.text.is_empty() {
                content.push(ContentBlock::Text {
                    text: completion.text.clone(),
                });
            }
            for (call, input) in completion.tool_calls.iter().zip(&inputs) {
                let input = input.as_ref().cloned().unwrap_or_else(|_| Value::Object(Default::default()));
                ctx.events.emit(RunEvent::ToolStart {
                    node: self.name.clone(),
                    tool: call.name.clone(),
                    input: input.clone(),
                });
                content.push(ContentBlock::ToolUse {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    input,
                });
            }
            messages.push(ChatMessage {
                role: Role::Assistant,
                content,
                name: None,
                timestamp: Some(chrono::Utc::now()),
            });

            let results = tokio::select! {
                _ = ctx.cancel.cancelled() => return Err(OmniError::Cancelled),
                r = self.run_tools(&completion.tool_calls, inputs, &tool_ctx) => r?,
            };

            let mut blocks = Vec::with_capacity(results.len());
            for (call, result) in completion.tool_calls.iter().zip(results) {
                // Error details go to the model, not to the caller's stream
                let shown = if result.is_error {
                    TOOL_FAILED.to_string()
                } else {
                    result.content.clone()
                };
                ctx.events.emit(RunEvent::ToolEnd {
                    node: self.name.clone(),
                    tool: call.name.clone(),
                    content: shown,
                    is_error: result.is_error,
                });
                if result.is_error && !failed_tools.contains(&call.name) {
                    failed_tools.push(call.name.clone());
                }
                blocks.push(ContentBlock::ToolResult {
                    tool_use_id: call.id.clone(),
                    content: result.content,
                    is_error: result.is_error,
                });
            }
            messages.push(ChatMessage::tool_results(blocks));
        }

        warn!(agent = %self.name, max_turns = self.config.max_turns, "Turn limit reached");
        Ok(finalize(last_text, &failed_tools))
    }

    /// Run one turn's tool calls. Results come back in request order.
    async fn run_tools(
        &self,
        calls: &[ToolCall],
        inputs: Vec<std::result::Result<Value, String>>,
        ctx: &ToolContext,
    ) -> Result<Vec<ToolResult>> {
        if self.config.parallel_tools && calls.len() > 1 {
            let futs = calls
                .iter()
                .zip(inputs)
                .map(|(call, input)| self.invoke(call, input, ctx));
            futures::future::join_all(futs).await.into_iter().collect()
        } else {
            let mut results = Vec::with_capacity(calls.len());
            for (call, input) in calls.iter().zip(inputs) {
                results.push(self.invoke(call, input, ctx).await?);
            }
            Ok(results)
        }
    }

    async fn invoke(
        &self,
        call: &ToolCall,
        input: std::result::Result<Value, String>,
        ctx: &ToolContext,
    ) -> Result<ToolResult> {
        let input = match input {
            Ok(v) => v,
            Err(message) => {
                warn!(agent = %self.name, tool = %call.name, "Malformed tool arguments");
                return Ok(ToolResult::error(message));
            }
        };
        match self.tools.execute(&call.name, input, ctx.clone()).await {
            Ok(result) => Ok(result),
            Err(e @ OmniError::ToolNotFound(_)) => Ok(ToolResult::error(format!(
                "{}. Available tools: {}",
                e,
                self.tools.list().join(", ")
            ))),
            Err(e) if e.is_tool_failure() => {
                warn!(agent = %self.name, tool = %call.name, error = %e, "Tool failed");
                Ok(ToolResult::error(e.to_string()))
            }
            // Anything else is not the model's to recover from
            Err(e) => Err(e),
        }
    }
}

const TOOL_FAILED: &str = "tool failed";

fn finalize(text: String, failed_tools: &[String]) -> String {
    if !text.trim().is_empty() {
        return text;
    }
    if failed_tools.is_empty() {
        "Sorry, I couldn't put together an answer this time. Could you try rephrasing your question?"
            .to_string()
    } else {
        format!(
            "Sorry, I couldn't fetch that information because {} failed. Please try again in a moment.",
            failed_tools.join(", ")
        )
    }
}

impl NodeExecutor for SubAgent {
    fn run<'a>(
        &'a self,
        state: &'a ConversationState,
        ctx: &'a NodeContext,
    ) -> BoxFuture<'a, Result<StateUpdate>> {
        Box::pin(async move {
            info!(agent = %self.name, "Running agent");
            let text = self.answer(state, ctx).await?;
            Ok(StateUpdate::message(ChatMessage::named(&self.name, text)))
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use omniagent_core::config::ModelConfig;
    use omniagent_core::traits::Tool;
    use omniagent_test_utils::{last_user_text, FailingTool, MockLlm, MockResponse, StaticTool};

    use super::*;
    use crate::graph::EventSink;

    fn agent(llm: Arc<MockLlm>, tools: ToolRegistry) -> SubAgent {
        SubAgent::new(
            "market_analysis_agent",
            ChatModel::new(llm, ModelConfig::default()),
            tools,
            "You are MarketAnalyst.",
            AgentConfig {
                max_turns: 3,
                parallel_tools: true,
            },
        )
    }

    fn ctx() -> NodeContext {
        NodeContext::new("s".into(), CancellationToken::new(), EventSink::discard())
    }

    fn state(q: &str) -> ConversationState {
        ConversationState::from_history(vec![ChatMessage::user(q)])
    }

    #[tokio::test]
    async fn test_answers_without_tools() {
        let llm = Arc::new(MockLlm::new().with_responses(vec![MockResponse::text("gm! 🌞")]));
        let update = agent(llm.clone(), ToolRegistry::new())
            .run(&state("gm"), &ctx())
            .await
            .unwrap();

        let msg = &update.messages[0];
        assert_eq!(msg.name.as_deref(), Some("market_analysis_agent"));
        assert_eq!(msg.text(), "gm! 🌞");
        assert_eq!(llm.calls()[0].system_prompt(), "You are MarketAnalyst.");
    }

    #[tokio::test]
    async fn test_tool_result_is_fed_back() {
        let price = StaticTool::new("price", "ETH: $3,000.00");
        let inputs = price.inputs();
        let mut tools = ToolRegistry::new();
        tools.register(price);

        let llm = Arc::new(MockLlm::new().with_responses(vec![
            MockResponse::tool_call("price", json!({"symbol": "ETH"})),
            MockResponse::text("ETH is trading at $3,000.00 🚀"),
        ]));
        let text = agent(llm.clone(), tools)
            .answer(&state("What is the price of ETH?"), &ctx())
            .await
            .unwrap();

        assert!(text.contains("$3,000.00"));
        assert_eq!(inputs.lock().unwrap()[0], json!({"symbol": "ETH"}));

        let second = &llm.calls()[1];
        let tool_msg = second.messages.last().unwrap();
        assert_eq!(tool_msg.role, Role::Tool);
        assert!(matches!(
            &tool_msg.content[0],
            ContentBlock::ToolResult { content, is_error: false, .. } if content == "ETH: $3,000.00"
        ));
    }

    #[tokio::test]
    async fn test_parallel_results_keep_request_order() {
        let mut tools = ToolRegistry::new();
        tools.register(StaticTool::new("price", "p"));
        tools.register(StaticTool::new("funding_rate", "f"));

        let llm = Arc::new(MockLlm::new().with_responses(vec![
            MockResponse::tool_calls(vec![("funding_rate", "{}"), ("price", "{}")]),
            MockResponse::text("done"),
        ]));
        agent(llm.clone(), tools)
            .answer(&state("q"), &ctx())
            .await
            .unwrap();

        let results: Vec<String> = llm.calls()[1]
            .messages
            .last()
            .unwrap()
            .content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolResult { content, .. } => Some(content.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(results, vec!["f", "p"]);
    }

    #[tokio::test]
    async fn test_bad_arguments_and_unknown_tools_become_error_results() {
        let mut tools = ToolRegistry::new();
        tools.register(StaticTool::new("price", "p"));

        let llm = Arc::new(MockLlm::new().with_responses(vec![
            MockResponse::tool_calls(vec![("price", "{\"symbol\": "), ("teleport", "{}")]),
            MockResponse::text("recovered"),
        ]));
        let text = agent(llm.clone(), tools)
            .answer(&state("q"), &ctx())
            .await
            .unwrap();
        assert_eq!(text, "recovered");

        let errors: Vec<String> = llm.calls()[1]
            .messages
            .last()
            .unwrap()
            .content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolResult {
                    content,
                    is_error: true,
                    ..
                } => Some(content.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].starts_with("Invalid JSON arguments for price"));
        assert!(errors[1].contains("Available tools: price"));
    }

    #[tokio::test]
    async fn test_failed_tool_with_empty_answer_apologizes() {
        let mut tools = ToolRegistry::new();
        tools.register(FailingTool::new("price"));

        let llm = Arc::new(MockLlm::new().with_responses(vec![
            MockResponse::tool_call("price", json!({"symbol": "ETH"})),
            MockResponse::text(""),
        ]));
        let text = agent(llm, tools).answer(&state("q"), &ctx()).await.unwrap();
        assert!(text.starts_with("Sorry"));
        assert!(text.contains("price"));
    }

    #[tokio::test]
    async fn test_tool_error_detail_stays_off_the_event_stream() {
        let mut tools = ToolRegistry::new();
        tools.register(FailingTool::new("price"));
        let llm = Arc::new(MockLlm::new().with_responses(vec![
            MockResponse::tool_call("price", json!({"symbol": "ETH"})),
            MockResponse::text("price feed is down"),
        ]));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ctx = NodeContext::new("s".into(), CancellationToken::new(), EventSink::new(tx));

        agent(llm.clone(), tools).answer(&state("q"), &ctx).await.unwrap();

        let mut ends = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            if let RunEvent::ToolEnd { content, is_error, .. } = ev {
                ends.push((content, is_error));
            }
        }
        assert_eq!(ends, vec![(TOOL_FAILED.to_string(), true)]);

        // The model still sees what went wrong
        let tool_msg = llm.calls()[1].messages.last().unwrap().clone();
        assert!(matches!(
            &tool_msg.content[0],
            ContentBlock::ToolResult { content, is_error: true, .. } if content.contains("HTTP 503")
        ));
    }

    /// Fails with an error that is not a tool failure.
    struct Misconfigured;

    impl Tool for Misconfigured {
        fn name(&self) -> &str {
            "price"
        }

        fn description(&self) -> &str {
            "Broken wiring"
        }

        fn input_schema(&self) -> Value {
            json!({ "type": "object", "properties": {} })
        }

        fn execute(&self, _input: Value, _ctx: ToolContext) -> BoxFuture<'_, Result<ToolResult>> {
            Box::pin(async { Err(OmniError::Config("missing price source".into())) })
        }
    }

    #[tokio::test]
    async fn test_non_tool_error_aborts_the_agent() {
        let mut tools = ToolRegistry::new();
        tools.register(Misconfigured);
        let llm = Arc::new(MockLlm::new().with_responses(vec![
            MockResponse::tool_call("price", json!({"symbol": "ETH"})),
            MockResponse::text("unreachable"),
        ]));

        let err = agent(llm.clone(), tools)
            .answer(&state("q"), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, OmniError::Config(_)));
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test]
    async fn test_replaying_state_repeats_tool_calls() {
        let price = StaticTool::new("price", "ETH: $3,000.00");
        let inputs = price.inputs();
        let mut tools = ToolRegistry::new();
        tools.register(price);

        let llm = Arc::new(MockLlm::new().with_handler(|messages, _| {
            if messages.iter().any(|m| m.role == Role::Tool) {
                return MockResponse::text("ETH is trading at $3,000.00");
            }
            let symbol = if last_user_text(messages).contains("BTC") { "BTC" } else { "ETH" };
            let args = json!({ "symbol": symbol }).to_string();
            MockResponse::tool_calls(vec![("price", args.as_str()), ("price", r#"{"symbol":"USD"}"#)])
        }));
        let agent = agent(llm, tools);
        let original = state("ETH vs BTC?");

        let first = agent.answer(&original.clone(), &ctx()).await.unwrap();
        let second = agent.answer(&original.clone(), &ctx()).await.unwrap();
        assert_eq!(first, second);

        let seen = inputs.lock().unwrap().clone();
        assert_eq!(seen.len(), 4);
        assert_eq!(seen[..2], seen[2..]);
        assert_eq!(seen[0], json!({ "symbol": "BTC" }));
        // Replays do not mutate the caller's state
        assert_eq!(original.len(), 1);
    }

    #[tokio::test]
    async fn test_parse_error_yields_best_effort_text() {
        let llm = Arc::new(
            MockLlm::new().with_responses(vec![MockResponse::parse_error("ETH looks bullish")]),
        );
        let text = agent(llm, ToolRegistry::new())
            .answer(&state("q"), &ctx())
            .await
            .unwrap();
        assert_eq!(text, "ETH looks bullish");
    }

    #[tokio::test]
    async fn test_turn_limit_returns_last_text() {
        let mut tools = ToolRegistry::new();
        tools.register(StaticTool::new("price", "p"));
        let llm = Arc::new(MockLlm::new().with_handler(|_, _| MockResponse::ToolCalls {
            text: "checking".into(),
            calls: vec![("price".into(), "{}".into())],
        }));

        let text = agent(llm.clone(), tools)
            .answer(&state("q"), &ctx())
            .await
            .unwrap();
        assert_eq!(text, "checking");
        assert_eq!(llm.call_count(), 3);
    }

    #[tokio::test]
    async fn test_request_error_propagates() {
        let llm = Arc::new(MockLlm::new().with_responses(vec![MockResponse::error("HTTP 500")]));
        let err = agent(llm, ToolRegistry::new())
            .answer(&state("q"), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, OmniError::LlmRequest(_)));
    }

    #[tokio::test]
    async fn test_emits_tool_and_text_events() {
        let mut tools = ToolRegistry::new();
        tools.register(StaticTool::new("price", "p"));
        let llm = Arc::new(MockLlm::new().with_responses(vec![
            MockResponse::tool_call("price", json!({"symbol": "BTC"})),
            MockResponse::text("BTC up"),
        ]));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ctx = NodeContext::new("s".into(), CancellationToken::new(), EventSink::new(tx));

        agent(llm, tools).answer(&state("q"), &ctx).await.unwrap();

        let mut kinds = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            kinds.push(ev.kind());
        }
        assert_eq!(kinds, vec!["tool_start", "tool_end", "text_delta", "text_delta"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_model_call() {
        let llm = Arc::new(
            MockLlm::new()
                .with_delay(Duration::from_secs(60))
                .with_responses(vec![MockResponse::text("late")]),
        );
        let cancel = CancellationToken::new();
        let ctx = NodeContext::new("s".into(), cancel.clone(), EventSink::discard());
        cancel.cancel();

        let err = agent(llm, ToolRegistry::new())
            .answer(&state("q"), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, OmniError::Cancelled));
    }
}
