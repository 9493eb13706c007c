//! Collecting a streamed response into a single [`Completion`].

use std::sync::Arc;

use futures::StreamExt;
use tracing::debug;

use omniagent_core::config::ModelConfig;
use omniagent_core::error::{OmniError, Result};
use omniagent_core::traits::LlmClient;
use omniagent_core::types::*;

/// A client bound to one model configuration.
#[derive(Clone)]
pub struct ChatModel {
    client: Arc<dyn LlmClient>,
    config: ModelConfig,
}

impl ChatModel {
    pub fn new(client: Arc<dyn LlmClient>, config: ModelConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn model_id(&self) -> &str {
        &self.config.model_id
    }

    /// Run one model call to completion.
    ///
    /// `on_text` is invoked for every text fragment as it arrives. Tool call
    /// arguments are accumulated per stream index and returned raw; callers
    /// decide what to do with arguments that are not valid JSON.
    pub async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        tools: &[ToolDefinition],
        mut on_text: impl FnMut(&str) + Send,
    ) -> Result<Completion> {
        let mut stream = self
            .client
            .chat_stream(&self.config, messages, tools)
            .await?;

        let mut completion = Completion::default();
        // (stream index, call) in arrival order
        let mut calls: Vec<(usize, ToolCall)> = Vec::new();

        while let Some(delta) = stream.next().await {
            match delta? {
                StreamDelta::TextDelta(text) => {
                    on_text(&text);
                    completion.text.push_str(&text);
                }
                StreamDelta::ToolUseStart { index, id, name } => {
                    calls.push((
                        index,
                        ToolCall {
                            id,
                            name,
                            arguments: String::new(),
                        },
                    ));
                }
                StreamDelta::ToolInputDelta { index, delta } => {
                    match calls.iter_mut().rev().find(|(i, _)| *i == index) {
                        Some((_, call)) => call.arguments.push_str(&delta),
                        None => {
                            return Err(OmniError::LlmParse(format!(
                                "tool arguments for unknown call index {}",
                                index
                            )))
                        }
                    }
                }
                StreamDelta::Stop(reason) => completion.stop_reason = Some(reason),
                StreamDelta::Usage {
                    input_tokens,
                    output_tokens,
                } => {
                    completion.input_tokens += input_tokens;
                    completion.output_tokens += output_tokens;
                }
            }
        }

        completion.tool_calls = calls.into_iter().map(|(_, call)| call).collect();
        if completion.stop_reason.is_none() {
            completion.stop_reason = Some(if completion.tool_calls.is_empty() {
                StopReason::EndTurn
            } else {
                StopReason::ToolUse
            });
        }

        debug!(
            model = %self.config.model_id,
            text_len = completion.text.len(),
            tool_calls = completion.tool_calls.len(),
            input_tokens = completion.input_tokens,
            output_tokens = completion.output_tokens,
            "Completion collected"
        );

        Ok(completion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use omniagent_test_utils::{MockLlm, MockResponse};

    #[tokio::test]
    async fn test_collects_text_and_forwards_deltas() {
        let llm = Arc::new(MockLlm::new().with_responses(vec![MockResponse::text("Hello there")]));
        let model = ChatModel::new(llm, ModelConfig::default());

        let mut seen = String::new();
        let completion = model
            .complete(vec![ChatMessage::user("hi")], &[], |t| seen.push_str(t))
            .await
            .unwrap();

        assert_eq!(completion.text, "Hello there");
        assert_eq!(seen, "Hello there");
        assert!(completion.tool_calls.is_empty());
    }

    #[tokio::test]
    async fn test_collects_tool_calls_in_order() {
        let llm = Arc::new(MockLlm::new().with_responses(vec![MockResponse::tool_calls(vec![
            ("price", r#"{"symbol":"ETH"}"#),
            ("funding_rate", r#"{"symbol":"ETHUSDT"}"#),
        ])]));
        let model = ChatModel::new(llm, ModelConfig::default());

        let completion = model
            .complete(vec![ChatMessage::user("hi")], &[], |_| {})
            .await
            .unwrap();

        let names: Vec<&str> = completion.tool_calls.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["price", "funding_rate"]);
        assert_eq!(
            completion.tool_calls[0].parse_input().unwrap()["symbol"],
            "ETH"
        );
        assert_eq!(completion.stop_reason, Some(StopReason::ToolUse));
    }

    #[tokio::test]
    async fn test_stream_parse_error_propagates() {
        let llm = Arc::new(MockLlm::new().with_responses(vec![MockResponse::parse_error("partial")]));
        let model = ChatModel::new(llm, ModelConfig::default());

        let err = model
            .complete(vec![ChatMessage::user("hi")], &[], |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, OmniError::LlmParse(_)));
    }
}
