use std::collections::HashMap;

use futures::future::BoxFuture;
use futures::stream::{BoxStream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;

use omniagent_core::config::ModelConfig;
use omniagent_core::error::{OmniError, Result};
use omniagent_core::traits::LlmClient;
use omniagent_core::types::*;

use crate::streaming::{SseEvent, SseStream};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Google Gemini native API client.
pub struct GeminiClient {
    http: Client,
}

impl GeminiClient {
    pub fn new() -> Self {
        Self {
            http: Client::new(),
        }
    }
}

impl Default for GeminiClient {
    fn default() -> Self {
        Self::new()
    }
}

// ── Request types ────────────────────────────────────────────────

#[derive(Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<GeminiToolDecl>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize, Deserialize, Debug)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(untagged)]
enum GeminiPart {
    Text {
        text: String,
    },
    FunctionCall {
        #[serde(rename = "functionCall")]
        function_call: GeminiFnCall,
    },
    FunctionResponse {
        #[serde(rename = "functionResponse")]
        function_response: GeminiFnResp,
    },
}

#[derive(Serialize, Deserialize, Debug)]
struct GeminiFnCall {
    name: String,
    #[serde(default)]
    args: serde_json::Value,
}

#[derive(Serialize, Deserialize, Debug)]
struct GeminiFnResp {
    name: String,
    response: serde_json::Value,
}

#[derive(Serialize)]
struct GeminiToolDecl {
    function_declarations: Vec<GeminiFnDecl>,
}

#[derive(Serialize)]
struct GeminiFnDecl {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Serialize)]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

// ── Response types ───────────────────────────────────────────────

#[derive(Deserialize, Debug)]
struct GeminiStreamChunk {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default, rename = "usageMetadata")]
    usage_metadata: Option<GeminiUsage>,
}

#[derive(Deserialize, Debug)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    #[serde(default, rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct GeminiUsage {
    #[serde(default, rename = "promptTokenCount")]
    prompt_token_count: u64,
    #[serde(default, rename = "candidatesTokenCount")]
    candidates_token_count: u64,
}

// ── Conversion ───────────────────────────────────────────────────

fn convert_messages(messages: Vec<ChatMessage>) -> (Option<GeminiContent>, Vec<GeminiContent>) {
    let mut system = None;
    let mut contents = Vec::new();
    // functionResponse parts are keyed by function name, not call id
    let mut call_names: HashMap<String, String> = HashMap::new();

    for msg in messages {
        match msg.role {
            Role::System => {
                system = Some(GeminiContent {
                    role: None,
                    parts: vec![GeminiPart::Text { text: msg.text() }],
                });
            }
            Role::User => {
                let text = msg.text();
                if !text.is_empty() {
                    contents.push(GeminiContent {
                        role: Some("user".to_string()),
                        parts: vec![GeminiPart::Text { text }],
                    });
                }
            }
            Role::Assistant => {
                let mut parts = Vec::new();
                for block in &msg.content {
                    match block {
                        ContentBlock::Text { text } if !text.is_empty() => {
                            let text = match &msg.name {
                                Some(name) => format!("[{}] {}", name, text),
                                None => text.clone(),
                            };
                            parts.push(GeminiPart::Text { text });
                        }
                        ContentBlock::ToolUse { id, name, input } => {
                            call_names.insert(id.clone(), name.clone());
                            parts.push(GeminiPart::FunctionCall {
                                function_call: GeminiFnCall {
                                    name: name.clone(),
                                    args: input.clone(),
                                },
                            });
                        }
                        _ => {}
                    }
                }
                if !parts.is_empty() {
                    contents.push(GeminiContent {
                        role: Some("model".to_string()),
                        parts,
                    });
                }
            }
            Role::Tool => {
                let parts: Vec<GeminiPart> = msg
                    .content
                    .iter()
                    .filter_map(|block| match block {
                        ContentBlock::ToolResult {
                            tool_use_id,
                            content,
                            ..
                        } => Some(GeminiPart::FunctionResponse {
                            function_response: GeminiFnResp {
                                name: call_names
                                    .get(tool_use_id)
                                    .cloned()
                                    .unwrap_or_else(|| tool_use_id.clone()),
                                response: serde_json::json!({ "result": content }),
                            },
                        }),
                        _ => None,
                    })
                    .collect();
                if !parts.is_empty() {
                    contents.push(GeminiContent {
                        role: Some("user".to_string()),
                        parts,
                    });
                }
            }
        }
    }

    (system, contents)
}

fn parse_gemini_chunk(event: SseEvent) -> Vec<Result<StreamDelta>> {
    if event.data.trim() == "[DONE]" {
        return vec![];
    }

    let chunk: GeminiStreamChunk = match serde_json::from_str(&event.data) {
        Ok(chunk) => chunk,
        Err(e) => {
            warn!(data = %event.data, error = %e, "Failed to parse Gemini SSE chunk");
            return vec![];
        }
    };

    let mut deltas = Vec::new();

    if let Some(candidate) = chunk.candidates.into_iter().next() {
        if let Some(content) = candidate.content {
            for (i, part) in content.parts.into_iter().enumerate() {
                match part {
                    GeminiPart::Text { text } if !text.is_empty() => {
                        deltas.push(Ok(StreamDelta::TextDelta(text)));
                    }
                    GeminiPart::FunctionCall { function_call } => {
                        // Gemini sends complete calls; emit start + full arguments.
                        deltas.push(Ok(StreamDelta::ToolUseStart {
                            index: i,
                            id: format!("call_{}_{}", i, function_call.name),
                            name: function_call.name,
                        }));
                        deltas.push(Ok(StreamDelta::ToolInputDelta {
                            index: i,
                            delta: function_call.args.to_string(),
                        }));
                    }
                    _ => {}
                }
            }
        }

        if let Some(reason) = candidate.finish_reason {
            let stop = match reason.as_str() {
                "MAX_TOKENS" => StopReason::MaxTokens,
                _ => StopReason::EndTurn,
            };
            deltas.push(Ok(StreamDelta::Stop(stop)));
        }
    }

    if let Some(usage) = chunk.usage_metadata {
        deltas.push(Ok(StreamDelta::Usage {
            input_tokens: usage.prompt_token_count,
            output_tokens: usage.candidates_token_count,
        }));
    }

    deltas
}

impl LlmClient for GeminiClient {
    fn chat_stream(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
        tools: &[ToolDefinition],
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
        let config = config.clone();
        let tools = tools.to_vec();

        Box::pin(async move {
            let api_key = config
                .api_key
                .as_deref()
                .ok_or_else(|| OmniError::Config("Gemini: api_key is required".into()))?;

            let base = config.base_url.as_deref().unwrap_or(GEMINI_API_BASE);
            let url = format!(
                "{}/{}:streamGenerateContent?alt=sse&key={}",
                base.trim_end_matches('/'),
                config.model_id,
                api_key
            );

            let (system_instruction, contents) = convert_messages(messages);

            let gemini_tools = if tools.is_empty() {
                vec![]
            } else {
                vec![GeminiToolDecl {
                    function_declarations: tools
                        .iter()
                        .map(|t| GeminiFnDecl {
                            name: t.name.clone(),
                            description: t.description.clone(),
                            parameters: t.input_schema.clone(),
                        })
                        .collect(),
                }]
            };

            let body = GeminiRequest {
                contents,
                system_instruction,
                tools: gemini_tools,
                generation_config: Some(GenerationConfig {
                    max_output_tokens: Some(config.max_tokens),
                    temperature: if config.temperature > 0.0 {
                        Some(config.temperature)
                    } else {
                        None
                    },
                }),
            };

            let response = self
                .http
                .post(&url)
                .header("content-type", "application/json")
                .json(&body)
                .send()
                .await
                .map_err(|e| OmniError::LlmRequest(e.to_string()))?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "unknown".to_string());
                return Err(OmniError::LlmRequest(format!("HTTP {}: {}", status, body)));
            }

            let sse_stream = SseStream::new(response.bytes_stream());
            let delta_stream = sse_stream
                .map(|event| futures::stream::iter(parse_gemini_chunk(event)))
                .flatten();

            Ok(Box::pin(delta_stream) as BoxStream<'_, Result<StreamDelta>>)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(data: &str) -> SseEvent {
        SseEvent {
            event_type: None,
            data: data.to_string(),
        }
    }

    #[test]
    fn test_function_call_carries_arguments() {
        let deltas = parse_gemini_chunk(event(
            r#"{"candidates":[{"content":{"role":"model","parts":[{"functionCall":{"name":"price","args":{"symbol":"ETH"}}}]},"finishReason":"STOP"}]}"#,
        ));
        assert_eq!(deltas.len(), 3);
        assert!(matches!(&deltas[0], Ok(StreamDelta::ToolUseStart { name, .. }) if name == "price"));
        match &deltas[1] {
            Ok(StreamDelta::ToolInputDelta { delta, .. }) => {
                let v: serde_json::Value = serde_json::from_str(delta).unwrap();
                assert_eq!(v["symbol"], "ETH");
            }
            other => panic!("unexpected delta: {:?}", other),
        }
        assert!(matches!(&deltas[2], Ok(StreamDelta::Stop(StopReason::EndTurn))));
    }

    #[test]
    fn test_text_survives_usage_and_finish_in_same_chunk() {
        let deltas = parse_gemini_chunk(event(
            r#"{"candidates":[{"content":{"parts":[{"text":"Hi"}]},"finishReason":"STOP"}],"usageMetadata":{"promptTokenCount":3,"candidatesTokenCount":1}}"#,
        ));
        assert!(matches!(&deltas[0], Ok(StreamDelta::TextDelta(t)) if t == "Hi"));
        assert_eq!(deltas.len(), 3);
    }

    #[test]
    fn test_function_response_uses_call_name() {
        let call = ChatMessage {
            role: Role::Assistant,
            content: vec![ContentBlock::ToolUse {
                id: "call_0_price".into(),
                name: "price".into(),
                input: serde_json::json!({"symbol": "ETH"}),
            }],
            name: None,
            timestamp: None,
        };
        let result = ChatMessage::tool_results(vec![ContentBlock::ToolResult {
            tool_use_id: "call_0_price".into(),
            content: "3000".into(),
            is_error: false,
        }]);

        let (_, contents) = convert_messages(vec![call, result]);
        assert_eq!(contents.len(), 2);
        match &contents[1].parts[0] {
            GeminiPart::FunctionResponse { function_response } => {
                assert_eq!(function_response.name, "price")
            }
            other => panic!("unexpected part: {:?}", other),
        }
    }
}
