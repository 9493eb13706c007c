//! Closed-set routing: pick the next member or finish.

use futures::future::BoxFuture;
use regex::Regex;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use omniagent_core::error::{OmniError, Result};
use omniagent_core::types::{ChatMessage, ToolDefinition};
use omniagent_core::{ConversationState, Route, StateUpdate, FINISH};
use omniagent_llm::ChatModel;

use crate::graph::{NodeContext, NodeExecutor};
use crate::members::{MemberRegistry, FINISH_SYNONYMS};
use crate::prompts;

/// Name of the function the model calls to report its decision.
pub const ROUTE_TOOL: &str = "route";

struct Label {
    name: String,
    description_len: usize,
    pattern: Regex,
}

/// Model-driven router over the member registry.
///
/// The decision is always a registered member or [`Route::Finish`]. Output
/// that maps to neither is re-prompted, and after the configured number of
/// attempts `decide` fails with `RoutingAmbiguity` rather than guessing.
pub struct Supervisor {
    model: ChatModel,
    labels: Vec<Label>,
    finish: Regex,
    prompt: String,
    attempts: usize,
}

impl Supervisor {
    pub fn new(model: ChatModel, members: &MemberRegistry, attempts: usize) -> Result<Self> {
        let labels = members
            .members()
            .iter()
            .map(|m| {
                let pattern = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(&m.name)))
                    .map_err(|e| OmniError::Config(format!("member '{}': {}", m.name, e)))?;
                Ok(Label {
                    name: m.name.clone(),
                    description_len: m.description.chars().count(),
                    pattern,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let finish = Regex::new(&format!(r"\b(?:{})\b", FINISH_SYNONYMS.join("|")))
            .map_err(|e| OmniError::Config(e.to_string()))?;

        let roster: Vec<(&str, &str)> = members
            .members()
            .iter()
            .map(|m| (m.name.as_str(), m.description.as_str()))
            .collect();

        Ok(Self {
            model,
            labels,
            finish,
            prompt: prompts::supervisor(&roster, FINISH),
            attempts: attempts.max(1),
        })
    }

    /// `FINISH` followed by every member name, in registration order.
    pub fn options(&self) -> Vec<&str> {
        std::iter::once(FINISH)
            .chain(self.labels.iter().map(|l| l.name.as_str()))
            .collect()
    }

    pub fn route_tool(&self) -> ToolDefinition {
        ToolDefinition {
            name: ROUTE_TOOL.to_string(),
            description: "Select the next role.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "next": {
                        "type": "string",
                        "title": "Next",
                        "enum": self.options(),
                    }
                },
                "required": ["next"]
            }),
        }
    }

    /// Map raw model output onto the label set.
    ///
    /// An exact label wins. Otherwise every member mentioned as a whole word
    /// is a candidate and the one with the shortest description wins, with
    /// registration order breaking ties. A finish label only counts when no
    /// member is mentioned.
    pub fn parse_decision(&self, output: &str) -> Option<Route> {
        let trimmed = output
            .trim()
            .trim_matches(|c: char| c == '"' || c == '\'' || c == '`' || c == '.');
        if FINISH_SYNONYMS.iter().any(|s| trimmed.eq_ignore_ascii_case(s)) {
            return Some(Route::Finish);
        }
        if let Some(label) = self.labels.iter().find(|l| l.name.eq_ignore_ascii_case(trimmed)) {
            return Some(Route::node(label.name.clone()));
        }

        let best = self
            .labels
            .iter()
            .enumerate()
            .filter(|(_, l)| l.pattern.is_match(output))
            .min_by_key(|(i, l)| (l.description_len, *i))
            .map(|(_, l)| Route::node(l.name.clone()));
        if best.is_some() {
            return best;
        }

        self.finish.is_match(output).then_some(Route::Finish)
    }

    /// Decide who acts next.
    pub async fn decide(
        &self,
        state: &ConversationState,
        cancel: &CancellationToken,
    ) -> Result<Route> {
        let tools = [self.route_tool()];
        let options = self.options().join(", ");

        let mut messages = Vec::with_capacity(state.len() + 2);
        messages.push(ChatMessage::system(&self.prompt));
        messages.extend(state.messages().iter().cloned());
        messages.push(ChatMessage::user(format!(
            "Given the conversation above, who should act next? Or should we {}? Select one of: {}",
            FINISH, options
        )));

        let mut last_output = String::new();
        for attempt in 1..=self.attempts {
            let result = tokio::select! {
                _ = cancel.cancelled() => return Err(OmniError::Cancelled),
                r = self.model.complete(messages.clone(), &tools, |_| {}) => r,
            };

            let completion = match result {
                Ok(c) => c,
                Err(OmniError::LlmParse(e)) => {
                    warn!(attempt, error = %e, "Supervisor response could not be parsed");
                    last_output = e;
                    continue;
                }
                Err(e) => return Err(e),
            };

            let raw = completion
                .tool_calls
                .iter()
                .find(|c| c.name == ROUTE_TOOL)
                .and_then(|c| c.parse_input().ok())
                .and_then(|v| v.get("next").and_then(|n| n.as_str()).map(str::to_string))
                .unwrap_or(completion.text);

            if let Some(route) = self.parse_decision(&raw) {
                debug!(attempt, route = %route, "Supervisor decided");
                return Ok(route);
            }

            warn!(attempt, output = %raw, "Supervisor output outside the label set");
            messages.push(ChatMessage::assistant_text(raw.clone()));
            messages.push(ChatMessage::user(format!(
                "'{}' is not a valid choice. Reply with exactly one of: {}",
                raw, options
            )));
            last_output = raw;
        }

        Err(OmniError::RoutingAmbiguity {
            output: last_output,
        })
    }
}

impl NodeExecutor for Supervisor {
    fn run<'a>(
        &'a self,
        state: &'a ConversationState,
        ctx: &'a NodeContext,
    ) -> BoxFuture<'a, Result<StateUpdate>> {
        Box::pin(async move {
            let route = self.decide(state, &ctx.cancel).await?;
            Ok(StateUpdate::route(route))
        })
    }
}
