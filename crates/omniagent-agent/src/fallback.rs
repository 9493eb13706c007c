//! Terminal catch-all node.

use futures::future::BoxFuture;
use tracing::{info, warn};

use omniagent_core::error::{OmniError, Result};
use omniagent_core::types::ChatMessage;
use omniagent_core::{ConversationState, StateUpdate};
use omniagent_llm::ChatModel;

use crate::graph::{NodeContext, NodeExecutor};
use crate::members::FALLBACK_AGENT;
use crate::prompts;

/// Reply used when no model is available or the model fails.
pub const CLARIFICATION: &str = "Sorry, I'm not quite sure what you're asking. 🤔 Could you \
rephrase it? I can help with token prices and market data, wallet balances, swaps and \
transfers, blockchain stats, project research and wallet activity feeds.";

/// Answers unroutable or unsatisfiable requests with a clarification.
///
/// Its output is never empty and never contains provider error text.
pub struct FallbackAgent {
    model: Option<ChatModel>,
    prompt: String,
}

impl FallbackAgent {
    pub fn new(model: Option<ChatModel>) -> Self {
        Self {
            model,
            prompt: prompts::fallback(),
        }
    }

    pub async fn reply(&self, state: &ConversationState, ctx: &NodeContext) -> Result<String> {
        let Some(model) = &self.model else {
            return Ok(CLARIFICATION.to_string());
        };

        let mut messages = Vec::with_capacity(state.len() + 1);
        messages.push(ChatMessage::system(&self.prompt));
        messages.extend(state.messages().iter().cloned());

        let result = tokio::select! {
            _ = ctx.cancel.cancelled() => return Err(OmniError::Cancelled),
            r = model.complete(messages, &[], |_| {}) => r,
        };
        match result {
            Ok(c) if !c.text.trim().is_empty() => Ok(c.text),
            Ok(_) => Ok(CLARIFICATION.to_string()),
            Err(e) => {
                warn!(error = %e, "Fallback model failed, using canned reply");
                Ok(CLARIFICATION.to_string())
            }
        }
    }
}

impl NodeExecutor for FallbackAgent {
    fn run<'a>(
        &'a self,
        state: &'a ConversationState,
        ctx: &'a NodeContext,
    ) -> BoxFuture<'a, Result<StateUpdate>> {
        Box::pin(async move {
            info!(reason = ctx.fallback_reason.as_deref().unwrap_or("routed"), "Running fallback");
            let text = self.reply(state, ctx).await?;
            Ok(StateUpdate::message(ChatMessage::named(FALLBACK_AGENT, text)))
        })
    }
}
