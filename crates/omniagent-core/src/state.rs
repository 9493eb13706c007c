//! Shared conversation state for one workflow run.

use serde::{Deserialize, Serialize};

use crate::types::{ChatMessage, Role};

/// Label the supervisor uses to end a run.
pub const FINISH: &str = "FINISH";

/// A routing decision: a registered node, or termination.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Node(String),
    Finish,
}

impl Route {
    pub fn node(name: impl Into<String>) -> Self {
        Self::Node(name.into())
    }

    /// The label used for conditional edges.
    pub fn label(&self) -> &str {
        match self {
            Self::Node(name) => name,
            Self::Finish => FINISH,
        }
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Partial update returned by a node.
#[derive(Debug, Clone, Default)]
pub struct StateUpdate {
    pub messages: Vec<ChatMessage>,
    pub next: Option<Route>,
}

impl StateUpdate {
    pub fn message(message: ChatMessage) -> Self {
        Self {
            messages: vec![message],
            next: None,
        }
    }

    pub fn route(next: Route) -> Self {
        Self {
            messages: vec![],
            next: Some(next),
        }
    }
}

/// Append-only message log plus the current routing decision.
///
/// Messages can only be added through [`ConversationState::apply`] and
/// [`ConversationState::push`]; nothing reorders or removes them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationState {
    messages: Vec<ChatMessage>,
    pub next: Option<Route>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a state from prior history.
    pub fn from_history(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            next: None,
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// Merge a node's update: append its messages, replace `next` if set.
    pub fn apply(&mut self, update: StateUpdate) {
        self.messages.extend(update.messages);
        if update.next.is_some() {
            self.next = update.next;
        }
    }

    /// Most recent user message text.
    pub fn last_user_text(&self) -> Option<String> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.text())
    }

    /// Most recent assistant message.
    pub fn last_answer(&self) -> Option<&ChatMessage> {
        self.messages.iter().rev().find(|m| m.role == Role::Assistant)
    }

    /// Messages appended after position `from`.
    pub fn since(&self, from: usize) -> &[ChatMessage] {
        &self.messages[from.min(self.messages.len())..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_appends_in_order() {
        let mut state = ConversationState::from_history(vec![ChatMessage::user("hi")]);
        state.apply(StateUpdate::message(ChatMessage::named("a", "one")));
        state.apply(StateUpdate::message(ChatMessage::named("b", "two")));

        let texts: Vec<String> = state.messages().iter().map(|m| m.text()).collect();
        assert_eq!(texts, vec!["hi", "one", "two"]);
    }

    #[test]
    fn test_apply_keeps_next_when_unset() {
        let mut state = ConversationState::new();
        state.apply(StateUpdate::route(Route::node("market_analysis_agent")));
        state.apply(StateUpdate::message(ChatMessage::named("x", "y")));
        assert_eq!(state.next, Some(Route::node("market_analysis_agent")));
    }

    #[test]
    fn test_since() {
        let mut state = ConversationState::from_history(vec![ChatMessage::user("q")]);
        let mark = state.len();
        state.push(ChatMessage::named("a", "answer"));
        assert_eq!(state.since(mark).len(), 1);
        assert!(state.since(99).is_empty());
    }

    #[test]
    fn test_route_label() {
        assert_eq!(Route::Finish.label(), "FINISH");
        assert_eq!(Route::node("fallback_agent").to_string(), "fallback_agent");
    }
}
