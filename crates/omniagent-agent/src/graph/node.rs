use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use omniagent_core::error::Result;
use omniagent_core::types::{RunEvent, SessionId};
use omniagent_core::{ConversationState, StateUpdate};

/// Role a node plays in the workflow; decides how its failures are recovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Supervisor,
    Member,
    Fallback,
}

/// Where run events go. A sink with no receiver silently drops events.
#[derive(Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<RunEvent>>,
}

impl EventSink {
    pub fn new(tx: mpsc::UnboundedSender<RunEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A sink that discards everything.
    pub fn discard() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: RunEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}

/// Per-run context handed to every node.
#[derive(Clone)]
pub struct NodeContext {
    pub session_id: SessionId,
    pub cancel: CancellationToken,
    pub events: EventSink,
    /// Why the run was diverted to the fallback node, if it was.
    pub fallback_reason: Option<String>,
}

impl NodeContext {
    pub fn new(session_id: SessionId, cancel: CancellationToken, events: EventSink) -> Self {
        Self {
            session_id,
            cancel,
            events,
            fallback_reason: None,
        }
    }
}

/// Executable body of a graph node: read the state, return a partial update.
pub trait NodeExecutor: Send + Sync + 'static {
    fn run<'a>(
        &'a self,
        state: &'a ConversationState,
        ctx: &'a NodeContext,
    ) -> BoxFuture<'a, Result<StateUpdate>>;
}

/// A named node in the workflow graph.
#[derive(Clone)]
pub struct Node {
    pub name: String,
    pub kind: NodeKind,
    pub executor: Arc<dyn NodeExecutor>,
}

impl Node {
    pub fn new(name: impl Into<String>, kind: NodeKind, executor: Arc<dyn NodeExecutor>) -> Self {
        Self {
            name: name.into(),
            kind,
            executor,
        }
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_sink_delivers_and_discards() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(tx);
        sink.emit(RunEvent::NodeStarted {
            node: "supervisor".into(),
        });
        assert!(matches!(rx.recv().await, Some(RunEvent::NodeStarted { node }) if node == "supervisor"));

        drop(rx);
        sink.emit(RunEvent::Routed { to: "x".into() });
        EventSink::discard().emit(RunEvent::Routed { to: "y".into() });
    }
}
