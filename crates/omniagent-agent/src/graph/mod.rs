//! Workflow graph: named nodes joined by conditional edges.
//!
//! The supervisor node has one `OnNext` edge per member plus one for
//! `FINISH`. Members return to the supervisor (iterative mode) or end the
//! run (single mode). The fallback node always ends the run. The graph is
//! built once and shared read-only between concurrent runs.

pub mod edge;
pub mod executor;
pub mod node;

use std::collections::HashMap;

use omniagent_core::error::{OmniError, Result};
use omniagent_core::FINISH;

pub use edge::{Edge, EdgeCondition, END};
pub use executor::{FallbackReason, RunOutcome, RunSettings};
pub use node::{EventSink, Node, NodeContext, NodeExecutor, NodeKind};

/// An immutable, validated workflow graph.
#[derive(Debug)]
pub struct WorkflowGraph {
    nodes: HashMap<String, Node>,
    edges: Vec<Edge>,
    entry: String,
    fallback: String,
    settings: RunSettings,
}

impl WorkflowGraph {
    pub fn builder() -> GraphBuilder {
        GraphBuilder::default()
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.get(name)
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Outgoing edges of `name`, in insertion order.
    pub fn outgoing<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.from == name)
    }
}

/// Collects nodes and edges and checks them before producing a graph.
#[derive(Default)]
pub struct GraphBuilder {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    entry: Option<String>,
    settings: RunSettings,
}

impl GraphBuilder {
    pub fn node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn edge(mut self, edge: Edge) -> Self {
        self.edges.push(edge);
        self
    }

    pub fn entry(mut self, name: impl Into<String>) -> Self {
        self.entry = Some(name.into());
        self
    }

    pub fn settings(mut self, settings: RunSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> Result<WorkflowGraph> {
        let mut nodes = HashMap::new();
        for node in self.nodes {
            if node.name == END || node.name == FINISH {
                return Err(OmniError::Config(format!(
                    "'{}' is a reserved node name",
                    node.name
                )));
            }
            let name = node.name.clone();
            if nodes.insert(name.clone(), node).is_some() {
                return Err(OmniError::Config(format!("duplicate node '{}'", name)));
            }
        }

        let entry = self
            .entry
            .ok_or_else(|| OmniError::Config("workflow graph has no entry node".into()))?;
        if !nodes.contains_key(&entry) {
            return Err(OmniError::UnknownNode(entry));
        }

        let fallbacks: Vec<&String> = nodes
            .values()
            .filter(|n| n.kind == NodeKind::Fallback)
            .map(|n| &n.name)
            .collect();
        let fallback = match fallbacks.as_slice() {
            [one] => (*one).clone(),
            _ => {
                return Err(OmniError::Config(
                    "workflow graph needs exactly one fallback node".into(),
                ))
            }
        };

        for edge in &self.edges {
            if !nodes.contains_key(&edge.from) {
                return Err(OmniError::UnknownNode(edge.from.clone()));
            }
            if edge.to != END && !nodes.contains_key(&edge.to) {
                return Err(OmniError::UnknownNode(edge.to.clone()));
            }
        }

        Ok(WorkflowGraph {
            nodes,
            edges: self.edges,
            entry,
            fallback,
            settings: self.settings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use futures::future::BoxFuture;
    use omniagent_core::{ConversationState, StateUpdate};

    struct Noop;

    impl NodeExecutor for Noop {
        fn run<'a>(
            &'a self,
            _state: &'a ConversationState,
            _ctx: &'a NodeContext,
        ) -> BoxFuture<'a, Result<StateUpdate>> {
            Box::pin(async { Ok(StateUpdate::default()) })
        }
    }

    fn node(name: &str, kind: NodeKind) -> Node {
        Node::new(name, kind, Arc::new(Noop))
    }

    #[test]
    fn test_build_valid_graph() {
        let graph = WorkflowGraph::builder()
            .node(node("supervisor", NodeKind::Supervisor))
            .node(node("a", NodeKind::Member))
            .node(node("fallback_agent", NodeKind::Fallback))
            .edge(Edge::on_next("supervisor", "a", "a"))
            .edge(Edge::on_next("supervisor", FINISH, END))
            .edge(Edge::always("a", "supervisor"))
            .edge(Edge::always("fallback_agent", END))
            .entry("supervisor")
            .build()
            .unwrap();

        assert_eq!(graph.entry(), "supervisor");
        assert_eq!(graph.fallback(), "fallback_agent");
        assert_eq!(graph.outgoing("supervisor").count(), 2);
    }

    #[test]
    fn test_rejects_dangling_edge() {
        let err = WorkflowGraph::builder()
            .node(node("supervisor", NodeKind::Supervisor))
            .node(node("fallback_agent", NodeKind::Fallback))
            .edge(Edge::on_next("supervisor", "ghost", "ghost"))
            .entry("supervisor")
            .build()
            .unwrap_err();
        assert!(matches!(err, OmniError::UnknownNode(n) if n == "ghost"));
    }

    #[test]
    fn test_rejects_reserved_and_duplicate_names() {
        let reserved = WorkflowGraph::builder()
            .node(node(END, NodeKind::Member))
            .entry(END)
            .build();
        assert!(reserved.is_err());

        let duplicate = WorkflowGraph::builder()
            .node(node("a", NodeKind::Member))
            .node(node("a", NodeKind::Member))
            .entry("a")
            .build();
        assert!(duplicate.is_err());
    }

    #[test]
    fn test_requires_single_fallback() {
        let err = WorkflowGraph::builder()
            .node(node("supervisor", NodeKind::Supervisor))
            .entry("supervisor")
            .build()
            .unwrap_err();
        assert!(matches!(err, OmniError::Config(_)));
    }
}
