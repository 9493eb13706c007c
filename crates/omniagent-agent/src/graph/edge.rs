use serde::{Deserialize, Serialize};

use omniagent_core::Route;

/// Reserved successor name: the run ends.
pub const END: &str = "END";

/// An edge connecting two nodes in the workflow graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// Source node name.
    pub from: String,
    /// Target node name, or [`END`].
    pub to: String,
    /// Condition that must be true to traverse this edge.
    #[serde(default)]
    pub condition: EdgeCondition,
}

/// Condition for traversing an edge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EdgeCondition {
    /// Always traverse this edge.
    #[default]
    Always,
    /// Traverse when the state's routing decision carries this label.
    OnNext { label: String },
}

impl Edge {
    /// Create an unconditional edge.
    pub fn always(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            condition: EdgeCondition::Always,
        }
    }

    /// Create an edge keyed on the routing decision.
    pub fn on_next(
        from: impl Into<String>,
        label: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            condition: EdgeCondition::OnNext {
                label: label.into(),
            },
        }
    }

    pub fn matches(&self, next: Option<&Route>) -> bool {
        match &self.condition {
            EdgeCondition::Always => true,
            EdgeCondition::OnNext { label } => next.is_some_and(|r| r.label() == label),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_builders() {
        let e = Edge::always("a", "b");
        assert_eq!(e.from, "a");
        assert_eq!(e.to, "b");
        assert!(matches!(e.condition, EdgeCondition::Always));

        let e = Edge::on_next("supervisor", "FINISH", END);
        assert_eq!(e.to, "END");
        assert!(matches!(e.condition, EdgeCondition::OnNext { ref label } if label == "FINISH"));
    }

    #[test]
    fn test_matches() {
        let e = Edge::on_next("supervisor", "market_analysis_agent", "market_analysis_agent");
        assert!(e.matches(Some(&Route::node("market_analysis_agent"))));
        assert!(!e.matches(Some(&Route::Finish)));
        assert!(!e.matches(None));

        let finish = Edge::on_next("supervisor", "FINISH", END);
        assert!(finish.matches(Some(&Route::Finish)));

        assert!(Edge::always("a", "b").matches(None));
    }

    #[test]
    fn test_serialization_roundtrip() {
        let edge = Edge::on_next("supervisor", "feed_explorer_agent", "feed_explorer_agent");
        let json = serde_json::to_string(&edge).unwrap();
        assert!(json.contains(r#""type":"on_next""#));
        let parsed: Edge = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, edge);
    }
}
