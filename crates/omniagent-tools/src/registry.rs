use std::sync::Arc;

use tracing::debug;

use omniagent_core::error::{OmniError, Result};
use omniagent_core::traits::Tool;
use omniagent_core::types::{ToolContext, ToolDefinition, ToolResult};

/// Ordered set of tools available to one agent.
///
/// Registration order is kept so the definitions sent to the model, and
/// therefore its tool choices, are reproducible.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Register a tool, replacing any earlier tool with the same name in place.
    pub fn register(&mut self, tool: impl Tool) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        match self.tools.iter().position(|t| t.name() == tool.name()) {
            Some(i) => self.tools[i] = tool,
            None => self.tools.push(tool),
        }
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    /// Tool names in registration order.
    pub fn list(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Get tool definitions for sending to the LLM.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition()).collect()
    }

    /// Execute a tool by name, bounded by the tool's own timeout.
    pub async fn execute(
        &self,
        name: &str,
        input: serde_json::Value,
        ctx: ToolContext,
    ) -> Result<ToolResult> {
        let tool = self
            .get(name)
            .ok_or_else(|| OmniError::ToolNotFound(name.to_string()))?;

        let timeout = std::time::Duration::from_secs(tool.timeout_secs());
        let start = std::time::Instant::now();

        let result = match tokio::time::timeout(timeout, tool.execute(input, ctx)).await {
            Ok(result) => result,
            Err(_) => Err(OmniError::ToolTimeout {
                tool: name.to_string(),
                timeout_secs: tool.timeout_secs(),
            }),
        };
        debug!(
            tool = name,
            elapsed_ms = start.elapsed().as_millis() as u64,
            ok = result.is_ok(),
            "Tool finished"
        );
        result
    }
}

impl FromIterator<Arc<dyn Tool>> for ToolRegistry {
    fn from_iter<I: IntoIterator<Item = Arc<dyn Tool>>>(iter: I) -> Self {
        let mut registry = Self::new();
        for tool in iter {
            registry.register_arc(tool);
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use omniagent_core::types::SessionId;
    use omniagent_test_utils::{FailingTool, SlowTool, StaticTool};

    fn ctx() -> ToolContext {
        ToolContext {
            session_id: SessionId::from("s"),
            agent: "test".into(),
        }
    }

    #[test]
    fn test_order_is_registration_order() {
        let mut registry = ToolRegistry::new();
        registry.register(StaticTool::new("zeta", "z"));
        registry.register(StaticTool::new("alpha", "a"));
        registry.register(StaticTool::new("mid", "m"));
        assert_eq!(registry.list(), vec!["zeta", "alpha", "mid"]);

        let defs: Vec<String> = registry.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(defs, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_reregister_replaces_in_place() {
        let mut registry = ToolRegistry::new();
        registry.register(StaticTool::new("a", "one"));
        registry.register(StaticTool::new("b", "two"));
        registry.register(StaticTool::new("a", "three"));
        assert_eq!(registry.list(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_execute_unknown_tool() {
        let registry = ToolRegistry::new();
        let err = registry
            .execute("nope", serde_json::json!({}), ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, OmniError::ToolNotFound(_)));
    }

    #[tokio::test]
    async fn test_execute_propagates_failure() {
        let mut registry = ToolRegistry::new();
        registry.register(FailingTool::new("price"));
        let err = registry
            .execute("price", serde_json::json!({}), ctx())
            .await
            .unwrap_err();
        assert!(err.is_tool_failure());
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_times_out() {
        let mut registry = ToolRegistry::new();
        registry.register(SlowTool::new("slow", 60, 1));
        let err = registry
            .execute("slow", serde_json::json!({}), ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, OmniError::ToolTimeout { timeout_secs: 1, .. }));
    }
}
