//! The static roster of routable team members.

use std::sync::Arc;

use omniagent_core::error::{OmniError, Result};
use omniagent_core::FINISH;

use crate::graph::NodeExecutor;

pub const SUPERVISOR: &str = "supervisor";

/// Routing replies that end the run. No member may answer to these.
pub(crate) const FINISH_SYNONYMS: &[&str] = &[FINISH, "TERMINATE", "END"];

pub const FALLBACK_AGENT: &str = "fallback_agent";

pub const MARKET_ANALYSIS_AGENT: &str = "market_analysis_agent";
pub const ASSET_MANAGEMENT_AGENT: &str = "asset_management_agent";
pub const BLOCK_EXPLORER_AGENT: &str = "block_explorer_agent";
pub const RESEARCH_ANALYST_AGENT: &str = "research_analyst_agent";
pub const FEED_EXPLORER_AGENT: &str = "feed_explorer_agent";

/// A routable node with the description the supervisor sees.
#[derive(Clone)]
pub struct Member {
    pub name: String,
    pub description: String,
    pub executor: Arc<dyn NodeExecutor>,
}

impl std::fmt::Debug for Member {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Member")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish()
    }
}

/// Name-to-member mapping in registration order.
///
/// Built once at startup and read-only afterwards. Registration order is
/// the final tie-break when the supervisor's output names several members.
#[derive(Debug, Clone, Default)]
pub struct MemberRegistry {
    members: Vec<Member>,
}

impl MemberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        executor: Arc<dyn NodeExecutor>,
    ) -> Result<()> {
        let name = name.into();
        let reserved = name == SUPERVISOR
            || FINISH_SYNONYMS.iter().any(|s| name.eq_ignore_ascii_case(s));
        if name.is_empty() || reserved {
            return Err(OmniError::Config(format!("'{}' cannot be a member name", name)));
        }
        if self.get(&name).is_some() {
            return Err(OmniError::Config(format!("member '{}' registered twice", name)));
        }
        self.members.push(Member {
            name,
            description: description.into(),
            executor,
        });
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn names(&self) -> Vec<&str> {
        self.members.iter().map(|m| m.name.as_str()).collect()
    }

    /// Position of `name` in registration order.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.members.iter().position(|m| m.name == name)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
