//! Assembling the member registry and the workflow graph.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use omniagent_core::config::{AgentConfig, AppConfig, WorkflowConfig, WorkflowMode};
use omniagent_core::error::{OmniError, Result};
use omniagent_core::FINISH;
use omniagent_llm::ChatModel;
use omniagent_tools::{ToolCapabilities, ToolRegistry, ToolsetBuilder};

use crate::fallback::FallbackAgent;
use crate::graph::{Edge, Node, NodeKind, RunSettings, WorkflowGraph, END};
use crate::members::*;
use crate::prompts;
use crate::sub_agent::SubAgent;
use crate::supervisor::Supervisor;

struct MemberSpec {
    name: &'static str,
    description: &'static str,
    prompt: fn() -> String,
    tools: fn(&ToolsetBuilder) -> ToolRegistry,
}

const STANDARD_MEMBERS: &[MemberSpec] = &[
    MemberSpec {
        name: MARKET_ANALYSIS_AGENT,
        description: "Market data and analysis: token prices, market rankings, funding rates, NFT collection stats and rankings.",
        prompt: prompts::market_analyst,
        tools: ToolsetBuilder::market,
    },
    MemberSpec {
        name: ASSET_MANAGEMENT_AGENT,
        description: "Wallet assets: token and NFT balances for an address, and building swap or transfer widgets.",
        prompt: prompts::asset_manager,
        tools: ToolsetBuilder::asset,
    },
    MemberSpec {
        name: BLOCK_EXPLORER_AGENT,
        description: "Blockchain data: block height, transactions, gas fees and network statistics.",
        prompt: prompts::block_explorer,
        tools: ToolsetBuilder::explorer,
    },
    MemberSpec {
        name: RESEARCH_ANALYST_AGENT,
        description: "Web3 project research: project background, team, investors, funding and ecosystem news.",
        prompt: prompts::research_analyst,
        tools: ToolsetBuilder::research,
    },
    MemberSpec {
        name: FEED_EXPLORER_AGENT,
        description: "Activity feeds of a wallet address: social posts, DeFi operations, transfers, and Telegram crypto news.",
        prompt: prompts::feed_explorer,
        tools: ToolsetBuilder::feed,
    },
];

// Longer than every member description, so a member mentioned together
// with the fallback always wins the tie-break.
const FALLBACK_DESCRIPTION: &str = "Anything else: greetings, small talk, off-topic questions, \
and unclear or nonsensical requests that none of the other members can handle.";

/// The shared, read-only routing setup for every run.
#[derive(Debug, Clone)]
pub struct Team {
    pub graph: Arc<WorkflowGraph>,
    pub members: Arc<MemberRegistry>,
}

impl Team {
    /// Wire a graph around `members`, which must include [`FALLBACK_AGENT`].
    pub fn assemble(
        members: MemberRegistry,
        supervisor_model: ChatModel,
        workflow: &WorkflowConfig,
    ) -> Result<Self> {
        if !members.contains(FALLBACK_AGENT) {
            return Err(OmniError::Config(format!(
                "team has no '{}' member",
                FALLBACK_AGENT
            )));
        }
        let supervisor = Supervisor::new(supervisor_model, &members, workflow.supervisor_attempts)?;

        let mut builder = WorkflowGraph::builder()
            .node(Node::new(SUPERVISOR, NodeKind::Supervisor, Arc::new(supervisor)))
            .entry(SUPERVISOR)
            .settings(RunSettings {
                max_iterations: workflow.max_iterations,
                node_timeout: Duration::from_secs(workflow.node_timeout_secs),
            });

        for member in members.members() {
            let (kind, after) = if member.name == FALLBACK_AGENT {
                (NodeKind::Fallback, END)
            } else if workflow.mode == WorkflowMode::Iterative {
                (NodeKind::Member, SUPERVISOR)
            } else {
                (NodeKind::Member, END)
            };
            builder = builder
                .node(Node::new(&member.name, kind, member.executor.clone()))
                .edge(Edge::on_next(SUPERVISOR, &member.name, &member.name))
                .edge(Edge::always(&member.name, after));
        }
        let graph = builder.edge(Edge::on_next(SUPERVISOR, FINISH, END)).build()?;

        info!(
            members = ?members.names(),
            mode = ?workflow.mode,
            max_iterations = workflow.max_iterations,
            "Workflow graph built"
        );

        Ok(Self {
            graph: Arc::new(graph),
            members: Arc::new(members),
        })
    }
}

/// Builds the standard crypto team from configuration.
///
/// Tool lists come from [`ToolsetBuilder`]; `with_tools` swaps in a
/// different registry for one member.
pub struct TeamBuilder {
    model: ChatModel,
    agent: AgentConfig,
    workflow: WorkflowConfig,
    toolsets: ToolsetBuilder,
    overrides: Vec<(String, ToolRegistry)>,
}

impl TeamBuilder {
    pub fn new(config: &AppConfig, model: ChatModel) -> Self {
        Self {
            model,
            agent: config.agent.clone(),
            workflow: config.workflow.clone(),
            toolsets: ToolsetBuilder::new(ToolCapabilities::from(&config.tools)),
            overrides: Vec::new(),
        }
    }

    pub fn with_tools(mut self, member: &str, tools: ToolRegistry) -> Self {
        self.overrides.push((member.to_string(), tools));
        self
    }

    pub fn build(self) -> Result<Team> {
        let mut members = MemberRegistry::new();
        for spec in STANDARD_MEMBERS {
            let tools = self
                .overrides
                .iter()
                .rev()
                .find(|(name, _)| name == spec.name)
                .map(|(_, tools)| tools.clone())
                .unwrap_or_else(|| (spec.tools)(&self.toolsets));
            info!(agent = spec.name, tools = ?tools.list(), "Member tools");

            let agent = SubAgent::new(
                spec.name,
                self.model.clone(),
                tools,
                (spec.prompt)(),
                self.agent.clone(),
            );
            members.register(spec.name, spec.description, Arc::new(agent))?;
        }
        members.register(
            FALLBACK_AGENT,
            FALLBACK_DESCRIPTION,
            Arc::new(FallbackAgent::new(Some(self.model.clone()))),
        )?;

        Team::assemble(members, self.model, &self.workflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use omniagent_core::config::ModelConfig;
    use omniagent_test_utils::{test_config, MockLlm};

    fn model() -> ChatModel {
        ChatModel::new(Arc::new(MockLlm::new()), ModelConfig::default())
    }

    #[test]
    fn test_standard_team_layout() {
        let team = TeamBuilder::new(&test_config(), model()).build().unwrap();
        assert_eq!(
            team.members.names(),
            vec![
                MARKET_ANALYSIS_AGENT,
                ASSET_MANAGEMENT_AGENT,
                BLOCK_EXPLORER_AGENT,
                RESEARCH_ANALYST_AGENT,
                FEED_EXPLORER_AGENT,
                FALLBACK_AGENT
            ]
        );

        let graph = &team.graph;
        assert_eq!(graph.entry(), SUPERVISOR);
        assert_eq!(graph.fallback(), FALLBACK_AGENT);
        // one edge per member plus FINISH
        assert_eq!(graph.outgoing(SUPERVISOR).count(), 7);
        let back = graph.outgoing(MARKET_ANALYSIS_AGENT).next().unwrap();
        assert_eq!(back.to, SUPERVISOR);
        let done = graph.outgoing(FALLBACK_AGENT).next().unwrap();
        assert_eq!(done.to, END);
    }

    #[test]
    fn test_single_mode_members_end_the_run() {
        let mut config = test_config();
        config.workflow.mode = WorkflowMode::Single;
        let team = TeamBuilder::new(&config, model()).build().unwrap();
        for name in team.members.names() {
            let edge = team.graph.outgoing(name).next().unwrap();
            assert_eq!(edge.to, END);
        }
    }

    #[test]
    fn test_assemble_requires_fallback() {
        let err = Team::assemble(MemberRegistry::new(), model(), &WorkflowConfig::default())
            .unwrap_err();
        assert!(matches!(err, OmniError::Config(_)));
    }

    #[test]
    fn test_fallback_is_least_specific() {
        let fallback = FALLBACK_DESCRIPTION.chars().count();
        assert!(STANDARD_MEMBERS
            .iter()
            .all(|m| m.description.chars().count() < fallback));
    }
}
