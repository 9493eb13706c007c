pub mod fallback;
pub mod graph;
pub mod members;
pub mod orchestrator;
pub mod prompts;
pub mod session;
pub mod sub_agent;
pub mod supervisor;
pub mod team;

pub use fallback::FallbackAgent;
pub use graph::{
    Edge, EdgeCondition, EventSink, FallbackReason, Node, NodeContext, NodeExecutor, NodeKind,
    RunOutcome, RunSettings, WorkflowGraph, END,
};
pub use members::{
    Member, MemberRegistry, ASSET_MANAGEMENT_AGENT, BLOCK_EXPLORER_AGENT, FALLBACK_AGENT,
    FEED_EXPLORER_AGENT, MARKET_ANALYSIS_AGENT, RESEARCH_ANALYST_AGENT, SUPERVISOR,
};
pub use orchestrator::Orchestrator;
pub use session::{Session, SessionRegistry};
pub use sub_agent::SubAgent;
pub use supervisor::Supervisor;
pub use team::{Team, TeamBuilder};
