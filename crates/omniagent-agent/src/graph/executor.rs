use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use omniagent_core::error::{OmniError, Result};
use omniagent_core::types::{ChatMessage, RunEvent};
use omniagent_core::{ConversationState, Route, StateUpdate};

use super::edge::END;
use super::node::{Node, NodeContext, NodeKind};
use super::WorkflowGraph;
use crate::fallback::CLARIFICATION;

/// Bounds applied to every run of a graph.
#[derive(Debug, Clone)]
pub struct RunSettings {
    /// Supervisor-to-member dispatches allowed per run.
    pub max_iterations: usize,
    pub node_timeout: Duration,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            node_timeout: Duration::from_secs(120),
        }
    }
}

/// Result of driving a graph from its entry node to END.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Text of the last assistant message appended by this run.
    pub answer: String,
    /// Member dispatches performed.
    pub iterations: usize,
    /// Why the run was diverted to the fallback node, if it was.
    pub fallback: Option<String>,
}

impl WorkflowGraph {
    /// Drive `state` through the graph until END.
    ///
    /// Node failures never end the run: a failed supervisor diverts to the
    /// fallback node and a failed member contributes an apology. Only
    /// cancellation is returned as an error.
    pub async fn run(&self, state: &mut ConversationState, mut ctx: NodeContext) -> Result<RunOutcome> {
        let start = Instant::now();
        let mark = state.len();
        let mut current = self.entry.clone();
        let mut dispatches = 0usize;
        let mut member_answered = false;

        loop {
            if ctx.cancel.is_cancelled() {
                return Err(OmniError::Cancelled);
            }

            let node = self
                .nodes
                .get(&current)
                .ok_or_else(|| OmniError::UnknownNode(current.clone()))?;
            if node.kind == NodeKind::Supervisor {
                state.next = None;
            }

            ctx.events.emit(RunEvent::NodeStarted {
                node: node.name.clone(),
            });
            let node_start = Instant::now();
            let result = tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => return Err(OmniError::Cancelled),
                r = tokio::time::timeout(self.settings.node_timeout, node.executor.run(state, &ctx)) => r,
            };
            debug!(
                node = %node.name,
                elapsed_ms = node_start.elapsed().as_millis() as u64,
                "Node finished"
            );

            let failure = match result {
                Ok(Ok(update)) => {
                    let appended = self.append(state, update, &ctx);
                    if node.kind == NodeKind::Member && appended > 0 {
                        member_answered = true;
                    }
                    None
                }
                Ok(Err(OmniError::Cancelled)) => return Err(OmniError::Cancelled),
                Ok(Err(e)) => Some(e),
                Err(_) => Some(OmniError::NodeTimeout {
                    node: node.name.clone(),
                    timeout_secs: self.settings.node_timeout.as_secs(),
                }),
            };

            if let Some(err) = failure {
                match node.kind {
                    NodeKind::Supervisor => {
                        if matches!(err, OmniError::RoutingAmbiguity { .. }) {
                            warn!(error = %err, "Routing anomaly");
                        } else {
                            warn!(error = %err, "Supervisor failed");
                        }
                        current = self.divert(&mut ctx, FallbackReason::RoutingFailed);
                        continue;
                    }
                    NodeKind::Member => {
                        warn!(node = %node.name, error = %err, "Member failed, replying with apology");
                        let apology = ChatMessage::named(&node.name, member_apology(node));
                        self.append(state, StateUpdate::message(apology), &ctx);
                        member_answered = true;
                    }
                    NodeKind::Fallback => {
                        warn!(error = %err, "Fallback failed, using canned reply");
                        let reply = ChatMessage::named(&node.name, CLARIFICATION);
                        self.append(state, StateUpdate::message(reply), &ctx);
                    }
                }
            }

            let next = if node.kind == NodeKind::Supervisor {
                let route = state.next.clone();
                if let Some(r) = &route {
                    ctx.events.emit(RunEvent::Routed { to: r.to_string() });
                    info!(to = %r, "Supervisor routed");
                }
                match route {
                    Some(Route::Finish) if !member_answered => {
                        current = self.divert(&mut ctx, FallbackReason::FinishedWithoutAnswer);
                        continue;
                    }
                    Some(Route::Node(ref target))
                        if *target != self.fallback && dispatches >= self.settings.max_iterations =>
                    {
                        let err = OmniError::IterationLimitExceeded(self.settings.max_iterations);
                        warn!(error = %err, target = %target, "Iteration bound reached");
                        current = self.divert(&mut ctx, FallbackReason::IterationLimit);
                        continue;
                    }
                    Some(Route::Node(ref target)) if *target == self.fallback => {
                        self.divert(&mut ctx, FallbackReason::SupervisorChoseFallback);
                    }
                    _ => {}
                }
                self.successor(node, route.as_ref())
            } else {
                self.successor(node, None)
            };

            match next {
                Some(to) if to == END => break,
                Some(to) => {
                    if self.nodes.get(&to).is_some_and(|n| n.kind == NodeKind::Member) {
                        dispatches += 1;
                    }
                    current = to;
                }
                None if node.kind == NodeKind::Fallback => break,
                None => {
                    warn!(node = %node.name, next = ?state.next, "No matching edge");
                    current = self.divert(&mut ctx, FallbackReason::NoRoute);
                }
            }
        }

        let answer = state
            .since(mark)
            .iter()
            .rev()
            .find(|m| m.name.is_some())
            .map(|m| m.text())
            .unwrap_or_default();

        info!(
            iterations = dispatches,
            fallback = ctx.fallback_reason.is_some(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Workflow run complete"
        );

        Ok(RunOutcome {
            answer,
            iterations: dispatches,
            fallback: ctx.fallback_reason,
        })
    }

    fn successor(&self, node: &Node, route: Option<&Route>) -> Option<String> {
        self.outgoing(&node.name)
            .find(|e| e.matches(route))
            .map(|e| e.to.clone())
    }

    /// Record the reason and return the fallback node name.
    fn divert(&self, ctx: &mut NodeContext, reason: FallbackReason) -> String {
        ctx.events.emit(RunEvent::Fallback {
            reason: reason.as_str().to_string(),
        });
        ctx.fallback_reason = Some(reason.as_str().to_string());
        self.fallback.clone()
    }

    /// Apply an update and announce each appended message. Returns the count.
    fn append(&self, state: &mut ConversationState, update: StateUpdate, ctx: &NodeContext) -> usize {
        let before = state.len();
        state.apply(update);
        for message in state.since(before) {
            ctx.events.emit(RunEvent::Message {
                message: message.clone(),
            });
        }
        state.len() - before
    }
}

/// Why a run was diverted to the fallback node.
///
/// Only these fixed labels leave the executor; the underlying error text
/// stays in the logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    RoutingFailed,
    IterationLimit,
    SupervisorChoseFallback,
    FinishedWithoutAnswer,
    NoRoute,
}

impl FallbackReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RoutingFailed => "routing_failed",
            Self::IterationLimit => "iteration_limit",
            Self::SupervisorChoseFallback => "supervisor_chose_fallback",
            Self::FinishedWithoutAnswer => "finished_without_answer",
            Self::NoRoute => "no_route",
        }
    }
}

fn member_apology(node: &Node) -> String {
    format!(
        "Sorry, {} couldn't finish looking into that just now. Please try again in a moment.",
        node.name
    )
}
