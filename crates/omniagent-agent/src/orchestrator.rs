//! Per-request entry point: session lookup, history seeding, graph run,
//! persistence, and the event stream handed to callers.

use std::sync::Arc;

use futures::stream::BoxStream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use omniagent_core::config::{AppConfig, SessionConfig};
use omniagent_core::error::{OmniError, Result};
use omniagent_core::traits::HistoryStore;
use omniagent_core::types::{ChatMessage, RunEvent, SessionId, SessionSummary};
use omniagent_core::ConversationState;

use crate::graph::{EventSink, NodeContext, RunOutcome};
use crate::session::SessionRegistry;
use crate::team::{Team, TeamBuilder};

const TITLE_CHARS: usize = 50;

/// Owns the team, the session registry and the history store.
pub struct Orchestrator {
    team: Team,
    store: Arc<dyn HistoryStore>,
    sessions: SessionRegistry,
    history_limit: usize,
}

impl Orchestrator {
    pub fn new(team: Team, store: Arc<dyn HistoryStore>, config: &SessionConfig) -> Self {
        Self {
            team,
            store,
            sessions: SessionRegistry::from_config(config),
            history_limit: config.history_limit,
        }
    }

    /// Resolve a model and build the standard team.
    ///
    /// Fails with `ProviderUnavailable` when no model provider is configured.
    pub fn from_config(config: &AppConfig, store: Arc<dyn HistoryStore>) -> Result<Self> {
        let model = omniagent_llm::resolve_model(config)?;
        let team = TeamBuilder::new(config, model).build()?;
        Ok(Self::new(team, store, &config.session))
    }

    pub fn team(&self) -> &Team {
        &self.team
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Start a run and stream its events.
    ///
    /// The stream ends after `RunComplete` or `RunError`. Dropping it
    /// cancels the run.
    pub fn run(
        self: &Arc<Self>,
        session_id: SessionId,
        user_id: String,
        message: String,
        cancel: CancellationToken,
    ) -> BoxStream<'static, RunEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let done = CancellationToken::new();

        let watch_tx = tx.clone();
        let watch_cancel = cancel.clone();
        let watch_done = done.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = watch_tx.closed() => watch_cancel.cancel(),
                _ = watch_done.cancelled() => {}
            }
        });

        let this = Arc::clone(self);
        tokio::spawn(async move {
            let events = EventSink::new(tx.clone());
            let result = this
                .run_to_completion(&session_id, &user_id, &message, cancel, events)
                .await;
            if let Err(e) = result {
                warn!(session = %session_id, error = %e, "Run ended with error");
                let error = match e {
                    OmniError::Cancelled => "cancelled",
                    _ => "run_failed",
                };
                let _ = tx.send(RunEvent::RunError {
                    error: error.to_string(),
                });
            }
            done.cancel();
        });

        Box::pin(UnboundedReceiverStream::new(rx))
    }

    /// Run one user message through the graph on `session_id`.
    ///
    /// Runs on the same session are serialized. Messages appended by the
    /// run are persisted afterwards, even when it was cancelled; a storage
    /// failure is logged and does not fail the run.
    pub async fn run_to_completion(
        &self,
        session_id: &SessionId,
        user_id: &str,
        message: &str,
        cancel: CancellationToken,
        events: EventSink,
    ) -> Result<RunOutcome> {
        let session = self.sessions.get_or_create(session_id);
        let mut transcript = tokio::select! {
            _ = cancel.cancelled() => return Err(OmniError::Cancelled),
            t = session.transcript.lock() => t,
        };

        if !transcript.loaded {
            match self.store.load(session_id, self.history_limit).await {
                Ok(history) => transcript.messages = history,
                Err(e) => error!(session = %session_id, error = %e, "Failed to load history"),
            }
            transcript.loaded = true;
        }

        let title: String = message.chars().take(TITLE_CHARS).collect();
        if let Err(e) = self.store.ensure_session(session_id, user_id, &title).await {
            error!(session = %session_id, error = %e, "Failed to record session");
        }

        events.emit(RunEvent::RunStarted {
            session_id: session_id.clone(),
        });
        info!(session = %session_id, history = transcript.messages.len(), "Run started");

        let mut state = ConversationState::from_history(transcript.messages.clone());
        let mark = state.len();
        state.push(ChatMessage::user(message));

        let ctx = NodeContext::new(session_id.clone(), cancel, events.clone());
        let result = self.team.graph.run(&mut state, ctx).await;

        let appended = state.since(mark).to_vec();
        for msg in &appended {
            if let Err(e) = self.store.append(session_id, msg).await {
                error!(session = %session_id, error = %e, "Failed to persist message");
            }
        }
        transcript.messages.extend(appended);

        let outcome = result?;
        events.emit(RunEvent::RunComplete {
            session_id: session_id.clone(),
            answer: outcome.answer.clone(),
            iterations: outcome.iterations,
        });
        Ok(outcome)
    }

    /// Soft-delete a session and forget its in-memory state.
    pub async fn delete_session(&self, session_id: &SessionId) -> Result<()> {
        self.store.soft_delete(session_id).await?;
        self.sessions.remove(session_id);
        info!(session = %session_id, "Session deleted");
        Ok(())
    }

    pub async fn history(&self, session_id: &SessionId, limit: usize) -> Result<Vec<ChatMessage>> {
        self.store.load(session_id, limit).await
    }

    pub async fn list_sessions(
        &self,
        user_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<SessionSummary>> {
        self.store.list_sessions(user_id, offset, limit).await
    }
}
