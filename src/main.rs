mod cases;

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use omniagent_agent::Orchestrator;
use omniagent_core::config::AppConfig;
use omniagent_core::error::OmniError;
use omniagent_core::traits::HistoryStore;
use omniagent_core::types::{RunEvent, SessionId};
use omniagent_gateway::{Engine, GatewayServer};
use omniagent_llm::ProviderRegistry;
use omniagent_memory::SqliteStore;

#[derive(Parser)]
#[command(name = "omniagent", version, about = "Multi-agent crypto assistant")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "omniagent.toml")]
    config: PathBuf,

    /// Session ID (auto-generated if not provided)
    #[arg(short, long)]
    session: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP/SSE gateway
    Serve,
    /// Ask one question and stream the answer
    Ask {
        /// The question; read from stdin when empty
        #[arg(trailing_var_arg = true)]
        prompt: Vec<String>,
    },
    /// Inspect or delete stored sessions
    Sessions {
        #[command(subcommand)]
        action: SessionsAction,
    },
    /// Run the canned question list against the configured team
    Cases {
        /// Seconds between questions
        #[arg(long, default_value = "1")]
        pace: u64,
    },
    /// Show current configuration
    Config,
    /// List available model providers
    Providers,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
enum SessionsAction {
    /// List a user's sessions, newest first
    List {
        #[arg(long, default_value = "anonymous")]
        user: String,
        #[arg(long, default_value = "0")]
        offset: usize,
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Print a session's messages
    History {
        id: String,
        #[arg(long, default_value = "50")]
        limit: usize,
    },
    /// Soft-delete a session
    Delete { id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("omniagent=info,warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    // Handle completions before config loading
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "omniagent", &mut io::stdout());
        return Ok(());
    }

    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
        Commands::Providers => {
            let registry = ProviderRegistry::from_config(&config);
            if registry.available().is_empty() {
                println!("No model providers configured.");
            }
            for model in registry.available() {
                println!(
                    "  {:<12} {}",
                    model.provider.as_deref().unwrap_or("-"),
                    model.model_id
                );
            }
        }
        Commands::Sessions { action } => {
            let store = open_store(&config)?;
            run_sessions(&store, action).await?;
        }
        Commands::Serve => {
            let store = open_store(&config)?;
            let engine = match Orchestrator::from_config(&config, store) {
                Ok(orchestrator) => Engine::Ready(Arc::new(orchestrator)),
                Err(e) => {
                    warn!(error = %e, "Chat engine unavailable");
                    Engine::Unavailable(e.to_string())
                }
            };

            let gateway_config = config.gateway.clone().unwrap_or_default();
            info!(bind = %gateway_config.bind, "Starting gateway");
            let server = GatewayServer::new(gateway_config, engine);

            let cancel = CancellationToken::new();
            let cancel_clone = cancel.clone();

            // Graceful shutdown on Ctrl-C
            tokio::spawn(async move {
                tokio::signal::ctrl_c().await.ok();
                info!("Shutting down gateway...");
                cancel_clone.cancel();
            });

            server.run(cancel).await?;
        }
        Commands::Ask { prompt } => {
            let mut text = prompt.join(" ");
            if text.trim().is_empty() {
                let stdin = io::stdin();
                text = stdin
                    .lock()
                    .lines()
                    .map_while(|l| l.ok())
                    .collect::<Vec<_>>()
                    .join("\n");
            }
            let orchestrator = Arc::new(Orchestrator::from_config(&config, open_store(&config)?)?);
            let session_id = cli
                .session
                .map(SessionId::from)
                .unwrap_or_default();
            run_once(&orchestrator, session_id, &text).await?;
        }
        Commands::Cases { pace } => {
            let orchestrator = Arc::new(Orchestrator::from_config(&config, open_store(&config)?)?);
            cases::run_cases(&orchestrator, std::time::Duration::from_secs(pace)).await;
        }
        Commands::Completions { .. } => unreachable!("handled before config load"),
    }

    Ok(())
}

/// Load the config file, or synthesize one from the environment when it is missing.
fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    match AppConfig::load(path) {
        Ok(config) => Ok(config),
        Err(OmniError::ConfigNotFound(_)) => {
            info!(path = %path.display(), "No config file, reading environment");
            Ok(AppConfig::from_env())
        }
        Err(e) => Err(e.into()),
    }
}

fn open_store(config: &AppConfig) -> anyhow::Result<Arc<dyn HistoryStore>> {
    let path = config.database_path();
    let store = SqliteStore::open(&path)?;
    Ok(Arc::new(store))
}

async fn run_sessions(store: &Arc<dyn HistoryStore>, action: SessionsAction) -> anyhow::Result<()> {
    match action {
        SessionsAction::List {
            user,
            offset,
            limit,
        } => {
            let sessions = store.list_sessions(&user, offset, limit).await?;
            if sessions.is_empty() {
                println!("No sessions for {}.", user);
            }
            for s in sessions {
                println!(
                    "{}  {}  {}",
                    s.session_id,
                    s.created_at.format("%Y-%m-%d %H:%M"),
                    s.title
                );
            }
        }
        SessionsAction::History { id, limit } => {
            for msg in store.load(&SessionId::from(id), limit).await? {
                let who = msg.name.as_deref().unwrap_or(msg.role.as_str());
                println!("[{}] {}", who, msg.text());
            }
        }
        SessionsAction::Delete { id } => {
            store.soft_delete(&SessionId::from(id.as_str())).await?;
            println!("Deleted session {}", id);
        }
    }
    Ok(())
}

/// Run one question and print its events as they arrive.
pub(crate) async fn run_once(
    orchestrator: &Arc<Orchestrator>,
    session_id: SessionId,
    input: &str,
) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    let ctrl_c = tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        cancel_clone.cancel();
    });

    let mut events = orchestrator.run(session_id, "cli".to_string(), input.to_string(), cancel);
    let mut failure = None;
    while let Some(event) = events.next().await {
        match event {
            RunEvent::Routed { to } => eprintln!("[route: {}]", to),
            RunEvent::TextDelta { text, .. } => {
                print!("{}", text);
                io::stdout().flush().ok();
            }
            RunEvent::ToolStart { tool, .. } => eprintln!("\n[tool: {}]", tool),
            RunEvent::ToolEnd {
                tool,
                content,
                is_error,
                ..
            } => {
                let status = if is_error { "ERROR" } else { "ok" };
                eprintln!("[{}: {}] {}", tool, status, truncate(&content, 200));
            }
            RunEvent::Fallback { reason } => eprintln!("\n[fallback: {}]", reason),
            RunEvent::RunComplete { iterations, .. } => {
                println!();
                eprintln!("[done after {} dispatches]", iterations);
            }
            RunEvent::RunError { error } => failure = Some(error),
            _ => {}
        }
    }
    ctrl_c.abort();

    match failure {
        Some(error) => anyhow::bail!("run failed: {}", error),
        None => Ok(()),
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
