use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{OmniError, Result};

/// Top-level OmniAgent configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub fallback_models: Vec<ModelConfig>,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub gateway: Option<GatewayConfig>,
}

/// Preferred model and its request knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Provider name. Inferred from `model_id` when omitted.
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default = "default_model_id")]
    pub model_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub extra_headers: HashMap<String, String>,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: None,
            model_id: default_model_id(),
            api_key: None,
            base_url: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            extra_headers: HashMap::new(),
            retry: None,
        }
    }
}

impl ModelConfig {
    /// Provider name, explicit or inferred from the model id prefix.
    pub fn provider_name(&self) -> &str {
        if let Some(p) = self.provider.as_deref().filter(|p| !p.is_empty()) {
            return p;
        }
        infer_provider(&self.model_id)
    }
}

/// Map a model id to its provider: `gpt*`/o-series → openai, `gemini*` → gemini,
/// anything else is served by a local OpenAI-compatible endpoint.
pub fn infer_provider(model_id: &str) -> &'static str {
    let id = model_id.to_ascii_lowercase();
    if id.starts_with("gpt") || id.starts_with("o1") || id.starts_with("o3") || id.starts_with("o4")
    {
        "openai"
    } else if id.starts_with("gemini") {
        "gemini"
    } else {
        "ollama"
    }
}

fn default_model_id() -> String { "gpt-4o".to_string() }
fn default_max_tokens() -> u32 { 4096 }
fn default_temperature() -> f32 { 0.3 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_max_retries() -> u32 { 3 }
fn default_initial_backoff() -> u64 { 1000 }
fn default_max_backoff() -> u64 { 30000 }

/// Credentials that decide which model providers are available.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub openai_api_key: Option<String>,
    #[serde(default)]
    pub gemini_api_key: Option<String>,
    /// OpenAI-compatible endpoint for local models.
    #[serde(default)]
    pub ollama_base_url: Option<String>,
    #[serde(default)]
    pub ollama_models: Vec<String>,
}

/// How sub-agents hand control back after answering.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowMode {
    /// Sub-agents go straight to END: one dispatch per query.
    Single,
    /// Sub-agents return to the supervisor, which may dispatch again or finish.
    #[default]
    Iterative,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default)]
    pub mode: WorkflowMode,
    /// Maximum supervisor → sub-agent dispatches per run.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_node_timeout")]
    pub node_timeout_secs: u64,
    /// Classification attempts before the supervisor gives up.
    #[serde(default = "default_supervisor_attempts")]
    pub supervisor_attempts: usize,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            mode: WorkflowMode::default(),
            max_iterations: default_max_iterations(),
            node_timeout_secs: default_node_timeout(),
            supervisor_attempts: default_supervisor_attempts(),
        }
    }
}

fn default_max_iterations() -> usize { 5 }
fn default_node_timeout() -> u64 { 120 }
fn default_supervisor_attempts() -> usize { 2 }

/// Sub-agent loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
    #[serde(default = "default_parallel_tools")]
    pub parallel_tools: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            parallel_tools: default_parallel_tools(),
        }
    }
}

fn default_max_turns() -> usize { 6 }
fn default_parallel_tools() -> bool { true }

/// Third-party data API keys. A missing key leaves its tools out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub coingecko_api_key: Option<String>,
    #[serde(default)]
    pub nftscan_api_key: Option<String>,
    #[serde(default)]
    pub covalent_api_key: Option<String>,
    #[serde(default)]
    pub rootdata_api_key: Option<String>,
    #[serde(default)]
    pub tavily_api_key: Option<String>,
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            coingecko_api_key: None,
            nftscan_api_key: None,
            covalent_api_key: None,
            rootdata_api_key: None,
            tavily_api_key: None,
            http_timeout_secs: default_http_timeout(),
        }
    }
}

fn default_http_timeout() -> u64 { 20 }

/// In-memory session cache and history seeding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: u64,
    /// Seconds a session may sit unused before it is dropped from memory.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
    /// Messages loaded from the store when a session is first used.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cache_capacity: default_cache_capacity(),
            cache_ttl_secs: default_cache_ttl(),
            history_limit: default_history_limit(),
        }
    }
}

fn default_cache_capacity() -> u64 { 1024 }
fn default_cache_ttl() -> u64 { 1800 }
fn default_history_limit() -> usize { 50 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> String { "~/.omniagent/history.db".to_string() }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Bearer token required on API routes when set.
    #[serde(default)]
    pub token: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            token: None,
        }
    }
}

fn default_bind() -> String { "0.0.0.0:8000".to_string() }

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            fallback_models: vec![],
            providers: ProvidersConfig::default(),
            workflow: WorkflowConfig::default(),
            agent: AgentConfig::default(),
            tools: ToolsConfig::default(),
            session: SessionConfig::default(),
            database: DatabaseConfig::default(),
            gateway: None,
        }
    }
}

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| OmniError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        toml::from_str(&expanded).map_err(|e| OmniError::Config(e.to_string()))
    }

    /// Build a config from the process environment alone.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let mut config = Self::default();
        config.providers.openai_api_key = get("OPENAI_API_KEY");
        config.providers.gemini_api_key = get("GEMINI_API_KEY");
        if let Some(base) = get("LLM_API_BASE") {
            config.providers.ollama_base_url = Some(base);
            config.providers.ollama_models = get("LLM_MODELS")
                .map(|m| m.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_else(|| vec!["llama3.1".to_string()]);
        }
        if let Some(model) = get("OMNIAGENT_MODEL") {
            config.model.model_id = model;
        }
        config.tools.coingecko_api_key = get("COINGECKO_API_KEY");
        config.tools.nftscan_api_key = get("NFTSCAN_API_KEY");
        config.tools.covalent_api_key = get("COVALENT_API_KEY");
        config.tools.rootdata_api_key = get("ROOTDATA_API_KEY");
        config.tools.tavily_api_key = get("TAVILY_API_KEY");
        config
    }

    /// Resolve the history database path (expand ~).
    pub fn database_path(&self) -> PathBuf {
        expand_home(&self.database.path)
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs_home() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                // Keep original if env var not set
                Err(_) => result.push_str(&format!("${{{}}}", var_name)),
            }
        } else {
            result.push(c);
        }
    }
    result
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}
