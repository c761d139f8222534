use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ConfigError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Path to config.toml - resolved at load time, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub guardrail: GuardrailConfig,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub state_store: StateStoreConfig,

    #[serde(default)]
    pub prompt: PromptConfig,
}

impl Config {
    /// Reject configurations the pipeline cannot run with.
    ///
    /// The generation key and both scanner settings are mandatory; everything
    /// else degrades at request time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if is_blank(self.generation.api_key.as_deref()) {
            return Err(ConfigError::Missing("generation.api_key (GEMINI_API_KEY)"));
        }
        if is_blank(self.guardrail.api_key.as_deref()) {
            return Err(ConfigError::Missing(
                "guardrail.api_key (PRISMA_AIRS_API_KEY)",
            ));
        }
        if is_blank(self.guardrail.profile_name.as_deref()) {
            return Err(ConfigError::Missing(
                "guardrail.profile_name (PRISMA_AIRS_PROFILE)",
            ));
        }
        if self.guardrail.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "guardrail.timeout_secs must be > 0".into(),
            ));
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err(ConfigError::Validation(
                "generation.temperature must be within 0.0..=2.0".into(),
            ));
        }
        if self.agent.enabled && self.agent.mcp_url.trim().is_empty() {
            return Err(ConfigError::Validation(
                "agent.mcp_url is required when the agent is enabled".into(),
            ));
        }
        if self.agent.enabled
            && self.agent.trigger == AgentTrigger::Keywords
            && self.agent.keywords.iter().all(|keyword| keyword.trim().is_empty())
        {
            return Err(ConfigError::Validation(
                "agent.keywords needs a non-blank entry with trigger = \"keywords\"".into(),
            ));
        }
        if !self.gateway.root_path.is_empty() && !self.gateway.root_path.starts_with('/') {
            return Err(ConfigError::Validation(
                "gateway.root_path must start with '/'".into(),
            ));
        }
        Ok(())
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.is_none_or(|v| v.trim().is_empty())
}

// ── Gateway ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Gateway host (default: 127.0.0.1)
    #[serde(default = "default_gateway_host")]
    pub host: String,
    /// Gateway port (default: 5001)
    #[serde(default = "default_gateway_port")]
    pub port: u16,
    /// Prefix every route is mounted under, e.g. `/ai-agent` (default: none)
    #[serde(default)]
    pub root_path: String,
}

fn default_gateway_host() -> String {
    "127.0.0.1".into()
}

fn default_gateway_port() -> u16 {
    5001
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_gateway_host(),
            port: default_gateway_port(),
            root_path: String::new(),
        }
    }
}

// ── Guardrail ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailConfig {
    #[serde(default = "default_guardrail_endpoint")]
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_name: Option<String>,
    /// Per-scan timeout in seconds (default: 10)
    #[serde(default = "default_guardrail_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_ai_model")]
    pub ai_model: String,
    #[serde(default = "default_app_name")]
    pub app_name: String,
    #[serde(default = "default_app_user")]
    pub app_user: String,
}

fn default_guardrail_endpoint() -> String {
    "https://service.api.aisecurity.paloaltonetworks.com/v1/scan/sync/request".into()
}

fn default_guardrail_timeout_secs() -> u64 {
    10
}

fn default_ai_model() -> String {
    "Gemini 2.0 Flash - Guarded Infra Agent".into()
}

fn default_app_name() -> String {
    "guarded-relay".into()
}

fn default_app_user() -> String {
    "guarded-relay-agent".into()
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self {
            endpoint: default_guardrail_endpoint(),
            api_key: None,
            profile_name: None,
            timeout_secs: default_guardrail_timeout_secs(),
            ai_model: default_ai_model(),
            app_name: default_app_name(),
            app_user: default_app_user(),
        }
    }
}

// ── Generation ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_generation_base_url")]
    pub base_url: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default = "default_generation_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
}

fn default_generation_base_url() -> String {
    "https://generativelanguage.googleapis.com".into()
}

fn default_generation_model() -> String {
    "gemini-2.0-flash-001".into()
}

fn default_generation_temperature() -> f64 {
    0.2
}

fn default_max_output_tokens() -> u32 {
    8192
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_generation_base_url(),
            model: default_generation_model(),
            temperature: default_generation_temperature(),
            max_output_tokens: default_max_output_tokens(),
        }
    }
}

// ── Agent ────────────────────────────────────────────────────────────────────

/// When the tool-augmented agent is consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AgentTrigger {
    /// Every accepted request.
    Always,
    /// Only requests mentioning one of `keywords`.
    #[default]
    Keywords,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Streamable-HTTP endpoint of the MCP server
    #[serde(default = "default_mcp_url")]
    pub mcp_url: String,
    /// Model driving the tool loop; falls back to `generation.model`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Fail the request when an invoked agent errors at runtime
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(default)]
    pub trigger: AgentTrigger,
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,
    /// Build the agent when the gateway starts instead of on first use
    #[serde(default = "default_true")]
    pub warm_on_startup: bool,
}

fn default_true() -> bool {
    true
}

fn default_mcp_url() -> String {
    "http://terraform-mcp:8080/mcp".into()
}

fn default_max_iterations() -> u32 {
    10
}

fn default_keywords() -> Vec<String> {
    [
        "terraform",
        "provider",
        "module",
        "resource",
        "state",
        "infrastructure",
        "registry",
        "version",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mcp_url: default_mcp_url(),
            model: None,
            max_iterations: default_max_iterations(),
            required: true,
            trigger: AgentTrigger::default(),
            keywords: default_keywords(),
            warm_on_startup: true,
        }
    }
}

// ── State store ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateStoreConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub backend: StateStoreBackend,
    /// Row source; Postgres rows are rendered through `row_to_json`,
    /// SQLite queries must select a single text column.
    #[serde(default = "default_state_query")]
    pub query: String,
}

fn default_state_query() -> String {
    "SELECT * FROM terraform_remote_state.states".into()
}

impl Default for StateStoreConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: StateStoreBackend::default(),
            query: default_state_query(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StateStoreBackend {
    Postgres(PostgresSettings),
    Sqlite { path: String },
}

impl Default for StateStoreBackend {
    fn default() -> Self {
        Self::Postgres(PostgresSettings::default())
    }
}

impl StateStoreBackend {
    /// Postgres settings, switching the backend to Postgres if needed.
    pub fn postgres_mut(&mut self) -> &mut PostgresSettings {
        if !matches!(self, Self::Postgres(_)) {
            *self = Self::Postgres(PostgresSettings::default());
        }
        match self {
            Self::Postgres(settings) => settings,
            Self::Sqlite { .. } => unreachable!("backend was just set to postgres"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default = "default_pg_port")]
    pub port: u16,
    #[serde(default = "default_pg_database")]
    pub database: String,
    #[serde(default = "default_pg_user")]
    pub user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default = "default_true")]
    pub require_tls: bool,
}

fn default_pg_port() -> u16 {
    5432
}

fn default_pg_database() -> String {
    "aiagentdb".into()
}

fn default_pg_user() -> String {
    "aiagent".into()
}

impl Default for PostgresSettings {
    fn default() -> Self {
        Self {
            host: None,
            port: default_pg_port(),
            database: default_pg_database(),
            user: default_pg_user(),
            password: None,
            require_tls: true,
        }
    }
}

// ── Prompt ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    #[serde(default = "default_system_instructions")]
    pub system_instructions: String,
}

fn default_system_instructions() -> String {
    "You are a Helpful Infrastructure Agent. \
     Answer Terraform questions clearly and provide examples where useful. \
     Use the agent context as the authoritative source only when applicable. \
     If the agent reports that it cannot access state files, ignore that response \
     and use the current state snapshot to answer the question. \
     Report versions and recommendations exactly as the agent returns them when available."
        .into()
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            system_instructions: default_system_instructions(),
        }
    }
}
