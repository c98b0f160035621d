//! Configuration loading and validation for Intervet.
//!
//! Loads configuration from a TOML file (default `intervet.toml`) with
//! `INTERVET_*` environment variable overrides. Validates all settings at
//! startup.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// The root configuration structure.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// SQLite database path (or `sqlite::memory:` for ephemeral runs)
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Language model endpoint configuration
    #[serde(default)]
    pub lm: LmConfig,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Code/SQL execution sandbox endpoints
    #[serde(default)]
    pub sandbox: SandboxConfig,

    /// Web-search collaborator configuration
    #[serde(default)]
    pub web_search: WebSearchConfig,
}

fn default_database_url() -> String {
    "sqlite://intervet.db".into()
}

/// Language model endpoint settings (OpenAI-compatible chat completions).
#[derive(Clone, Serialize, Deserialize)]
pub struct LmConfig {
    /// Base URL of the chat-completions API, without the endpoint path
    #[serde(default = "default_lm_base_url")]
    pub base_url: String,

    /// Model identifier sent in every request
    #[serde(default = "default_lm_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_lm_temperature")]
    pub temperature: f32,

    /// Per-request timeout in seconds
    #[serde(default = "default_lm_timeout_secs")]
    pub timeout_secs: u64,

    /// Optional bearer API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

fn default_lm_base_url() -> String {
    "http://localhost:1234/v1".into()
}
fn default_lm_model() -> String {
    "qwen/qwen3-8b".into()
}
fn default_lm_temperature() -> f32 {
    0.2
}
fn default_lm_timeout_secs() -> u64 {
    120
}

impl Default for LmConfig {
    fn default() -> Self {
        Self {
            base_url: default_lm_base_url(),
            model: default_lm_model(),
            temperature: default_lm_temperature(),
            timeout_secs: default_lm_timeout_secs(),
            api_key: None,
        }
    }
}

impl std::fmt::Debug for LmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LmConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("timeout_secs", &self.timeout_secs)
            .field(
                "api_key",
                &self.api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Comma-separated CORS origins, `*` for any
    #[serde(default = "default_allow_origins")]
    pub allow_origins: String,
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    8000
}
fn default_allow_origins() -> String {
    "*".into()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            allow_origins: default_allow_origins(),
        }
    }
}

/// Execution sandbox endpoints. Both are external HTTP collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    #[serde(default = "default_code_url")]
    pub code_url: String,

    #[serde(default = "default_sql_url")]
    pub sql_url: String,

    /// Per-submission timeout in seconds
    #[serde(default = "default_sandbox_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_code_url() -> String {
    "http://localhost:8001/run_code".into()
}
fn default_sql_url() -> String {
    "http://localhost:8002/run_sql".into()
}
fn default_sandbox_timeout_secs() -> u64 {
    30
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            code_url: default_code_url(),
            sql_url: default_sql_url(),
            timeout_secs: default_sandbox_timeout_secs(),
        }
    }
}

/// Web-search collaborator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSearchConfig {
    /// Instant-answer endpoint queried before degrading to a stub result
    #[serde(default = "default_search_url")]
    pub endpoint: String,

    #[serde(default = "default_search_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_search_url() -> String {
    "https://api.duckduckgo.com".into()
}
fn default_search_timeout_secs() -> u64 {
    15
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            endpoint: default_search_url(),
            timeout_secs: default_search_timeout_secs(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            lm: LmConfig::default(),
            server: ServerConfig::default(),
            sandbox: SandboxConfig::default(),
            web_search: WebSearchConfig::default(),
        }
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("database_url", &self.database_url)
            .field("lm", &self.lm)
            .field("server", &self.server)
            .field("sandbox", &self.sandbox)
            .field("web_search", &self.web_search)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from a TOML file, falling back to defaults when
    /// the file does not exist, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self, String> {
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path)
                .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
            toml::from_str(&raw).map_err(|e| format!("invalid config: {e}"))?
        } else {
            tracing::debug!(path = %path.display(), "Config file not found, using defaults");
            Self::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply `INTERVET_*` environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("INTERVET_DATABASE_URL") {
            self.database_url = v;
        }
        if let Ok(v) = std::env::var("INTERVET_LM_BASE_URL") {
            self.lm.base_url = v;
        }
        if let Ok(v) = std::env::var("INTERVET_LM_MODEL") {
            self.lm.model = v;
        }
        if let Ok(v) = std::env::var("INTERVET_LM_API_KEY") {
            self.lm.api_key = Some(v);
        }
        if let Ok(v) = std::env::var("INTERVET_HOST") {
            self.server.host = v;
        }
        if let Ok(v) = std::env::var("INTERVET_PORT")
            && let Ok(port) = v.parse()
        {
            self.server.port = port;
        }
        if let Ok(v) = std::env::var("INTERVET_SANDBOX_CODE_URL") {
            self.sandbox.code_url = v;
        }
        if let Ok(v) = std::env::var("INTERVET_SANDBOX_SQL_URL") {
            self.sandbox.sql_url = v;
        }
    }

    /// Validate settings that would otherwise fail deep inside a turn.
    fn validate(&self) -> Result<(), String> {
        if self.lm.base_url.is_empty() {
            return Err("lm.base_url must not be empty".into());
        }
        if !(0.0..=2.0).contains(&self.lm.temperature) {
            return Err(format!(
                "lm.temperature must be within [0, 2], got {}",
                self.lm.temperature
            ));
        }
        if self.database_url.is_empty() {
            return Err("database_url must not be empty".into());
        }
        Ok(())
    }
}
