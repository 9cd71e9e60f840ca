//! Configuration loading, validation, and management for finassist.
//!
//! Loads configuration from `~/.finassist/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.finassist/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the model provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Model provider name
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Base URL override for the provider's OpenAI-compatible endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Which model serves which role
    #[serde(default)]
    pub models: ModelsConfig,

    /// Retry and timeout settings handed to the model client
    #[serde(default)]
    pub client: ClientConfig,

    /// Reasoning loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Input guardrail settings
    #[serde(default)]
    pub guardrail: GuardrailConfig,

    /// Entry retrieval settings
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Thread and checkpoint storage
    #[serde(default)]
    pub store: StoreConfig,
}

fn default_provider() -> String {
    "openai".into()
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("base_url", &self.base_url)
            .field("models", &self.models)
            .field("client", &self.client)
            .field("agent", &self.agent)
            .field("guardrail", &self.guardrail)
            .field("retrieval", &self.retrieval)
            .field("store", &self.store)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// Model driving the reason/act loop
    #[serde(default = "default_reasoning_model")]
    pub reasoning: String,

    /// Model performing the semantic input check
    #[serde(default = "default_small_model")]
    pub guardrail: String,

    /// Model writing refusals for blocked input
    #[serde(default = "default_small_model")]
    pub safe_response: String,

    /// Model deciding whether to retrieve knowledge-base context
    #[serde(default = "default_small_model")]
    pub fast: String,

    #[serde(default)]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_reasoning_model() -> String {
    "gpt-4o".into()
}
fn default_small_model() -> String {
    "gpt-4o-mini".into()
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            reasoning: default_reasoning_model(),
            guardrail: default_small_model(),
            safe_response: default_small_model(),
            fast: default_small_model(),
            temperature: 0.0,
            max_tokens: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_max_retries() -> u32 {
    2
}
fn default_timeout_secs() -> u64 {
    60
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Reason/act rounds allowed per turn
    #[serde(default = "default_max_react_loops")]
    pub max_react_loops: u32,
}

fn default_agent_name() -> String {
    "student_debt_agent".into()
}
fn default_max_react_loops() -> u32 {
    6
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            max_react_loops: default_max_react_loops(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailConfig {
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,

    /// Prior user turns included in the context window
    #[serde(default = "default_context_user_turns")]
    pub context_user_turns: usize,
}

fn default_max_input_chars() -> usize {
    2000
}
fn default_context_user_turns() -> usize {
    2
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self {
            max_input_chars: default_max_input_chars(),
            context_user_turns: default_context_user_turns(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// JSONL file of knowledge-base chunks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub knowledge_path: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}
fn default_top_k() -> usize {
    5
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            top_k: default_top_k(),
            knowledge_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// "memory" or "file"
    #[serde(default = "default_store_backend")]
    pub backend: String,

    /// Directory for the file backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

fn default_store_backend() -> String {
    "file".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            path: None,
        }
    }
}

impl StoreConfig {
    /// Directory used by the file backend.
    pub fn resolved_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("threads"))
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.finassist/config.toml).
    ///
    /// Environment variables override the file:
    /// - `FINASSIST_API_KEY`, then `OPENAI_API_KEY`
    /// - `FINASSIST_PROVIDER`
    /// - `FINASSIST_MODEL` (reasoning model)
    /// - `FINASSIST_MAX_REACT_LOOPS`
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_layered(&Self::config_dir().join("config.toml"))
    }

    /// Load `path` and apply the environment overrides on top.
    pub fn load_layered(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if self.api_key.is_none() {
            self.api_key = std::env::var("FINASSIST_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(provider) = std::env::var("FINASSIST_PROVIDER") {
            self.default_provider = provider;
        }

        if let Ok(model) = std::env::var("FINASSIST_MODEL") {
            self.models.reasoning = model;
        }

        if let Ok(loops) = std::env::var("FINASSIST_MAX_REACT_LOOPS") {
            self.agent.max_react_loops = loops.parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "FINASSIST_MAX_REACT_LOOPS must be a positive integer, got '{loops}'"
                ))
            })?;
        }

        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".finassist")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.models.temperature < 0.0 || self.models.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "models.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.max_react_loops == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_react_loops must be at least 1".into(),
            ));
        }

        if self.guardrail.max_input_chars == 0 {
            return Err(ConfigError::ValidationError(
                "guardrail.max_input_chars must be > 0".into(),
            ));
        }

        if self.retrieval.top_k == 0 {
            return Err(ConfigError::ValidationError(
                "retrieval.top_k must be > 0".into(),
            ));
        }

        if !matches!(self.store.backend.as_str(), "memory" | "file") {
            return Err(ConfigError::ValidationError(format!(
                "store.backend must be \"memory\" or \"file\", got \"{}\"",
                self.store.backend
            )));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            base_url: None,
            models: ModelsConfig::default(),
            client: ClientConfig::default(),
            agent: AgentConfig::default(),
            guardrail: GuardrailConfig::default(),
            retrieval: RetrievalConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
