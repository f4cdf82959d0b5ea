//! Configuration management
//!
//! This module handles loading, validation, and management of the Foreman configuration.
//! Configuration is stored in TOML format at ~/.foreman/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Log level, data directory
//! - **server**: Webhook listener address and the operational "disabled" switch
//! - **dispatcher**: Worker pool size, queue capacity, claim TTL
//! - **llm**: LLM provider settings
//! - **tracker**: Linear endpoint, team and terminal state names
//! - **conventions**: Per-domain conventions appended to task briefs
//! - **pipeline**: Stage order for full pipeline runs
//!
//! Secrets (API keys, webhook secrets) are never stored here. See
//! [`crate::secrets`].
//!
//! # Examples
//!
//! ```no_run
//! use foreman_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//! println!("Listening on port {}", config.server.port);
//! println!("Default provider: {}", config.llm.default_provider);
//! # Ok(())
//! # }
//! ```

use sdk::capability::CapabilityKind;
use sdk::errors::EngineError;
use sdk::TaskType;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable that forces the disabled switch on
pub const DISABLED_ENV: &str = "FOREMAN_DISABLED";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Core engine settings
    #[serde(default)]
    pub core: CoreConfig,

    /// Webhook listener settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Worker pool settings
    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    /// LLM provider configuration
    #[serde(default)]
    pub llm: LLMConfig,

    /// Linear tracker settings
    #[serde(default)]
    pub tracker: TrackerConfig,

    /// Task brief conventions
    #[serde(default)]
    pub conventions: ConventionsConfig,

    /// Full pipeline stage order
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Core engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// Webhook listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Answer webhooks with "disabled" instead of dispatching
    #[serde(default)]
    pub disabled: bool,
}

/// Dispatcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Maximum concurrently running units
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Jobs accepted but not yet started
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// How long an idempotency claim blocks re-delivery
    #[serde(default = "default_claim_ttl_secs")]
    pub claim_ttl_secs: u64,

    /// How long shutdown waits for in-flight units
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    /// Default LLM provider (anthropic, ollama)
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Anthropic provider settings
    #[serde(default)]
    pub anthropic: AnthropicConfig,

    /// Ollama provider settings
    #[serde(default)]
    pub ollama: OllamaConfig,
}

/// Anthropic provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicConfig {
    #[serde(default = "default_anthropic_base_url")]
    pub base_url: String,

    #[serde(default = "default_anthropic_model")]
    pub model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    // Note: API key stored in env or OS keychain, not in config
}

/// Ollama provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    #[serde(default = "default_ollama_base_url")]
    pub base_url: String,

    #[serde(default = "default_ollama_model")]
    pub model: String,
}

/// Linear tracker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// GraphQL endpoint
    #[serde(default = "default_tracker_api_url")]
    pub api_url: String,

    /// Team that owns created issues and workflow states
    #[serde(default)]
    pub team_id: String,

    /// Terminal "done" state names, tried in order
    #[serde(default = "default_done_states")]
    pub done_states: Vec<String>,

    /// Terminal "planned" state names, tried in order
    #[serde(default = "default_planned_states")]
    pub planned_states: Vec<String>,
}

/// Conventions appended to task briefs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConventionsConfig {
    /// Shared project description
    #[serde(default = "default_project_context")]
    pub project_context: String,

    #[serde(default = "default_frontend_conventions")]
    pub frontend: String,

    #[serde(default = "default_backend_conventions")]
    pub backend: String,

    #[serde(default = "default_database_conventions")]
    pub database: String,

    #[serde(default = "default_review_conventions")]
    pub review: String,
}

impl ConventionsConfig {
    /// Conventions for one domain
    pub fn for_task(&self, task: TaskType) -> &str {
        match task {
            TaskType::Frontend => &self.frontend,
            TaskType::Backend => &self.backend,
            TaskType::Database => &self.database,
            TaskType::Review => &self.review,
        }
    }
}

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Stage order (planning, database, backend, frontend, review)
    #[serde(default = "default_stages")]
    pub stages: Vec<String>,
}

impl PipelineConfig {
    /// Parsed stage kinds. Valid after [`Config::load_from_path`].
    pub fn stage_kinds(&self) -> Result<Vec<CapabilityKind>, EngineError> {
        self.stages
            .iter()
            .map(|s| {
                s.parse::<CapabilityKind>()
                    .map_err(|e| EngineError::Config(format!("Invalid pipeline stage: {}", e)))
            })
            .collect()
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.foreman")
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_workers() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    64
}

fn default_claim_ttl_secs() -> u64 {
    600
}

fn default_shutdown_grace_secs() -> u64 {
    30
}

fn default_provider() -> String {
    "anthropic".to_string()
}

fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com/v1".to_string()
}

fn default_anthropic_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_ollama_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "llama3.1:8b".to_string()
}

fn default_tracker_api_url() -> String {
    "https://api.linear.app/graphql".to_string()
}

fn default_done_states() -> Vec<String> {
    vec!["Done".to_string(), "已完成".to_string()]
}

fn default_planned_states() -> Vec<String> {
    vec!["规划完成".to_string()]
}

fn default_project_context() -> String {
    "Frontend lives in src/ (React 18, TypeScript, Vite, Tailwind CSS, Zustand). \
     Backend lives in server/ (Python, FastAPI, Pydantic). \
     Database is Supabase (PostgreSQL) with migrations in supabase/migrations/."
        .to_string()
}

fn default_frontend_conventions() -> String {
    "Use function components and hooks with complete TypeScript types. \
     Style with Tailwind classes, never inline styles. Keep components single-purpose \
     and handle loading and error states."
        .to_string()
}

fn default_backend_conventions() -> String {
    "Design RESTful endpoints with FastAPI. Annotate all types, validate input with \
     Pydantic, handle errors explicitly and log at appropriate levels."
        .to_string()
}

fn default_database_conventions() -> String {
    "Write Supabase migration files. Use UUID primary keys, plural snake_case table names, \
     foreign key constraints, created_at/updated_at timestamps and row level security policies."
        .to_string()
}

fn default_review_conventions() -> String {
    "Check correctness and completeness, style consistency, potential bugs and security issues, \
     performance problems and frontend/backend interface consistency. Give concrete suggestions."
        .to_string()
}

fn default_stages() -> Vec<String> {
    ["planning", "database", "backend", "frontend", "review"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            data_dir: default_data_dir(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            disabled: false,
        }
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            claim_ttl_secs: default_claim_ttl_secs(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            default_provider: default_provider(),
            anthropic: AnthropicConfig::default(),
            ollama: OllamaConfig::default(),
        }
    }
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            base_url: default_anthropic_base_url(),
            model: default_anthropic_model(),
            max_tokens: default_max_tokens(),
        }
    }
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_base_url(),
            model: default_ollama_model(),
        }
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            api_url: default_tracker_api_url(),
            team_id: String::new(),
            done_states: default_done_states(),
            planned_states: default_planned_states(),
        }
    }
}

impl Default for ConventionsConfig {
    fn default() -> Self {
        Self {
            project_context: default_project_context(),
            frontend: default_frontend_conventions(),
            backend: default_backend_conventions(),
            database: default_database_conventions(),
            review: default_review_conventions(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stages: default_stages(),
        }
    }
}

impl Config {
    /// Load configuration from the default location (~/.foreman/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if validation fails.
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;
        Self::load_or_create_at(&config_path)
    }

    /// Load configuration from `path`, writing defaults there first if missing
    pub fn load_or_create_at(path: &Path) -> Result<Self, EngineError> {
        if path.exists() {
            Self::load_from_path(path)
        } else {
            Self::create_default(path)
        }
    }

    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        let mut config: Config = toml::from_str(&contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;
        config.apply_env_overrides();

        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let config = Self::default();

        // Written before path expansion so the file keeps the portable "~" form
        let toml_string = toml::to_string_pretty(&config)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Created default configuration at {:?}", path);

        let mut config = config;
        config.validate_and_process()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Get the default configuration file path (~/.foreman/config.toml)
    pub fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".foreman").join("config.toml"))
    }

    /// Path of the SQLite ledger inside the data directory
    pub fn database_path(&self) -> PathBuf {
        self.core.data_dir.join("foreman.db")
    }

    /// Validate and process configuration
    ///
    /// This method:
    /// - Validates enumerated and numeric fields
    /// - Parses pipeline stage names
    /// - Expands ~ in the data directory and creates it
    pub fn validate_and_process(&mut self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        let valid_providers = ["anthropic", "ollama"];
        if !valid_providers.contains(&self.llm.default_provider.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid default provider '{}'. Must be one of: {}",
                self.llm.default_provider,
                valid_providers.join(", ")
            )));
        }

        if self.dispatcher.workers == 0 {
            return Err(EngineError::Config(
                "dispatcher.workers must be at least 1".to_string(),
            ));
        }
        if self.dispatcher.queue_capacity == 0 {
            return Err(EngineError::Config(
                "dispatcher.queue_capacity must be at least 1".to_string(),
            ));
        }

        if self.tracker.done_states.is_empty() || self.tracker.planned_states.is_empty() {
            return Err(EngineError::Config(
                "tracker.done_states and tracker.planned_states must not be empty".to_string(),
            ));
        }

        if self.pipeline.stages.is_empty() {
            return Err(EngineError::Config(
                "pipeline.stages must not be empty".to_string(),
            ));
        }
        self.pipeline.stage_kinds()?;

        self.core.data_dir = expand_path(&self.core.data_dir)?;
        if !self.core.data_dir.exists() {
            fs::create_dir_all(&self.core.data_dir).map_err(|e| {
                EngineError::Config(format!("Failed to create data directory: {}", e))
            })?;
        }

        Ok(())
    }

    /// Environment switches that override the file
    fn apply_env_overrides(&mut self) {
        if env_flag(std::env::var(DISABLED_ENV).ok().as_deref()) {
            self.server.disabled = true;
        }
    }
}

fn env_flag(value: Option<&str>) -> bool {
    matches!(
        value.map(|v| v.trim().to_lowercase()).as_deref(),
        Some("1") | Some("true") | Some("yes") | Some("on")
    )
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = Config::default();

        assert_eq!(config.core.log_level, "info");
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.dispatcher.workers, 4);
        assert_eq!(config.tracker.done_states, vec!["Done", "已完成"]);
        assert_eq!(config.pipeline.stages.len(), 5);
    }

    #[test]
    fn test_default_stage_kinds() {
        let kinds = PipelineConfig::default().stage_kinds().unwrap();
        assert_eq!(kinds[0], CapabilityKind::Planning);
        assert_eq!(kinds[1], CapabilityKind::Task(TaskType::Database));
        assert_eq!(kinds[4], CapabilityKind::Task(TaskType::Review));
    }

    #[test]
    fn test_expand_path_with_tilde() {
        let path = PathBuf::from("~/test");
        let expanded = expand_path(&path).unwrap();

        let home = dirs::home_dir().unwrap();
        assert_eq!(expanded, home.join("test"));
    }

    #[test]
    fn test_expand_path_without_tilde() {
        let path = PathBuf::from("/absolute/path");
        assert_eq!(expand_path(&path).unwrap(), path);
    }

    #[test]
    fn test_env_flag() {
        assert!(env_flag(Some("1")));
        assert!(env_flag(Some("TRUE")));
        assert!(!env_flag(Some("0")));
        assert!(!env_flag(None));
    }

    #[test]
    fn test_conventions_for_task() {
        let conventions = ConventionsConfig::default();
        assert!(conventions.for_task(TaskType::Frontend).contains("Tailwind"));
        assert!(conventions.for_task(TaskType::Database).contains("migration"));
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_string = toml::to_string(&config).unwrap();

        let deserialized: Config = toml::from_str(&toml_string).unwrap();
        assert_eq!(config.core.log_level, deserialized.core.log_level);
        assert_eq!(config.pipeline.stages, deserialized.pipeline.stages);
    }
}
