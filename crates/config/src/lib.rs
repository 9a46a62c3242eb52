//! Configuration loading, validation, and management for parley.
//!
//! Loads configuration from `~/.parley/config.toml` with environment
//! variable overrides. Every section falls back to its defaults, so a missing
//! file is a valid configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.parley/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Who the assistant is (used for self-mention detection)
    #[serde(default)]
    pub assistant: AssistantConfig,

    /// Prefix marker characters
    #[serde(default)]
    pub prefix: PrefixConfig,

    /// Message router settings
    #[serde(default)]
    pub router: RouterConfig,

    /// Response filter settings
    #[serde(default)]
    pub filter: FilterConfig,

    /// Short-term memory settings
    #[serde(default)]
    pub short_term: ShortTermConfig,

    /// Semantic memory settings
    #[serde(default)]
    pub semantic: SemanticConfig,

    /// Action executor settings
    #[serde(default)]
    pub actions: ActionsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    /// Platform user id of the assistant
    #[serde(default)]
    pub id: String,

    #[serde(default = "default_assistant_name")]
    pub name: String,

    /// Extra names people use to address the assistant
    #[serde(default)]
    pub aliases: Vec<String>,
}

fn default_assistant_name() -> String {
    "maid".into()
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: default_assistant_name(),
            aliases: vec![],
        }
    }
}

impl AssistantConfig {
    /// Lower-cased names the assistant answers to.
    pub fn names(&self) -> Vec<String> {
        std::iter::once(&self.name)
            .chain(self.aliases.iter())
            .filter(|n| !n.trim().is_empty())
            .map(|n| n.to_lowercase())
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrefixConfig {
    #[serde(default = "default_command_marker")]
    pub command: char,

    #[serde(default = "default_query_marker")]
    pub query: char,

    #[serde(default = "default_quick_marker")]
    pub quick: char,
}

fn default_command_marker() -> char {
    '!'
}
fn default_query_marker() -> char {
    '?'
}
fn default_quick_marker() -> char {
    '.'
}

impl Default for PrefixConfig {
    fn default() -> Self {
        Self {
            command: default_command_marker(),
            query: default_query_marker(),
            quick: default_quick_marker(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Detect code blocks, error output, and long pastes
    #[serde(default = "default_true")]
    pub passive_triggers: bool,

    /// When false, every human message in a shared conversation is `Natural`
    #[serde(default = "default_true")]
    pub require_mention: bool,

    /// Length (in characters) above which a message is a passive trigger
    #[serde(default = "default_long_message_threshold")]
    pub long_message_threshold: usize,
}

fn default_long_message_threshold() -> usize {
    1000
}
fn default_true() -> bool {
    true
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            passive_triggers: true,
            require_mention: true,
            long_message_threshold: default_long_message_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(default = "default_attention_window_ms")]
    pub attention_window_ms: u64,

    #[serde(default = "default_true")]
    pub smart_filtering: bool,

    #[serde(default = "default_true")]
    pub respond_to_replies: bool,

    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,

    /// How recent an assistant reply must be to count as "just replied"
    #[serde(default = "default_recent_reply_ms")]
    pub recent_reply_ms: u64,

    /// Conversations that always receive a response
    #[serde(default)]
    pub always_respond: Vec<String>,
}

fn default_attention_window_ms() -> u64 {
    120_000
}
fn default_min_confidence() -> f32 {
    0.6
}
fn default_recent_reply_ms() -> u64 {
    30_000
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            attention_window_ms: default_attention_window_ms(),
            smart_filtering: true,
            respond_to_replies: true,
            min_confidence: default_min_confidence(),
            recent_reply_ms: default_recent_reply_ms(),
            always_respond: vec![],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShortTermConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    #[serde(default = "default_max_messages")]
    pub max_messages: usize,

    /// Mirror buffers to the durable store
    #[serde(default = "default_true")]
    pub persist: bool,

    /// Only rows newer than this are restored on hydration
    #[serde(default = "default_persist_max_age_ms")]
    pub persist_max_age_ms: u64,

    /// Token budget used when the pipeline assembles a context bundle
    #[serde(default = "default_context_budget")]
    pub context_budget: usize,
}

fn default_max_tokens() -> usize {
    4000
}
fn default_max_messages() -> usize {
    50
}
fn default_persist_max_age_ms() -> u64 {
    24 * 60 * 60 * 1000
}
fn default_context_budget() -> usize {
    2000
}

impl Default for ShortTermConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            max_messages: default_max_messages(),
            persist: true,
            persist_max_age_ms: default_persist_max_age_ms(),
            context_budget: default_context_budget(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticConfig {
    /// SQLite database path (`sqlite::memory:` for ephemeral)
    #[serde(default = "default_database_path")]
    pub database_path: String,

    #[serde(default = "default_search_limit")]
    pub search_limit: usize,

    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_database_path() -> String {
    AppConfig::config_dir()
        .join("parley.db")
        .to_string_lossy()
        .into_owned()
}
fn default_search_limit() -> usize {
    5
}
/// Upper bound on any configured age: one hundred years.
const MAX_RETENTION_DAYS: u32 = 36_500;
const MAX_PERSIST_AGE_MS: u64 = MAX_RETENTION_DAYS as u64 * 24 * 60 * 60 * 1000;

fn default_retention_days() -> u32 {
    30
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            search_limit: default_search_limit(),
            retention_days: default_retention_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionsConfig {
    /// Detections below this confidence are reported but not executed
    #[serde(default = "default_action_confidence")]
    pub min_confidence: f32,

    /// Upper bound on a single capability invocation
    #[serde(default = "default_invoke_timeout_ms")]
    pub invoke_timeout_ms: u64,
}

fn default_action_confidence() -> f32 {
    0.7
}
fn default_invoke_timeout_ms() -> u64 {
    10_000
}

impl Default for ActionsConfig {
    fn default() -> Self {
        Self {
            min_confidence: default_action_confidence(),
            invoke_timeout_ms: default_invoke_timeout_ms(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.parley/config.toml).
    ///
    /// Environment overrides (highest priority):
    /// - `PARLEY_DATABASE_PATH`
    /// - `PARLEY_ATTENTION_WINDOW_MS`
    /// - `PARLEY_MIN_CONFIDENCE`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
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
        if let Ok(path) = std::env::var("PARLEY_DATABASE_PATH") {
            self.semantic.database_path = path;
        }

        if let Ok(window) = std::env::var("PARLEY_ATTENTION_WINDOW_MS") {
            self.filter.attention_window_ms = window.parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "PARLEY_ATTENTION_WINDOW_MS must be an integer, got '{window}'"
                ))
            })?;
        }

        if let Ok(confidence) = std::env::var("PARLEY_MIN_CONFIDENCE") {
            self.filter.min_confidence = confidence.parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "PARLEY_MIN_CONFIDENCE must be a number, got '{confidence}'"
                ))
            })?;
        }

        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".parley")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let markers = [self.prefix.command, self.prefix.query, self.prefix.quick];
        if markers.iter().any(|c| c.is_whitespace() || c.is_alphanumeric()) {
            return Err(ConfigError::ValidationError(
                "prefix markers must be punctuation characters".into(),
            ));
        }
        if markers[0] == markers[1] || markers[0] == markers[2] || markers[1] == markers[2] {
            return Err(ConfigError::ValidationError(
                "prefix markers must be distinct".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.filter.min_confidence) {
            return Err(ConfigError::ValidationError(
                "filter.min_confidence must be between 0.0 and 1.0".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.actions.min_confidence) {
            return Err(ConfigError::ValidationError(
                "actions.min_confidence must be between 0.0 and 1.0".into(),
            ));
        }

        if self.short_term.max_tokens == 0 || self.short_term.max_messages == 0 {
            return Err(ConfigError::ValidationError(
                "short_term.max_tokens and short_term.max_messages must be > 0".into(),
            ));
        }

        if self.short_term.persist_max_age_ms > MAX_PERSIST_AGE_MS {
            return Err(ConfigError::ValidationError(format!(
                "short_term.persist_max_age_ms must be at most {MAX_PERSIST_AGE_MS}"
            )));
        }

        if self.semantic.retention_days > MAX_RETENTION_DAYS {
            return Err(ConfigError::ValidationError(format!(
                "semantic.retention_days must be at most {MAX_RETENTION_DAYS}"
            )));
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
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
