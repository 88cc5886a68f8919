//! Configuration loading, validation, and management for the try-on bot.
//!
//! Loads configuration from `~/.tryon/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.tryon/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Where inputs, metadata, artifacts and transcripts live
    #[serde(default)]
    pub storage: StorageConfig,

    /// Attachment retrieval policy
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Composition backend
    #[serde(default)]
    pub composition: CompositionConfig,

    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Conversation transcript
    #[serde(default)]
    pub chat_history: ChatHistoryConfig,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_input_dir")]
    pub input_dir: PathBuf,

    #[serde(default = "default_input_metadata_dir")]
    pub input_metadata_dir: PathBuf,

    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default = "default_output_metadata_dir")]
    pub output_metadata_dir: PathBuf,

    #[serde(default = "default_chat_history_dir")]
    pub chat_history_dir: PathBuf,

    /// "file", "sqlite" or "memory"
    #[serde(default = "default_ledger_backend")]
    pub ledger_backend: String,

    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,
}

fn default_input_dir() -> PathBuf {
    PathBuf::from("./input_images")
}
fn default_input_metadata_dir() -> PathBuf {
    PathBuf::from("./input_metadata")
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("./output_images")
}
fn default_output_metadata_dir() -> PathBuf {
    PathBuf::from("./output_metadata")
}
fn default_chat_history_dir() -> PathBuf {
    PathBuf::from("./chat_history")
}
fn default_ledger_backend() -> String {
    "file".into()
}
fn default_sqlite_path() -> String {
    "sqlite://./tryon.db".into()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            input_dir: default_input_dir(),
            input_metadata_dir: default_input_metadata_dir(),
            output_dir: default_output_dir(),
            output_metadata_dir: default_output_metadata_dir(),
            chat_history_dir: default_chat_history_dir(),
            ledger_backend: default_ledger_backend(),
            sqlite_path: default_sqlite_path(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Total attempts per attachment, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_attempt_timeout_secs")]
    pub attempt_timeout_secs: u64,

    /// Delay before the second attempt; doubled for each further attempt
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Basic-auth user for the messaging provider's media URLs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Basic-auth password for the messaging provider's media URLs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_attempt_timeout_secs() -> u64 {
    30
}
fn default_backoff_ms() -> u64 {
    250
}
fn default_max_backoff_ms() -> u64 {
    4_000
}

impl FetchConfig {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            attempt_timeout_secs: default_attempt_timeout_secs(),
            backoff_ms: default_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            username: None,
            password: None,
        }
    }
}

impl std::fmt::Debug for FetchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchConfig")
            .field("max_attempts", &self.max_attempts)
            .field("attempt_timeout_secs", &self.attempt_timeout_secs)
            .field("backoff_ms", &self.backoff_ms)
            .field("max_backoff_ms", &self.max_backoff_ms)
            .field("username", &self.username)
            .field("password", &redact(&self.password))
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct CompositionConfig {
    /// "merge" (person and garment side by side; "stub" is an alias) or
    /// "http" (remote inference endpoint)
    #[serde(default = "default_composition_backend")]
    pub backend: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,

    /// Upper bound on one composition; the per-user session unblocks after it
    #[serde(default = "default_composition_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub seed: u64,
}

fn default_composition_backend() -> String {
    "merge".into()
}
fn default_composition_timeout_secs() -> u64 {
    120
}

impl CompositionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for CompositionConfig {
    fn default() -> Self {
        Self {
            backend: default_composition_backend(),
            endpoint: None,
            api_token: None,
            timeout_secs: default_composition_timeout_secs(),
            seed: 0,
        }
    }
}

impl std::fmt::Debug for CompositionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositionConfig")
            .field("backend", &self.backend)
            .field("endpoint", &self.endpoint)
            .field("api_token", &redact(&self.api_token))
            .field("timeout_secs", &self.timeout_secs)
            .field("seed", &self.seed)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Externally reachable base URL used to build artifact links
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
}

fn default_port() -> u16 {
    8000
}
fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_public_base_url() -> String {
    "http://localhost:8000".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            public_base_url: default_public_base_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatHistoryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for ChatHistoryConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.tryon/config.toml).
    ///
    /// Environment variables override secrets and the public URL:
    /// - `TRYON_FETCH_USERNAME`, then `TWILIO_ACCOUNT_ID`
    /// - `TRYON_FETCH_PASSWORD`, then `TWILIO_AUTH_TOKEN`
    /// - `TRYON_COMPOSITION_TOKEN`, then `HF_API_TOKEN`
    /// - `TRYON_PUBLIC_BASE_URL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
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

    /// Apply environment overrides through `lookup`.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let first = |keys: &[&str]| keys.iter().find_map(|k| lookup(k));

        if let Some(user) = first(&["TRYON_FETCH_USERNAME", "TWILIO_ACCOUNT_ID"]) {
            self.fetch.username = Some(user);
        }
        if let Some(password) = first(&["TRYON_FETCH_PASSWORD", "TWILIO_AUTH_TOKEN"]) {
            self.fetch.password = Some(password);
        }
        if let Some(token) = first(&["TRYON_COMPOSITION_TOKEN", "HF_API_TOKEN"]) {
            self.composition.api_token = Some(token);
        }
        if let Some(url) = lookup("TRYON_PUBLIC_BASE_URL") {
            self.gateway.public_base_url = url;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".tryon")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.fetch.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "fetch.max_attempts must be at least 1".into(),
            ));
        }

        if self.fetch.attempt_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "fetch.attempt_timeout_secs must be > 0".into(),
            ));
        }

        if self.composition.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "composition.timeout_secs must be > 0".into(),
            ));
        }

        match self.composition.backend.as_str() {
            "merge" | "stub" => {}
            "http" if self.composition.endpoint.is_none() => {
                return Err(ConfigError::ValidationError(
                    "composition.endpoint is required for the http backend".into(),
                ));
            }
            "http" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "unknown composition backend '{other}' (expected merge, stub or http)"
                )));
            }
        }

        if !matches!(
            self.storage.ledger_backend.as_str(),
            "file" | "sqlite" | "memory"
        ) {
            return Err(ConfigError::ValidationError(format!(
                "unknown ledger backend '{}' (expected file, sqlite or memory)",
                self.storage.ledger_backend
            )));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for `onboard` command).
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
