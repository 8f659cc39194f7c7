//! Configuration management for techwriter

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Environment variable overriding `backend.base_url`
pub const ENV_BASE_URL: &str = "OLLAMA_BASE_URL";
/// Environment variable overriding `backend.model`
pub const ENV_MODEL: &str = "OLLAMA_MODEL";
/// Environment variable overriding `prompts.path`
pub const ENV_PROMPTS: &str = "TECHWRITER_PROMPTS";

/// Inference backend configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the Ollama server (the `/api/generate` path is appended)
    pub base_url: String,
    /// Model used by any prompt template that does not name its own
    pub model: String,
    /// Ceiling for a single request attempt, in seconds
    pub timeout_seconds: u64,
    /// Total attempts per correction, including the first one
    pub max_attempts: u32,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "tech-writer:latest".to_string(),
            timeout_seconds: 30,
            max_attempts: 3, // one try plus two retries
        }
    }
}

/// Prompt template configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    /// TOML file with `[[modes]]` tables. Built-in modes are used if omitted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Mode used when the caller does not pick one
    pub default_mode: String,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            path: None,
            default_mode: "default".to_string(),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backend settings
    pub backend: BackendConfig,
    /// Prompt settings
    pub prompts: PromptsConfig,
}

/// Network client settings handed to the inference client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub max_attempts: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        BackendConfig::default().client_config()
    }
}

impl BackendConfig {
    /// Derive the network client settings
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.base_url.clone(),
            timeout: Duration::from_secs(self.timeout_seconds),
            max_attempts: self.max_attempts,
        }
    }
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("techwriter")
            .join("config.toml")
    }

    /// Load configuration from the default path, then apply environment overrides
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::default_path())?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific path.
    ///
    /// A missing file yields the defaults. A file that exists but cannot be
    /// read or parsed is an error: the process must not start on a config
    /// it did not understand.
    pub fn load_from(path: &Path) -> Result<Self> {
        let exists = path.try_exists().map_err(|e| {
            Error::Config(format!("Failed to access config file {:?}: {}", path, e))
        })?;
        if !exists {
            debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        Self::load_existing(path)
    }

    /// Load configuration from a path the user named explicitly; it must exist
    pub fn load_existing(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        let config: Config = toml::from_str(&contents).map_err(|e| {
            Error::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = non_empty(ENV_BASE_URL) {
            debug!("{} overrides backend.base_url", ENV_BASE_URL);
            self.backend.base_url = url;
        }
        if let Some(model) = non_empty(ENV_MODEL) {
            debug!("{} overrides backend.model", ENV_MODEL);
            self.backend.model = model;
        }
        if let Some(path) = non_empty(ENV_PROMPTS) {
            debug!("{} overrides prompts.path", ENV_PROMPTS);
            self.prompts.path = Some(PathBuf::from(path));
        }
    }

    /// Check values that would otherwise fail on first use
    pub fn validate(&self) -> Result<()> {
        let backend = &self.backend;
        let url = backend.base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "backend.base_url must be an http(s) URL, got {:?}",
                backend.base_url
            )));
        }
        if backend.model.trim().is_empty() {
            return Err(Error::Config("backend.model must not be empty".to_string()));
        }
        if backend.timeout_seconds == 0 {
            return Err(Error::Config(
                "backend.timeout_seconds must be at least 1".to_string(),
            ));
        }
        if backend.max_attempts == 0 {
            return Err(Error::Config(
                "backend.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.prompts.default_mode.trim().is_empty() {
            return Err(Error::Config(
                "prompts.default_mode must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Network client settings for the inference client
    pub fn client_config(&self) -> ClientConfig {
        self.backend.client_config()
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, self.to_toml()?)?;

        info!("Saved config to {:?}", path);
        Ok(())
    }

    /// Create a default config file if it doesn't exist. Returns true if one was written.
    pub fn ensure_default_exists(path: &Path) -> Result<bool> {
        if path.exists() {
            return Ok(false);
        }
        info!("Creating default config at {:?}", path);
        Self::default().save_to(path)?;
        Ok(true)
    }

    /// Format config as TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))
    }
}
