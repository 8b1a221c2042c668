//! Configuration loading, validation, and management for A2IA.
//!
//! Loads configuration from `~/.a2ia/config.toml` (the directory can be moved
//! with `A2IA_HOME`) with environment variable overrides. Validates all
//! settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.a2ia/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// LLM backend settings
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Sandbox settings
    #[serde(default)]
    pub workspace: WorkspaceConfig,

    /// Conversation loop settings
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Tool execution settings
    #[serde(default)]
    pub tools: ToolsConfig,
}

/// Which OpenAI-compatible backend to talk to.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Backend flavour: "ollama", "vllm" or "openai"
    #[serde(default = "default_provider_name")]
    pub name: String,

    /// Base URL of the `/v1` API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Completion length cap sent with every request; unset lets the backend decide
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// HTTP request timeout
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
}

fn default_provider_name() -> String {
    "ollama".into()
}
fn default_base_url() -> String {
    "http://localhost:11434/v1".into()
}
fn default_model() -> String {
    "qwen2.5:latest".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_request_timeout() -> u64 {
    120
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &redact(&self.api_key))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: default_provider_name(),
            base_url: default_base_url(),
            model: default_model(),
            api_key: None,
            temperature: default_temperature(),
            max_tokens: None,
            timeout_secs: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Sandbox root. Defaults to `<config dir>/workspace`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,

    /// Fixed workspace id; generated on first use when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl WorkspaceConfig {
    /// The effective sandbox root.
    pub fn root_dir(&self) -> PathBuf {
        self.root.clone().unwrap_or_else(AppConfig::workspace_dir)
    }
}

/// Tool-calling protocol used by the orchestrator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrchestratorMode {
    /// Structured tool calls from the backend
    #[default]
    Native,
    /// Free-text Thought / Action / Action Input protocol
    React,
}

impl std::str::FromStr for OrchestratorMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "native" => Ok(Self::Native),
            "react" => Ok(Self::React),
            other => Err(format!("unknown orchestrator mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    #[serde(default = "default_true")]
    pub enable_tools: bool,

    #[serde(default)]
    pub mode: OrchestratorMode,

    #[serde(default = "default_true")]
    pub stream: bool,
}

fn default_max_iterations() -> usize {
    300
}
fn default_true() -> bool {
    true
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            enable_tools: true,
            mode: OrchestratorMode::default(),
            stream: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Default timeout for `ExecuteCommand`
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// Upper bound a caller may request
    #[serde(default = "default_max_command_timeout")]
    pub max_command_timeout_secs: u64,
}

fn default_command_timeout() -> u64 {
    30
}
fn default_max_command_timeout() -> u64 {
    600
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            command_timeout_secs: default_command_timeout(),
            max_command_timeout_secs: default_max_command_timeout(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (`<config dir>/config.toml`)
    /// and apply environment overrides:
    /// - `A2IA_MODEL`
    /// - `A2IA_BASE_URL`
    /// - `A2IA_API_KEY` (falls back to `OPENAI_API_KEY`)
    /// - `A2IA_WORKSPACE`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();
        let mut config = Self::load_from(&config_path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
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

    /// Apply overrides from a variable lookup (the process environment in
    /// [`AppConfig::load`]).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(model) = lookup("A2IA_MODEL") {
            self.provider.model = model;
        }
        if let Some(url) = lookup("A2IA_BASE_URL") {
            self.provider.base_url = url;
        }
        if let Some(key) = lookup("A2IA_API_KEY").or_else(|| {
            if self.provider.api_key.is_none() {
                lookup("OPENAI_API_KEY")
            } else {
                None
            }
        }) {
            self.provider.api_key = Some(key);
        }
        if let Some(root) = lookup("A2IA_WORKSPACE") {
            self.workspace.root = Some(PathBuf::from(root));
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        match std::env::var("A2IA_HOME") {
            Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => dirs_home().join(".a2ia"),
        }
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Get the default workspace directory path.
    pub fn workspace_dir() -> PathBuf {
        Self::config_dir().join("workspace")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.provider.temperature) {
            return Err(ConfigError::ValidationError(
                "provider.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.orchestrator.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "orchestrator.max_iterations must be at least 1".into(),
            ));
        }

        if self.tools.command_timeout_secs > self.tools.max_command_timeout_secs {
            return Err(ConfigError::ValidationError(format!(
                "tools.command_timeout_secs ({}) exceeds tools.max_command_timeout_secs ({})",
                self.tools.command_timeout_secs, self.tools.max_command_timeout_secs
            )));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.provider.api_key.is_some()
    }

    /// Generate a default config TOML string (for `a2ia config --init`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }

    /// The effective configuration as TOML with the API key masked.
    pub fn redacted_toml(&self) -> String {
        let mut shown = self.clone();
        if shown.provider.api_key.is_some() {
            shown.provider.api_key = Some("[REDACTED]".into());
        }
        toml::to_string_pretty(&shown).unwrap_or_default()
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

impl From<ConfigError> for a2ia_core::Error {
    fn from(err: ConfigError) -> Self {
        a2ia_core::Error::Config {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.provider.name, "ollama");
        assert_eq!(config.orchestrator.max_iterations, 300);
        assert_eq!(config.orchestrator.mode, OrchestratorMode::Native);
        assert_eq!(config.tools.command_timeout_secs, 30);
        assert_eq!(config.tools.max_command_timeout_secs, 600);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.provider.model, config.provider.model);
        assert_eq!(parsed.orchestrator.stream, config.orchestrator.stream);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let toml_str = r#"
[provider]
model = "a2ia-qwen"
max_tokens = 2048

[orchestrator]
mode = "react"
max_iterations = 12
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.provider.model, "a2ia-qwen");
        assert_eq!(config.provider.max_tokens, Some(2048));
        assert_eq!(config.provider.base_url, "http://localhost:11434/v1");
        assert_eq!(config.orchestrator.mode, OrchestratorMode::React);
        assert_eq!(config.orchestrator.max_iterations, 12);
        assert!(config.orchestrator.enable_tools);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let mut config = AppConfig::default();
        config.provider.temperature = 5.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_iterations_rejected() {
        let mut config = AppConfig::default();
        config.orchestrator.max_iterations = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn command_timeout_above_cap_rejected() {
        let mut config = AppConfig::default();
        config.tools.command_timeout_secs = 900;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_command_timeout_secs"));
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_ok());
        assert_eq!(result.unwrap().provider.name, "ollama");
    }

    #[test]
    fn load_from_file_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[provider]\ntemperature = 3.5\n").unwrap();
        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));

        std::fs::write(&path, "[provider\n").unwrap();
        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn env_overrides_apply() {
        let vars: HashMap<&str, &str> = [
            ("A2IA_MODEL", "mixtral"),
            ("A2IA_BASE_URL", "http://gpu:8000/v1"),
            ("A2IA_WORKSPACE", "/srv/ws"),
            ("OPENAI_API_KEY", "sk-fallback"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_overrides(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.provider.model, "mixtral");
        assert_eq!(config.provider.base_url, "http://gpu:8000/v1");
        assert_eq!(config.provider.api_key.as_deref(), Some("sk-fallback"));
        assert_eq!(config.workspace.root_dir(), PathBuf::from("/srv/ws"));
    }

    #[test]
    fn file_api_key_beats_openai_fallback() {
        let mut config = AppConfig::default();
        config.provider.api_key = Some("sk-file".into());
        config.apply_overrides(|k| (k == "OPENAI_API_KEY").then(|| "sk-env".to_string()));
        assert_eq!(config.provider.api_key.as_deref(), Some("sk-file"));
    }

    #[test]
    fn debug_and_display_redact_api_key() {
        let mut config = AppConfig::default();
        config.provider.api_key = Some("sk-secret".into());
        assert!(!format!("{config:?}").contains("sk-secret"));
        let shown = config.redacted_toml();
        assert!(!shown.contains("sk-secret"));
        assert!(shown.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("qwen2.5:latest"));
        assert!(toml_str.contains("max_iterations = 300"));
    }

    #[test]
    fn mode_parses_from_str() {
        assert_eq!("ReAct".parse::<OrchestratorMode>().unwrap(), OrchestratorMode::React);
        assert!("chain".parse::<OrchestratorMode>().is_err());
    }
}
