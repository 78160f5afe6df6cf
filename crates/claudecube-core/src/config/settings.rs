//! Application settings and YAML configuration parsing.
//!
//! Every field has a default, so an absent or empty config file is valid.
//! Keys are camelCase on disk to match the format the hook bridge and the
//! agent CLI speak.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Top-level ClaudeCube configuration, loaded from a YAML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CubeConfig {
    #[serde(default = "default_version")]
    pub version: u32,

    /// HTTP ingress settings.
    #[serde(default)]
    pub server: ServerSettings,

    /// LLM escalation settings.
    #[serde(default)]
    pub escalation: EscalationSettings,

    /// Telegram channel settings.
    #[serde(default)]
    pub telegram: TelegramSettings,

    /// Stop-event handling settings.
    #[serde(default)]
    pub stop: StopSettings,
}

/// HTTP ingress settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerSettings {
    /// Loopback port the daemon listens on.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Settings for the LLM escalation tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscalationSettings {
    /// Model id used for both the tool-call evaluator and the reply
    /// classifier.
    #[serde(default = "default_evaluator_model")]
    pub evaluator_model: String,

    /// Accepted for config compatibility; the evaluator's own `confident`
    /// boolean is what decides, not this threshold.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,

    /// Seconds to wait for a human answer before a request times out.
    #[serde(default = "default_telegram_timeout")]
    pub telegram_timeout_seconds: u64,
}

/// Telegram channel settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelegramSettings {
    /// Master switch for the human channel. The bot token and chat id come
    /// from the environment, not from this file.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Send a message when a session starts.
    #[serde(default)]
    pub notify_on_start: bool,

    /// Send a message when a session ends.
    #[serde(default)]
    pub notify_on_complete: bool,

    /// Accepted for config compatibility; no send site consumes this yet.
    #[serde(default)]
    pub notify_on_error: bool,

    /// Denial count at which a session qualifies for an alert.
    #[serde(default = "default_denial_alert_threshold")]
    pub denial_alert_threshold: u32,
}

/// Stop-event handling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopSettings {
    /// Nudge the agent to retry when its last message looks like an error.
    #[serde(default = "default_true")]
    pub retry_on_error: bool,

    /// Consecutive error-retry nudges allowed per session.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Ask the human before letting a session stop.
    #[serde(default = "default_true")]
    pub escalate_to_telegram: bool,
}

fn default_version() -> u32 {
    1
}

fn default_port() -> u16 {
    7080
}

fn default_evaluator_model() -> String {
    "claude-haiku-4-5-20251001".to_string()
}

fn default_confidence_threshold() -> f64 {
    0.8
}

fn default_telegram_timeout() -> u64 {
    300
}

fn default_denial_alert_threshold() -> u32 {
    3
}

fn default_max_retries() -> u32 {
    2
}

fn default_true() -> bool {
    true
}

impl Default for CubeConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            server: ServerSettings::default(),
            escalation: EscalationSettings::default(),
            telegram: TelegramSettings::default(),
            stop: StopSettings::default(),
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

impl Default for EscalationSettings {
    fn default() -> Self {
        Self {
            evaluator_model: default_evaluator_model(),
            confidence_threshold: default_confidence_threshold(),
            telegram_timeout_seconds: default_telegram_timeout(),
        }
    }
}

impl Default for TelegramSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            notify_on_start: false,
            notify_on_complete: false,
            notify_on_error: false,
            denial_alert_threshold: default_denial_alert_threshold(),
        }
    }
}

impl Default for StopSettings {
    fn default() -> Self {
        Self {
            retry_on_error: true,
            max_retries: default_max_retries(),
            escalate_to_telegram: true,
        }
    }
}

impl CubeConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// A missing file yields the default configuration.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: CubeConfig = serde_yaml_ng::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        Ok(config)
    }
}

/// Base directory for all ClaudeCube state (`~/.claudecube`).
pub fn home_base_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".claudecube")
}

/// Default orchestrator config path.
pub fn default_config_path() -> PathBuf {
    home_base_dir().join("config.yaml")
}

/// Default rules file path.
pub fn default_rules_path() -> PathBuf {
    home_base_dir().join("rules.yaml")
}

/// Runtime-written policies file path.
pub fn policies_path() -> PathBuf {
    home_base_dir().join("policies.yaml")
}

/// The agent's settings file the installer patches.
pub fn default_settings_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".claude")
        .join("settings.json")
}
