//! Serializable framework configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_SYNC_TIMEOUT_SECS: f64 = 10.0;
const DEFAULT_INVOKE_TIMEOUT_SECS: f64 = 10.0;
const DEFAULT_HISTORY_LENGTH: usize = 100;

/// Verbosity of the framework's own log output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// No output.
    Off,
    /// Errors only.
    Error,
    /// Warnings and errors.
    Warn,
    /// Lifecycle messages.
    #[default]
    Info,
    /// Registration and dispatch detail.
    Debug,
    /// Everything.
    Trace,
}

impl LogLevel {
    /// `EnvFilter` directive for this level.
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Curated reply texts shown to invokers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Messages {
    /// Reply attached when a command body sets none.
    pub default: String,
    /// Reply for internal failures.
    pub error: String,
    /// Reply for unknown commands.
    pub not_found: String,
}

impl Default for Messages {
    fn default() -> Self {
        Self {
            default: "Command executed successfully.".to_string(),
            error: "An error occurred.".to_string(),
            not_found: "Command not found.".to_string(),
        }
    }
}

/// Framework options recognized by `start_server` and `start_client`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameworkConfig {
    /// Register the built-in argument types.
    pub register_builtin_types: bool,
    /// Log verbosity.
    pub log_level: LogLevel,
    /// Reply texts.
    pub messages: Messages,
    /// Number of executed lines retained on the observer.
    pub history_length: usize,
    /// Seconds the observer waits for its first snapshot.
    pub sync_timeout_secs: f64,
    /// Seconds the observer waits for a remote command reply.
    pub invoke_timeout_secs: f64,
}

impl Default for FrameworkConfig {
    fn default() -> Self {
        Self {
            register_builtin_types: true,
            log_level: LogLevel::default(),
            messages: Messages::default(),
            history_length: DEFAULT_HISTORY_LENGTH,
            sync_timeout_secs: DEFAULT_SYNC_TIMEOUT_SECS,
            invoke_timeout_secs: DEFAULT_INVOKE_TIMEOUT_SECS,
        }
    }
}

/// Configuration parse failure.
#[derive(Debug, Error)]
#[error("invalid framework config: {0}")]
pub struct ConfigError(#[from] serde_json::Error);

impl FrameworkConfig {
    /// Parses a JSON document; missing fields take their defaults.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Initial sync deadline. Negative or non-finite values fall back to the default.
    pub fn sync_timeout(&self) -> Duration {
        seconds_or(self.sync_timeout_secs, DEFAULT_SYNC_TIMEOUT_SECS)
    }

    /// Remote invocation deadline. Negative or non-finite values fall back to the default.
    pub fn invoke_timeout(&self) -> Duration {
        seconds_or(self.invoke_timeout_secs, DEFAULT_INVOKE_TIMEOUT_SECS)
    }
}

fn seconds_or(secs: f64, fallback: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or_else(|_| Duration::from_secs_f64(fallback))
}
