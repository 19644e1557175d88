//! Configuration schema definitions.
//!
//! This module defines the complete configuration tree for the dispatcher.
//! All types derive Serde traits so the same structures serve the TOML file
//! on disk and the JSON fragments returned by the configuration server.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::level_filters::LevelFilter;

/// Root application configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Backend selector (e.g. "dockerrun", "kuberun").
    pub backend: String,

    /// Settings for the `docker` backend.
    pub docker: BackendSettings,

    /// Settings for the `dockerrun` backend.
    pub dockerrun: BackendSettings,

    /// Settings for the `kubernetes` backend.
    pub kubernetes: BackendSettings,

    /// Settings for the `kuberun` backend.
    pub kuberun: BackendSettings,

    /// Settings for the `sshproxy` backend.
    pub sshproxy: BackendSettings,

    /// Security overlay policy.
    pub security: SecurityConfig,

    /// Logging settings.
    pub log: LogConfig,

    /// Remote configuration server.
    pub config_server: ConfigServerConfig,
}

/// Backend-owned settings.
///
/// The dispatcher never interprets these; each backend constructor decodes
/// its own section with [`BackendSettings::parse`].
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(transparent)]
pub struct BackendSettings(pub Map<String, Value>);

impl BackendSettings {
    /// Decode the section into a backend-specific type.
    pub fn parse<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(self.0.clone()))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Log verbosity.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    /// Minimum level to emit.
    pub level: LogLevel,

    /// Output format.
    pub format: LogFormat,
}

/// Remote configuration server.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ConfigServerConfig {
    /// Endpoint URL. Empty disables per-connection lookups.
    pub url: String,

    /// HTTP client timeout in seconds.
    pub timeout_secs: u64,
}

impl ConfigServerConfig {
    pub fn is_enabled(&self) -> bool {
        !self.url.is_empty()
    }
}

impl Default for ConfigServerConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            timeout_secs: 60,
        }
    }
}

/// How a class of session requests is treated by the security overlay.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PolicyMode {
    /// Use the overlay's default mode.
    #[default]
    Inherit,
    /// Pass every request through.
    Enable,
    /// Pass only requests matching the allow list.
    Filter,
    /// Reject every request.
    Disable,
}

/// Policy for one class of session requests.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct RequestPolicy {
    pub mode: PolicyMode,

    /// Allowed values when `mode = "filter"` (variable names, programs,
    /// subsystem names).
    pub allow: Vec<String>,
}

/// Security overlay configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SecurityConfig {
    /// Wrap backends with the policy overlay.
    pub enabled: bool,

    /// Mode applied to request classes left at `inherit`.
    pub default_mode: PolicyMode,

    /// Environment variable requests.
    pub env: RequestPolicy,

    /// Command execution requests.
    pub exec: RequestPolicy,

    /// Interactive shell requests.
    pub shell: RequestPolicy,

    /// Subsystem requests (e.g. sftp).
    pub subsystem: RequestPolicy,

    /// Maximum concurrent session channels per connection. `None` is unlimited.
    pub max_sessions: Option<u32>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_mode: PolicyMode::Enable,
            env: RequestPolicy::default(),
            exec: RequestPolicy::default(),
            shell: RequestPolicy::default(),
            subsystem: RequestPolicy::default(),
            max_sessions: None,
        }
    }
}
