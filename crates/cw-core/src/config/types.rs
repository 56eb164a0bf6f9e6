//! Configuration types

use crate::session::ProtocolOptions;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Complete configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Core configuration
    #[serde(default)]
    pub core: CoreConfig,
    /// Selection protocol tuning
    #[serde(default)]
    pub protocol: ProtocolConfig,
    /// Desktop notification settings
    #[serde(default)]
    pub notifications: NotificationConfig,
}

/// Core configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Minimum severity written to the log
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Log verbosity accepted on the command line and in config files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    #[serde(alias = "warn")]
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }

    pub fn as_tracing(&self) -> tracing::Level {
        match self {
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warning => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warning" | "warn" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            other => Err(format!(
                "invalid log level '{other}' (expected debug, info, warning or error)"
            )),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Selection protocol configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Property on our window that receives converted data
    #[serde(default = "default_delivery_property")]
    pub delivery_property: String,
    /// How long to wait for an owner's SelectionNotify
    #[serde(default = "default_timeout_ms")]
    pub reply_timeout_ms: u64,
    /// How long to wait for each INCR chunk
    #[serde(default = "default_timeout_ms")]
    pub chunk_timeout_ms: u64,
}

fn default_delivery_property() -> String {
    "SEL_DATA".to_string()
}

fn default_timeout_ms() -> u64 {
    5000
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            delivery_property: default_delivery_property(),
            reply_timeout_ms: default_timeout_ms(),
            chunk_timeout_ms: default_timeout_ms(),
        }
    }
}

impl ProtocolConfig {
    pub fn options(&self) -> ProtocolOptions {
        ProtocolOptions {
            delivery_property: self.delivery_property.clone(),
            reply_timeout: Duration::from_millis(self.reply_timeout_ms),
            chunk_timeout: Duration::from_millis(self.chunk_timeout_ms),
        }
    }
}

/// Notification configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Show a desktop notification per access (default: true)
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Application name attached to notifications
    #[serde(default = "default_app_name")]
    pub app_name: String,
    /// Access records buffered between the protocol thread and the notifier
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Ask for confirmation before reporting each access
    #[serde(default)]
    pub require_permission: bool,
}

fn default_enabled() -> bool {
    true
}

fn default_app_name() -> String {
    "Clipboard-Watcher".to_string()
}

fn default_queue_capacity() -> usize {
    64
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            app_name: default_app_name(),
            queue_capacity: default_queue_capacity(),
            require_permission: false,
        }
    }
}
