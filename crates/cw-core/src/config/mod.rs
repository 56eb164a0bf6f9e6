//! Configuration resolution
//!
//! Resolves configuration from multiple sources with priority:
//! 1. Command-line flags (passed as parameters)
//! 2. Environment variables
//! 3. Config file (`--config`, or ~/.config/clipboard-watcher/config.toml)
//! 4. Defaults

mod discovery;
mod types;

pub use discovery::{ConfigError, ConfigOverrides, global_config_path, resolve_config};
pub use types::{Config, CoreConfig, LogLevel, NotificationConfig, ProtocolConfig};
