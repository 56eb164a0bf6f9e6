//! Configuration discovery and resolution

use super::types::{Config, LogLevel};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Explicitly requested config file does not exist
    #[error("Configuration not found: {}", .0.display())]
    NotFound(PathBuf),
}

/// Command-line overrides for configuration
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    /// Override log level
    pub log_level: Option<LogLevel>,
    /// Override permission mode
    pub require_permission: Option<bool>,
    /// Path to config file override
    pub config_path: Option<PathBuf>,
}

/// Location of the per-user config file under `home_dir`.
pub fn global_config_path(home_dir: &Path) -> PathBuf {
    home_dir.join(".config/clipboard-watcher/config.toml")
}

/// Resolve configuration from all sources
///
/// Priority (highest to lowest):
/// 1. Command-line overrides
/// 2. Environment variables (`CLIPWATCH_LOG`, `CLIPWATCH_PERMISSION`)
/// 3. Config file
/// 4. Defaults
///
/// A file passed with `--config` must exist and parse. The global file is
/// optional and a malformed one only produces a warning.
pub fn resolve_config(overrides: &ConfigOverrides, home_dir: &Path) -> Result<Config, ConfigError> {
    // 3. Config file
    let mut config = match &overrides.config_path {
        Some(path) => {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.clone()));
            }
            load_config_file(path)?
        }
        None => {
            let path = global_config_path(home_dir);
            if path.exists() {
                match load_config_file(&path) {
                    Ok(config) => config,
                    Err(e) => {
                        warn!("Failed to parse config at {path:?}: {e}");
                        Config::default()
                    }
                }
            } else {
                Config::default()
            }
        }
    };

    // 2. Apply environment variables
    apply_env_overrides(&mut config);

    // 1. Apply command-line overrides
    apply_cli_overrides(&mut config, overrides);

    if config.notifications.queue_capacity == 0 {
        warn!("notifications.queue_capacity must be positive, using 1");
        config.notifications.queue_capacity = 1;
    }

    Ok(config)
}

/// Load config from a TOML file
fn load_config_file(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&contents)?;
    Ok(config)
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

/// Apply environment variable overrides
fn apply_env_overrides(config: &mut Config) {
    if let Ok(level) = std::env::var("CLIPWATCH_LOG") {
        match level.parse() {
            Ok(level) => config.core.log_level = level,
            Err(e) => warn!("Ignoring CLIPWATCH_LOG: {e}"),
        }
    }

    if let Ok(value) = std::env::var("CLIPWATCH_PERMISSION") {
        match parse_flag(&value) {
            Some(flag) => config.notifications.require_permission = flag,
            None => warn!("Ignoring CLIPWATCH_PERMISSION: unrecognized value '{value}'"),
        }
    }
}

/// Apply command-line overrides
fn apply_cli_overrides(config: &mut Config, overrides: &ConfigOverrides) {
    if let Some(level) = overrides.log_level {
        config.core.log_level = level;
    }

    if let Some(permission) = overrides.require_permission {
        config.notifications.require_permission = permission;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use tempfile::TempDir;

    fn clear_env() {
        unsafe {
            env::remove_var("CLIPWATCH_LOG");
            env::remove_var("CLIPWATCH_PERMISSION");
        }
    }

    fn write_global(home: &Path, contents: &str) {
        let path = global_config_path(home);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    #[test]
    #[serial]
    fn test_config_defaults() {
        clear_env();
        let home = TempDir::new().unwrap();

        let config = resolve_config(&ConfigOverrides::default(), home.path()).unwrap();

        assert_eq!(config, Config::default());
        assert_eq!(config.core.log_level, LogLevel::Info);
        assert!(!config.notifications.require_permission);
    }

    #[test]
    #[serial]
    fn test_global_file_is_loaded() {
        clear_env();
        let home = TempDir::new().unwrap();
        write_global(
            home.path(),
            "[core]\nlog_level = \"debug\"\n[notifications]\napp_name = \"cw\"\n",
        );

        let config = resolve_config(&ConfigOverrides::default(), home.path()).unwrap();

        assert_eq!(config.core.log_level, LogLevel::Debug);
        assert_eq!(config.notifications.app_name, "cw");
    }

    #[test]
    #[serial]
    fn test_malformed_global_config_falls_back_to_defaults() {
        clear_env();
        let home = TempDir::new().unwrap();
        write_global(home.path(), "invalid toml [[[");

        let config = resolve_config(&ConfigOverrides::default(), home.path()).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    #[serial]
    fn test_explicit_config_path_must_exist() {
        clear_env();
        let home = TempDir::new().unwrap();
        let overrides = ConfigOverrides {
            config_path: Some(home.path().join("missing.toml")),
            ..Default::default()
        };

        let result = resolve_config(&overrides, home.path());
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    #[serial]
    fn test_explicit_malformed_config_is_an_error() {
        clear_env();
        let home = TempDir::new().unwrap();
        let path = home.path().join("custom.toml");
        std::fs::write(&path, "[protocol\n").unwrap();
        let overrides = ConfigOverrides {
            config_path: Some(path),
            ..Default::default()
        };

        let result = resolve_config(&overrides, home.path());
        assert!(matches!(result, Err(ConfigError::TomlParse(_))));
    }

    #[test]
    #[serial]
    fn test_env_overrides_file() {
        clear_env();
        let home = TempDir::new().unwrap();
        write_global(home.path(), "[core]\nlog_level = \"error\"\n");

        unsafe {
            env::set_var("CLIPWATCH_LOG", "Warning");
            env::set_var("CLIPWATCH_PERMISSION", "yes");
        }

        let config = resolve_config(&ConfigOverrides::default(), home.path()).unwrap();
        clear_env();

        assert_eq!(config.core.log_level, LogLevel::Warning);
        assert!(config.notifications.require_permission);
    }

    #[test]
    #[serial]
    fn test_invalid_env_values_are_ignored() {
        clear_env();
        let home = TempDir::new().unwrap();

        unsafe {
            env::set_var("CLIPWATCH_LOG", "loud");
            env::set_var("CLIPWATCH_PERMISSION", "maybe");
        }

        let config = resolve_config(&ConfigOverrides::default(), home.path()).unwrap();
        clear_env();

        assert_eq!(config.core.log_level, LogLevel::Info);
        assert!(!config.notifications.require_permission);
    }

    #[test]
    #[serial]
    fn test_cli_overrides_env() {
        clear_env();
        let home = TempDir::new().unwrap();

        unsafe {
            env::set_var("CLIPWATCH_LOG", "debug");
            env::set_var("CLIPWATCH_PERMISSION", "1");
        }

        let overrides = ConfigOverrides {
            log_level: Some(LogLevel::Error),
            require_permission: Some(false),
            config_path: None,
        };
        let config = resolve_config(&overrides, home.path()).unwrap();
        clear_env();

        assert_eq!(config.core.log_level, LogLevel::Error);
        assert!(!config.notifications.require_permission);
    }

    #[test]
    #[serial]
    fn test_zero_queue_capacity_is_clamped() {
        clear_env();
        let home = TempDir::new().unwrap();
        write_global(home.path(), "[notifications]\nqueue_capacity = 0\n");

        let config = resolve_config(&ConfigOverrides::default(), home.path()).unwrap();
        assert_eq!(config.notifications.queue_capacity, 1);
    }
}
