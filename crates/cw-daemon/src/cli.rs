//! Command-line arguments

use clap::Parser;
use clipboard_watcher_core::config::{ConfigOverrides, LogLevel};
use std::path::PathBuf;

/// Watches the X11 clipboard and reports which process reads it
#[derive(Parser, Debug)]
#[command(name = "clipboard-watcher")]
#[command(about = "Watches the X11 clipboard and reports which process reads it")]
#[command(version)]
pub struct Args {
    /// Log level: debug, info, warning or error
    #[arg(short = 'l', long = "loglevel", value_name = "LEVEL")]
    pub loglevel: Option<LogLevel>,

    /// Ask for confirmation before reporting each clipboard access
    #[arg(short, long)]
    pub permission: bool,

    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// X display to connect to (default: $DISPLAY)
    #[arg(long, value_name = "DISPLAY")]
    pub display: Option<String>,
}

impl Args {
    /// Overrides applied on top of file and environment configuration.
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            log_level: self.loglevel,
            require_permission: self.permission.then_some(true),
            config_path: self.config.clone(),
        }
    }
}
