//! Home directory resolution
//!
//! Precedence:
//!
//! 1. `CLIPWATCH_HOME` environment variable (if set and non-empty)
//! 2. `dirs::home_dir()` platform default
//!
//! Tests point `CLIPWATCH_HOME` at a temporary directory so they never read
//! the real user's config.

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Home directory used to locate `.config/clipboard-watcher/`.
pub fn get_home_dir() -> Result<PathBuf> {
    if let Ok(home) = std::env::var("CLIPWATCH_HOME") {
        let trimmed = home.trim();
        if !trimmed.is_empty() {
            return Ok(PathBuf::from(trimmed));
        }
    }

    dirs::home_dir().context("Could not determine home directory")
}
