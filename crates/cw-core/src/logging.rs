//! Shared logging initialization.

use crate::config::LogLevel;
use std::sync::OnceLock;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{Registry, fmt, reload};

static HANDLE: OnceLock<reload::Handle<LevelFilter, Registry>> = OnceLock::new();

/// Install the process-wide `tracing` subscriber at `level`.
///
/// Call this before configuration is resolved so its warnings are shown,
/// then [`set_level`] once the configured level is known. Only the first
/// call installs anything; a subscriber that a test harness already
/// installed is left alone.
pub fn init(level: LogLevel) {
    if HANDLE.get().is_some() {
        set_level(level);
        return;
    }
    let (filter, handle) = reload::Layer::new(LevelFilter::from_level(level.as_tracing()));
    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .try_init();
    if installed.is_ok() {
        let _ = HANDLE.set(handle);
    }
}

/// Change the level of the subscriber installed by [`init`].
pub fn set_level(level: LogLevel) {
    if let Some(handle) = HANDLE.get() {
        let _ = handle.modify(|filter| *filter = LevelFilter::from_level(level.as_tracing()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_can_change_after_init() {
        init(LogLevel::Error);
        set_level(LogLevel::Debug);
        init(LogLevel::Warning);
        if let Some(handle) = HANDLE.get() {
            let current = handle.clone_current();
            assert_eq!(current, Some(LevelFilter::WARN));
        }
    }
}
