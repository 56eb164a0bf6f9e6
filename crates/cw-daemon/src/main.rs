//! clipboard-watcher - reports every read of the X11 clipboard

use anyhow::{Context, Result};
use clap::Parser;
use clipboard_watcher_core::config::resolve_config;
use clipboard_watcher_core::session::Session;
use clipboard_watcher_core::{
    AccessRecord, Dispatcher, StartupError, SysinfoLookup, home, logging,
};
use clipboard_watcher_daemon::cli::Args;
use clipboard_watcher_daemon::daemon::{self, DaemonOptions, NotifySettings};
use clipboard_watcher_daemon::desktop::{DesktopNotifier, ZenityPrompt};
use clipboard_watcher_daemon::x11::X11Connection;
use std::sync::Arc;
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Early subscriber so configuration warnings are visible
    logging::init(args.loglevel.unwrap_or_default());

    let home_dir = home::get_home_dir().context("Failed to determine home directory")?;
    let config = resolve_config(&args.overrides(), &home_dir)
        .context("Failed to resolve configuration")?;

    logging::set_level(config.core.log_level);
    info!("clipboard-watcher {} starting", env!("CARGO_PKG_VERSION"));
    if let Some(config_path) = &args.config {
        info!("Loaded config from: {}", config_path.display());
    }
    if config.notifications.require_permission {
        info!("Permission mode enabled");
    }

    let cancel_token = CancellationToken::new();

    // Set up signal handlers
    let cancel_for_signals = cancel_token.clone();
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};

            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => info!("Received SIGINT (Ctrl+C)"),
                        _ = sigterm.recv() => info!("Received SIGTERM"),
                    }
                }
                Err(e) => {
                    error!("Failed to install SIGTERM handler: {}", e);
                    if tokio::signal::ctrl_c().await.is_ok() {
                        info!("Received SIGINT (Ctrl+C)");
                    }
                }
            }
        }

        #[cfg(not(unix))]
        {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl+C");
            }
        }

        cancel_for_signals.cancel();
    });

    let app_name = config.notifications.app_name.clone();
    let notifier = Arc::new(DesktopNotifier::new(app_name.clone()));
    let prompt = Arc::new(ZenityPrompt::new(app_name));
    let options = DaemonOptions {
        queue_capacity: config.notifications.queue_capacity,
        notify: NotifySettings::from_config(&config.notifications),
    };

    let display = args.display.clone();
    let protocol = config.protocol.options();
    let build = move |access_tx: Sender<AccessRecord>| -> Result<_, StartupError> {
        let conn = X11Connection::connect(display.as_deref())?;
        let session = Session::new(conn, protocol)?;
        Ok(Dispatcher::new(session, SysinfoLookup::new(), access_tx))
    };

    daemon::run(options, notifier, prompt, build, cancel_token)
        .await
        .context("clipboard-watcher failed")?;

    info!("clipboard-watcher shutdown complete");
    Ok(())
}
