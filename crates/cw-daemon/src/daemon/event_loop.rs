//! Main daemon event loop

use crate::daemon::notify_task::{NotifySettings, NotifyStats, NotifyWorker};
use crate::daemon::protocol::spawn_protocol_thread;
use crate::desktop::{Notifier, PermissionPrompt};
use anyhow::{Context, Result};
use clipboard_watcher_core::connection::SelectionConnection;
use clipboard_watcher_core::{
    AccessRecord, ConnectionError, Dispatcher, ProcessLookup, StartupError,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, Sender};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Channel and worker wiring for one daemon run.
pub struct DaemonOptions {
    pub queue_capacity: usize,
    pub notify: NotifySettings,
}

/// Run the daemon until `cancel` fires or the protocol thread stops.
///
/// This function:
/// 1. Starts the notification worker on the access channel
/// 2. Spawns the protocol thread, which builds the dispatcher with `build`
///    and takes initial ownership of the selections
/// 3. Waits for cancellation (signal, or the protocol thread giving up)
/// 4. Lets the worker drain and reports how the protocol thread ended
///
/// A protocol thread that is still running at shutdown is left behind; it
/// holds nothing that needs saving.
pub async fn run<C, P, F>(
    options: DaemonOptions,
    notifier: Arc<dyn Notifier>,
    prompt: Arc<dyn PermissionPrompt>,
    build: F,
    cancel: CancellationToken,
) -> Result<NotifyStats>
where
    C: SelectionConnection + 'static,
    P: ProcessLookup + 'static,
    F: FnOnce(Sender<AccessRecord>) -> Result<Dispatcher<C, P>, StartupError> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(options.queue_capacity.max(1));

    let worker = NotifyWorker::new(notifier, prompt, options.notify);
    let worker_cancel = cancel.clone();
    let worker_task = tokio::spawn(async move { worker.run(rx, worker_cancel).await });

    let protocol = spawn_protocol_thread(move || build(tx), cancel.clone())
        .context("Failed to spawn protocol thread")?;

    match protocol.ready.await {
        Ok(Ok(())) => info!("Watching PRIMARY and CLIPBOARD"),
        Ok(Err(e)) => {
            cancel.cancel();
            let _ = worker_task.await;
            return Err(e).context("Startup failed");
        }
        Err(_) => {
            cancel.cancel();
            let _ = worker_task.await;
            anyhow::bail!("Protocol thread exited during startup");
        }
    }

    cancel.cancelled().await;
    info!("Cancellation received. Beginning shutdown...");

    let stats = match tokio::time::timeout(Duration::from_secs(10), worker_task).await {
        Ok(Ok(stats)) => stats,
        Ok(Err(e)) => {
            error!("Notification worker panicked: {}", e);
            NotifyStats::default()
        }
        Err(_) => {
            warn!("Notification worker did not stop in time");
            NotifyStats::default()
        }
    };

    if protocol.handle.is_finished() {
        match protocol.handle.join() {
            Ok(Ok(())) | Ok(Err(ConnectionError::Closed)) => {}
            Ok(Err(e)) => return Err(e).context("Display connection failed"),
            Err(_) => anyhow::bail!("Protocol thread panicked"),
        }
    }

    info!("Daemon shutdown complete");
    Ok(stats)
}
