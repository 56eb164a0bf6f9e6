//! The protocol thread.
//!
//! The display connection, the selection store and the ownership flags live
//! on one dedicated OS thread for the whole run. The async side only learns
//! whether startup succeeded and, later, that the thread stopped.

use clipboard_watcher_core::connection::SelectionConnection;
use clipboard_watcher_core::{ConnectionError, Dispatcher, ProcessLookup, StartupError};
use std::thread::JoinHandle;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Handle to a running protocol thread.
pub struct ProtocolThread {
    /// Resolves once initial ownership is taken, or startup failed.
    pub ready: oneshot::Receiver<Result<(), StartupError>>,
    pub handle: JoinHandle<Result<(), ConnectionError>>,
}

/// Spawn the protocol thread.
///
/// `build` runs on the new thread and creates the dispatcher there, so the
/// connection is never touched from anywhere else. When the dispatcher stops
/// for any reason, `cancel` is fired so the rest of the process shuts down.
pub fn spawn_protocol_thread<C, P, F>(
    build: F,
    cancel: CancellationToken,
) -> std::io::Result<ProtocolThread>
where
    C: SelectionConnection + 'static,
    P: ProcessLookup + 'static,
    F: FnOnce() -> Result<Dispatcher<C, P>, StartupError> + Send + 'static,
{
    let (ready_tx, ready) = oneshot::channel();

    let handle = std::thread::Builder::new()
        .name("selection-protocol".to_string())
        .spawn(move || {
            let result = build().and_then(|mut dispatcher| {
                dispatcher.start()?;
                Ok(dispatcher)
            });
            let mut dispatcher = match result {
                Ok(dispatcher) => {
                    let _ = ready_tx.send(Ok(()));
                    dispatcher
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    cancel.cancel();
                    return Ok(());
                }
            };

            let result = dispatcher.run();
            match &result {
                Err(ConnectionError::Closed) => info!("Display event stream closed"),
                Err(e) => error!("Protocol thread stopped: {}", e),
                Ok(()) => {}
            }
            cancel.cancel();
            result
        })?;

    Ok(ProtocolThread { ready, handle })
}
