//! Graceful shutdown handling.

use log::{info, warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::storage::{DocumentManager, RelationalManager};

/// Cancels `stop` when the process receives Ctrl-C.
///
/// The returned task ends either on the signal or when `stop` is cancelled by someone
/// else; abort or await it during shutdown.
pub fn spawn_ctrl_c_listener(stop: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                match result {
                    Ok(()) => warn!("Interrupt received, stopping store operations"),
                    Err(e) => warn!("Could not listen for Ctrl-C: {e}"),
                }
                stop.cancel();
            }
            _ = stop.cancelled() => {}
        }
    })
}

/// Sets the stop signal, closes every manager and waits for the signal task.
///
/// Managers are closed even when the stop signal was already set; `close()` is never
/// gated.
pub async fn shutdown_gracefully(
    stop: CancellationToken,
    signal_task: Option<JoinHandle<()>>,
    documents: Option<&DocumentManager>,
    relational: Option<&RelationalManager>,
) {
    stop.cancel();
    if let Some(signal_task) = signal_task {
        let _ = signal_task.await;
    }

    if let Some(manager) = documents {
        manager.close().await;
    }
    if let Some(manager) = relational {
        manager.close().await;
    }
    info!("Store connections closed");
}
