//! Forwards window-size changes to a running program.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use teashell_core::Msg;

use crate::program::Program;
use crate::session::WindowChanges;

/// Spawn [`relay`] on the current runtime.
pub fn spawn_relay(
    program: Arc<dyn Program>,
    changes: WindowChanges,
    cancel: CancellationToken,
) -> JoinHandle<usize> {
    tokio::spawn(relay(program, changes, cancel))
}

/// Deliver each window change to `program` until `cancel` fires, then ask the
/// program to quit. Returns the number of changes delivered.
///
/// Cancellation wins every tie. A closed feed does not end the relay; only
/// cancellation does. At most one send is outstanding at a time, and a send
/// still pending when cancellation fires is abandoned.
pub async fn relay(
    program: Arc<dyn Program>,
    mut changes: WindowChanges,
    cancel: CancellationToken,
) -> usize {
    let mut forwarded = 0;
    let mut feed_open = true;

    loop {
        let size = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            change = changes.recv(), if feed_open => match change {
                Some(size) => size,
                None => {
                    debug!("Window change feed closed; waiting for cancellation");
                    feed_open = false;
                    continue;
                }
            },
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = program.send(Msg::WindowSize(size)) => {
                forwarded += 1;
                debug!("Relayed window size {}", size);
            }
        }
    }

    program.quit();
    forwarded
}
