//! Shutdown signal
//!
//! A crossbeam channel that never carries a message: dropping the
//! `ShutdownTrigger` disconnects it, which every `Shutdown` clone observes.

use std::time::Duration;

use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};

/// Owned by the server; dropping it (or calling `trigger`) signals shutdown
pub(crate) struct ShutdownTrigger {
    _tx: Sender<()>,
}

impl ShutdownTrigger {
    pub(crate) fn trigger(self) {}
}

/// Observer side, cloned into the accept loop and every connection
#[derive(Clone)]
pub(crate) struct Shutdown {
    rx: Receiver<()>,
}

/// Create a linked trigger/observer pair
pub(crate) fn channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = bounded(0);
    (ShutdownTrigger { _tx: tx }, Shutdown { rx })
}

impl Shutdown {
    /// Non-blocking check
    pub(crate) fn is_triggered(&self) -> bool {
        !matches!(self.rx.try_recv(), Err(TryRecvError::Empty))
    }

    /// Block for up to `timeout`, returning early if shutdown fires.
    /// Returns whether shutdown has been signalled.
    pub(crate) fn wait_timeout(&self, timeout: Duration) -> bool {
        !matches!(self.rx.recv_timeout(timeout), Err(RecvTimeoutError::Timeout))
    }
}
