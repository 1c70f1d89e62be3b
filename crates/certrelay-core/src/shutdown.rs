//! Process-level termination requests.
//!
//! A [`ShutdownSignal`] is the receiving half of a `watch` channel. The binary
//! feeds it from SIGINT/SIGTERM; tests feed it from a [`ShutdownTrigger`].
//! Every blocking wait in the pipeline and the scheduler selects on it.

use std::time::Duration;

use tokio::sync::watch;

/// Sending half: requests termination.
#[derive(Debug, Clone)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    /// Request termination. Idempotent.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

/// Receiving half: observes termination requests.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Create a connected trigger/signal pair.
    pub fn channel() -> (ShutdownTrigger, ShutdownSignal) {
        let (tx, rx) = watch::channel(false);
        (ShutdownTrigger { tx }, ShutdownSignal { rx })
    }

    /// A signal that never fires.
    pub fn never() -> ShutdownSignal {
        let (_, signal) = Self::channel();
        signal
    }

    pub fn is_requested(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once termination has been requested.
    ///
    /// If every trigger is dropped without firing, this never resolves.
    pub async fn requested(&self) {
        let mut rx = self.rx.clone();
        let outcome = rx.wait_for(|requested| *requested).await.map(|_| ());
        if outcome.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// Sleep for `duration` unless termination is requested first.
    ///
    /// Returns `true` if the full duration elapsed.
    pub async fn sleep(&self, duration: Duration) -> bool {
        if self.is_requested() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.requested() => false,
        }
    }
}
