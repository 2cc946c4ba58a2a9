// ============================================================================
// Cooperative Shutdown
// ============================================================================
//
// A `Shutdown` is observed by the claim loop between messages and raced
// against in-flight authority calls. Children add their own trigger on top of
// the parent's: a partition worker stops when the process shuts down OR when
// its partition is revoked, without affecting sibling workers.
//
// ============================================================================

use futures_util::future::select_all;
use std::time::Duration;
use tokio::sync::watch;

/// Fires a shutdown to every `Shutdown` subscribed to it
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

/// Cancellation signal handed to workers
#[derive(Debug, Clone)]
pub struct Shutdown {
    receivers: Vec<watch::Receiver<bool>>,
}

/// Create a root trigger and its signal
pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { receivers: vec![rx] })
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        // send_replace never fails, even with no live receivers
        self.tx.send_replace(true);
    }
}

impl Shutdown {
    /// Derive a signal that fires with this one or with its own trigger
    pub fn child(&self) -> (ShutdownTrigger, Shutdown) {
        let (tx, rx) = watch::channel(false);
        let mut receivers = self.receivers.clone();
        receivers.push(rx);
        (ShutdownTrigger { tx }, Shutdown { receivers })
    }

    pub fn is_shutdown(&self) -> bool {
        self.receivers.iter().any(|rx| *rx.borrow())
    }

    /// Resolves once any trigger in the chain has fired
    pub async fn cancelled(&self) {
        let waits = self.receivers.iter().cloned().map(|mut rx| {
            Box::pin(async move {
                let closed = rx.wait_for(|stop| *stop).await.is_err();
                if closed {
                    // Trigger dropped without firing: this link can no longer cancel
                    std::future::pending::<()>().await;
                }
            })
        });
        select_all(waits).await;
    }

    /// Sleep for `delay` unless shutdown fires first. Returns false if interrupted.
    pub async fn sleep(&self, delay: Duration) -> bool {
        if delay.is_zero() {
            return !self.is_shutdown();
        }
        tokio::select! {
            biased;
            _ = self.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}
