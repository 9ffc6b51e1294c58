//! Ordering gate: holds inbound deliveries back while an outbound send is in flight.
//!
//! A reply to "hello bot" can be fetched before the HTTP response to the send of "hello bot"
//! arrives. Deliveries wait on the gate so the harness always sees its own message flushed
//! before the bot's answer.
//!
//! State is either empty or pending (one in-flight send). The pending signal is a
//! `watch` channel; waiters resolve when it flips to `true` or its sender is dropped.

use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

#[derive(Default)]
pub struct OrderingGate {
    pending: Mutex<Option<watch::Sender<bool>>>,
}

/// Snapshot of the gate taken by [`OrderingGate::acquire`].
pub struct GateHandle {
    rx: Option<watch::Receiver<bool>>,
}

impl GateHandle {
    /// Resolve once the send that was in flight at acquire time has completed.
    pub async fn wait(self) {
        if let Some(mut rx) = self.rx {
            // Err means the sender was dropped (replaced or reset): nothing left to wait for.
            let _ = rx.wait_for(|done| *done).await;
        }
    }
}

/// Marks one send in flight; ends it on drop.
pub struct SendGuard<'a> {
    gate: &'a OrderingGate,
}

impl Drop for SendGuard<'_> {
    fn drop(&mut self) {
        self.gate.end_send();
    }
}

impl OrderingGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<watch::Sender<bool>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn acquire(&self) -> GateHandle {
        GateHandle {
            rx: self.lock().as_ref().map(|tx| tx.subscribe()),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.lock().is_some()
    }

    /// Mark a send as in flight. Replaces (and releases) any signal still pending.
    pub fn begin_send(&self) {
        let (tx, _) = watch::channel(false);
        if let Some(prev) = self.lock().replace(tx) {
            log::warn!("ordering gate: send started while another send is still pending");
            prev.send_replace(true);
        }
    }

    /// [`begin_send`](Self::begin_send) with a guard that calls [`end_send`](Self::end_send) on drop.
    pub fn begin_send_guarded(&self) -> SendGuard<'_> {
        self.begin_send();
        SendGuard { gate: self }
    }

    /// Resolve and clear the pending signal.
    pub fn end_send(&self) {
        match self.lock().take() {
            Some(tx) => {
                tx.send_replace(true);
            }
            None => log::warn!("ordering gate: send completed but no send was pending"),
        }
    }

    /// Release any pending signal (session teardown).
    pub fn reset(&self) {
        if let Some(tx) = self.lock().take() {
            log::warn!("ordering gate: reset while a send was pending");
            tx.send_replace(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    const SHORT: Duration = Duration::from_millis(50);

    #[tokio::test]
    async fn idle_gate_passes_immediately() {
        let gate = OrderingGate::new();
        assert!(!gate.is_pending());
        tokio::time::timeout(SHORT, gate.acquire().wait())
            .await
            .expect("idle gate should not block");
    }

    #[tokio::test]
    async fn pending_send_blocks_until_end() {
        let gate = Arc::new(OrderingGate::new());
        gate.begin_send();
        assert!(gate.is_pending());

        let waiter = tokio::spawn({
            let handle = gate.acquire();
            async move { handle.wait().await }
        });
        tokio::time::sleep(SHORT).await;
        assert!(!waiter.is_finished());

        gate.end_send();
        tokio::time::timeout(SHORT, waiter)
            .await
            .expect("waiter released after end_send")
            .unwrap();
        assert!(!gate.is_pending());
    }

    #[tokio::test]
    async fn acquire_after_end_does_not_wait_on_next_send() {
        let gate = OrderingGate::new();
        gate.begin_send();
        gate.end_send();
        let handle = gate.acquire();
        gate.begin_send();
        tokio::time::timeout(SHORT, handle.wait())
            .await
            .expect("handle taken while idle");
        gate.end_send();
    }

    #[tokio::test]
    async fn overlapping_send_releases_previous_waiters() {
        let gate = OrderingGate::new();
        gate.begin_send();
        let first = gate.acquire();
        gate.begin_send();
        tokio::time::timeout(SHORT, first.wait())
            .await
            .expect("replaced signal releases its waiters");
        assert!(gate.is_pending());
        gate.end_send();
    }

    #[tokio::test]
    async fn guard_ends_send_on_drop() {
        let gate = OrderingGate::new();
        {
            let _guard = gate.begin_send_guarded();
            assert!(gate.is_pending());
        }
        assert!(!gate.is_pending());
    }

    #[tokio::test]
    async fn reset_releases_waiters() {
        let gate = OrderingGate::new();
        gate.begin_send();
        let handle = gate.acquire();
        gate.reset();
        tokio::time::timeout(SHORT, handle.wait())
            .await
            .expect("reset releases");
        assert!(!gate.is_pending());
        gate.end_send();
    }
}
