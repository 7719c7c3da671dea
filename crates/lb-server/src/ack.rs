//! Ack correlation (§4.3, §9 "Asynchronous request/reply across a bus").
//!
//! Dispatch selection may send the same logical command over more than one
//! bridge (§4.3 "Dispatch selection"): an ack from *any* of them resolves
//! the command, and later acks for the same dispatch are ignored. This is
//! modeled as one `oneshot::Sender` shared behind an `Arc<Mutex<Option<_>>>`
//! across every `(bridge_id, device_id, msg_id)` key the dispatch touched.
//! Whichever key is acked first consumes the sender; the sweep task safely
//! no-ops on an already-consumed entry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::oneshot;

use lb_protocol::packet::StatusFields;

/// Default ack timeout (§5).
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub enum AckOutcome {
    Acked {
        bridge_id: u8,
        status: Option<StatusFields>,
    },
    Timeout,
}

type Resolver = Arc<Mutex<Option<oneshot::Sender<AckOutcome>>>>;

struct PendingEntry {
    resolver: Resolver,
    sent_at: Instant,
}

/// `msg_id` is only unique within one bridge's own sequence (§4.3), so the
/// bridge is part of the key alongside the target device.
type PendingKey = (u8, u8, u16);

#[derive(Default)]
pub struct AckCorrelator {
    pending: Mutex<HashMap<PendingKey, PendingEntry>>,
}

impl AckCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a dispatch across one or more `(bridge_id, msg_id)` targets
    /// for `device_id`. Returns a receiver resolved by whichever target acks
    /// first.
    pub fn register_dispatch(
        &self,
        device_id: u8,
        targets: &[(u8, u16)],
    ) -> oneshot::Receiver<AckOutcome> {
        let (tx, rx) = oneshot::channel();
        let resolver: Resolver = Arc::new(Mutex::new(Some(tx)));
        let sent_at = Instant::now();
        let mut pending = self.pending.lock().unwrap();
        for &(bridge_id, msg_id) in targets {
            pending.insert(
                (bridge_id, device_id, msg_id),
                PendingEntry {
                    resolver: resolver.clone(),
                    sent_at,
                },
            );
        }
        rx
    }

    /// Resolve an ack arriving on `bridge_id`'s connection for `device_id`
    /// at `msg_id`. An unknown key, or a key whose resolver was already
    /// consumed, is a no-op — this is how duplicate acks across bridges are
    /// ignored (§4.3).
    pub fn resolve(&self, bridge_id: u8, device_id: u8, msg_id: u16, status: Option<StatusFields>) {
        let entry = self
            .pending
            .lock()
            .unwrap()
            .remove(&(bridge_id, device_id, msg_id));
        if let Some(entry) = entry {
            if let Some(tx) = entry.resolver.lock().unwrap().take() {
                let _ = tx.send(AckOutcome::Acked { bridge_id, status });
            }
        }
    }

    /// Sweep entries older than `timeout`, resolving each surviving
    /// resolver with `Timeout` exactly once (§4.3 "entries older than
    /// T_ack are dropped").
    pub fn sweep(&self, timeout: Duration) {
        let now = Instant::now();
        let mut pending = self.pending.lock().unwrap();
        pending.retain(|_, entry| {
            if now.duration_since(entry.sent_at) < timeout {
                return true;
            }
            if let Some(tx) = entry.resolver.lock().unwrap().take() {
                let _ = tx.send(AckOutcome::Timeout);
            }
            false
        });
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// Sweeper loop, spawned once by the supervisor and run until the
    /// process shuts down.
    pub async fn run_sweeper(self: Arc<Self>, timeout: Duration) {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        loop {
            ticker.tick().await;
            self.sweep(timeout);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ack_resolves_pending_dispatch() {
        let correlator = AckCorrelator::new();
        let rx = correlator.register_dispatch(26, &[(1, 7)]);
        correlator.resolve(1, 26, 7, None);
        let outcome = rx.await.unwrap();
        assert!(matches!(outcome, AckOutcome::Acked { bridge_id: 1, .. }));
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn second_bridge_ack_is_ignored_after_first_resolves() {
        let correlator = AckCorrelator::new();
        let rx = correlator.register_dispatch(26, &[(1, 7), (2, 9)]);
        correlator.resolve(1, 26, 7, None);
        correlator.resolve(2, 26, 9, None);
        let outcome = rx.await.unwrap();
        assert!(matches!(outcome, AckOutcome::Acked { bridge_id: 1, .. }));
    }

    #[tokio::test]
    async fn unknown_ack_is_a_no_op() {
        let correlator = AckCorrelator::new();
        correlator.resolve(9, 99, 1234, None);
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn sweep_times_out_stale_entries() {
        let correlator = AckCorrelator::new();
        let rx = correlator.register_dispatch(26, &[(1, 7)]);
        correlator.sweep(Duration::from_secs(0));
        let outcome = rx.await.unwrap();
        assert!(matches!(outcome, AckOutcome::Timeout));
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn sweep_leaves_fresh_entries_pending() {
        let correlator = AckCorrelator::new();
        let _rx = correlator.register_dispatch(26, &[(1, 7)]);
        correlator.sweep(Duration::from_secs(30));
        assert_eq!(correlator.pending_count(), 1);
    }
}
