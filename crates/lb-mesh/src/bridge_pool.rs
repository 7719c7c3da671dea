//! The ready-to-relay bridge pool (§3, I6) and the bridge-rotation
//! bookkeeping used by both C3's dispatch selection and C5's periodic
//! refresh.

use std::collections::HashMap;
use std::sync::RwLock;

use lb_protocol::device::DEFAULT_BRIDGE_POOL_CAP;

use crate::error::{MeshError, MeshResult};

/// Exponential moving average smoothing factor for per-destination ack
/// latency (design note "Bridge rotation").
const EMA_ALPHA: f64 = 0.3;

#[derive(Default)]
struct BridgeEntry {
    /// Running EMA of ack latency in milliseconds, per destination device.
    latency_ema_ms: HashMap<u8, f64>,
}

pub struct BridgePool {
    cap: usize,
    ready: RwLock<HashMap<u8, BridgeEntry>>,
    /// Round-robin cursor used when no latency history exists yet.
    round_robin: RwLock<usize>,
}

impl BridgePool {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            ready: RwLock::new(HashMap::new()),
            round_robin: RwLock::new(0),
        }
    }

    pub fn with_default_cap() -> Self {
        Self::new(DEFAULT_BRIDGE_POOL_CAP)
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn len(&self) -> usize {
        self.ready.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, bridge_id: u8) -> bool {
        self.ready.read().unwrap().contains_key(&bridge_id)
    }

    /// Register a bridge as ready. Enforces I6: once at cap, further
    /// registrations are rejected (the caller still acks the handshake,
    /// it just doesn't mark the device control-ready).
    pub fn register(&self, bridge_id: u8) -> MeshResult<()> {
        let mut ready = self.ready.write().unwrap();
        if ready.contains_key(&bridge_id) {
            return Ok(());
        }
        if ready.len() >= self.cap {
            return Err(MeshError::BridgePoolFull { cap: self.cap });
        }
        ready.insert(bridge_id, BridgeEntry::default());
        Ok(())
    }

    /// Remove a bridge, e.g. on disconnect.
    pub fn unregister(&self, bridge_id: u8) {
        self.ready.write().unwrap().remove(&bridge_id);
    }

    pub fn ready_ids(&self) -> Vec<u8> {
        self.ready.read().unwrap().keys().copied().collect()
    }

    /// Select up to `count` bridges to dispatch a command for `device_id`,
    /// preferring the ones with the fastest known EMA latency for that
    /// destination, falling back to round-robin when no history exists.
    pub fn select_targets(&self, device_id: u8, count: usize) -> MeshResult<Vec<u8>> {
        let ready = self.ready.read().unwrap();
        if ready.is_empty() {
            return Err(MeshError::NoBridgeAvailable);
        }

        let mut with_history: Vec<(u8, f64)> = ready
            .iter()
            .filter_map(|(id, entry)| entry.latency_ema_ms.get(&device_id).map(|ms| (*id, *ms)))
            .collect();
        with_history.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap());

        let mut targets: Vec<u8> = with_history.into_iter().map(|(id, _)| id).collect();
        if targets.len() < count {
            let mut all_ids: Vec<u8> = ready.keys().copied().collect();
            all_ids.sort_unstable();
            drop(ready);
            let mut cursor = self.round_robin.write().unwrap();
            for _ in 0..all_ids.len() {
                let candidate = all_ids[*cursor % all_ids.len()];
                *cursor = cursor.wrapping_add(1);
                if !targets.contains(&candidate) {
                    targets.push(candidate);
                }
                if targets.len() >= count {
                    break;
                }
            }
        }
        targets.truncate(count);
        Ok(targets)
    }

    /// Pick a single bridge for periodic mesh-info refresh, rotating across
    /// the ready pool each call.
    pub fn next_for_periodic_refresh(&self) -> Option<u8> {
        let ready = self.ready.read().unwrap();
        if ready.is_empty() {
            return None;
        }
        let mut ids: Vec<u8> = ready.keys().copied().collect();
        ids.sort_unstable();
        drop(ready);
        let mut cursor = self.round_robin.write().unwrap();
        let chosen = ids[*cursor % ids.len()];
        *cursor = cursor.wrapping_add(1);
        Some(chosen)
    }

    /// Record an ack latency sample, updating the EMA for `(bridge, device)`.
    pub fn record_ack_latency(&self, bridge_id: u8, device_id: u8, latency_ms: f64) {
        let mut ready = self.ready.write().unwrap();
        if let Some(entry) = ready.get_mut(&bridge_id) {
            let ema = entry.latency_ema_ms.entry(device_id).or_insert(latency_ms);
            *ema = EMA_ALPHA * latency_ms + (1.0 - EMA_ALPHA) * *ema;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cap_enforced_i6() {
        let pool = BridgePool::new(2);
        pool.register(1).unwrap();
        pool.register(2).unwrap();
        assert!(matches!(
            pool.register(3),
            Err(MeshError::BridgePoolFull { cap: 2 })
        ));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn re_registering_same_bridge_is_a_no_op() {
        let pool = BridgePool::new(1);
        pool.register(1).unwrap();
        pool.register(1).unwrap();
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn empty_pool_has_no_bridge_available() {
        let pool = BridgePool::new(4);
        assert!(matches!(
            pool.select_targets(26, 2),
            Err(MeshError::NoBridgeAvailable)
        ));
        assert!(pool.next_for_periodic_refresh().is_none());
    }

    #[test]
    fn select_targets_prefers_fastest_history() {
        let pool = BridgePool::new(4);
        pool.register(1).unwrap();
        pool.register(2).unwrap();
        pool.register(3).unwrap();
        pool.record_ack_latency(1, 26, 500.0);
        pool.record_ack_latency(2, 26, 50.0);
        let targets = pool.select_targets(26, 2).unwrap();
        assert_eq!(targets[0], 2);
    }

    #[test]
    fn periodic_refresh_rotates() {
        let pool = BridgePool::new(4);
        pool.register(1).unwrap();
        pool.register(2).unwrap();
        let first = pool.next_for_periodic_refresh().unwrap();
        let second = pool.next_for_periodic_refresh().unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn unregister_frees_capacity() {
        let pool = BridgePool::new(1);
        pool.register(1).unwrap();
        pool.unregister(1);
        pool.register(2).unwrap();
        assert!(pool.contains(2));
    }
}
