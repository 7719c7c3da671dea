//! Registry of active bridge-connection writer handles (§4.3 "Dispatch
//! selection").
//!
//! `lb_mesh::BridgePool` tracks *which* bridges are ready; this registry
//! tracks *how to reach* each one: the outbound-frame channel its writer
//! task owns, and the monotonically increasing `msg_id` counter scoped to
//! that destination bridge (§4.3 "Ack correlation").

use std::collections::HashMap;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::mpsc;

use crate::error::{ServerError, ServerResult};

/// One outbound wire frame queued for a connection's writer task.
pub type OutboundFrame = Vec<u8>;

/// Writer-queue depth. A full queue applies backpressure to the caller
/// rather than growing unbounded (§5 "bounded; backpressure on full").
pub const WRITER_QUEUE_DEPTH: usize = 32;

struct BridgeHandle {
    sender: mpsc::Sender<OutboundFrame>,
    next_msg_id: AtomicU16,
}

/// Shared table of `bridge_id -> writer handle`, populated when a
/// connection reaches READY and removed on disconnect.
#[derive(Default)]
pub struct ConnectionRegistry {
    bridges: RwLock<HashMap<u8, Arc<BridgeHandle>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, bridge_id: u8, sender: mpsc::Sender<OutboundFrame>) {
        self.bridges.write().unwrap().insert(
            bridge_id,
            Arc::new(BridgeHandle {
                sender,
                next_msg_id: AtomicU16::new(1),
            }),
        );
    }

    pub fn unregister(&self, bridge_id: u8) {
        self.bridges.write().unwrap().remove(&bridge_id);
    }

    pub fn is_registered(&self, bridge_id: u8) -> bool {
        self.bridges.read().unwrap().contains_key(&bridge_id)
    }

    /// Allocate the next `msg_id` for a command dispatched through
    /// `bridge_id`. Starts at 1 and wraps, matching the wire field's `u16`
    /// width; wraparound collisions are no worse than the duplicate-seq
    /// tolerance the codec already builds in (§4.1).
    pub fn next_msg_id(&self, bridge_id: u8) -> ServerResult<u16> {
        let bridges = self.bridges.read().unwrap();
        let handle = bridges
            .get(&bridge_id)
            .ok_or(ServerError::Mesh(lb_mesh::error::MeshError::NoBridgeAvailable))?;
        Ok(handle.next_msg_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Queue a frame for `bridge_id`'s writer task.
    pub async fn send(&self, bridge_id: u8, frame: OutboundFrame) -> ServerResult<()> {
        let handle = {
            let bridges = self.bridges.read().unwrap();
            bridges
                .get(&bridge_id)
                .cloned()
                .ok_or(ServerError::Mesh(lb_mesh::error::MeshError::NoBridgeAvailable))?
        };
        handle
            .sender
            .send(frame)
            .await
            .map_err(|_| ServerError::Mesh(lb_mesh::error::MeshError::NoBridgeAvailable))
    }
}
