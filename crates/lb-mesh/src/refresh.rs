//! C5: periodic and event-driven mesh refresh (§4.5).
//!
//! The controller asks one ready bridge for a full mesh-info snapshot on a
//! fixed interval, and can be nudged to do so immediately after a command ack
//! so a change is reflected without waiting out the rest of the interval.
//! The transport is abstracted behind `MeshTransport` the same way the
//! teacher abstracts its interface behind a trait with a mock, so the
//! scheduling logic here can be tested without a real bridge connection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::bridge_pool::BridgePool;
use crate::error::MeshResult;

/// Default interval between unsolicited mesh-info requests.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(5);

/// Sends a mesh-info request to a specific bridge and waits for its reply to
/// be folded into the device store by the caller of the transport (the
/// packet reader's own dispatch loop owns applying `MeshInfo` bodies; this
/// trait only covers issuing the request).
#[async_trait]
pub trait MeshTransport: Send + Sync {
    async fn ask_mesh_info(&self, bridge_id: u8) -> MeshResult<()>;
}

/// Drives periodic and on-demand mesh-info requests against the ready bridge
/// pool, rotating which bridge is asked each time (§4.5's "pick a ready
/// bridge" is delegated to `BridgePool::next_for_periodic_refresh`).
pub struct RefreshController<T: MeshTransport> {
    transport: Arc<T>,
    bridges: Arc<BridgePool>,
    interval: Duration,
    requests_sent: AtomicU64,
}

impl<T: MeshTransport> RefreshController<T> {
    pub fn new(transport: Arc<T>, bridges: Arc<BridgePool>) -> Self {
        Self::with_interval(transport, bridges, DEFAULT_REFRESH_INTERVAL)
    }

    pub fn with_interval(transport: Arc<T>, bridges: Arc<BridgePool>, interval: Duration) -> Self {
        Self {
            transport,
            bridges,
            interval,
            requests_sent: AtomicU64::new(0),
        }
    }

    pub fn requests_sent(&self) -> u64 {
        self.requests_sent.load(Ordering::Relaxed)
    }

    /// Run the periodic loop until the process shuts down. Mirrors the
    /// teacher's heartbeat loop: a `tokio::time::interval` with the first
    /// tick (which fires immediately) consumed up front, so a refresh isn't
    /// fired the instant the controller starts.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            self.refresh_once().await;
        }
    }

    /// One refresh cycle: pick a ready bridge and ask it for mesh info.
    /// A missing bridge pool or a transport error is logged and swallowed —
    /// the next tick (or the next ack-triggered refresh) will try again.
    pub async fn refresh_once(&self) {
        let Some(bridge_id) = self.bridges.next_for_periodic_refresh() else {
            debug!("no ready bridge for mesh refresh, skipping cycle");
            return;
        };
        match self.transport.ask_mesh_info(bridge_id).await {
            Ok(()) => {
                self.requests_sent.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => warn!(bridge_id, %err, "mesh-info request failed"),
        }
    }

    /// Event-driven refresh: called after a command ack to pull a fresh
    /// snapshot sooner than the next periodic tick would.
    pub async fn refresh_now(&self) {
        self.refresh_once().await;
    }
}
