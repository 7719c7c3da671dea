//! Ties `DeviceStore` and `BridgePool` together for the one operation that
//! spans both: `mark_ready` (§4.2, §3 I6).

use std::sync::Arc;

use crate::bridge_pool::BridgePool;
use crate::error::{MeshError, MeshResult};
use crate::store::DeviceStore;

/// `bridges` is `Arc`-shared rather than owned outright: `lb-server`'s
/// `RefreshController` needs its own handle to the same pool to rotate
/// periodic mesh-info requests across it (§4.5).
pub struct MeshState {
    pub devices: DeviceStore,
    pub groups: crate::group_store::GroupStore,
    pub bridges: Arc<BridgePool>,
}

impl MeshState {
    pub fn new(
        devices: DeviceStore,
        groups: crate::group_store::GroupStore,
        bridges: Arc<BridgePool>,
    ) -> Self {
        Self {
            devices,
            groups,
            bridges,
        }
    }

    /// Transition a freshly authenticated connection to control-ready.
    /// If the device is a bridge, attempts bridge-pool admission (I6); on
    /// `BridgePoolFull`, the device is still known to the store (so status
    /// updates from it continue to apply) but is not added to the ready set,
    /// matching "handshake completes but device is not registered ready".
    pub fn mark_ready(&self, device_id: u8, is_bridge: bool) -> MeshResult<()> {
        if self.devices.get(device_id).is_none() {
            return Err(MeshError::UnknownDevice(device_id));
        }
        self.devices.set_bridge_flag(device_id, is_bridge)?;
        if is_bridge {
            self.bridges.register(device_id)?;
        }
        Ok(())
    }

    /// Remove a device from the ready bridge pool on disconnect. The device
    /// remains known to the store; only its control-ready status is revoked.
    pub fn mark_disconnected(&self, device_id: u8) {
        self.bridges.unregister(device_id);
    }
}
