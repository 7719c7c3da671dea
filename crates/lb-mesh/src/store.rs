//! C2: the canonical in-memory device/group state.
//!
//! Mutating methods are the *only* entry points that touch `Device`/`Group`
//! fields; every other component (MQTT publisher, command API, refresh
//! controller, connection reader) goes through this store, which serializes
//! access with a single `RwLock` rather than one lock per device — at the
//! device counts this protocol targets (≤255 per account) that single lock
//! is never meaningfully contended, and it keeps the invariant that exactly
//! one code path writes `device.online` easy to audit (I3).

use std::collections::HashMap;
use std::sync::RwLock;

use lb_protocol::device::{Availability, CommandKind, Device, DeviceState, OFFLINE_THRESHOLD};
use lb_protocol::packet::StatusFields;

use crate::error::{MeshError, MeshResult};

/// What happened to `device.online` as a result of `apply_status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvailabilityChange {
    Unchanged,
    BecameOnline,
    BecameOffline,
}

pub struct DeviceStore {
    devices: RwLock<HashMap<u8, Device>>,
}

impl DeviceStore {
    pub fn new(devices: impl IntoIterator<Item = Device>) -> Self {
        let map = devices.into_iter().map(|d| (d.id, d)).collect();
        Self {
            devices: RwLock::new(map),
        }
    }

    /// Clone of a device's current state, for publishers and read-only callers.
    pub fn get(&self, id: u8) -> Option<Device> {
        self.devices.read().unwrap().get(&id).cloned()
    }

    pub fn all(&self) -> Vec<Device> {
        self.devices.read().unwrap().values().cloned().collect()
    }

    pub fn bridge_ids(&self) -> Vec<u8> {
        self.devices
            .read()
            .unwrap()
            .values()
            .filter(|d| d.is_bridge)
            .map(|d| d.id)
            .collect()
    }

    /// Apply a status tuple (from a status broadcast, an ack-with-state, or
    /// one entry of a mesh-info snapshot) to the named device.
    ///
    /// This is the single code path that may write `device.availability`
    /// (I3), implementing the exact algorithm in §4.2. Fields other than
    /// `connected_to_mesh` are copied through whenever the sender provided
    /// them; idempotent when called twice with identical fields.
    pub fn apply_status(&self, fields: &StatusFields) -> MeshResult<AvailabilityChange> {
        let mut map = self.devices.write().unwrap();
        let device = map
            .get_mut(&fields.device_id)
            .ok_or(MeshError::UnknownDevice(fields.device_id))?;

        device.state.power = fields.power;
        if let Some(b) = fields.brightness_wire {
            device.state.brightness = Some(lb_protocol::packet::brightness_wire_to_pct(b));
        }
        if let Some(t) = fields.color_temp_wire {
            device.state.color_temp = Some(t);
        }
        if let Some(rgb) = fields.rgb {
            device.state.rgb = Some(rgb);
        }
        device.state.connected_to_mesh = fields.connected_to_mesh;

        Ok(apply_availability(&mut device.availability, fields.connected_to_mesh))
    }

    /// `mark_ready`: transitions a freshly authenticated connection into the
    /// control-ready set. Bridge-pool admission (I6) is handled by the
    /// caller (`MeshState::mark_ready`), since that decision spans both the
    /// device map and the bridge pool.
    pub fn set_bridge_flag(&self, id: u8, is_bridge: bool) -> MeshResult<()> {
        let mut map = self.devices.write().unwrap();
        let device = map.get_mut(&id).ok_or(MeshError::UnknownDevice(id))?;
        device.is_bridge = is_bridge;
        Ok(())
    }

    /// Atomic "set if not already pending" (I1). Returns `false`, without
    /// mutating anything, if a command of this kind is already in flight.
    pub fn take_pending(&self, id: u8, kind: CommandKind) -> MeshResult<bool> {
        let mut map = self.devices.write().unwrap();
        let device = map.get_mut(&id).ok_or(MeshError::UnknownDevice(id))?;
        if device.pending_command == Some(kind) {
            return Ok(false);
        }
        device.pending_command = Some(kind);
        Ok(true)
    }

    /// Idempotent release of the throttle latch (ack, timeout, or a later
    /// aggregated mesh-info all call this the same way).
    pub fn clear_pending(&self, id: u8) -> MeshResult<()> {
        let mut map = self.devices.write().unwrap();
        let device = map.get_mut(&id).ok_or(MeshError::UnknownDevice(id))?;
        device.pending_command = None;
        Ok(())
    }

    /// Optimistic, locally-predictable state update (§4.4): the command API
    /// applies the expected post-command state immediately, ahead of any
    /// ack, so MQTT reflects intent without waiting on the mesh round trip.
    /// Only `DeviceState` fields are touched here; `availability` stays
    /// untouched, so this path never competes with `apply_status` over I3.
    pub fn apply_optimistic(&self, id: u8, f: impl FnOnce(&mut DeviceState)) -> MeshResult<Device> {
        let mut map = self.devices.write().unwrap();
        let device = map.get_mut(&id).ok_or(MeshError::UnknownDevice(id))?;
        f(&mut device.state);
        Ok(device.clone())
    }
}

/// The availability algorithm from §4.2, factored out so it is exercised
/// identically from both `apply_status` and unit tests.
fn apply_availability(avail: &mut Availability, connected_to_mesh: bool) -> AvailabilityChange {
    if !connected_to_mesh {
        avail.offline_count += 1;
        if avail.offline_count >= OFFLINE_THRESHOLD && avail.online {
            avail.online = false;
            return AvailabilityChange::BecameOffline;
        }
    } else {
        avail.offline_count = 0;
        if !avail.online {
            avail.online = true;
            return AvailabilityChange::BecameOnline;
        }
    }
    AvailabilityChange::Unchanged
}
