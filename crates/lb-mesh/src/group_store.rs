use std::collections::HashMap;
use std::sync::RwLock;

use lb_protocol::group::{aggregate, Group, GroupAggregate};

use crate::error::{MeshError, MeshResult};
use crate::store::DeviceStore;

pub struct GroupStore {
    groups: RwLock<HashMap<u16, Group>>,
}

impl GroupStore {
    pub fn new(groups: impl IntoIterator<Item = Group>) -> Self {
        let map = groups.into_iter().map(|g| (g.id, g)).collect();
        Self {
            groups: RwLock::new(map),
        }
    }

    pub fn get(&self, id: u16) -> Option<Group> {
        self.groups.read().unwrap().get(&id).cloned()
    }

    pub fn all(&self) -> Vec<Group> {
        self.groups.read().unwrap().values().cloned().collect()
    }

    /// Recompute a group's aggregate view from the live device store.
    /// Pure at publish time; nothing here is cached (§9 "Group aggregation").
    pub fn aggregate(&self, group_id: u16, devices: &DeviceStore) -> MeshResult<GroupAggregate> {
        let group = self.get(group_id).ok_or(MeshError::UnknownGroup(group_id))?;
        let members: Vec<_> = group
            .member_ids
            .iter()
            .filter_map(|id| devices.get(*id))
            .collect();
        let refs: Vec<&lb_protocol::device::Device> = members.iter().collect();
        Ok(aggregate(&refs))
    }

    /// Whether this group is fan-only, per the live device store (§4.6).
    pub fn is_fan_only(&self, group_id: u16, devices: &DeviceStore) -> MeshResult<bool> {
        let group = self.get(group_id).ok_or(MeshError::UnknownGroup(group_id))?;
        let members: Vec<_> = group
            .member_ids
            .iter()
            .filter_map(|id| devices.get(*id))
            .collect();
        let refs: Vec<&lb_protocol::device::Device> = members.iter().collect();
        Ok(group.is_fan_only(&refs))
    }
}
