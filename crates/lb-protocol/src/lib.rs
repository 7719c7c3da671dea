//! Shared wire types, device/group data model, MQTT topic table, and the
//! persisted configuration schema for the lighting bridge controller.
//!
//! This crate has no I/O of its own: it is pure types and pure functions,
//! depended on by every other crate in the workspace.

pub mod config;
pub mod device;
pub mod error;
pub mod group;
pub mod packet;
pub mod topics;

pub use device::*;
pub use error::{ProtocolError, ProtocolResult};
pub use group::{aggregate, Group, GroupAggregate};
pub use packet::*;
