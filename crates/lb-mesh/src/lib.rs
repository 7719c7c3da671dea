//! C2 (device/group in-memory model, availability tracking) and C5 (mesh &
//! refresh controller, bridge pool, bridge rotation) for the lighting
//! controller.
//!
//! No socket I/O lives here: `MeshTransport` is the seam `lb-server` plugs a
//! real bridge connection into, the same way `lb-mqtt::Channel` is the seam
//! for the broker.

pub mod bridge_pool;
pub mod error;
pub mod group_store;
pub mod mesh_state;
pub mod refresh;
pub mod store;

pub use bridge_pool::BridgePool;
pub use error::{MeshError, MeshResult};
pub use group_store::GroupStore;
pub use mesh_state::MeshState;
pub use refresh::{MeshTransport, RefreshController, DEFAULT_REFRESH_INTERVAL};
pub use store::{AvailabilityChange, DeviceStore};
