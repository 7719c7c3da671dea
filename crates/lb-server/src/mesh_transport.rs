//! Concrete `MeshTransport` wiring a mesh-info request onto the shared
//! per-bridge writer queue (§4.5). The reply is a `MeshInfo` packet the
//! connection reader's own dispatch loop folds into `DeviceStore` — this
//! module only covers issuing the request.

use std::sync::Arc;

use async_trait::async_trait;
use lb_mesh::{MeshError, MeshResult, MeshTransport};
use lb_protocol::packet::{self, MessageType};

use crate::registry::ConnectionRegistry;

pub struct BridgeMeshTransport {
    registry: Arc<ConnectionRegistry>,
}

impl BridgeMeshTransport {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl MeshTransport for BridgeMeshTransport {
    async fn ask_mesh_info(&self, bridge_id: u8) -> MeshResult<()> {
        let frame = packet::encode(MessageType::MeshInfoRequest, 0, &[]);
        self.registry
            .send(bridge_id, frame)
            .await
            .map_err(|_| MeshError::NoBridgeAvailable)
    }
}
