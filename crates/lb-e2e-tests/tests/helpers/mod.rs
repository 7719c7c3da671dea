//! Shared test harness wiring the real mesh, registry, ack correlator, and
//! MQTT mock together — the same components `supervisor::run` assembles in
//! production, minus the TLS listener itself.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use lb_mesh::mesh_state::MeshState;
use lb_mesh::refresh::RefreshController;
use lb_mesh::{BridgePool, DeviceStore, GroupStore, MeshResult, MeshTransport};
use lb_mqtt::MockChannel;
use lb_protocol::device::{Capabilities, Device};
use lb_protocol::group::Group;
use lb_server::ack::AckCorrelator;
use lb_server::command::CommandApi;
use lb_server::registry::ConnectionRegistry;

pub const ACCOUNT_ID: u64 = 123;
pub const BASE_TOPIC: &str = "cync";

/// Records every mesh-info request it is asked to issue; real dispatch
/// happens over `ConnectionRegistry` frames, so this double only needs to
/// observe that a refresh was kicked.
#[derive(Default)]
pub struct RecordingTransport {
    calls: std::sync::Mutex<Vec<u8>>,
}

#[async_trait]
impl MeshTransport for RecordingTransport {
    async fn ask_mesh_info(&self, bridge_id: u8) -> MeshResult<()> {
        self.calls.lock().unwrap().push(bridge_id);
        Ok(())
    }
}

impl RecordingTransport {
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

/// A Hallway scenario matching the spec's worked examples: switch 26, bulbs
/// 4 and 6, grouped as "Hallway Lights" (group 9001).
pub struct Harness {
    pub mesh: Arc<MeshState>,
    pub registry: Arc<ConnectionRegistry>,
    pub acks: Arc<AckCorrelator>,
    pub mqtt: Arc<MockChannel>,
    pub api: CommandApi<RecordingTransport>,
    pub transport: Arc<RecordingTransport>,
    /// Receivers for the frames queued on each registered bridge's writer.
    pub bridge_rx: std::collections::HashMap<u8, mpsc::Receiver<Vec<u8>>>,
}

impl Harness {
    pub fn new() -> Self {
        let mut bulb4 = Device::new(4, ACCOUNT_ID, "Hallway Bulb");
        bulb4.capabilities = Capabilities::ON_OFF | Capabilities::BRIGHTNESS | Capabilities::COLOR_TEMP;
        bulb4.color_temp_range_k = Some((2700, 6500));

        let mut bulb6 = Device::new(6, ACCOUNT_ID, "Hallway Bulb 2");
        bulb6.capabilities = Capabilities::ON_OFF | Capabilities::BRIGHTNESS;

        let mut switch26 = Device::new(26, ACCOUNT_ID, "Hallway Switch");
        switch26.is_switch = true;
        switch26.capabilities = Capabilities::ON_OFF | Capabilities::SWITCH;

        let devices = DeviceStore::new([bulb4, bulb6, switch26]);
        let groups = GroupStore::new([Group {
            id: 9001,
            name: "Hallway Lights".into(),
            member_ids: vec![4, 6, 26],
        }]);
        let bridges = Arc::new(BridgePool::with_default_cap());
        bridges.register(1).unwrap();

        let mesh = Arc::new(MeshState::new(devices, groups, bridges));
        let registry = Arc::new(ConnectionRegistry::new());
        let (tx, rx) = mpsc::channel(32);
        registry.register(1, tx);

        let acks = Arc::new(AckCorrelator::new());
        let mqtt = Arc::new(MockChannel::new());
        let transport = Arc::new(RecordingTransport::default());
        let refresh = Arc::new(RefreshController::new(transport.clone(), mesh.bridges.clone()));

        let api = CommandApi::new(mesh.clone(), registry.clone(), acks.clone(), mqtt.clone(), BASE_TOPIC, refresh);

        let mut bridge_rx = std::collections::HashMap::new();
        bridge_rx.insert(1u8, rx);

        Self { mesh, registry, acks, mqtt, api, transport, bridge_rx }
    }

    /// Register a second bridge and return its frame receiver, for tests
    /// that exercise dispatch across more than one ready bridge.
    pub fn add_bridge(&mut self, bridge_id: u8) -> mpsc::Receiver<Vec<u8>> {
        self.mesh.bridges.register(bridge_id).unwrap();
        let (tx, rx) = mpsc::channel(32);
        self.registry.register(bridge_id, tx);
        rx
    }

    pub fn hass_id(device_id: u8) -> String {
        format!("{ACCOUNT_ID}-{device_id}")
    }
}
