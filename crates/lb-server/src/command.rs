//! C4: semantic command objects layered over the connection engine's
//! dispatch-and-ack machinery (§4.4).
//!
//! Every per-device command follows the same shape: check the capability,
//! throttle-gate via I1, pick bridge targets, encode and queue the frame,
//! publish an optimistic state where the spec calls for one, then await the
//! ack (or the correlator's sweep timeout), clear the throttle and kick an
//! event-driven mesh refresh. Group commands follow the same shape addressed
//! at the group instead of a single device, plus the post-ack switch sync
//! from §4.4.

use std::sync::Arc;
use std::time::Instant;

use rumqttc::QoS;
use serde::Serialize;
use tokio::sync::oneshot;

use lb_mesh::mesh_state::MeshState;
use lb_mesh::refresh::RefreshController;
use lb_mesh::{MeshError, MeshTransport};
use lb_mqtt::{publish, Channel};
use lb_protocol::device::{Capabilities, CommandKind, Device, FanPreset};
use lb_protocol::packet::{self, ControlField, PowerState, Rgb, StatusFields};
use lb_protocol::topics;

use crate::ack::{AckCorrelator, AckOutcome};
use crate::error::{ServerError, ServerResult};
use crate::perf::PerfTracker;
use crate::registry::ConnectionRegistry;

/// Bridges a single command is dispatched across simultaneously (§4.3
/// "Dispatch selection").
pub const COMMAND_TARGETS: usize = 2;

/// Outcome of a delivered command: the bridge that acked and, if the ack
/// carried one, the post-command state it reported.
#[derive(Debug, Clone)]
pub struct CommandAck {
    pub bridge_id: u8,
    pub status: Option<StatusFields>,
}

/// Light-style JSON shape published to a group's own `group-<id>` entity
/// topic, mirroring `lb_mqtt::publish`'s per-device payload fields.
#[derive(Debug, Serialize)]
struct GroupStatePayload {
    state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    brightness: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    color_mode: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    color_temp: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rgb: Option<Rgb>,
}

/// The semantic command surface (§4.4), holding everything needed to turn a
/// `set_*`/`group_set_*` call into a dispatched packet, an optimistic
/// publish, and a correlated ack.
pub struct CommandApi<T: MeshTransport> {
    mesh: Arc<MeshState>,
    registry: Arc<ConnectionRegistry>,
    acks: Arc<AckCorrelator>,
    mqtt: Arc<dyn Channel>,
    base_topic: String,
    refresh: Arc<RefreshController<T>>,
    perf: PerfTracker,
}

impl<T: MeshTransport> CommandApi<T> {
    pub fn new(
        mesh: Arc<MeshState>,
        registry: Arc<ConnectionRegistry>,
        acks: Arc<AckCorrelator>,
        mqtt: Arc<dyn Channel>,
        base_topic: impl Into<String>,
        refresh: Arc<RefreshController<T>>,
    ) -> Self {
        Self::with_perf_tracker(mesh, registry, acks, mqtt, base_topic, refresh, PerfTracker::disabled())
    }

    pub fn with_perf_tracker(
        mesh: Arc<MeshState>,
        registry: Arc<ConnectionRegistry>,
        acks: Arc<AckCorrelator>,
        mqtt: Arc<dyn Channel>,
        base_topic: impl Into<String>,
        refresh: Arc<RefreshController<T>>,
        perf: PerfTracker,
    ) -> Self {
        Self {
            mesh,
            registry,
            acks,
            mqtt,
            base_topic: base_topic.into(),
            refresh,
            perf,
        }
    }

    pub async fn set_power(&self, device_id: u8, on: bool) -> ServerResult<CommandAck> {
        let (rx, sent_at) = self
            .begin_dispatch(device_id, CommandKind::Power, Capabilities::ON_OFF, ControlField::Power(on))
            .await?;
        self.publish_optimistic(device_id, |s| {
            s.power = if on { PowerState::On } else { PowerState::Off };
        })
        .await;
        self.finish_dispatch(device_id, rx, sent_at).await
    }

    pub async fn set_brightness(&self, device_id: u8, pct: u8) -> ServerResult<CommandAck> {
        if pct > 100 {
            return Err(ServerError::OutOfRange { value: pct as i64, min: 0, max: 100 });
        }
        let wire = packet::brightness_pct_to_wire(pct);
        let (rx, sent_at) = self
            .begin_dispatch(
                device_id,
                CommandKind::Brightness,
                Capabilities::BRIGHTNESS,
                ControlField::Brightness(wire),
            )
            .await?;
        self.publish_optimistic(device_id, |s| s.brightness = Some(pct)).await;
        self.finish_dispatch(device_id, rx, sent_at).await
    }

    /// Color temperature is clamped to the device's declared Kelvin range
    /// rather than rejected (§8 "Boundary behaviors"). No optimistic publish:
    /// per the design note on optimistic-vs-reactive commands, color
    /// temperature is corrected by the ack's reported state or the next
    /// mesh-info, not published ahead of it.
    pub async fn set_color_temperature(&self, device_id: u8, k: u16) -> ServerResult<CommandAck> {
        let device = self.mesh.devices.get(device_id).ok_or(MeshError::UnknownDevice(device_id))?;
        let k = match device.color_temp_range_k {
            Some((min, max)) => k.clamp(min, max),
            None => k,
        };
        let (rx, sent_at) = self
            .begin_dispatch(device_id, CommandKind::ColorTemp, Capabilities::COLOR_TEMP, ControlField::ColorTemp(k))
            .await?;
        self.finish_dispatch(device_id, rx, sent_at).await
    }

    /// No optimistic publish, for the same reason as color temperature.
    pub async fn set_rgb(&self, device_id: u8, rgb: Rgb) -> ServerResult<CommandAck> {
        let (rx, sent_at) = self
            .begin_dispatch(device_id, CommandKind::Rgb, Capabilities::RGB, ControlField::Rgb(rgb))
            .await?;
        self.finish_dispatch(device_id, rx, sent_at).await
    }

    pub async fn set_fan_speed(&self, device_id: u8, preset: FanPreset) -> ServerResult<CommandAck> {
        let wire = packet::brightness_pct_to_wire(preset.to_brightness_pct());
        let (rx, sent_at) = self
            .begin_dispatch(device_id, CommandKind::FanSpeed, Capabilities::FAN_SPEED, ControlField::FanSpeed(wire))
            .await?;
        self.publish_optimistic(device_id, |s| s.brightness = Some(preset.to_brightness_pct()))
            .await;
        self.finish_dispatch(device_id, rx, sent_at).await
    }

    pub async fn group_set_power(&self, group_id: u16, on: bool) -> ServerResult<CommandAck> {
        self.dispatch_group(group_id, ControlField::Power(on), move |s| {
            s.power = if on { PowerState::On } else { PowerState::Off };
        })
        .await
    }

    pub async fn group_set_brightness(&self, group_id: u16, pct: u8) -> ServerResult<CommandAck> {
        if pct > 100 {
            return Err(ServerError::OutOfRange { value: pct as i64, min: 0, max: 100 });
        }
        let wire = packet::brightness_pct_to_wire(pct);
        self.dispatch_group(group_id, ControlField::Brightness(wire), move |s| {
            s.brightness = Some(pct);
        })
        .await
    }

    /// Group color temperature/RGB publish optimistically only at the
    /// group's own entity topic, never per member (§9 design note): unlike
    /// power and brightness, a single Kelvin or RGB value doesn't aggregate
    /// sensibly from a mix of member states, so there is no per-member
    /// value to pre-publish ahead of the ack.
    pub async fn group_set_color_temperature(&self, group_id: u16, k: u16) -> ServerResult<CommandAck> {
        self.mesh.groups.get(group_id).ok_or(MeshError::UnknownGroup(group_id))?;
        let (rx, sent_at, group_addr) = self.dispatch_group_frame(group_id, ControlField::ColorTemp(k)).await?;
        self.publish_group_optimistic(group_id, |p| {
            p.color_mode = Some("color_temp");
            p.color_temp = Some(k);
        })
        .await;
        self.finish_group_dispatch(group_id, group_addr, rx, sent_at).await
    }

    /// No per-member pre-publish, for the same reason as color temperature.
    pub async fn group_set_rgb(&self, group_id: u16, rgb: Rgb) -> ServerResult<CommandAck> {
        self.mesh.groups.get(group_id).ok_or(MeshError::UnknownGroup(group_id))?;
        let (rx, sent_at, group_addr) = self.dispatch_group_frame(group_id, ControlField::Rgb(rgb)).await?;
        self.publish_group_optimistic(group_id, |p| {
            p.color_mode = Some("rgb");
            p.rgb = Some(rgb);
        })
        .await;
        self.finish_group_dispatch(group_id, group_addr, rx, sent_at).await
    }

    /// Re-publish each switch member's state to match the group's aggregated
    /// power, skipping any member with its own `pending_command` set —
    /// individual control takes precedence (§4.4, S2).
    pub async fn sync_group_switches(&self, group_id: u16) -> ServerResult<()> {
        let group = self.mesh.groups.get(group_id).ok_or(MeshError::UnknownGroup(group_id))?;
        let agg = self.mesh.groups.aggregate(group_id, &self.mesh.devices)?;
        for member_id in &group.member_ids {
            let Some(device) = self.mesh.devices.get(*member_id) else {
                continue;
            };
            if !device.is_switch || device.pending_command.is_some() {
                continue;
            }
            if let Ok(updated) = self.mesh.devices.apply_optimistic(*member_id, |s| s.power = agg.power) {
                self.publish_state(&updated).await;
            }
        }
        Ok(())
    }

    /// Capability check, throttle gate (I1), bridge selection, ack
    /// registration, and frame dispatch. Returns the shared ack receiver and
    /// the time the frames went out, for latency bookkeeping.
    async fn begin_dispatch(
        &self,
        device_id: u8,
        kind: CommandKind,
        required: Capabilities,
        field: ControlField,
    ) -> ServerResult<(oneshot::Receiver<AckOutcome>, Instant)> {
        let device = self.mesh.devices.get(device_id).ok_or(MeshError::UnknownDevice(device_id))?;
        if !device.has(required) {
            return Err(ServerError::Unsupported(device_id));
        }
        if !self.mesh.devices.take_pending(device_id, kind)? {
            return Err(ServerError::Throttled);
        }

        let targets = match self.mesh.bridges.select_targets(device_id, COMMAND_TARGETS) {
            Ok(targets) => targets,
            Err(err) => {
                let _ = self.mesh.devices.clear_pending(device_id);
                return Err(err.into());
            }
        };

        let dispatch_targets = self.allocate_msg_ids(&targets)?;
        let rx = self.acks.register_dispatch(device_id, &dispatch_targets);
        let sent_at = Instant::now();
        for (bridge_id, msg_id) in &dispatch_targets {
            let frame = packet::encode_control(*msg_id, device_id, *msg_id, field);
            self.send_or_warn(*bridge_id, frame).await;
        }
        Ok((rx, sent_at))
    }

    async fn finish_dispatch(
        &self,
        device_id: u8,
        rx: oneshot::Receiver<AckOutcome>,
        sent_at: Instant,
    ) -> ServerResult<CommandAck> {
        let outcome = match rx.await {
            Ok(AckOutcome::Acked { bridge_id, status }) => {
                self.mesh
                    .bridges
                    .record_ack_latency(bridge_id, device_id, sent_at.elapsed().as_secs_f64() * 1000.0);
                let _ = self.mesh.devices.clear_pending(device_id);
                self.refresh.refresh_now().await;
                Ok(CommandAck { bridge_id, status })
            }
            Ok(AckOutcome::Timeout) | Err(_) => {
                let _ = self.mesh.devices.clear_pending(device_id);
                Err(ServerError::Timeout)
            }
        };
        self.perf.record("command_dispatch", sent_at);
        outcome
    }

    /// Group commands address a single packet at the group rather than a
    /// device, so they skip per-device capability/throttle checks (groups
    /// have no `Device` entry) and instead pre-publish each non-switch
    /// member's expected state before awaiting the ack (§4.4).
    async fn dispatch_group(
        &self,
        group_id: u16,
        field: ControlField,
        optimistic: impl Fn(&mut lb_protocol::device::DeviceState) + Copy,
    ) -> ServerResult<CommandAck> {
        let group = self.mesh.groups.get(group_id).ok_or(MeshError::UnknownGroup(group_id))?;
        let (rx, sent_at, group_addr) = self.dispatch_group_frame(group_id, field).await?;

        for member_id in &group.member_ids {
            let Some(device) = self.mesh.devices.get(*member_id) else {
                continue;
            };
            if device.is_switch {
                continue;
            }
            if let Ok(updated) = self.mesh.devices.apply_optimistic(*member_id, optimistic) {
                self.publish_state(&updated).await;
            }
        }

        self.finish_group_dispatch(group_id, group_addr, rx, sent_at).await
    }

    /// Select bridge targets and send the control frame addressed at the
    /// group, without touching any member or group state. Shared by every
    /// group command; callers handle their own pre-ack publish strategy.
    async fn dispatch_group_frame(
        &self,
        group_id: u16,
        field: ControlField,
    ) -> ServerResult<(oneshot::Receiver<AckOutcome>, Instant, u8)> {
        // The wire addresses devices with a single byte; a group is sent to
        // its id truncated to that width, the same convention the vendor
        // mesh uses for its own reserved group-address range (see DESIGN.md).
        let group_addr = (group_id & 0xff) as u8;

        let targets = self
            .mesh
            .bridges
            .select_targets(group_addr, COMMAND_TARGETS)
            .map_err(ServerError::from)?;
        let dispatch_targets = self.allocate_msg_ids(&targets)?;
        let rx = self.acks.register_dispatch(group_addr, &dispatch_targets);
        let sent_at = Instant::now();
        for (bridge_id, msg_id) in &dispatch_targets {
            let frame = packet::encode_control(*msg_id, group_addr, *msg_id, field);
            self.send_or_warn(*bridge_id, frame).await;
        }
        Ok((rx, sent_at, group_addr))
    }

    /// Await the correlated ack for a group dispatch, then run the same
    /// post-ack bookkeeping every group command shares: switch sync and a
    /// refresh kick.
    async fn finish_group_dispatch(
        &self,
        group_id: u16,
        group_addr: u8,
        rx: oneshot::Receiver<AckOutcome>,
        sent_at: Instant,
    ) -> ServerResult<CommandAck> {
        let outcome = match rx.await {
            Ok(AckOutcome::Acked { bridge_id, status }) => {
                self.mesh
                    .bridges
                    .record_ack_latency(bridge_id, group_addr, sent_at.elapsed().as_secs_f64() * 1000.0);
                self.sync_group_switches(group_id).await?;
                self.refresh.refresh_now().await;
                Ok(CommandAck { bridge_id, status })
            }
            Ok(AckOutcome::Timeout) | Err(_) => Err(ServerError::Timeout),
        };
        self.perf.record("group_command_dispatch", sent_at);
        outcome
    }

    /// Publish a light-style JSON state to the group's own entity topic
    /// (`group-<id>`), starting from its current aggregated power/brightness
    /// and layering in the caller's color fields — the group-level-only
    /// optimistic publish color temperature/RGB commands use instead of a
    /// per-member pre-publish.
    async fn publish_group_optimistic(&self, group_id: u16, mutate: impl FnOnce(&mut GroupStatePayload)) {
        let Ok(agg) = self.mesh.groups.aggregate(group_id, &self.mesh.devices) else {
            return;
        };
        let mut payload = GroupStatePayload {
            state: match agg.power {
                PowerState::On => "ON",
                PowerState::Off | PowerState::Unknown => "OFF",
            },
            brightness: agg.brightness,
            color_mode: None,
            color_temp: None,
            rgb: None,
        };
        mutate(&mut payload);

        let topic = topics::status(&self.base_topic, &topics::group_hass_id(group_id));
        let bytes = match serde_json::to_vec(&payload) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(group_id, %err, "failed to serialize group state payload");
                return;
            }
        };
        if let Err(err) = self.mqtt.publish(&topic, &bytes, QoS::AtMostOnce, false).await {
            tracing::warn!(%topic, %err, "failed to publish optimistic group state");
        }
    }

    fn allocate_msg_ids(&self, bridge_ids: &[u8]) -> ServerResult<Vec<(u8, u16)>> {
        bridge_ids
            .iter()
            .map(|id| Ok((*id, self.registry.next_msg_id(*id)?)))
            .collect()
    }

    async fn send_or_warn(&self, bridge_id: u8, frame: Vec<u8>) {
        if let Err(err) = self.registry.send(bridge_id, frame).await {
            tracing::warn!(bridge_id, %err, "failed to dispatch command to bridge");
        }
    }

    async fn publish_optimistic(&self, device_id: u8, mutate: impl FnOnce(&mut lb_protocol::device::DeviceState)) {
        if let Ok(updated) = self.mesh.devices.apply_optimistic(device_id, mutate) {
            self.publish_state(&updated).await;
        }
    }

    async fn publish_state(&self, device: &Device) {
        for msg in publish::state_messages(device, &self.base_topic) {
            let qos = if msg.retain { QoS::AtLeastOnce } else { QoS::AtMostOnce };
            if let Err(err) = self.mqtt.publish(&msg.topic, &msg.payload, qos, msg.retain).await {
                tracing::warn!(topic = %msg.topic, %err, "failed to publish optimistic state");
            }
        }
    }
}
