//! C8: process lifecycle. Parses configuration, constructs every other
//! component, starts the background tasks, and tears everything down in
//! the shutdown order from §4.8 once a signal arrives.

use std::sync::Arc;

use rumqttc::{Event, Packet, QoS};
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;

use lb_mesh::mesh_state::MeshState;
use lb_mesh::refresh::RefreshController;
use lb_mesh::{BridgePool, DeviceStore, GroupStore};
use lb_mqtt::{command as mqtt_command, Channel, MqttChannel};
use lb_protocol::config::ControllerConfig;
use lb_protocol::device::Device;
use lb_protocol::group::Group;
use lb_protocol::topics;

use crate::ack::{AckCorrelator, DEFAULT_ACK_TIMEOUT};
use crate::command::CommandApi;
use crate::config::ServerConfig;
use crate::connection::ConnectionContext;
use crate::error::{ServerError, ServerResult};
use crate::mesh_transport::BridgeMeshTransport;
use crate::perf::PerfTracker;
use crate::registry::ConnectionRegistry;
use crate::{connection, discovery_bridge, tls};

/// Grace period given to in-flight connection tasks to observe shutdown
/// before the process exits anyway (§4.8).
const SHUTDOWN_GRACE: std::time::Duration = std::time::Duration::from_secs(5);

/// Run the controller until a shutdown signal arrives. Owns every C1-C7
/// component for the lifetime of the process.
pub async fn run(config: ServerConfig) -> ServerResult<()> {
    let controller_config = ControllerConfig::load(&config.config_path)
        .map_err(|e| ServerError::Config(e.to_string()))?;
    let account_id = controller_config.account_id;

    let devices: Vec<Device> = controller_config
        .devices
        .iter()
        .map(|d| Device::from_config(d, account_id))
        .collect();
    let groups: Vec<Group> = controller_config
        .groups
        .iter()
        .map(|g| Group {
            id: g.id,
            name: g.name.clone(),
            member_ids: g.member_ids.clone(),
        })
        .collect();

    let device_store = DeviceStore::new(devices);
    let group_store = GroupStore::new(groups);
    let bridges = Arc::new(BridgePool::with_default_cap());
    let mesh = Arc::new(MeshState::new(device_store, group_store, bridges.clone()));

    let registry = Arc::new(ConnectionRegistry::new());
    let acks = Arc::new(AckCorrelator::new());

    let (cert_pem, key_pem) = tls::load_or_generate_cert(&config.tls_cert_path, &config.tls_key_path)?;
    let acceptor = tls::build_acceptor(&cert_pem, &key_pem)?;

    let (mqtt_channel, mut eventloop) = MqttChannel::new(&config.mqtt)?;
    let mqtt_channel = Arc::new(mqtt_channel);
    let mqtt_dyn: Arc<dyn Channel> = mqtt_channel.clone();
    let base_topic = config.mqtt.base_topic.clone();

    mqtt_channel.announce_online().await?;
    mqtt_dyn
        .subscribe(&topics::set_wildcard(&base_topic), QoS::AtLeastOnce)
        .await?;

    discovery_bridge::publish_all(&mqtt_dyn, &mesh, &base_topic, topics::group_hass_id).await;

    let transport = Arc::new(BridgeMeshTransport::new(registry.clone()));
    let refresh = Arc::new(RefreshController::new(transport, bridges.clone()));

    let perf = PerfTracker::new(config.perf_tracking, config.perf_threshold);
    let command_api = Arc::new(CommandApi::with_perf_tracker(
        mesh.clone(),
        registry.clone(),
        acks.clone(),
        mqtt_dyn.clone(),
        base_topic.clone(),
        refresh.clone(),
        perf,
    ));

    let refresh_handle = tokio::spawn(refresh.clone().run());
    let sweeper_handle = tokio::spawn(acks.clone().run_sweeper(DEFAULT_ACK_TIMEOUT));

    let mqtt_loop_handle = {
        let command_api = command_api.clone();
        let mesh = mesh.clone();
        let base_topic = base_topic.clone();
        tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        if let Some(cmd) = mqtt_command::parse(&base_topic, &publish.topic, &publish.payload) {
                            route_command(&command_api, &mesh, cmd).await;
                        }
                    }
                    Ok(_) => {}
                    Err(err) => {
                        tracing::warn!(%err, "mqtt event loop error, retrying");
                        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                    }
                }
            }
        })
    };

    let listener = TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(bind_addr = %config.bind_addr, "device-facing listener ready");

    let ctx = Arc::new(ConnectionContext {
        mesh: mesh.clone(),
        registry: registry.clone(),
        acks: acks.clone(),
        mqtt: mqtt_dyn.clone(),
        base_topic: base_topic.clone(),
        relay_config: config.relay.clone(),
    });

    let mut connections = JoinSet::new();
    accept_loop(listener, acceptor, ctx, &mut connections).await;

    tracing::info!("shutdown signal received, draining connections");
    let _ = tokio::time::timeout(SHUTDOWN_GRACE, async {
        while connections.join_next().await.is_some() {}
    })
    .await;
    connections.abort_all();

    refresh_handle.abort();
    sweeper_handle.abort();
    mqtt_loop_handle.abort();

    Ok(())
}

/// Accept connections until ctrl-c arrives, spawning one task per socket
/// into `connections` for the caller to drain on shutdown.
async fn accept_loop(
    listener: TcpListener,
    acceptor: TlsAcceptor,
    ctx: Arc<ConnectionContext>,
    connections: &mut JoinSet<()>,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let Ok((stream, peer)) = accepted else {
                    tracing::warn!("failed to accept device connection");
                    continue;
                };
                let acceptor = acceptor.clone();
                let ctx = ctx.clone();
                connections.spawn(async move {
                    match acceptor.accept(stream).await {
                        Ok(tls_stream) => connection::run(tls_stream, ctx).await,
                        Err(err) => tracing::warn!(%peer, %err, "tls handshake failed"),
                    }
                });
            }
            _ = tokio::signal::ctrl_c() => {
                return;
            }
        }
    }
}

/// Translate one classified MQTT command into a C4 call. Resolves the
/// `hass_id` the wire command names to an internal device or group id,
/// routing the group/device split at `group_hass_id`'s convention.
async fn route_command<T: lb_mesh::MeshTransport>(
    api: &CommandApi<T>,
    mesh: &MeshState,
    cmd: mqtt_command::IncomingCommand,
) {
    if let Some(group_id) = topics::parse_group_hass_id(&cmd.hass_id) {
        route_group_command(api, group_id, cmd.kind).await;
        return;
    }
    let Some(device_id) = mesh.devices.all().into_iter().find(|d| d.hass_id == cmd.hass_id).map(|d| d.id) else {
        tracing::debug!(hass_id = %cmd.hass_id, "command for unknown hass_id, ignoring");
        return;
    };
    route_device_command(api, device_id, cmd.kind).await;
}

async fn route_device_command<T: lb_mesh::MeshTransport>(
    api: &CommandApi<T>,
    device_id: u8,
    kind: mqtt_command::CommandPayload,
) {
    use mqtt_command::CommandPayload;
    let result = match kind {
        CommandPayload::Power(on) => api.set_power(device_id, on).await.map(|_| ()),
        CommandPayload::Brightness(pct) => api.set_brightness(device_id, pct).await.map(|_| ()),
        CommandPayload::ColorTemp(k) => api.set_color_temperature(device_id, k).await.map(|_| ()),
        CommandPayload::Rgb(rgb) => api.set_rgb(device_id, rgb).await.map(|_| ()),
        CommandPayload::FanPreset(preset) => api.set_fan_speed(device_id, preset).await.map(|_| ()),
        CommandPayload::LightJson(light) => {
            apply_light_command(api, device_id, light).await;
            Ok(())
        }
    };
    log_command_outcome(device_id, result);
}

async fn apply_light_command<T: lb_mesh::MeshTransport>(
    api: &CommandApi<T>,
    device_id: u8,
    light: mqtt_command::LightCommand,
) {
    if let Some(on) = light.power {
        log_command_outcome(device_id, api.set_power(device_id, on).await.map(|_| ()));
    }
    if let Some(pct) = light.brightness {
        log_command_outcome(device_id, api.set_brightness(device_id, pct).await.map(|_| ()));
    }
    if let Some(k) = light.color_temp {
        log_command_outcome(device_id, api.set_color_temperature(device_id, k).await.map(|_| ()));
    }
    if let Some(color) = light.color {
        let rgb = (color.r, color.g, color.b);
        log_command_outcome(device_id, api.set_rgb(device_id, rgb).await.map(|_| ()));
    }
}

async fn route_group_command<T: lb_mesh::MeshTransport>(
    api: &CommandApi<T>,
    group_id: u16,
    kind: mqtt_command::CommandPayload,
) {
    use mqtt_command::CommandPayload;
    let result = match kind {
        CommandPayload::Power(on) => api.group_set_power(group_id, on).await.map(|_| ()),
        CommandPayload::Brightness(pct) => api.group_set_brightness(group_id, pct).await.map(|_| ()),
        CommandPayload::ColorTemp(k) => api.group_set_color_temperature(group_id, k).await.map(|_| ()),
        CommandPayload::Rgb(rgb) => api.group_set_rgb(group_id, rgb).await.map(|_| ()),
        CommandPayload::LightJson(light) => {
            if let Some(on) = light.power {
                let _ = api.group_set_power(group_id, on).await;
            }
            if let Some(pct) = light.brightness {
                let _ = api.group_set_brightness(group_id, pct).await;
            }
            if let Some(k) = light.color_temp {
                let _ = api.group_set_color_temperature(group_id, k).await;
            }
            if let Some(color) = light.color {
                let rgb = (color.r, color.g, color.b);
                let _ = api.group_set_rgb(group_id, rgb).await;
            }
            Ok(())
        }
        // Fan preset has no group-level semantic command: fan-only groups
        // are never registered for discovery (§4.6), so no topic routes one
        // here; ignored rather than guessed at.
        CommandPayload::FanPreset(_) => Ok(()),
    };
    if let Err(err) = result {
        tracing::debug!(group_id, %err, "group command did not complete");
    }
}

fn log_command_outcome(device_id: u8, result: ServerResult<()>) {
    match result {
        Ok(()) => {}
        Err(ServerError::Throttled) => {
            tracing::debug!(device_id, "command throttled, a prior command is still in flight");
        }
        Err(err) => tracing::warn!(device_id, %err, "command failed"),
    }
}
