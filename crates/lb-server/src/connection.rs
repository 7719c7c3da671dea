//! Per-connection state machine for one device's TLS-terminated TCP socket
//! (§4.3): ACCEPTED -> HANDSHAKE_IN -> HANDSHAKE_OUT -> AUTHENTICATED ->
//! READY -> DISCONNECTED.
//!
//! Everything past the handshake runs as one task `select!`ing between the
//! reader (with an idle watchdog) and the heartbeat ticker, with a single
//! writer task owning the socket's write half so every outbound byte —
//! heartbeats, dispatched commands, relayed cloud bytes — goes through one
//! channel instead of racing for the write lock.

use std::sync::Arc;
use std::time::Duration;

use rumqttc::QoS;
use tokio::io::{split, AsyncWriteExt, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_rustls::server::TlsStream;

use lb_mesh::{AvailabilityChange, MeshState};
use lb_mqtt::{publish, Channel};
use lb_protocol::packet::{self, MessageType, PacketBody, PacketReader, RawFrame, StatusFields};

use crate::ack::AckCorrelator;
use crate::config::RelayConfig;
use crate::error::{ServerError, ServerResult};
use crate::registry::{ConnectionRegistry, OutboundFrame, WRITER_QUEUE_DEPTH};
use crate::relay::CloudRelay;

/// T_handshake (§5).
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);
/// W_idle (§5).
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(90);
/// H_interval (§5).
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Everything a connection needs that is shared across the whole
/// controller, handed in once by the supervisor.
pub struct ConnectionContext {
    pub mesh: Arc<MeshState>,
    pub registry: Arc<ConnectionRegistry>,
    pub acks: Arc<AckCorrelator>,
    pub mqtt: Arc<dyn Channel>,
    pub base_topic: String,
    pub relay_config: RelayConfig,
}

/// Drive one accepted, TLS-terminated device connection end to end. Returns
/// once the device disconnects, the idle watchdog fires, or the handshake
/// fails.
pub async fn run(stream: TlsStream<TcpStream>, ctx: Arc<ConnectionContext>) {
    let (read_half, mut write_half) = split(stream);
    let mut reader = PacketReader::new(read_half);

    let (device_id, is_bridge, queued_frames) = match perform_handshake(&mut reader, &mut write_half).await {
        Ok(triple) => triple,
        Err(err) => {
            tracing::warn!(%err, "handshake failed, closing connection");
            return;
        }
    };

    if let Err(err) = ctx.mesh.mark_ready(device_id, is_bridge) {
        match err {
            lb_mesh::MeshError::BridgePoolFull { cap } => {
                tracing::warn!(
                    device_id,
                    cap,
                    "bridge pool full, device stays known but not control-ready"
                );
            }
            other => {
                tracing::warn!(device_id, %other, "rejecting connection");
                return;
            }
        }
    }

    let (tx, rx) = mpsc::channel::<OutboundFrame>(WRITER_QUEUE_DEPTH);
    spawn_writer(write_half, rx);

    if ctx.mesh.bridges.contains(device_id) {
        ctx.registry.register(device_id, tx.clone());
    }

    tracing::info!(device_id, is_bridge, "device connection ready");

    let relay = match CloudRelay::connect(&ctx.relay_config).await {
        Ok(relay) => relay.map(Arc::new),
        Err(err) => {
            tracing::warn!(%err, "cloud relay connection failed, continuing without it");
            None
        }
    };
    if let Some(relay) = relay.clone() {
        let tx_for_relay = tx.clone();
        tokio::spawn(async move {
            while let Some(bytes) = relay.recv_cloud_bytes().await {
                if tx_for_relay.send(bytes).await.is_err() {
                    break;
                }
            }
        });
    }

    // Frames that arrived during HANDSHAKE_OUT ahead of the device's
    // `Connected` reply (a retransmitted handshake, a stray heartbeat) were
    // queued rather than rejected (§4.3); replay them now that the
    // connection is READY, through the same path a frame read from the
    // socket would take.
    for raw in queued_frames {
        process_raw_frame(&ctx, device_id, raw, relay.as_ref()).await;
    }

    let mut heartbeat_ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat_ticker.tick().await;

    loop {
        tokio::select! {
            frame = timeout(IDLE_TIMEOUT, reader.read_frame()) => {
                match frame {
                    Ok(Ok(Some(raw))) => {
                        process_raw_frame(&ctx, device_id, raw, relay.as_ref()).await;
                    }
                    Ok(Ok(None)) => {
                        tracing::info!(device_id, "device closed connection");
                        break;
                    }
                    Ok(Err(err)) => {
                        tracing::warn!(device_id, %err, "frame read error, closing connection");
                        break;
                    }
                    Err(_elapsed) => {
                        tracing::info!(device_id, "idle watchdog expired, closing connection");
                        break;
                    }
                }
            }
            _ = heartbeat_ticker.tick() => {
                let frame = packet::encode(MessageType::HeartbeatCloud, 0, &[]);
                if tx.send(frame).await.is_err() {
                    tracing::debug!(device_id, "writer gone, closing connection");
                    break;
                }
            }
        }
    }

    ctx.mesh.mark_disconnected(device_id);
    ctx.registry.unregister(device_id);
}

/// Read the Handshake frame, ack it, then read frames until the device's
/// `Connected` reply arrives. Both the handshake read and the whole
/// HANDSHAKE_OUT wait share `HANDSHAKE_TIMEOUT` as an overall deadline, not
/// a per-read one — otherwise a stream of queued frames could stall the
/// connection past T_handshake one read at a time.
///
/// Anything other than `Connected` arriving in HANDSHAKE_OUT is queued, not
/// parsed against READY-state expectations (§4.3): a retransmitted
/// handshake or a stray heartbeat-device frame is not a protocol violation
/// here, just a frame that has to wait. The queue is returned to the caller
/// to replay once the connection reaches READY.
async fn perform_handshake<R, W>(
    reader: &mut PacketReader<R>,
    writer: &mut W,
) -> ServerResult<(u8, bool, Vec<RawFrame>)>
where
    R: tokio::io::AsyncRead + Unpin,
    W: tokio::io::AsyncWrite + Unpin,
{
    let raw = timeout(HANDSHAKE_TIMEOUT, reader.read_frame())
        .await
        .map_err(|_| ServerError::HandshakeTimeout)?
        .map_err(ServerError::Protocol)?
        .ok_or(ServerError::HandshakeTimeout)?;
    let device_id_wire = match packet::parse_body(raw.msg_type, &raw.body)? {
        PacketBody::Handshake { device_id } => device_id,
        _ => return Err(ServerError::HandshakeTimeout),
    };

    let ack = packet::encode(MessageType::HandshakeAck, raw.seq, &device_id_wire.to_be_bytes());
    writer.write_all(&ack).await?;

    let mut queued = Vec::new();
    let deadline = tokio::time::Instant::now() + HANDSHAKE_TIMEOUT;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            return Err(ServerError::HandshakeTimeout);
        }
        let raw = timeout(remaining, reader.read_frame())
            .await
            .map_err(|_| ServerError::HandshakeTimeout)?
            .map_err(ServerError::Protocol)?
            .ok_or(ServerError::HandshakeTimeout)?;
        match packet::parse_body(raw.msg_type, &raw.body) {
            Ok(PacketBody::Connected { device_id, is_bridge }) => {
                return Ok(((device_id & 0xff) as u8, is_bridge, queued));
            }
            // Not Connected, or a body we can't yet parse — queue it rather
            // than fail the handshake; `process_raw_frame` will warn and
            // drop it on replay if it really is malformed.
            _ => queued.push(raw),
        }
    }
}

/// Mirror a frame to the cloud relay (if one is connected), log it when
/// `debug_packet_logging` is on, and dispatch its parsed body — the single
/// path both the reader loop and replayed HANDSHAKE_OUT frames go through.
async fn process_raw_frame(
    ctx: &ConnectionContext,
    device_id: u8,
    raw: RawFrame,
    relay: Option<&Arc<CloudRelay>>,
) {
    if ctx.relay_config.debug_packet_logging {
        tracing::debug!(
            msg_type = raw.msg_type,
            seq = raw.seq,
            len = raw.body.len(),
            "inbound frame"
        );
    }
    if let Some(relay) = relay {
        let mirrored = packet::encode(MessageType::from_byte(raw.msg_type), raw.seq, &raw.body);
        relay.forward_device_bytes(&mirrored).await;
    }
    match packet::parse_body(raw.msg_type, &raw.body) {
        Ok(body) => dispatch_body(ctx, device_id, body).await,
        Err(err) => tracing::warn!(device_id, %err, "malformed frame body, dropping"),
    }
}

fn spawn_writer(mut write_half: WriteHalf<TlsStream<TcpStream>>, mut rx: mpsc::Receiver<OutboundFrame>) {
    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if let Err(err) = write_half.write_all(&frame).await {
                tracing::debug!(%err, "connection writer closed");
                break;
            }
        }
    });
}

async fn dispatch_body(ctx: &ConnectionContext, bridge_id: u8, body: PacketBody) {
    match body {
        PacketBody::HeartbeatDevice => {}
        PacketBody::StatusBroadcast(fields) => apply_and_publish_status(ctx, &fields).await,
        PacketBody::MeshInfo { entries } => {
            for fields in &entries {
                apply_and_publish_status(ctx, fields).await;
            }
        }
        PacketBody::Ack { device_id, msg_id, status } => {
            if let Some(fields) = &status {
                apply_and_publish_status(ctx, fields).await;
            }
            ctx.acks.resolve(bridge_id, device_id, msg_id, status);
        }
        PacketBody::Unknown { msg_type, raw } => {
            tracing::debug!(msg_type, len = raw.len(), "unhandled message type");
        }
        other => tracing::debug!(?other, "unexpected message in READY state"),
    }
}

async fn apply_and_publish_status(ctx: &ConnectionContext, fields: &StatusFields) {
    let change = match ctx.mesh.devices.apply_status(fields) {
        Ok(change) => change,
        Err(err) => {
            tracing::debug!(device_id = fields.device_id, %err, "status for unknown device");
            return;
        }
    };
    let Some(device) = ctx.mesh.devices.get(fields.device_id) else {
        return;
    };
    if !matches!(change, AvailabilityChange::Unchanged) {
        let online = matches!(change, AvailabilityChange::BecameOnline);
        publish_one(ctx, publish::availability_message(&device, &ctx.base_topic, online)).await;
    }
    for msg in publish::state_messages(&device, &ctx.base_topic) {
        publish_one(ctx, msg).await;
    }
}

async fn publish_one(ctx: &ConnectionContext, msg: publish::StatePublish) {
    let qos = if msg.retain { QoS::AtLeastOnce } else { QoS::AtMostOnce };
    if let Err(err) = ctx.mqtt.publish(&msg.topic, &msg.payload, qos, msg.retain).await {
        tracing::warn!(topic = %msg.topic, %err, "failed to publish state update");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lb_protocol::packet::{encode, MessageType};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn handshake_completes_and_acks() {
        let (mut client, server) = tokio::io::duplex(1024);
        let (server_read, mut server_write) = tokio::io::split(server);
        let mut reader = PacketReader::new(server_read);

        let handshake = encode(MessageType::Handshake, 1, &42u32.to_be_bytes());
        let mut connected_body = 42u32.to_be_bytes().to_vec();
        connected_body.push(1);
        let connected = encode(MessageType::Connected, 2, &connected_body);

        tokio::spawn(async move {
            client.write_all(&handshake).await.unwrap();
            client.write_all(&connected).await.unwrap();
            let mut buf = [0u8; 64];
            let _ = client.read(&mut buf).await;
        });

        let (device_id, is_bridge, queued) = perform_handshake(&mut reader, &mut server_write).await.unwrap();
        assert_eq!(device_id, 42);
        assert!(is_bridge);
        assert!(queued.is_empty());
    }

    #[tokio::test]
    async fn handshake_queues_frames_ahead_of_connected() {
        let (mut client, server) = tokio::io::duplex(1024);
        let (server_read, mut server_write) = tokio::io::split(server);
        let mut reader = PacketReader::new(server_read);

        let handshake = encode(MessageType::Handshake, 1, &42u32.to_be_bytes());
        let heartbeat = encode(MessageType::HeartbeatDevice, 2, &[]);
        let mut connected_body = 42u32.to_be_bytes().to_vec();
        connected_body.push(0);
        let connected = encode(MessageType::Connected, 3, &connected_body);

        tokio::spawn(async move {
            client.write_all(&handshake).await.unwrap();
            // A stray heartbeat arriving before Connected must be queued,
            // not treated as a handshake failure.
            client.write_all(&heartbeat).await.unwrap();
            client.write_all(&connected).await.unwrap();
            let mut buf = [0u8; 64];
            let _ = client.read(&mut buf).await;
        });

        let (device_id, is_bridge, queued) = perform_handshake(&mut reader, &mut server_write).await.unwrap();
        assert_eq!(device_id, 42);
        assert!(!is_bridge);
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].msg_type, MessageType::HeartbeatDevice.to_byte());
    }

    #[tokio::test]
    async fn handshake_times_out_without_a_frame() {
        let (_client, server) = tokio::io::duplex(64);
        let (server_read, mut server_write) = tokio::io::split(server);
        let mut reader = PacketReader::new(server_read);

        let result = tokio::time::timeout(
            Duration::from_millis(50),
            perform_handshake(&mut reader, &mut server_write),
        )
        .await;
        // The inner call itself has a 5s timeout; bound the test with a
        // shorter outer one and just assert it never completes early.
        assert!(result.is_err());
    }
}
