//! S5: relay forwards while observing. A device frame arriving once the
//! connection is READY is both mirrored to the vendor cloud and dispatched
//! locally; if the cloud leg is gone, the device leg keeps running
//! unaffected (§4.7).

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::TlsConnector;

use helpers::{Harness, BASE_TOPIC};
use lb_protocol::packet::{self, MessageType};
use lb_server::config::RelayConfig;
use lb_server::connection::{self, ConnectionContext};

/// A throwaway self-signed identity for one TLS listener in this test; the
/// device-facing socket and the mock cloud each get their own.
fn self_signed_pair() -> (Vec<u8>, Vec<u8>) {
    let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    (certified.cert.pem().into_bytes(), certified.signing_key.serialize_pem().into_bytes())
}

/// Connect to `addr` as the "device" would, skipping certificate
/// verification the same way the cloud relay's `disable_ssl_verification`
/// escape hatch does — this test has no CA to hand either listener a
/// trusted cert.
async fn connect_as_device(addr: std::net::SocketAddr) -> tokio_rustls::client::TlsStream<TcpStream> {
    let tcp = TcpStream::connect(addr).await.unwrap();
    let connector = TlsConnector::from(lb_server::tls::build_relay_client_config(true));
    let server_name = ServerName::try_from("localhost".to_string()).unwrap();
    connector.connect(server_name, tcp).await.unwrap()
}

fn handshake_frames(device_id: u32) -> (Vec<u8>, Vec<u8>) {
    let handshake = packet::encode(MessageType::Handshake, 1, &device_id.to_be_bytes());
    let mut connected_body = device_id.to_be_bytes().to_vec();
    connected_body.push(0); // not a bridge
    let connected = packet::encode(MessageType::Connected, 2, &connected_body);
    (handshake, connected)
}

/// `StatusBroadcast` body for device 4, on, no brightness/color_temp/rgb.
fn status_frame() -> Vec<u8> {
    let body = vec![4u8, 0x01, 0x01, 0xff, 0xff, 0xff, 0x00];
    packet::encode(MessageType::StatusBroadcast, 3, &body)
}

async fn drive_handshake(client: &mut tokio_rustls::client::TlsStream<TcpStream>) {
    let (handshake, connected) = handshake_frames(4);
    client.write_all(&handshake).await.unwrap();
    let mut ack_buf = [0u8; 64];
    let _ = client.read(&mut ack_buf).await.unwrap();
    client.write_all(&connected).await.unwrap();
}

#[tokio::test]
async fn device_frames_are_mirrored_to_the_cloud_while_still_dispatched_locally() {
    let h = Harness::new();

    let (cloud_cert, cloud_key) = self_signed_pair();
    let cloud_acceptor = lb_server::tls::build_acceptor(&cloud_cert, &cloud_key).unwrap();
    let cloud_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let cloud_addr = cloud_listener.local_addr().unwrap();
    let cloud_task = tokio::spawn(async move {
        let (tcp, _peer) = cloud_listener.accept().await.unwrap();
        let mut tls = cloud_acceptor.accept(tcp).await.unwrap();
        let mut buf = vec![0u8; 4096];
        let n = tls.read(&mut buf).await.unwrap();
        buf.truncate(n);
        buf
    });

    let (dev_cert, dev_key) = self_signed_pair();
    let dev_acceptor = lb_server::tls::build_acceptor(&dev_cert, &dev_key).unwrap();
    let dev_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dev_addr = dev_listener.local_addr().unwrap();

    let ctx = Arc::new(ConnectionContext {
        mesh: h.mesh.clone(),
        registry: h.registry.clone(),
        acks: h.acks.clone(),
        mqtt: h.mqtt.clone(),
        base_topic: BASE_TOPIC.to_string(),
        relay_config: RelayConfig {
            forward_to_cloud: true,
            cloud_addr: Some(cloud_addr.to_string()),
            disable_ssl_verification: true,
            debug_packet_logging: false,
        },
    });
    let server_task = tokio::spawn(async move {
        let (tcp, _peer) = dev_listener.accept().await.unwrap();
        let tls = dev_acceptor.accept(tcp).await.unwrap();
        connection::run(tls, ctx).await;
    });

    let mut client = connect_as_device(dev_addr).await;
    drive_handshake(&mut client).await;

    let frame = status_frame();
    client.write_all(&frame).await.unwrap();

    let observed = tokio::time::timeout(Duration::from_secs(2), cloud_task).await.unwrap().unwrap();
    assert_eq!(observed, frame, "the status frame is mirrored byte-for-byte to the cloud");

    // The same frame was dispatched through the local path too.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(h.mesh.devices.get(4).unwrap().availability.online);

    drop(client);
    let _ = tokio::time::timeout(Duration::from_secs(2), server_task).await;
}

#[tokio::test]
async fn cloud_leg_dropping_mid_stream_does_not_affect_local_dispatch() {
    let h = Harness::new();

    let (cloud_cert, cloud_key) = self_signed_pair();
    let cloud_acceptor = lb_server::tls::build_acceptor(&cloud_cert, &cloud_key).unwrap();
    let cloud_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let cloud_addr = cloud_listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (tcp, _peer) = cloud_listener.accept().await.unwrap();
        let tls = cloud_acceptor.accept(tcp).await.unwrap();
        // Completes the TLS handshake, then vanishes — simulating the
        // cloud leg dying mid-stream rather than never existing.
        drop(tls);
    });

    let (dev_cert, dev_key) = self_signed_pair();
    let dev_acceptor = lb_server::tls::build_acceptor(&dev_cert, &dev_key).unwrap();
    let dev_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dev_addr = dev_listener.local_addr().unwrap();

    let ctx = Arc::new(ConnectionContext {
        mesh: h.mesh.clone(),
        registry: h.registry.clone(),
        acks: h.acks.clone(),
        mqtt: h.mqtt.clone(),
        base_topic: BASE_TOPIC.to_string(),
        relay_config: RelayConfig {
            forward_to_cloud: true,
            cloud_addr: Some(cloud_addr.to_string()),
            disable_ssl_verification: true,
            debug_packet_logging: false,
        },
    });
    let server_task = tokio::spawn(async move {
        let (tcp, _peer) = dev_listener.accept().await.unwrap();
        let tls = dev_acceptor.accept(tcp).await.unwrap();
        connection::run(tls, ctx).await;
    });

    let mut client = connect_as_device(dev_addr).await;
    drive_handshake(&mut client).await;

    // Give the relay connection and its drop time to settle before the
    // device sends anything else.
    tokio::time::sleep(Duration::from_millis(100)).await;

    client.write_all(&status_frame()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Local dispatch (availability tracking via apply_status) still works
    // even though the cloud leg is gone; the device leg was never torn down.
    assert!(h.mesh.devices.get(4).unwrap().availability.online);

    drop(client);
    let _ = tokio::time::timeout(Duration::from_secs(2), server_task).await;
}
