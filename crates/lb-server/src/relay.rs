//! Cloud relay: optionally tee the device<->controller byte stream to the
//! real vendor cloud endpoint (§4.7).
//!
//! The controller sits in the device's path only because DNS has been
//! redirected at it; nothing requires that the real cloud never see this
//! device again. When `forward_to_cloud` is set, every byte read from the
//! device is also pushed to a connection against `cloud_addr`, and every
//! byte the cloud sends back is handed to the caller to forward to the
//! device. Forwarding is strictly best-effort: a cloud-side failure never
//! tears down the device leg, it just stops the tee.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::TlsConnector;

use crate::config::RelayConfig;

const TEE_QUEUE_DEPTH: usize = 32;
const CLOUD_READ_CHUNK: usize = 4096;

/// A live tee to the vendor cloud for one device connection. Dropping this
/// closes both pump tasks.
pub struct CloudRelay {
    to_cloud: mpsc::Sender<Vec<u8>>,
    from_cloud: Mutex<mpsc::Receiver<Vec<u8>>>,
}

impl CloudRelay {
    /// Connect to the configured cloud endpoint. Returns `None` when
    /// forwarding is disabled or no address is configured — a relay-less
    /// connection behaves exactly as if this module did not exist.
    pub async fn connect(config: &RelayConfig) -> std::io::Result<Option<Self>> {
        if !config.forward_to_cloud {
            return Ok(None);
        }
        let Some(addr) = config.cloud_addr.clone() else {
            tracing::warn!("CLOUD_RELAY_FORWARD is set but no cloud address is configured");
            return Ok(None);
        };

        if config.disable_ssl_verification {
            tracing::warn!("cloud relay TLS verification is DISABLED; do not use this in production");
        }

        let tcp = TcpStream::connect(&addr).await?;
        let host = addr.split(':').next().unwrap_or(&addr).to_string();
        let tls_config = crate::tls::build_relay_client_config(config.disable_ssl_verification);
        let connector = TlsConnector::from(tls_config);
        let server_name = ServerName::try_from(host)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
        let stream = connector.connect(server_name, tcp).await?;
        let (mut read_half, mut write_half) = tokio::io::split(stream);

        let (to_cloud_tx, mut to_cloud_rx) = mpsc::channel::<Vec<u8>>(TEE_QUEUE_DEPTH);
        let (from_cloud_tx, from_cloud_rx) = mpsc::channel::<Vec<u8>>(TEE_QUEUE_DEPTH);

        tokio::spawn(async move {
            while let Some(bytes) = to_cloud_rx.recv().await {
                if write_half.write_all(&bytes).await.is_err() {
                    tracing::debug!("cloud relay write leg closed");
                    break;
                }
            }
        });

        tokio::spawn(async move {
            let mut buf = [0u8; CLOUD_READ_CHUNK];
            loop {
                match read_half.read(&mut buf).await {
                    Ok(0) | Err(_) => {
                        tracing::debug!("cloud relay read leg closed");
                        break;
                    }
                    Ok(n) => {
                        if from_cloud_tx.send(buf[..n].to_vec()).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        tracing::info!(cloud_addr = %addr, "cloud relay connected");
        Ok(Some(Self {
            to_cloud: to_cloud_tx,
            from_cloud: Mutex::new(from_cloud_rx),
        }))
    }

    /// Forward bytes read from the device to the cloud. Swallows failures:
    /// the device leg keeps running regardless of relay health.
    pub async fn forward_device_bytes(&self, bytes: &[u8]) {
        let _ = self.to_cloud.send(bytes.to_vec()).await;
    }

    /// Next chunk of bytes the cloud sent back, to be written to the
    /// device. Returns `None` once the relay has torn down.
    pub async fn recv_cloud_bytes(&self) -> Option<Vec<u8>> {
        self.from_cloud.lock().await.recv().await
    }
}
