//! Optional TLS for the connection to the local MQTT broker.
//!
//! A home-automation broker is commonly reachable in plaintext on the LAN;
//! TLS is supported for the minority of deployments that front it with a
//! CA-signed or self-signed certificate, with an optional client cert for
//! mutual TLS. Unlike the device-facing listener (C3), there is no vendor
//! constraint here — this just has to speak whatever the broker wants.

use rumqttc::Transport;

use crate::config::MqttConfig;
use crate::error::{MqttError, MqttResult};

/// Build a TLS transport from the certificate paths in `config`, if any are
/// set. `config.use_tls = true` with no `ca_cert_path` uses the platform's
/// native root store.
pub fn load_tls_transport(config: &MqttConfig) -> MqttResult<Transport> {
    let ca = match &config.ca_cert_path {
        Some(path) => std::fs::read(path)
            .map_err(|e| MqttError::Tls(format!("failed to read CA cert '{path}': {e}")))?,
        None => Vec::new(),
    };

    let client_auth = match (&config.client_cert_path, &config.client_key_path) {
        (Some(cert_path), Some(key_path)) => {
            let cert = std::fs::read(cert_path).map_err(|e| {
                MqttError::Tls(format!("failed to read client cert '{cert_path}': {e}"))
            })?;
            let key = std::fs::read(key_path).map_err(|e| {
                MqttError::Tls(format!("failed to read client key '{key_path}': {e}"))
            })?;
            Some((cert, key))
        }
        _ => None,
    };

    Ok(Transport::tls_with_config(
        rumqttc::TlsConfiguration::Simple {
            ca,
            alpn: None,
            client_auth,
        },
    ))
}

/// Build MQTT options without TLS (the common local-broker case).
pub fn plaintext_transport() -> Transport {
    Transport::Tcp
}
