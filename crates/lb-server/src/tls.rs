//! TLS termination for the device-facing listener (§2 "Ambient stack", C3/C8
//! "Self-signed certificate lifecycle"), plus the optional cloud-relay
//! client leg's `disable_ssl_verification` escape hatch (§4.7).
//!
//! Devices accept a self-signed certificate without complaint once they've
//! been DNS-redirected to this controller, so there is no CA involved on
//! the device-facing side — but the certificate is generated once and
//! cached to disk so a restart doesn't force every device to re-trust a new
//! one.

use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::TlsAcceptor;

use crate::error::{ServerError, ServerResult};

/// Hostnames the vendor devices expect the controller's certificate to be
/// valid for, after DNS redirection (§6 "DNS contract").
const SUBJECT_ALT_NAMES: &[&str] = &[
    "cm-sec.gelighting.com",
    "cm.gelighting.com",
    "cm-ge.xlink.cn",
];

/// Load a cached cert/key pair from `cert_path`/`key_path`, generating and
/// writing a fresh self-signed pair if either file is missing.
pub fn load_or_generate_cert(
    cert_path: &std::path::Path,
    key_path: &std::path::Path,
) -> ServerResult<(Vec<u8>, Vec<u8>)> {
    if cert_path.exists() && key_path.exists() {
        let cert_pem = std::fs::read(cert_path)?;
        let key_pem = std::fs::read(key_path)?;
        return Ok((cert_pem, key_pem));
    }

    let names: Vec<String> = SUBJECT_ALT_NAMES.iter().map(|s| s.to_string()).collect();
    let certified = rcgen::generate_simple_self_signed(names)
        .map_err(|e| ServerError::Tls(format!("failed to generate self-signed cert: {e}")))?;
    let cert_pem = certified.cert.pem().into_bytes();
    let key_pem = certified.signing_key.serialize_pem().into_bytes();

    if let Some(parent) = cert_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(cert_path, &cert_pem)?;
    std::fs::write(key_path, &key_pem)?;
    tracing::info!(
        cert_path = %cert_path.display(),
        "generated and cached self-signed device-facing certificate"
    );

    Ok((cert_pem, key_pem))
}

/// Build the `TlsAcceptor` the listener hands every accepted socket to.
pub fn build_acceptor(cert_pem: &[u8], key_pem: &[u8]) -> ServerResult<TlsAcceptor> {
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut &cert_pem[..])
        .collect::<Result<_, _>>()
        .map_err(|e| ServerError::Tls(format!("failed to parse certificate PEM: {e}")))?;
    let key: PrivateKeyDer<'static> = rustls_pemfile::private_key(&mut &key_pem[..])
        .map_err(|e| ServerError::Tls(format!("failed to parse private key PEM: {e}")))?
        .ok_or_else(|| ServerError::Tls("no private key found in PEM".into()))?;

    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| ServerError::Tls(format!("invalid certificate/key pair: {e}")))?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// A `ServerCertVerifier` that accepts any certificate, for the cloud-relay
/// leg's `disable_ssl_verification` debug flag (§4.7). Never used on the
/// device-facing listener, only on the optional outbound cloud connection.
#[derive(Debug)]
pub struct AcceptAnyServerCert;

impl rustls::client::danger::ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// Build the cloud-relay client's `rustls::ClientConfig`, with verification
/// disabled when `disable_ssl_verification` is set. Callers MUST log a
/// prominent warning before using this (§4.7).
pub fn build_relay_client_config(disable_ssl_verification: bool) -> Arc<rustls::ClientConfig> {
    let builder = rustls::ClientConfig::builder();
    let config = if disable_ssl_verification {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert))
            .with_no_client_auth()
    } else {
        let mut roots = rustls::RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        builder
            .with_root_certificates(roots)
            .with_no_client_auth()
    };
    Arc::new(config)
}
