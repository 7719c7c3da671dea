//! Top-level error type for the device-facing controller (§7).
//!
//! Wraps each component's typed error so `?` composes cleanly through
//! connection handling and the command API, the same way the teacher's
//! `ApiError` is the single sink for its per-module errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Protocol(#[from] lb_protocol::ProtocolError),

    #[error(transparent)]
    Mesh(#[from] lb_mesh::error::MeshError),

    #[error(transparent)]
    Mqtt(#[from] lb_mqtt::error::MqttError),

    #[error("handshake did not complete within the timeout")]
    HandshakeTimeout,

    #[error("connection idle for longer than the watchdog allows")]
    IdleTimeout,

    #[error("a prior command of this kind is still pending for this device")]
    Throttled,

    #[error("command acknowledgement did not arrive in time")]
    Timeout,

    #[error("device {0} does not support this command")]
    Unsupported(u8),

    #[error("value {value} is out of range {min}..={max}")]
    OutOfRange { value: i64, min: i64, max: i64 },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("tls error: {0}")]
    Tls(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type ServerResult<T> = Result<T, ServerError>;
