use thiserror::Error;

/// Errors surfaced by the device/group store and the bridge pool.
#[derive(Debug, Error)]
pub enum MeshError {
    #[error("device {0} is not known to this controller")]
    UnknownDevice(u8),

    #[error("group {0} is not known to this controller")]
    UnknownGroup(u16),

    #[error("bridge pool is full (cap={cap}); handshake acked but not registered ready")]
    BridgePoolFull { cap: usize },

    #[error("no bridge is currently ready to relay commands")]
    NoBridgeAvailable,
}

pub type MeshResult<T> = Result<T, MeshError>;
