use thiserror::Error;

/// Errors produced while framing or parsing the vendor wire protocol.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame declared length {declared} exceeds the {max} byte sanity limit")]
    FramingError { declared: usize, max: usize },

    #[error("checksum mismatch: declared 0x{declared:02x}, computed 0x{computed:02x}")]
    MalformedPacket { declared: u8, computed: u8 },

    #[error("packet body too short for type 0x{msg_type:02x}: need {need}, got {got}")]
    ShortBody {
        msg_type: u8,
        need: usize,
        got: usize,
    },

    #[error("i/o error while reading or writing a frame: {0}")]
    Io(String),
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
