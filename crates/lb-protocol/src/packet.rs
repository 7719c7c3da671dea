//! The vendor binary packet protocol: framing, checksums, and typed bodies.
//!
//! Frame layout on the wire:
//!
//! ```text
//! [ msg_type:1 ][ seq:2 BE ][ body_len:2 BE ][ body: body_len bytes ]
//! ```
//!
//! The last byte of `body` is always a checksum: the wrapping sum (mod 256)
//! of every preceding byte in the frame, header included. Golden captures
//! from a real fleet are required to pin exact field layouts per message
//! type; the layouts below are the ones this controller has been matched
//! against.

use bytes::{Buf, BytesMut};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{ProtocolError, ProtocolResult};

/// Frames larger than this are not a vendor bug, they are a corrupted stream.
pub const MAX_FRAME_BYTES: usize = 4096;

/// One-byte message type tags used by the vendor wire protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Handshake,
    HandshakeAck,
    Connected,
    HeartbeatDevice,
    HeartbeatCloud,
    Control,
    Ack,
    StatusBroadcast,
    MeshInfoRequest,
    MeshInfo,
    Unknown(u8),
}

impl MessageType {
    pub fn from_byte(b: u8) -> Self {
        match b {
            0x23 => MessageType::Handshake,
            0x28 => MessageType::HandshakeAck,
            0x29 => MessageType::Connected,
            0xd3 => MessageType::HeartbeatDevice,
            0xd8 => MessageType::HeartbeatCloud,
            0x73 => MessageType::Control,
            0x48 => MessageType::Ack,
            0x83 => MessageType::StatusBroadcast,
            0x52 => MessageType::MeshInfoRequest,
            0x58 => MessageType::MeshInfo,
            other => MessageType::Unknown(other),
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            MessageType::Handshake => 0x23,
            MessageType::HandshakeAck => 0x28,
            MessageType::Connected => 0x29,
            MessageType::HeartbeatDevice => 0xd3,
            MessageType::HeartbeatCloud => 0xd8,
            MessageType::Control => 0x73,
            MessageType::Ack => 0x48,
            MessageType::StatusBroadcast => 0x83,
            MessageType::MeshInfoRequest => 0x52,
            MessageType::MeshInfo => 0x58,
            MessageType::Unknown(b) => b,
        }
    }
}

/// A frame with header parsed and checksum already validated, body still raw.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub msg_type: u8,
    pub seq: u16,
    pub body: Vec<u8>,
}

/// Power state as carried on the wire and in the device model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerState {
    On,
    Off,
    Unknown,
}

/// RGB triple, 0..255 per channel.
pub type Rgb = (u8, u8, u8);

/// One device's state as reported inside a status broadcast or mesh-info entry.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusFields {
    pub device_id: u8,
    pub connected_to_mesh: bool,
    pub power: PowerState,
    /// 0..255, wire scale.
    pub brightness_wire: Option<u8>,
    pub color_temp_wire: Option<u16>,
    pub rgb: Option<Rgb>,
}

/// A decoded packet body, one variant per known message type.
#[derive(Debug, Clone, PartialEq)]
pub enum PacketBody {
    Handshake { device_id: u32 },
    HandshakeAck { device_id: u32 },
    Connected { device_id: u32, is_bridge: bool },
    HeartbeatDevice,
    HeartbeatCloud,
    Control { device_id: u8, msg_id: u16, field: ControlField },
    Ack { device_id: u8, msg_id: u16, status: Option<StatusFields> },
    StatusBroadcast(StatusFields),
    MeshInfoRequest,
    MeshInfo { entries: Vec<StatusFields> },
    Unknown { msg_type: u8, raw: Vec<u8> },
}

/// What a control packet asks the device to do.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlField {
    Power(bool),
    /// 0..255 wire scale.
    Brightness(u8),
    /// Raw device Kelvin encoding.
    ColorTemp(u16),
    Rgb(Rgb),
    /// 0, 25, 50, 75, 100 wire brightness buckets used for fan presets.
    FanSpeed(u8),
}

fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// Encode a header + body + checksum into a full wire frame.
pub fn encode(msg_type: MessageType, seq: u16, body_without_checksum: &[u8]) -> Vec<u8> {
    let body_len = body_without_checksum.len() + 1; // + checksum byte
    let mut frame = Vec::with_capacity(5 + body_len);
    frame.push(msg_type.to_byte());
    frame.extend_from_slice(&seq.to_be_bytes());
    frame.extend_from_slice(&(body_len as u16).to_be_bytes());
    frame.extend_from_slice(body_without_checksum);
    let sum = checksum(&frame);
    frame.push(sum);
    frame
}

/// Serialize a device-bound control field into the `Control` message's wire
/// body (mirrors the field layout `parse_body` expects), wrapped as a full
/// frame. `seq` is the frame-header sequence number, independent of `msg_id`
/// (which lives inside the body and is what ack correlation keys on).
pub fn encode_control(seq: u16, device_id: u8, msg_id: u16, field: ControlField) -> Vec<u8> {
    let mut body = vec![device_id];
    body.extend_from_slice(&msg_id.to_be_bytes());
    match field {
        ControlField::Power(on) => {
            body.push(0x01);
            body.push(on as u8);
        }
        ControlField::Brightness(wire) => {
            body.push(0x02);
            body.push(wire);
        }
        ControlField::ColorTemp(k) => {
            body.push(0x03);
            body.extend_from_slice(&k.to_be_bytes());
        }
        ControlField::Rgb((r, g, b)) => {
            body.push(0x04);
            body.extend_from_slice(&[r, g, b]);
        }
        ControlField::FanSpeed(wire) => {
            body.push(0x05);
            body.push(wire);
        }
    }
    encode(MessageType::Control, seq, &body)
}

/// Recompute and compare the checksum trailer of a raw (header+body) frame.
pub fn validate_checksum(frame_bytes: &[u8]) -> ProtocolResult<()> {
    let Some((&declared, rest)) = frame_bytes.split_last() else {
        return Err(ProtocolError::MalformedPacket {
            declared: 0,
            computed: 0,
        });
    };
    let computed = checksum(rest);
    if declared == computed {
        Ok(())
    } else {
        Err(ProtocolError::MalformedPacket { declared, computed })
    }
}

/// Streaming frame reader: accumulates bytes until a full frame is available.
///
/// Duplicate sequence numbers are passed through unchanged; idempotence is
/// the ack-correlator's responsibility, not the codec's.
pub struct PacketReader<R> {
    reader: R,
    buf: BytesMut,
}

impl<R: AsyncRead + Unpin> PacketReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: BytesMut::with_capacity(4096),
        }
    }

    /// Read the next frame, validating its checksum. Malformed frames are
    /// reported but do not close the stream; the caller decides to keep
    /// reading or not. Returns `Ok(None)` on clean EOF between frames.
    pub async fn read_frame(&mut self) -> ProtocolResult<Option<RawFrame>> {
        loop {
            if let Some(frame) = self.try_parse_buffered()? {
                return Ok(Some(frame));
            }
            let mut chunk = [0u8; 1024];
            let n = self
                .reader
                .read(&mut chunk)
                .await
                .map_err(|e| ProtocolError::Io(e.to_string()))?;
            if n == 0 {
                return Ok(None);
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    /// Attempt to pull one complete frame out of the buffer without blocking.
    fn try_parse_buffered(&mut self) -> ProtocolResult<Option<RawFrame>> {
        if self.buf.len() < 5 {
            return Ok(None);
        }
        let msg_type = self.buf[0];
        let seq = u16::from_be_bytes([self.buf[1], self.buf[2]]);
        let body_len = u16::from_be_bytes([self.buf[3], self.buf[4]]) as usize;

        if body_len == 0 || 5 + body_len > MAX_FRAME_BYTES {
            return Err(ProtocolError::FramingError {
                declared: 5 + body_len,
                max: MAX_FRAME_BYTES,
            });
        }
        if self.buf.len() < 5 + body_len {
            // Not enough bytes yet; keep streaming.
            return Ok(None);
        }

        let frame_bytes = self.buf[..5 + body_len].to_vec();
        validate_checksum(&frame_bytes)?;

        self.buf.advance(5 + body_len);
        let body = frame_bytes[5..5 + body_len - 1].to_vec();
        Ok(Some(RawFrame {
            msg_type,
            seq,
            body,
        }))
    }
}

fn require(body: &[u8], need: usize, msg_type: u8) -> ProtocolResult<()> {
    if body.len() < need {
        Err(ProtocolError::ShortBody {
            msg_type,
            need,
            got: body.len(),
        })
    } else {
        Ok(())
    }
}

/// Parse a raw body into a typed `PacketBody` given its message type.
/// Unknown types are preserved verbatim and logged at debug by the caller.
pub fn parse_body(msg_type: u8, body: &[u8]) -> ProtocolResult<PacketBody> {
    match MessageType::from_byte(msg_type) {
        MessageType::Handshake => {
            require(body, 4, msg_type)?;
            Ok(PacketBody::Handshake {
                device_id: u32::from_be_bytes(body[0..4].try_into().unwrap()),
            })
        }
        MessageType::HandshakeAck => {
            require(body, 4, msg_type)?;
            Ok(PacketBody::HandshakeAck {
                device_id: u32::from_be_bytes(body[0..4].try_into().unwrap()),
            })
        }
        MessageType::Connected => {
            require(body, 5, msg_type)?;
            Ok(PacketBody::Connected {
                device_id: u32::from_be_bytes(body[0..4].try_into().unwrap()),
                is_bridge: body[4] != 0,
            })
        }
        MessageType::HeartbeatDevice => Ok(PacketBody::HeartbeatDevice),
        MessageType::HeartbeatCloud => Ok(PacketBody::HeartbeatCloud),
        MessageType::Control => {
            require(body, 4, msg_type)?;
            let device_id = body[0];
            let msg_id = u16::from_be_bytes([body[1], body[2]]);
            let kind = body[3];
            let field = match kind {
                0x01 => {
                    require(body, 5, msg_type)?;
                    ControlField::Power(body[4] != 0)
                }
                0x02 => {
                    require(body, 5, msg_type)?;
                    ControlField::Brightness(body[4])
                }
                0x03 => {
                    require(body, 6, msg_type)?;
                    ControlField::ColorTemp(u16::from_be_bytes([body[4], body[5]]))
                }
                0x04 => {
                    require(body, 7, msg_type)?;
                    ControlField::Rgb((body[4], body[5], body[6]))
                }
                0x05 => {
                    require(body, 5, msg_type)?;
                    ControlField::FanSpeed(body[4])
                }
                _ => {
                    return Ok(PacketBody::Unknown {
                        msg_type,
                        raw: body.to_vec(),
                    });
                }
            };
            Ok(PacketBody::Control {
                device_id,
                msg_id,
                field,
            })
        }
        MessageType::Ack => {
            require(body, 3, msg_type)?;
            let device_id = body[0];
            let msg_id = u16::from_be_bytes([body[1], body[2]]);
            let status = if body.len() >= 3 + 7 {
                Some(parse_status_fields(&body[3..3 + 7])?)
            } else {
                None
            };
            Ok(PacketBody::Ack {
                device_id,
                msg_id,
                status,
            })
        }
        MessageType::StatusBroadcast => {
            require(body, 7, msg_type)?;
            Ok(PacketBody::StatusBroadcast(parse_status_fields(&body[0..7])?))
        }
        MessageType::MeshInfoRequest => Ok(PacketBody::MeshInfoRequest),
        MessageType::MeshInfo => {
            if body.len() % 7 != 0 {
                return Err(ProtocolError::ShortBody {
                    msg_type,
                    need: ((body.len() / 7) + 1) * 7,
                    got: body.len(),
                });
            }
            let entries = body
                .chunks_exact(7)
                .map(parse_status_fields)
                .collect::<ProtocolResult<Vec<_>>>()?;
            Ok(PacketBody::MeshInfo { entries })
        }
        MessageType::Unknown(t) => Ok(PacketBody::Unknown {
            msg_type: t,
            raw: body.to_vec(),
        }),
    }
}

/// Parse the common 7-byte `{id, connected, power, brightness, temp(2), ...}`
/// shape shared by status broadcasts, mesh-info entries, and acks-with-state.
/// The final byte packs an RGB presence flag in its high bit and, when unset,
/// is unused padding (captures show the vendor zero-fills it).
fn parse_status_fields(b: &[u8]) -> ProtocolResult<StatusFields> {
    let device_id = b[0];
    let connected_to_mesh = b[1] != 0;
    let power = match b[2] {
        0x01 => PowerState::On,
        0x00 => PowerState::Off,
        _ => PowerState::Unknown,
    };
    let brightness_wire = if b[3] == 0xff { None } else { Some(b[3]) };
    let color_temp_wire = if b[4] == 0xff && b[5] == 0xff {
        None
    } else {
        Some(u16::from_be_bytes([b[4], b[5]]))
    };
    let rgb = if b[6] & 0x80 != 0 {
        Some((b[3], b[4], b[5]))
    } else {
        None
    };
    Ok(StatusFields {
        device_id,
        connected_to_mesh,
        power,
        brightness_wire,
        color_temp_wire,
        rgb,
    })
}

/// Convert wire brightness (0..255) to the bridge API's 0..100 scale.
pub fn brightness_wire_to_pct(wire: u8) -> u8 {
    ((wire as u16 * 100 + 127) / 255) as u8
}

/// Convert bridge API brightness (0..100) to wire scale (0..255).
pub fn brightness_pct_to_wire(pct: u8) -> u8 {
    let pct = pct.min(100);
    ((pct as u16 * 255 + 50) / 100) as u8
}
