//! Frame opcodes and layouts.
//!
//! Every frame is `Opcode(1) + Payload(n) + Checksum(1)`. The length of a
//! frame is fixed by its opcode. Multi-byte payload fields are little-endian.
//!
//! Layout table, protocol version 1:
//!
//! | Opcode | Direction   | Name        | Length |
//! |--------|-------------|-------------|--------|
//! | `0xA1` | to wand     | Handshake   | 4      |
//! | `0xA2` | to wand     | ReadRequest | 4      |
//! | `0xB0` | from wand   | DeviceInfo  | 6      |
//! | `0xB1` | from wand   | Reading     | 10     |
//!
//! A firmware revision that changes a layout gets a new opcode; existing rows
//! never change meaning.

use crate::error::DecodeError;
use crate::protocol::checksum::checksum;

/// Protocol version this crate speaks.
pub const PROTOCOL_VERSION: u8 = 0x01;

/// Length of the shortest notification frame the wand sends.
pub const MIN_NOTIFICATION_LEN: usize = 6;

/// Marker for an absent unsigned sensor field.
pub const ABSENT_U16: u16 = 0xFFFF;

/// Marker for an absent signed sensor field.
pub const ABSENT_I16: i16 = i16::MIN;

/// Frame opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Handshake command (0xA1).
    Handshake = 0xA1,
    /// Read request command (0xA2).
    ReadRequest = 0xA2,
    /// Device information notification, the handshake acknowledgement (0xB0).
    DeviceInfo = 0xB0,
    /// Sensor reading notification (0xB1).
    Reading = 0xB1,
}

impl Opcode {
    /// Create from raw byte value.
    pub fn from_raw(value: u8) -> Option<Self> {
        match value {
            0xA1 => Some(Self::Handshake),
            0xA2 => Some(Self::ReadRequest),
            0xB0 => Some(Self::DeviceInfo),
            0xB1 => Some(Self::Reading),
            _ => None,
        }
    }

    /// Convert to raw byte value.
    pub fn to_raw(self) -> u8 {
        self as u8
    }

    /// Total frame length for this opcode, checksum included.
    pub fn frame_len(self) -> usize {
        match self {
            Self::Handshake | Self::ReadRequest => 4,
            Self::DeviceInfo => 6,
            Self::Reading => 10,
        }
    }

    /// Check if this opcode is sent by the wand.
    pub fn is_notification(self) -> bool {
        matches!(self, Self::DeviceInfo | Self::Reading)
    }
}

/// Validate an inbound frame and return its opcode and payload.
///
/// Checks run cheapest first: minimum length, opcode, exact length, then
/// checksum. Nothing is interpreted until all of them pass.
pub fn open_notification(frame: &[u8]) -> Result<(Opcode, &[u8]), DecodeError> {
    if frame.len() < MIN_NOTIFICATION_LEN {
        return Err(DecodeError::BadLength {
            expected: MIN_NOTIFICATION_LEN,
            actual: frame.len(),
        });
    }

    let opcode = match Opcode::from_raw(frame[0]) {
        Some(op) if op.is_notification() => op,
        _ => return Err(DecodeError::UnknownOpcode(frame[0])),
    };

    if frame.len() != opcode.frame_len() {
        return Err(DecodeError::BadLength {
            expected: opcode.frame_len(),
            actual: frame.len(),
        });
    }

    let (&actual, body) = frame
        .split_last()
        .ok_or(DecodeError::BadLength {
            expected: opcode.frame_len(),
            actual: 0,
        })?;
    let expected = checksum(body);
    if expected != actual {
        return Err(DecodeError::BadChecksum { expected, actual });
    }

    Ok((opcode, &body[1..]))
}

/// Read a little-endian unsigned field, mapping the absent marker to `None`.
pub(crate) fn read_u16(payload: &[u8], offset: usize) -> Option<u16> {
    let raw = u16::from_le_bytes([payload[offset], payload[offset + 1]]);
    (raw != ABSENT_U16).then_some(raw)
}

/// Read a little-endian signed field, mapping the absent marker to `None`.
pub(crate) fn read_i16(payload: &[u8], offset: usize) -> Option<i16> {
    let raw = i16::from_le_bytes([payload[offset], payload[offset + 1]]);
    (raw != ABSENT_I16).then_some(raw)
}
