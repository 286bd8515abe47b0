//! Command frames sent to the wand.

use crate::protocol::checksum::append_checksum;
use crate::protocol::frame::{Opcode, PROTOCOL_VERSION};

/// Sensor mask requesting every channel (pH, ORP, TDS, temperature).
pub const SENSOR_MASK_ALL: u8 = 0x0F;

/// Commands the wand understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// Announce the client's protocol version. The wand answers with a
    /// device information frame.
    Handshake,
    /// Ask the wand for one sensor reading.
    ReadRequest,
}

impl CommandKind {
    /// Opcode used for this command.
    pub fn opcode(self) -> Opcode {
        match self {
            Self::Handshake => Opcode::Handshake,
            Self::ReadRequest => Opcode::ReadRequest,
        }
    }
}

/// Build the frame for a command.
///
/// # Example
///
/// ```
/// use yinmik_ble::protocol::{create_command, CommandKind};
///
/// assert_eq!(create_command(CommandKind::ReadRequest), vec![0xA2, 0x01, 0x0F, 0xB2]);
/// ```
pub fn create_command(kind: CommandKind) -> Vec<u8> {
    let argument = match kind {
        CommandKind::Handshake => 0x00,
        CommandKind::ReadRequest => SENSOR_MASK_ALL,
    };
    let frame = append_checksum(&[kind.opcode().to_raw(), PROTOCOL_VERSION, argument]);
    debug_assert_eq!(frame.len(), kind.opcode().frame_len());
    frame
}
