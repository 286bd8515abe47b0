//! Protocol module for building and decoding wand frames.
//!
//! Everything here is pure: no I/O, no clocks. This module contains:
//! - Frame layouts and opcodes
//! - Command construction
//! - Notification decoding
//! - Checksum calculation

pub mod checksum;
pub mod commands;
pub mod frame;
pub mod notifications;

pub use checksum::{append_checksum, checksum, verify_checksum};
pub use commands::{create_command, CommandKind};
pub use frame::{Opcode, PROTOCOL_VERSION};
pub use notifications::{decode_notification, parse_water_reading, Notification};
