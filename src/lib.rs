// Allow unusual byte groupings for UUIDs which have standard format
#![allow(clippy::unusual_byte_groupings)]

//! # yinmik-ble
//!
//! A cross-platform Rust library for reading Yinmik water-testing wands
//! (pH, ORP, TDS and temperature) over Bluetooth Low Energy.
//!
//! The crate has two layers:
//!
//! - **Protocol codec** ([`protocol`]): pure functions that build command
//!   frames and decode notification frames. No I/O, no clocks.
//! - **Connection session** ([`WandSession`]): a state machine that drives a
//!   single wand through scan, connect, read and disconnect over a
//!   [`RadioTransport`].
//!
//! ## Features
//!
//! - **Wand Discovery**: Find nearby wands by advertised name
//! - **On-demand Readings**: Request a measurement and await the reply
//! - **Corrupt Frame Tolerance**: Bad frames are skipped, never surfaced
//! - **Deadlines**: Every wait is bounded and interrupted by `disconnect()`
//! - **Plausibility Checks**: Flag values outside physical ranges
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use yinmik_ble::{BtleplugTransport, Result, WandSession};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let transport = BtleplugTransport::new().await?;
//!     let session = WandSession::new(Arc::new(transport));
//!
//!     // Listen for wands
//!     let wands = session.scan().await?;
//!     let Some(wand) = wands.first() else {
//!         println!("No wand found");
//!         return Ok(());
//!     };
//!
//!     session.connect(&wand.device_id).await?;
//!
//!     let reading = session.read_water().await?;
//!     println!("{}", reading);
//!
//!     session.disconnect().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Platform Notes
//!
//! ### macOS
//! Requires Bluetooth permission. Add `NSBluetoothAlwaysUsageDescription`
//! to your Info.plist for bundled apps.
//!
//! ### Linux
//! Requires BlueZ. User may need to be in the `bluetooth` group.
//!
//! ### Windows
//! Requires Windows 10 or later with Bluetooth LE support.
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization for data types

// Public modules
pub mod ble;
pub mod data;
pub mod error;
pub mod protocol;
pub mod session;

// Re-exports for convenience
pub use error::{DecodeError, Error, Result};
pub use session::{CallbackHandle, ConnectionStatus, SessionConfig, WandSession};

// Re-export commonly used types from submodules
pub use ble::{
    is_yinmik_name, BtleplugTransport, DeviceFilter, DiscoveredDevice, FrameSink, LinkHandle,
    RadioTransport, ReceivedFrame, SubscriptionHandle,
};
pub use data::{
    validate_reading, DeviceInfo, Parameter, PlausibilityFlag, ValidationResult, WaterReading,
    YinmikDevice,
};
pub use protocol::{create_command, parse_water_reading, CommandKind};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_exports() {
        // Verify that key types are exported
        let _ = std::any::TypeId::of::<WandSession>();
        let _ = std::any::TypeId::of::<BtleplugTransport>();
        let _ = std::any::TypeId::of::<Error>();
        let _ = std::any::TypeId::of::<DecodeError>();
        let _ = std::any::TypeId::of::<WaterReading>();
        let _ = std::any::TypeId::of::<YinmikDevice>();
        let _ = std::any::TypeId::of::<SessionConfig>();
    }

    #[test]
    fn test_codec_round_trip_through_exports() {
        let command = create_command(CommandKind::ReadRequest);
        assert_eq!(command, vec![0xA2, 0x01, 0x0F, 0xB2]);

        let frame = [0xB1, 0x2A, 0x03, 0x88, 0xFF, 0x00, 0x00, 0xDD, 0xFF, 0x41];
        let reading = parse_water_reading(&frame, chrono::Utc::now()).unwrap();
        assert_eq!(reading.ph, Some(8.1));
        assert_eq!(reading.orp, Some(-120.0));
        assert_eq!(reading.tds, Some(0.0));
        assert_eq!(reading.temperature_c, Some(-3.5));
    }
}
