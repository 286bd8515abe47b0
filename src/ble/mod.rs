//! BLE communication module.
//!
//! This module provides the radio side of the crate: the [`RadioTransport`]
//! abstraction a session drives, and its `btleplug` implementation for
//! discovering and talking to Yinmik wands.

pub mod characteristics;
pub(crate) mod guard;
pub mod platform;
pub mod scanner;
pub mod transport;
pub mod uuids;

pub use platform::BtleplugTransport;
pub use scanner::BleScanner;
pub use transport::{
    DeviceFilter, DiscoveredDevice, FrameSink, LinkHandle, RadioTransport, ReceivedFrame,
    SubscriptionHandle, FRAME_QUEUE_CAPACITY,
};
pub use uuids::*;
