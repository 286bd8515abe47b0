//! Data structures for wand data.
//!
//! This module contains the typed values produced by the codec: readings,
//! device identity and information, and plausibility checks.

pub mod device;
pub mod reading;
pub mod validation;

pub use device::{DeviceInfo, YinmikDevice};
pub use reading::WaterReading;
pub use validation::{validate_reading, Parameter, PlausibilityFlag, ValidationResult};
