//! Device identity and information.

use crate::ble::transport::{DeviceFilter, DiscoveredDevice};

/// A compatible wand found during a scan.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct YinmikDevice {
    /// Opaque platform handle used to connect.
    pub device_id: String,
    /// Advertised name.
    pub name: String,
    /// Signal strength in dBm, if the platform reports it.
    pub rssi: Option<i16>,
}

impl YinmikDevice {
    /// Recognize a wand among raw scan results.
    ///
    /// Returns `None` for devices whose advertised name does not match a
    /// known wand prefix, including devices that advertise no name.
    pub fn from_discovered(device: &DiscoveredDevice) -> Option<Self> {
        Self::from_filtered(device, &DeviceFilter::default())
    }

    /// Recognize a wand using a custom set of name prefixes.
    pub fn from_filtered(device: &DiscoveredDevice, filter: &DeviceFilter) -> Option<Self> {
        if !filter.matches(device) {
            return None;
        }

        Some(Self {
            device_id: device.id.clone(),
            name: device.name.clone()?,
            rssi: device.rssi,
        })
    }
}

/// Information the wand reports in its handshake acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceInfo {
    /// Protocol version spoken by the wand firmware.
    pub protocol_version: u8,
    /// Firmware major version.
    pub firmware_major: u8,
    /// Firmware minor version.
    pub firmware_minor: u8,
    /// Battery charge in percent, if the wand reports it.
    pub battery_percent: Option<u8>,
}

impl DeviceInfo {
    /// Firmware version formatted as `major.minor`.
    pub fn firmware_version(&self) -> String {
        format!("{}.{}", self.firmware_major, self.firmware_minor)
    }

    /// Check if the battery is reported below the given percentage.
    pub fn is_battery_below(&self, percent: u8) -> bool {
        self.battery_percent.map(|b| b < percent).unwrap_or(false)
    }
}
