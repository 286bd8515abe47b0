//! Error types for the yinmik-ble crate.

use thiserror::Error;

/// Why a notification frame was rejected by the codec.
///
/// These are routine on a noisy radio link and are returned as values,
/// never raised as panics.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecodeError {
    /// The frame is shorter than any known frame, or its length does not
    /// match the length its opcode requires.
    #[error("Bad frame length: expected {expected} bytes, got {actual}")]
    BadLength {
        /// The length required.
        expected: usize,
        /// The length received.
        actual: usize,
    },

    /// The trailing checksum byte does not match the recomputed checksum.
    #[error("Checksum mismatch: expected {expected:#04x}, got {actual:#04x}")]
    BadChecksum {
        /// The checksum computed over the frame.
        expected: u8,
        /// The checksum byte carried by the frame.
        actual: u8,
    },

    /// The opcode byte is not one this decoder accepts.
    #[error("Unknown opcode: {0:#04x}")]
    UnknownOpcode(u8),

    /// The frame was well formed but carried no sensor values at all.
    #[error("Frame carries no sensor values")]
    AllValuesNull,
}

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Bluetooth-related error from the underlying BLE library.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Bluetooth is not available or is disabled on this system.
    #[error("Bluetooth not available or disabled")]
    BluetoothUnavailable,

    /// Device discovery could not be completed.
    #[error("Scan failed: {reason}")]
    ScanFailed {
        /// Description of why the scan failed.
        reason: String,
    },

    /// The specified device was not found.
    #[error("Device not found: {identifier}")]
    DeviceNotFound {
        /// The identifier that was searched for.
        identifier: String,
    },

    /// Failed to establish a connection to the wand.
    #[error("Connect failed: {reason}")]
    ConnectFailed {
        /// Description of why the connection failed.
        reason: String,
    },

    /// Failed to subscribe to the wand's notification characteristic.
    #[error("Subscription failed: {reason}")]
    SubscriptionFailed {
        /// Description of why the subscription failed.
        reason: String,
    },

    /// Writing a command frame to the wand failed.
    #[error("Write failed: {reason}")]
    WriteFailed {
        /// Description of why the write failed.
        reason: String,
    },

    /// Operation requires a connection but the session is not connected.
    #[error("Wand not connected")]
    NotConnected,

    /// The operation did not complete before its deadline.
    #[error("Operation timed out")]
    Timeout,

    /// The link was torn down while the operation was in flight.
    #[error("Disconnected")]
    Disconnected,

    /// Another operation is already in flight on this session.
    #[error("Session busy")]
    Busy,

    /// A frame could not be decoded.
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Characteristic not found on the device.
    #[error("Characteristic not found: {uuid}")]
    CharacteristicNotFound {
        /// The UUID of the characteristic that was not found.
        uuid: String,
    },

    /// An invalid parameter was provided.
    #[error("Invalid parameter: {name} = {value}")]
    InvalidParameter {
        /// The name of the parameter.
        name: String,
        /// The invalid value that was provided.
        value: String,
    },
}

impl Error {
    /// Check if retrying the operation later could succeed.
    ///
    /// Configuration mistakes and a missing adapter are not retryable.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::BluetoothUnavailable | Self::InvalidParameter { .. }
        )
    }
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_display() {
        let err = DecodeError::BadChecksum {
            expected: 0xA9,
            actual: 0x00,
        };
        assert_eq!(err.to_string(), "Checksum mismatch: expected 0xa9, got 0x00");
        assert_eq!(
            DecodeError::UnknownOpcode(0x7E).to_string(),
            "Unknown opcode: 0x7e"
        );
    }

    #[test]
    fn test_decode_error_converts() {
        let err: Error = DecodeError::AllValuesNull.into();
        assert!(matches!(err, Error::Decode(DecodeError::AllValuesNull)));
    }

    #[test]
    fn test_is_retryable() {
        assert!(Error::Timeout.is_retryable());
        assert!(Error::Busy.is_retryable());
        assert!(!Error::BluetoothUnavailable.is_retryable());
    }
}
