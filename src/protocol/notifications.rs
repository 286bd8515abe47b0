//! Notification frame decoding.
//!
//! Reading frame payload (protocol version 1):
//! - Bytes 0-1: pH × 100 (`u16`)
//! - Bytes 2-3: ORP in mV (`i16`)
//! - Bytes 4-5: TDS in ppm (`u16`)
//! - Bytes 6-7: Temperature in °C × 10 (`i16`)
//!
//! Device information payload:
//! - Byte 0: Protocol version
//! - Byte 1: Firmware major
//! - Byte 2: Firmware minor
//! - Byte 3: Battery percent (`0xFF` = unknown)

use chrono::{DateTime, Utc};

use crate::data::{DeviceInfo, WaterReading};
use crate::error::DecodeError;
use crate::protocol::frame::{open_notification, read_i16, read_u16, Opcode};

/// Scale of the pH field.
pub const PH_SCALE: f64 = 100.0;
/// Scale of the ORP field.
pub const ORP_SCALE: f64 = 1.0;
/// Scale of the TDS field.
pub const TDS_SCALE: f64 = 1.0;
/// Scale of the temperature field.
pub const TEMPERATURE_SCALE: f64 = 10.0;

const BATTERY_UNKNOWN: u8 = 0xFF;

/// A decoded notification frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// A sensor reading.
    Reading(WaterReading),
    /// The handshake acknowledgement.
    DeviceInfo(DeviceInfo),
}

/// Decode any notification frame the wand sends.
///
/// `captured_at` is stamped onto readings so decoding stays deterministic.
pub fn decode_notification(
    frame: &[u8],
    captured_at: DateTime<Utc>,
) -> Result<Notification, DecodeError> {
    let (opcode, payload) = open_notification(frame)?;

    match opcode {
        Opcode::Reading => decode_reading(payload, captured_at).map(Notification::Reading),
        Opcode::DeviceInfo => Ok(Notification::DeviceInfo(decode_device_info(payload))),
        other => Err(DecodeError::UnknownOpcode(other.to_raw())),
    }
}

/// Decode a reading frame.
///
/// Frames of any other type, device information included, are reported as
/// [`DecodeError::UnknownOpcode`].
///
/// # Example
///
/// ```
/// use chrono::Utc;
/// use yinmik_ble::protocol::parse_water_reading;
///
/// let frame = [0xB1, 0xD3, 0x02, 0xF5, 0x00, 0x38, 0x01, 0xF5, 0x00, 0xA9];
/// let reading = parse_water_reading(&frame, Utc::now()).unwrap();
/// assert_eq!(reading.ph, Some(7.23));
/// assert_eq!(reading.temperature_c, Some(24.5));
/// ```
pub fn parse_water_reading(
    frame: &[u8],
    captured_at: DateTime<Utc>,
) -> Result<WaterReading, DecodeError> {
    match decode_notification(frame, captured_at)? {
        Notification::Reading(reading) => Ok(reading),
        Notification::DeviceInfo(_) => Err(DecodeError::UnknownOpcode(Opcode::DeviceInfo.to_raw())),
    }
}

fn decode_reading(payload: &[u8], captured_at: DateTime<Utc>) -> Result<WaterReading, DecodeError> {
    let reading = WaterReading {
        ph: read_u16(payload, 0).map(|raw| raw as f64 / PH_SCALE),
        orp: read_i16(payload, 2).map(|raw| raw as f64 / ORP_SCALE),
        tds: read_u16(payload, 4).map(|raw| raw as f64 / TDS_SCALE),
        temperature_c: read_i16(payload, 6).map(|raw| raw as f64 / TEMPERATURE_SCALE),
        captured_at,
    };

    if reading.is_empty() {
        return Err(DecodeError::AllValuesNull);
    }

    Ok(reading)
}

fn decode_device_info(payload: &[u8]) -> DeviceInfo {
    DeviceInfo {
        protocol_version: payload[0],
        firmware_major: payload[1],
        firmware_minor: payload[2],
        battery_percent: (payload[3] != BATTERY_UNKNOWN).then_some(payload[3].min(100)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::checksum::append_checksum;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    /// Full sensor set: pH 7.23, ORP 245 mV, TDS 312 ppm, 24.5 °C.
    const FULL_READING: [u8; 10] = [0xB1, 0xD3, 0x02, 0xF5, 0x00, 0x38, 0x01, 0xF5, 0x00, 0xA9];
    /// pH 6.85 and 18.0 °C only, ORP and TDS probes absent.
    const PARTIAL_READING: [u8; 10] = [0xB1, 0xAD, 0x02, 0x00, 0x80, 0xFF, 0xFF, 0xB4, 0x00, 0x92];
    /// pH 8.10, ORP -120 mV, TDS 0 ppm, -3.5 °C.
    const NEGATIVE_READING: [u8; 10] =
        [0xB1, 0x2A, 0x03, 0x88, 0xFF, 0x00, 0x00, 0xDD, 0xFF, 0x41];
    /// Every sensor absent.
    const EMPTY_READING: [u8; 10] = [0xB1, 0xFF, 0xFF, 0x00, 0x80, 0xFF, 0xFF, 0x00, 0x80, 0xAD];
    /// Protocol 1, firmware 2.7, battery 85 %.
    const DEVICE_INFO: [u8; 6] = [0xB0, 0x01, 0x02, 0x07, 0x55, 0x0F];

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn reading_frame(ph: u16, orp: i16, tds: u16, temperature: i16) -> Vec<u8> {
        let mut body = vec![Opcode::Reading.to_raw()];
        body.extend_from_slice(&ph.to_le_bytes());
        body.extend_from_slice(&orp.to_le_bytes());
        body.extend_from_slice(&tds.to_le_bytes());
        body.extend_from_slice(&temperature.to_le_bytes());
        append_checksum(&body)
    }

    fn bits(reading: &WaterReading) -> [Option<u64>; 4] {
        [reading.ph, reading.orp, reading.tds, reading.temperature_c].map(|v| v.map(f64::to_bits))
    }

    #[test]
    fn test_full_reading_fixture() {
        let reading = parse_water_reading(&FULL_READING, at()).unwrap();
        assert_eq!(
            reading,
            WaterReading {
                ph: Some(7.23),
                orp: Some(245.0),
                tds: Some(312.0),
                temperature_c: Some(24.5),
                captured_at: at(),
            }
        );
    }

    #[test]
    fn test_partial_reading_fixture() {
        let reading = parse_water_reading(&PARTIAL_READING, at()).unwrap();
        assert_eq!(reading.ph, Some(6.85));
        assert_eq!(reading.orp, None);
        assert_eq!(reading.tds, None);
        assert_eq!(reading.temperature_c, Some(18.0));
    }

    #[test]
    fn test_negative_reading_fixture() {
        let reading = parse_water_reading(&NEGATIVE_READING, at()).unwrap();
        assert_eq!(reading.ph, Some(8.1));
        assert_eq!(reading.orp, Some(-120.0));
        assert_eq!(reading.tds, Some(0.0));
        assert_eq!(reading.temperature_c, Some(-3.5));
    }

    #[test]
    fn test_all_values_null() {
        assert_eq!(
            parse_water_reading(&EMPTY_READING, at()),
            Err(DecodeError::AllValuesNull)
        );
    }

    #[test]
    fn test_device_info_fixture() {
        assert_eq!(
            decode_notification(&DEVICE_INFO, at()),
            Ok(Notification::DeviceInfo(DeviceInfo {
                protocol_version: 1,
                firmware_major: 2,
                firmware_minor: 7,
                battery_percent: Some(85),
            }))
        );
    }

    #[test]
    fn test_device_info_unknown_battery() {
        let frame = append_checksum(&[0xB0, 0x01, 0x01, 0x00, 0xFF]);
        match decode_notification(&frame, at()) {
            Ok(Notification::DeviceInfo(info)) => assert_eq!(info.battery_percent, None),
            other => panic!("unexpected decode result: {:?}", other),
        }
    }

    #[test]
    fn test_parse_water_reading_rejects_device_info() {
        assert_eq!(
            parse_water_reading(&DEVICE_INFO, at()),
            Err(DecodeError::UnknownOpcode(0xB0))
        );
    }

    #[test]
    fn test_unknown_opcode() {
        let mut frame = FULL_READING;
        frame[0] = 0x7E;
        assert_eq!(
            parse_water_reading(&frame, at()),
            Err(DecodeError::UnknownOpcode(0x7E))
        );
    }

    #[test]
    fn test_truncated_reading() {
        assert_eq!(
            parse_water_reading(&FULL_READING[..9], at()),
            Err(DecodeError::BadLength {
                expected: 10,
                actual: 9
            })
        );
    }

    #[test]
    fn test_trailing_garbage() {
        let mut frame = FULL_READING.to_vec();
        frame.push(0x00);
        assert_eq!(
            parse_water_reading(&frame, at()),
            Err(DecodeError::BadLength {
                expected: 10,
                actual: 11
            })
        );
    }

    #[test]
    fn test_corrupted_payload() {
        let mut frame = FULL_READING;
        frame[3] ^= 0x01;
        assert!(matches!(
            parse_water_reading(&frame, at()),
            Err(DecodeError::BadChecksum { .. })
        ));
    }

    #[test]
    fn test_empty_input() {
        assert!(matches!(
            parse_water_reading(&[], at()),
            Err(DecodeError::BadLength { actual: 0, .. })
        ));
    }

    proptest! {
        #[test]
        fn prop_decoding_is_idempotent(
            ph in any::<u16>(),
            orp in any::<i16>(),
            tds in any::<u16>(),
            temperature in any::<i16>(),
        ) {
            let frame = reading_frame(ph, orp, tds, temperature);
            match (parse_water_reading(&frame, at()), parse_water_reading(&frame, at())) {
                (Ok(first), Ok(second)) => {
                    prop_assert_eq!(bits(&first), bits(&second));
                    prop_assert_eq!(first.captured_at, second.captured_at);
                }
                (first, second) => prop_assert_eq!(first, second),
            }
        }

        #[test]
        fn prop_short_input_is_bad_length(bytes in proptest::collection::vec(any::<u8>(), 0..6)) {
            let is_bad_length = matches!(
                parse_water_reading(&bytes, at()),
                Err(DecodeError::BadLength { .. })
            );
            prop_assert!(is_bad_length);
        }

        #[test]
        fn prop_corrupted_last_byte_is_bad_checksum(
            ph in any::<u16>(),
            orp in any::<i16>(),
            tds in any::<u16>(),
            temperature in any::<i16>(),
            delta in 1u8..=255,
        ) {
            let mut frame = reading_frame(ph, orp, tds, temperature);
            let last = frame.len() - 1;
            frame[last] = frame[last].wrapping_add(delta);
            let is_bad_checksum = matches!(
                parse_water_reading(&frame, at()),
                Err(DecodeError::BadChecksum { .. })
            );
            prop_assert!(is_bad_checksum);
        }

        #[test]
        fn prop_arbitrary_bytes_never_panic(bytes in proptest::collection::vec(any::<u8>(), 0..32)) {
            let _ = decode_notification(&bytes, at());
        }
    }
}
