//! BLE Service and Characteristic UUIDs.
//!
//! Contains the GATT layout and advertised-name prefixes used to recognize
//! and talk to Yinmik wands.

use uuid::Uuid;

/// Wand data service UUID.
pub const WAND_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_ff00_0000_1000_8000_00805f9b34fb);
/// Command characteristic UUID (write to wand).
pub const WAND_WRITE_UUID: Uuid = Uuid::from_u128(0x0000_ff01_0000_1000_8000_00805f9b34fb);
/// Reading characteristic UUID (notifications from wand).
pub const WAND_NOTIFY_UUID: Uuid = Uuid::from_u128(0x0000_ff02_0000_1000_8000_00805f9b34fb);

/// Advertised-name prefixes of compatible wands.
pub const YINMIK_NAME_PREFIXES: &[&str] = &["BLE-9909", "BLE-C600", "BLE-YC01", "YINMIK"];

/// Check if an advertised name belongs to a compatible wand.
///
/// Matching is ASCII case-insensitive on the prefix.
pub fn is_yinmik_name(name: &str) -> bool {
    matches_any_prefix(name, YINMIK_NAME_PREFIXES)
}

/// Check if `name` starts with any of `prefixes`, ignoring ASCII case.
pub fn matches_any_prefix<S: AsRef<str>>(name: &str, prefixes: &[S]) -> bool {
    let name = name.trim();
    prefixes.iter().any(|prefix| {
        let prefix = prefix.as_ref();
        name.len() >= prefix.len()
            && name.is_char_boundary(prefix.len())
            && name[..prefix.len()].eq_ignore_ascii_case(prefix)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_format() {
        assert_eq!(
            WAND_SERVICE_UUID.to_string(),
            "0000ff00-0000-1000-8000-00805f9b34fb"
        );
        assert!(WAND_WRITE_UUID.to_string().starts_with("0000ff01"));
        assert!(WAND_NOTIFY_UUID.to_string().starts_with("0000ff02"));
    }

    #[test]
    fn test_is_yinmik_name() {
        assert!(is_yinmik_name("BLE-9909"));
        assert!(is_yinmik_name("BLE-C600 0A1B"));
        assert!(is_yinmik_name("ble-yc01"));
        assert!(is_yinmik_name("Yinmik Wand"));
        assert!(!is_yinmik_name("BLE-99"));
        assert!(!is_yinmik_name("Meat Thermometer"));
        assert!(!is_yinmik_name(""));
    }

    #[test]
    fn test_prefix_on_multibyte_name() {
        assert!(!is_yinmik_name("BLE-990é"));
        assert!(matches_any_prefix("Pool°Wand", &["pool"]));
    }
}
