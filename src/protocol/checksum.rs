//! Frame checksum.
//!
//! Wand frames end with a single 8-bit additive checksum: the wrapping sum
//! of every byte that precedes it (opcode and payload).

/// Calculate the checksum for the given frame body.
///
/// # Example
///
/// ```
/// use yinmik_ble::protocol::checksum;
///
/// assert_eq!(checksum(&[0xA2, 0x01, 0x0F]), 0xB2);
/// ```
pub fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, &byte| acc.wrapping_add(byte))
}

/// Verify a complete frame whose last byte is the checksum.
///
/// Returns `false` for frames too short to carry a body and a checksum.
pub fn verify_checksum(frame: &[u8]) -> bool {
    match frame.split_last() {
        Some((&actual, body)) if !body.is_empty() => checksum(body) == actual,
        _ => false,
    }
}

/// Append the checksum byte to a frame body.
pub fn append_checksum(body: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(body.len() + 1);
    frame.extend_from_slice(body);
    frame.push(checksum(body));
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_empty() {
        assert_eq!(checksum(&[]), 0);
    }

    #[test]
    fn test_checksum_wraps() {
        assert_eq!(checksum(&[0xFF, 0x02]), 0x01);
        assert_eq!(checksum(&[0x80, 0x80]), 0x00);
    }

    #[test]
    fn test_checksum_reading_fixture() {
        let body = [0xB1, 0xD3, 0x02, 0xF5, 0x00, 0x38, 0x01, 0xF5, 0x00];
        assert_eq!(checksum(&body), 0xA9);
    }

    #[test]
    fn test_verify_checksum() {
        assert!(verify_checksum(&[0xA1, 0x01, 0x00, 0xA2]));
        assert!(!verify_checksum(&[0xA1, 0x01, 0x00, 0xA3]));
    }

    #[test]
    fn test_verify_checksum_too_short() {
        assert!(!verify_checksum(&[]));
        assert!(!verify_checksum(&[0x00]));
    }

    #[test]
    fn test_append_checksum() {
        let frame = append_checksum(&[0xB0, 0x01, 0x02, 0x07, 0x55]);
        assert_eq!(frame, vec![0xB0, 0x01, 0x02, 0x07, 0x55, 0x0F]);
        assert!(verify_checksum(&frame));
    }
}
