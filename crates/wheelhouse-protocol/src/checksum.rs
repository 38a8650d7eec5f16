//! RFID tag checksum.
//!
//! The reader transmits a 10-character hex identifier followed by a
//! 2-character hex checksum. The checksum is the XOR of the five bytes the
//! identifier encodes:
//!
//! ```text
//! "3A00112233"  ->  0x3A ^ 0x00 ^ 0x11 ^ 0x22 ^ 0x33 = 0x3A  ->  "3A"
//! ```

use wheelhouse_core::{
    TagId,
    constants::{TAG_CHECKSUM_LEN, TAG_ID_LEN},
};

const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

fn hex_value(digit: u8) -> Option<u8> {
    match digit {
        b'0'..=b'9' => Some(digit - b'0'),
        b'A'..=b'F' => Some(digit - b'A' + 10),
        b'a'..=b'f' => Some(digit - b'a' + 10),
        _ => None,
    }
}

/// Parse two ASCII hex characters into a byte.
fn hex_byte(pair: &[u8]) -> Option<u8> {
    match pair {
        [hi, lo] => Some(hex_value(*hi)? << 4 | hex_value(*lo)?),
        _ => None,
    }
}

/// XOR-fold the bytes encoded by an ASCII-hex identifier.
///
/// Returns `None` if the identifier has an odd length or a non-hex character.
#[must_use]
pub fn tag_checksum(id: &[u8]) -> Option<u8> {
    if id.len() % 2 != 0 {
        return None;
    }
    id.chunks(2)
        .try_fold(0u8, |acc, pair| hex_byte(pair).map(|b| acc ^ b))
}

/// Encode a checksum as two uppercase ASCII hex characters.
#[must_use]
pub fn checksum_hex(value: u8) -> [u8; TAG_CHECKSUM_LEN] {
    [
        HEX_DIGITS[usize::from(value >> 4)],
        HEX_DIGITS[usize::from(value & 0x0F)],
    ]
}

/// Validate a tag payload (identifier followed by checksum).
///
/// Returns the tag on success and `None` when the payload has the wrong
/// length, contains non-hex characters, or fails the checksum.
///
/// ```
/// use wheelhouse_protocol::checksum::verify_tag_payload;
///
/// let tag = verify_tag_payload(b"3A001122333A").unwrap();
/// assert_eq!(tag.as_str(), "3A00112233");
/// assert!(verify_tag_payload(b"3A001122333B").is_none());
/// ```
#[must_use]
pub fn verify_tag_payload(payload: &[u8]) -> Option<TagId> {
    if payload.len() != TAG_ID_LEN + TAG_CHECKSUM_LEN {
        return None;
    }
    let (id, received) = payload.split_at(TAG_ID_LEN);

    let expected = tag_checksum(id)?;
    if hex_byte(received)? != expected {
        return None;
    }

    let id = std::str::from_utf8(id).ok()?;
    TagId::new(id).ok()
}
