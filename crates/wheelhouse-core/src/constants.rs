//! Wire-level and default constants for the running-wheel protocol.
//!
//! The wheel firmware speaks a compact, command-prefixed byte protocol. Every
//! device frame starts with a single command byte that fully determines the
//! frame layout:
//!
//! ```text
//! 0x00 dir                       step (0 = backward, 1 = forward)
//! 0x01 lo hi                     raw ADC temperature, little-endian
//! 0x02 <10 hex> <2 hex> 0x03     RFID tag read with XOR checksum
//! 0x04 state                     heartbeat with current lock state
//! 0x05 id                        wheel identity, sent once after sync
//! 0xFF ...                       handshake reply run
//! ```
//!
//! The host only ever writes single bytes: [`CMD_UNLOCK`], [`CMD_LOCK`] and
//! [`HANDSHAKE_REQUEST`].
//!
//! # Usage
//!
//! ```
//! use wheelhouse_core::constants::*;
//!
//! assert_eq!(FRAME_TAG_START, 0x02);
//! assert_eq!(SENTINEL_TAG.len(), TAG_ID_LEN);
//! ```

// ============================================================================
// Host -> Device Commands
// ============================================================================

/// Release the wheel brake.
pub const CMD_UNLOCK: u8 = 0x00;

/// Engage the wheel brake.
pub const CMD_LOCK: u8 = 0x01;

/// Ask a freshly opened device to identify itself with a sync run.
pub const HANDSHAKE_REQUEST: u8 = 0xFF;

// ============================================================================
// Device -> Host Frame Prefixes
// ============================================================================

/// Hall-sensor step frame: `[0x00][dir]`.
pub const FRAME_STEP: u8 = 0x00;

/// Temperature frame: `[0x01][lo][hi]`.
pub const FRAME_TEMPERATURE: u8 = 0x01;

/// Start marker of an RFID tag frame.
pub const FRAME_TAG_START: u8 = 0x02;

/// End marker of an RFID tag frame.
pub const FRAME_TAG_END: u8 = 0x03;

/// Heartbeat frame carrying the applied lock state: `[0x04][state]`.
pub const FRAME_PING: u8 = 0x04;

/// Wheel identity frame: `[0x05][id]`.
pub const FRAME_WHEEL_ID: u8 = 0x05;

/// Byte repeated by the device to acknowledge a handshake.
pub const SYNC_BYTE: u8 = 0xFF;

/// Length of two-byte frames (step, ping, wheel id).
pub const SHORT_FRAME_LEN: usize = 2;

/// Length of the temperature frame.
pub const TEMPERATURE_FRAME_LEN: usize = 3;

// ============================================================================
// RFID Tags
// ============================================================================

/// Number of ASCII-hex characters in a tag identifier.
pub const TAG_ID_LEN: usize = 10;

/// Number of ASCII-hex characters in a tag checksum.
pub const TAG_CHECKSUM_LEN: usize = 2;

/// Full tag frame length: start marker, id, checksum, end marker.
pub const TAG_FRAME_LEN: usize = 1 + TAG_ID_LEN + TAG_CHECKSUM_LEN + 1;

/// Reserved identifier meaning "no tag" or "unreadable tag".
pub const SENTINEL_TAG: &str = "0000000000";

// ============================================================================
// Analog Front End
// ============================================================================

/// Full-scale count of the device ADC.
pub const ADC_RESOLUTION: f64 = 1024.0;

/// Largest raw value the 10-bit ADC can report.
pub const ADC_MAX_RAW: u16 = 1023;

/// Default ADC reference voltage in volts.
pub const DEFAULT_ADC_VREF: f64 = 5.0;

// ============================================================================
// Engine Defaults
// ============================================================================

/// Fast tick period in milliseconds (byte draining).
pub const DEFAULT_TICK_MS: u64 = 100;

/// Slow scan interval in seconds (discovery, timeouts, schedules).
///
/// Handshake deadline and inactivity timeout both equal one scan interval.
pub const DEFAULT_SCAN_INTERVAL_SECS: u64 = 3;

/// Consecutive [`SYNC_BYTE`]s required to accept a handshake.
pub const DEFAULT_SYNC_LENGTH: usize = 10;

/// Default serial line speed.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Scheduled lock firing window, in scan intervals.
pub const DEFAULT_SCHEDULE_GRACE_SCANS: u32 = 5;

/// Samples kept per display trail (temperature per port, distance per tag).
pub const DEFAULT_DISPLAY_WINDOW: usize = 600;

/// Default wheel radius in centimetres.
pub const DEFAULT_WHEEL_RADIUS_CM: f64 = 8.0;

/// Default number of hall-sensor transitions per revolution.
pub const DEFAULT_SENSOR_COUNT: u32 = 4;

/// Seconds in one day, used for time-of-day wraparound.
pub const SECONDS_PER_DAY: u32 = 86_400;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_frame_len_matches_layout() {
        assert_eq!(TAG_FRAME_LEN, 14);
    }

    #[test]
    fn test_sentinel_is_full_length() {
        assert_eq!(SENTINEL_TAG.len(), TAG_ID_LEN);
        assert!(SENTINEL_TAG.bytes().all(|b| b == b'0'));
    }
}
