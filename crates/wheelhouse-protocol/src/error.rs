//! Protocol violation errors.
//!
//! Every variant here means the byte stream can no longer be trusted to be
//! aligned on frame boundaries. The connection layer answers all of them the
//! same way: close the port and rediscover it.

/// Result type alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Leading byte matches no known frame prefix.
    #[error("Unknown command byte 0x{0:02X}")]
    UnknownCommand(u8),

    /// Frame prefix was recognized but its payload is out of range.
    #[error("Invalid {frame} payload byte 0x{byte:02X}")]
    InvalidPayload { frame: &'static str, byte: u8 },

    /// Tag frame grew past its fixed length without an end marker.
    #[error("Tag frame exceeds {max} bytes without terminator")]
    UnterminatedTag { max: usize },

    /// Transport error surfaced through the codec.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// The offending leading byte, when there is one.
    #[must_use]
    pub fn offending_byte(&self) -> Option<u8> {
        match self {
            Self::UnknownCommand(byte) | Self::InvalidPayload { byte, .. } => Some(*byte),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_command_display() {
        let error = ProtocolError::UnknownCommand(0x07);
        assert_eq!(error.to_string(), "Unknown command byte 0x07");
        assert_eq!(error.offending_byte(), Some(0x07));
    }

    #[test]
    fn test_invalid_payload_display() {
        let error = ProtocolError::InvalidPayload {
            frame: "step",
            byte: 0x09,
        };
        assert_eq!(error.to_string(), "Invalid step payload byte 0x09");
    }

    #[test]
    fn test_unterminated_has_no_byte() {
        let error = ProtocolError::UnterminatedTag { max: 14 };
        assert_eq!(error.offending_byte(), None);
    }
}
