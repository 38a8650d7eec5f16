use bytes::{BufMut, BytesMut};
use wheelhouse_core::{
    LockState, StepDirection, TagId, WheelId,
    constants::{
        CMD_LOCK, CMD_UNLOCK, FRAME_PING, FRAME_STEP, FRAME_TAG_END, FRAME_TAG_START,
        FRAME_TEMPERATURE, FRAME_WHEEL_ID, HANDSHAKE_REQUEST, TAG_FRAME_LEN,
    },
};

use crate::checksum::{checksum_hex, tag_checksum};

/// A decoded device-to-host frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// One hall-sensor transition.
    Step(StepDirection),

    /// Raw 10-bit ADC temperature sample.
    Temperature { raw: u16 },

    /// RFID tag read. Unreadable reads carry the sentinel tag.
    Tag(TagId),

    /// Heartbeat reporting the lock state the device has applied.
    LockState(LockState),

    /// Identity of the wheel, sent once after the handshake.
    WheelId(WheelId),
}

impl Message {
    /// Short name used in logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Step(_) => "step",
            Message::Temperature { .. } => "temperature",
            Message::Tag(_) => "tag",
            Message::LockState(_) => "ping",
            Message::WheelId(_) => "wheel_id",
        }
    }

    /// Append the wire encoding of this message to `dst`.
    ///
    /// This is what the firmware sends; the host uses it for simulation
    /// and tests.
    pub fn encode_into(&self, dst: &mut BytesMut) {
        match self {
            Message::Step(direction) => {
                dst.put_u8(FRAME_STEP);
                dst.put_u8(direction.to_u8());
            }
            Message::Temperature { raw } => {
                dst.put_u8(FRAME_TEMPERATURE);
                dst.put_u16_le(*raw);
            }
            Message::Tag(tag) => {
                let id = tag.as_str().as_bytes();
                dst.reserve(TAG_FRAME_LEN);
                dst.put_u8(FRAME_TAG_START);
                dst.put_slice(id);
                // TagId guarantees an even-length hex id
                dst.put_slice(&checksum_hex(tag_checksum(id).unwrap_or_default()));
                dst.put_u8(FRAME_TAG_END);
            }
            Message::LockState(state) => {
                dst.put_u8(FRAME_PING);
                dst.put_u8(state.to_u8());
            }
            Message::WheelId(id) => {
                dst.put_u8(FRAME_WHEEL_ID);
                dst.put_u8(id.as_u8());
            }
        }
    }

    #[must_use]
    pub fn to_bytes(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(TAG_FRAME_LEN);
        self.encode_into(&mut buf);
        buf
    }
}

/// A single-byte host-to-device command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostCommand {
    Unlock,
    Lock,
    Handshake,
}

impl HostCommand {
    #[must_use]
    pub fn to_byte(self) -> u8 {
        match self {
            HostCommand::Unlock => CMD_UNLOCK,
            HostCommand::Lock => CMD_LOCK,
            HostCommand::Handshake => HANDSHAKE_REQUEST,
        }
    }
}

impl From<LockState> for HostCommand {
    fn from(state: LockState) -> Self {
        match state {
            LockState::Unlocked => HostCommand::Unlock,
            LockState::Locked => HostCommand::Lock,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_encoding() {
        let bytes = Message::Step(StepDirection::Forward).to_bytes();
        assert_eq!(&bytes[..], &[0x00, 0x01]);
    }

    #[test]
    fn test_temperature_is_little_endian() {
        let bytes = Message::Temperature { raw: 0x0302 }.to_bytes();
        assert_eq!(&bytes[..], &[0x01, 0x02, 0x03]);
    }

    #[test]
    fn test_tag_encoding_appends_checksum() {
        let tag = TagId::new("3A00112233").unwrap();
        let bytes = Message::Tag(tag).to_bytes();
        assert_eq!(&bytes[..], b"\x023A001122333A\x03");
    }

    #[test]
    fn test_host_commands() {
        assert_eq!(HostCommand::Unlock.to_byte(), 0x00);
        assert_eq!(HostCommand::Lock.to_byte(), 0x01);
        assert_eq!(HostCommand::Handshake.to_byte(), 0xFF);
        assert_eq!(HostCommand::from(LockState::Locked), HostCommand::Lock);
    }
}
