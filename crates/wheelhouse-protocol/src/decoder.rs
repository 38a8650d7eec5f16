//! Frame decoder for the wheel byte stream.
//!
//! The device protocol has no general framing: the leading byte of the
//! buffer selects a fixed frame layout, except for tag reads which are
//! delimited by `0x02 .. 0x03`. Decoding is therefore a loop over the
//! buffer head:
//!
//! ```text
//! ┌──────────────┐ complete frame ┌────────────────┐
//! │ inspect head │───────────────>│ consume, emit  │──┐
//! └──────────────┘                └────────────────┘  │
//!    │  │   ^                                         │
//!    │  │   └─────────────────────────────────────────┘
//!    │  │ partial frame
//!    │  └──────────────> stop, keep remainder for the next call
//!    │ unknown prefix
//!    └─────────────────> stop, report desync (caller resets the port)
//! ```
//!
//! The decoder never blocks and never holds state between calls; anything
//! not yet decodable stays in the caller's buffer.

use bytes::{Buf, BytesMut};
use tracing::{debug, trace};
use wheelhouse_core::{
    LockState, StepDirection, TagId, WheelId,
    constants::{
        ADC_MAX_RAW, FRAME_PING, FRAME_STEP, FRAME_TAG_END, FRAME_TAG_START, FRAME_TEMPERATURE,
        FRAME_WHEEL_ID, SHORT_FRAME_LEN, SYNC_BYTE, TAG_FRAME_LEN, TEMPERATURE_FRAME_LEN,
    },
};

use crate::{
    Message,
    checksum::verify_tag_payload,
    error::{ProtocolError, Result},
};

/// Everything decoded from one pass over a buffer.
#[derive(Debug, Default)]
pub struct DecodeOutcome {
    /// Messages in arrival order.
    pub messages: Vec<Message>,

    /// Tag frames whose checksum failed; each produced a sentinel tag message.
    pub checksum_mismatches: usize,

    /// Set when decoding stopped on a protocol violation.
    pub desync: Option<ProtocolError>,
}

impl DecodeOutcome {
    #[must_use]
    pub fn is_desync(&self) -> bool {
        self.desync.is_some()
    }
}

/// One decoded frame plus its checksum verdict.
struct Decoded {
    message: Message,
    checksum_ok: bool,
}

impl Decoded {
    fn valid(message: Message) -> Self {
        Self {
            message,
            checksum_ok: true,
        }
    }
}

/// Stateless decoder over a port's receive buffer.
///
/// # Example
///
/// ```
/// use bytes::BytesMut;
/// use wheelhouse_core::StepDirection;
/// use wheelhouse_protocol::{FrameDecoder, Message};
///
/// // One complete step frame and the first byte of a temperature frame
/// let mut buf = BytesMut::from(&[0x00, 0x01, 0x01][..]);
/// let outcome = FrameDecoder::decode(&mut buf);
///
/// assert_eq!(outcome.messages, vec![Message::Step(StepDirection::Forward)]);
/// assert_eq!(&buf[..], &[0x01]);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameDecoder;

impl FrameDecoder {
    /// Decode every complete frame at the head of `buf`.
    ///
    /// Consumed frames are removed from `buf`; a trailing partial frame is
    /// left in place. On a protocol violation decoding stops, the offending
    /// bytes stay in `buf`, and [`DecodeOutcome::desync`] is set.
    pub fn decode(buf: &mut BytesMut) -> DecodeOutcome {
        let mut outcome = DecodeOutcome::default();

        loop {
            match Self::next_frame(buf) {
                Ok(Some(decoded)) => {
                    if !decoded.checksum_ok {
                        outcome.checksum_mismatches += 1;
                    }
                    outcome.messages.push(decoded.message);
                }
                Ok(None) => break,
                Err(e) => {
                    outcome.desync = Some(e);
                    break;
                }
            }
        }

        outcome
    }

    /// Decode a single frame from the head of `buf`.
    ///
    /// Returns `Ok(None)` when more bytes are needed.
    ///
    /// # Errors
    /// Returns a [`ProtocolError`] when the head of the buffer is not a
    /// valid frame.
    pub fn decode_frame(buf: &mut BytesMut) -> Result<Option<Message>> {
        Ok(Self::next_frame(buf)?.map(|decoded| decoded.message))
    }

    fn next_frame(buf: &mut BytesMut) -> Result<Option<Decoded>> {
        loop {
            let Some(&command) = buf.first() else {
                return Ok(None);
            };

            let decoded = match command {
                // Tail of a sync run longer than the configured length
                SYNC_BYTE => {
                    buf.advance(1);
                    continue;
                }
                FRAME_STEP => Self::decode_step(buf)?,
                FRAME_TEMPERATURE => Self::decode_temperature(buf)?,
                FRAME_TAG_START => Self::decode_tag(buf)?,
                FRAME_PING => Self::decode_ping(buf)?,
                FRAME_WHEEL_ID => Self::decode_wheel_id(buf)?,
                other => return Err(ProtocolError::UnknownCommand(other)),
            };

            if let Some(decoded) = &decoded {
                trace!(kind = decoded.message.kind(), "decoded frame");
            }
            return Ok(decoded);
        }
    }

    fn decode_step(buf: &mut BytesMut) -> Result<Option<Decoded>> {
        if buf.len() < SHORT_FRAME_LEN {
            return Ok(None);
        }
        let byte = buf[1];
        let direction = StepDirection::from_u8(byte)
            .map_err(|_| ProtocolError::InvalidPayload { frame: "step", byte })?;
        buf.advance(SHORT_FRAME_LEN);
        Ok(Some(Decoded::valid(Message::Step(direction))))
    }

    fn decode_temperature(buf: &mut BytesMut) -> Result<Option<Decoded>> {
        if buf.len() < TEMPERATURE_FRAME_LEN {
            return Ok(None);
        }
        let raw = u16::from_le_bytes([buf[1], buf[2]]);
        if raw > ADC_MAX_RAW {
            return Err(ProtocolError::InvalidPayload {
                frame: "temperature",
                byte: buf[2],
            });
        }
        buf.advance(TEMPERATURE_FRAME_LEN);
        Ok(Some(Decoded::valid(Message::Temperature { raw })))
    }

    fn decode_ping(buf: &mut BytesMut) -> Result<Option<Decoded>> {
        if buf.len() < SHORT_FRAME_LEN {
            return Ok(None);
        }
        let byte = buf[1];
        let state = LockState::from_u8(byte)
            .map_err(|_| ProtocolError::InvalidPayload { frame: "ping", byte })?;
        buf.advance(SHORT_FRAME_LEN);
        Ok(Some(Decoded::valid(Message::LockState(state))))
    }

    fn decode_wheel_id(buf: &mut BytesMut) -> Result<Option<Decoded>> {
        if buf.len() < SHORT_FRAME_LEN {
            return Ok(None);
        }
        let id = WheelId::new(buf[1]);
        buf.advance(SHORT_FRAME_LEN);
        Ok(Some(Decoded::valid(Message::WheelId(id))))
    }

    /// Tag frames are the only variable-length frames: scan for the end
    /// marker within the fixed frame length.
    fn decode_tag(buf: &mut BytesMut) -> Result<Option<Decoded>> {
        let search_end = buf.len().min(TAG_FRAME_LEN);

        let Some(end) = buf[1..search_end].iter().position(|&b| b == FRAME_TAG_END) else {
            if buf.len() >= TAG_FRAME_LEN {
                return Err(ProtocolError::UnterminatedTag {
                    max: TAG_FRAME_LEN,
                });
            }
            return Ok(None);
        };

        let frame = buf.split_to(end + 2);
        let payload = &frame[1..=end];

        let decoded = match verify_tag_payload(payload) {
            Some(tag) => Decoded::valid(Message::Tag(tag)),
            None => {
                debug!(
                    payload = %String::from_utf8_lossy(payload),
                    "tag checksum mismatch, substituting sentinel"
                );
                Decoded {
                    message: Message::Tag(TagId::sentinel()),
                    checksum_ok: false,
                }
            }
        };
        Ok(Some(decoded))
    }
}

/// Locate a handshake reply in `buf`.
///
/// Looks for a run of at least `min_len` consecutive sync bytes and returns
/// the index just past the end of that run, i.e. the number of bytes to
/// discard. Returns `None` while no long-enough run is present.
///
/// ```
/// use wheelhouse_protocol::find_sync_run;
///
/// let buf = [0x00, 0xFF, 0xFF, 0xFF, 0x05, 0x02];
/// assert_eq!(find_sync_run(&buf, 3), Some(4));
/// assert_eq!(find_sync_run(&buf, 4), None);
/// ```
#[must_use]
pub fn find_sync_run(buf: &[u8], min_len: usize) -> Option<usize> {
    let mut run = 0;
    for (i, &byte) in buf.iter().enumerate() {
        if byte == SYNC_BYTE {
            run += 1;
        } else {
            if run >= min_len {
                return Some(i);
            }
            run = 0;
        }
    }
    (run >= min_len).then_some(buf.len())
}
