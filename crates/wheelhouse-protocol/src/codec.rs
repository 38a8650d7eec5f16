//! Tokio codec for the wheel protocol.
//!
//! `WheelCodec` wraps [`FrameDecoder`] for use with `tokio_util::codec`
//! framed transports:
//! - [`Decoder`]: yields one [`Message`] per complete device frame
//! - [`Encoder<HostCommand>`]: writes single-byte host commands
//!
//! The engine itself drains raw bytes on its own tick and never needs a
//! runtime; the codec serves async transports and device simulators.
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use tokio_util::codec::FramedRead;
//! use wheelhouse_protocol::WheelCodec;
//!
//! # async fn example(port: impl tokio::io::AsyncRead + Unpin) {
//! let mut frames = FramedRead::new(port, WheelCodec::new());
//! while let Some(result) = frames.next().await {
//!     match result {
//!         Ok(message) => println!("{message:?}"),
//!         Err(e) => {
//!             eprintln!("stream out of sync: {e}");
//!             break;
//!         }
//!     }
//! }
//! # }
//! ```

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::{FrameDecoder, HostCommand, Message, ProtocolError};

/// Codec for device frames and host commands.
#[derive(Debug, Clone, Copy, Default)]
pub struct WheelCodec {
    _private: (),
}

impl WheelCodec {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for WheelCodec {
    type Item = Message;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        FrameDecoder::decode_frame(src)
    }
}

impl Encoder<HostCommand> for WheelCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: HostCommand, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.put_u8(item.to_byte());
        Ok(())
    }
}

impl Encoder<Message> for WheelCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.encode_into(dst);
        Ok(())
    }
}
