//! Wire protocol of the running-wheel firmware.
//!
//! - [`Message`] / [`HostCommand`]: typed device and host frames
//! - [`FrameDecoder`]: non-blocking decoder over a port's receive buffer
//! - [`find_sync_run`]: handshake reply detection
//! - [`WheelCodec`]: `tokio_util` codec for async transports

pub mod checksum;
pub mod codec;
pub mod decoder;
pub mod error;
pub mod message;

pub use codec::WheelCodec;
pub use decoder::{DecodeOutcome, FrameDecoder, find_sync_run};
pub use error::{ProtocolError, Result};
pub use message::{HostCommand, Message};
