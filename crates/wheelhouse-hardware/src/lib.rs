//! Serial port abstraction layer for the running-wheel engine.
//!
//! This crate defines the narrow, non-blocking interfaces the engine uses to
//! reach the operating system, together with two implementations:
//!
//! - [`serial`]: real ports through the `serialport` crate, and
//!   [`probe::BlockingProbe`] which opens ports on the Tokio blocking pool
//! - [`mock`]: a scriptable in-memory bus for tests and demos
//!
//! # Design
//!
//! - **Non-blocking**: the engine drives every port from one tick thread, so
//!   reads only drain what the driver already holds and availability checks
//!   are handed off to a [`PortProbe`].
//! - **Object-safe**: open ports are `Box<dyn SerialLink>` so real and mock
//!   links can coexist.
//! - **Error-aware**: every fallible call returns [`Result<T>`][error::Result]
//!   carrying a [`HardwareError`].
//!
//! ```no_run
//! use bytes::BytesMut;
//! use wheelhouse_hardware::{SerialBackend, SerialLink, SystemSerial};
//!
//! # fn example() -> wheelhouse_hardware::Result<()> {
//! let mut backend = SystemSerial::new(9600);
//! for name in backend.visible_ports()? {
//!     let mut link = backend.open(&name)?;
//!     link.write_byte(0xFF)?;
//!
//!     let mut buf = BytesMut::new();
//!     link.read_available(&mut buf)?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod mock;
pub mod probe;
pub mod serial;
pub mod traits;

pub use error::{HardwareError, Result};
pub use probe::BlockingProbe;
pub use serial::{SerialportLink, SystemSerial};
pub use traits::{PortProbe, ProbeResult, SerialBackend, SerialLink};
