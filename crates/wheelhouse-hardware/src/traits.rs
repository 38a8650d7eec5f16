//! Serial port abstraction traits.
//!
//! These traits are the seam between the tick-driven engine and the OS.
//! Every method must return promptly: the engine calls them from a single
//! thread on every tick and has no other place to run.
//!
//! - [`SerialBackend`]: enumerate visible ports and open them
//! - [`SerialLink`]: non-blocking byte I/O on one open port
//! - [`PortProbe`]: asynchronous open that hands the link back on a later tick

use bytes::BytesMut;
use std::collections::BTreeSet;

use crate::error::Result;

/// One open serial port.
///
/// Dropping the link closes the port.
pub trait SerialLink: Send {
    /// OS name of the port.
    fn name(&self) -> &str;

    /// Append every byte the driver currently holds to `dst`.
    ///
    /// Returns the number of bytes appended. No data is `Ok(0)`, not an
    /// error, and the call never waits for more bytes to arrive.
    ///
    /// # Errors
    /// Returns an error if the port has failed (e.g. it was unplugged).
    fn read_available(&mut self, dst: &mut BytesMut) -> Result<usize>;

    /// Write a single command byte.
    ///
    /// # Errors
    /// Returns an error if the byte could not be handed to the driver.
    fn write_byte(&mut self, byte: u8) -> Result<()>;
}

/// Port enumeration and opening.
pub trait SerialBackend {
    /// Names of every serial port the OS currently reports.
    ///
    /// # Errors
    /// Returns an error if enumeration itself fails.
    fn visible_ports(&mut self) -> Result<BTreeSet<String>>;

    /// Open a port for non-blocking I/O.
    ///
    /// # Errors
    /// Returns an error if the port cannot be opened.
    fn open(&mut self, name: &str) -> Result<Box<dyn SerialLink>>;
}

/// Settled result of one probe request.
///
/// A successful probe hands over the link it opened, so the port is never
/// opened a second time on the tick thread.
pub struct ProbeResult {
    /// Port that was probed.
    pub port: String,

    /// The opened port, or `None` if it could not be opened.
    pub link: Option<Box<dyn SerialLink>>,
}

impl ProbeResult {
    pub fn available(port: impl Into<String>, link: Box<dyn SerialLink>) -> Self {
        Self {
            port: port.into(),
            link: Some(link),
        }
    }

    pub fn unavailable(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            link: None,
        }
    }

    pub fn is_available(&self) -> bool {
        self.link.is_some()
    }
}

impl std::fmt::Debug for ProbeResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeResult")
            .field("port", &self.port)
            .field("available", &self.is_available())
            .finish()
    }
}

/// Asynchronous port open.
///
/// [`probe`](PortProbe::probe) starts opening a port off the calling thread;
/// [`step`](PortProbe::step) must be called every tick and returns the
/// checks that settled since the last call. Each probe request settles
/// exactly once. A request for a port whose previous check is still in
/// flight is coalesced with it.
pub trait PortProbe {
    fn probe(&mut self, port: &str);

    fn step(&mut self) -> Vec<ProbeResult>;
}
