//! `serialport`-backed implementation of the serial traits.

use bytes::BytesMut;
use serialport::SerialPort;
use std::collections::BTreeSet;
use std::io::{self, Read, Write};
use std::time::Duration;
use tracing::{debug, trace};

use crate::{
    Result,
    traits::{SerialBackend, SerialLink},
};

/// Driver timeout for a single read or write.
///
/// Reads only request bytes the driver already holds, so this bounds the
/// rare case of a write stalling on a full output buffer.
pub const IO_TIMEOUT: Duration = Duration::from_millis(10);

/// Serial ports as reported by the operating system.
#[derive(Debug, Clone)]
pub struct SystemSerial {
    baud_rate: u32,
}

impl SystemSerial {
    pub fn new(baud_rate: u32) -> Self {
        Self { baud_rate }
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }
}

impl SerialBackend for SystemSerial {
    fn visible_ports(&mut self) -> Result<BTreeSet<String>> {
        let ports = serialport::available_ports()?;
        Ok(ports.into_iter().map(|p| p.port_name).collect())
    }

    fn open(&mut self, name: &str) -> Result<Box<dyn SerialLink>> {
        let port = serialport::new(name, self.baud_rate)
            .timeout(IO_TIMEOUT)
            .open()?;
        debug!(port = name, baud = self.baud_rate, "opened serial port");
        Ok(Box::new(SerialportLink {
            name: name.to_string(),
            port,
        }))
    }
}

/// An open OS serial port.
pub struct SerialportLink {
    name: String,
    port: Box<dyn SerialPort>,
}

impl std::fmt::Debug for SerialportLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialportLink")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl SerialLink for SerialportLink {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_available(&mut self, dst: &mut BytesMut) -> Result<usize> {
        let pending = usize::try_from(self.port.bytes_to_read()?).unwrap_or(usize::MAX);
        if pending == 0 {
            return Ok(0);
        }

        let start = dst.len();
        dst.resize(start + pending, 0);
        match self.port.read(&mut dst[start..]) {
            Ok(n) => {
                dst.truncate(start + n);
                trace!(port = %self.name, bytes = n, "read");
                Ok(n)
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                dst.truncate(start);
                Ok(0)
            }
            Err(e) => {
                dst.truncate(start);
                Err(e.into())
            }
        }
    }

    fn write_byte(&mut self, byte: u8) -> Result<()> {
        self.port.write_all(&[byte])?;
        trace!(port = %self.name, byte, "wrote command");
        Ok(())
    }
}

impl Drop for SerialportLink {
    fn drop(&mut self) {
        debug!(port = %self.name, "closed serial port");
    }
}
