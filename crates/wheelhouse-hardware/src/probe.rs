//! Port opener on the Tokio blocking pool.
//!
//! Opening a serial port can stall for a long time on some platforms (a
//! Bluetooth SPP port that is out of range, a USB adapter mid-reset). The
//! probe performs the open on a blocking-pool thread and sends the open
//! link back through a channel the engine drains on its own tick.
//!
//! ```text
//! tick thread                       blocking pool
//! ───────────                       ─────────────
//! probe("COM4") ──spawn_blocking──> open("COM4")
//!                                        │ link
//! step() <──────── mpsc ─────────────────┘
//! ```

use std::collections::HashSet;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::debug;

use crate::{
    serial::SystemSerial,
    traits::{PortProbe, ProbeResult, SerialBackend},
};

/// Probe that opens ports on the Tokio blocking pool.
#[derive(Debug)]
pub struct BlockingProbe {
    runtime: Handle,
    serial: SystemSerial,
    result_tx: mpsc::UnboundedSender<ProbeResult>,
    result_rx: mpsc::UnboundedReceiver<ProbeResult>,
    in_flight: HashSet<String>,
}

impl BlockingProbe {
    /// Create a probe that schedules its checks on `runtime`.
    pub fn new(runtime: Handle, baud_rate: u32) -> Self {
        let (result_tx, result_rx) = mpsc::unbounded_channel();
        Self {
            runtime,
            serial: SystemSerial::new(baud_rate),
            result_tx,
            result_rx,
            in_flight: HashSet::new(),
        }
    }

    /// Number of checks that have not settled yet.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}

impl PortProbe for BlockingProbe {
    fn probe(&mut self, port: &str) {
        if !self.in_flight.insert(port.to_string()) {
            return;
        }

        let tx = self.result_tx.clone();
        let name = port.to_string();
        let mut serial = self.serial.clone();
        self.runtime.spawn_blocking(move || {
            let result = match serial.open(&name) {
                Ok(link) => ProbeResult::available(name, link),
                Err(e) => {
                    debug!(port = %name, error = %e, "probe failed");
                    ProbeResult::unavailable(name)
                }
            };
            // Receiver only disappears when the probe itself is dropped
            let _ = tx.send(result);
        });
    }

    fn step(&mut self) -> Vec<ProbeResult> {
        let mut settled = Vec::new();
        while let Ok(result) = self.result_rx.try_recv() {
            self.in_flight.remove(&result.port);
            settled.push(result);
        }
        settled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_missing_port_settles_unavailable() {
        let mut probe = BlockingProbe::new(Handle::current(), 9600);
        probe.probe("/dev/wheelhouse-does-not-exist");
        probe.probe("/dev/wheelhouse-does-not-exist");
        assert_eq!(probe.in_flight(), 1);

        let mut settled = Vec::new();
        for _ in 0..100 {
            settled.extend(probe.step());
            if !settled.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        assert_eq!(settled.len(), 1);
        assert_eq!(settled[0].port, "/dev/wheelhouse-does-not-exist");
        assert!(!settled[0].is_available());
        assert_eq!(probe.in_flight(), 0);
    }
}
