//! Mock serial bus for testing and development.
//!
//! The bus simulates a set of wheel devices that can be plugged, unplugged,
//! made busy, and scripted to emit bytes, all without physical hardware.
//!
//! # Examples
//!
//! ```
//! use bytes::BytesMut;
//! use wheelhouse_hardware::mock::MockSerial;
//! use wheelhouse_hardware::traits::{PortProbe, SerialBackend, SerialLink};
//!
//! let (mut backend, handle) = MockSerial::new();
//! handle.plug("/dev/ttyACM0");
//! handle.plug("/dev/ttyACM1");
//!
//! let mut probe = handle.probe();
//! probe.probe("/dev/ttyACM1");
//! assert!(probe.step()[0].is_available());
//! assert!(handle.is_open("/dev/ttyACM1"));
//!
//! let mut link = backend.open("/dev/ttyACM0").unwrap();
//! link.write_byte(0xFF).unwrap();
//! handle.emit("/dev/ttyACM0", &[0x05, 0x02]);
//!
//! let mut buf = BytesMut::new();
//! link.read_available(&mut buf).unwrap();
//! assert_eq!(&buf[..], &[0x05, 0x02]);
//! assert_eq!(handle.written("/dev/ttyACM0"), vec![0xFF]);
//! ```

use bytes::BytesMut;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use wheelhouse_core::constants::{FRAME_WHEEL_ID, HANDSHAKE_REQUEST, SYNC_BYTE};

use crate::{
    HardwareError, Result,
    traits::{PortProbe, ProbeResult, SerialBackend, SerialLink},
};

/// Automatic handshake reply.
#[derive(Debug, Clone, Copy)]
struct Responder {
    sync_len: usize,
    wheel_id: u8,
}

#[derive(Debug)]
struct MockDevice {
    openable: bool,
    open: bool,
    failing: bool,
    failing_writes: bool,
    inbound: Vec<u8>,
    written: Vec<u8>,
    open_count: usize,
    responder: Option<Responder>,
}

impl MockDevice {
    fn new() -> Self {
        Self {
            openable: true,
            open: false,
            failing: false,
            failing_writes: false,
            inbound: Vec::new(),
            written: Vec::new(),
            open_count: 0,
            responder: None,
        }
    }
}

#[derive(Debug, Default)]
struct MockBus {
    devices: BTreeMap<String, MockDevice>,
}

type SharedBus = Arc<Mutex<MockBus>>;

fn lock(bus: &SharedBus) -> MutexGuard<'_, MockBus> {
    bus.lock().unwrap_or_else(PoisonError::into_inner)
}

fn open_link(bus: &SharedBus, name: &str) -> Result<Box<dyn SerialLink>> {
    let mut guard = lock(bus);
    let device = guard
        .devices
        .get_mut(name)
        .ok_or_else(|| HardwareError::disconnected(name))?;

    if !device.openable || device.open {
        return Err(HardwareError::unavailable(name, "port busy"));
    }

    device.open = true;
    device.open_count += 1;
    // Fresh open starts with an empty driver buffer
    device.inbound.clear();

    Ok(Box::new(MockLink {
        name: name.to_string(),
        bus: bus.clone(),
    }))
}

/// Mock implementation of [`SerialBackend`].
#[derive(Debug, Clone)]
pub struct MockSerial {
    bus: SharedBus,
}

impl MockSerial {
    /// Create an empty bus.
    ///
    /// Returns the backend to hand to the engine and a handle that scripts
    /// device behaviour.
    pub fn new() -> (Self, MockSerialHandle) {
        let bus: SharedBus = Arc::default();
        (Self { bus: bus.clone() }, MockSerialHandle { bus })
    }
}

impl SerialBackend for MockSerial {
    fn visible_ports(&mut self) -> Result<BTreeSet<String>> {
        Ok(lock(&self.bus).devices.keys().cloned().collect())
    }

    fn open(&mut self, name: &str) -> Result<Box<dyn SerialLink>> {
        open_link(&self.bus, name)
    }
}

/// Mock implementation of [`SerialLink`].
#[derive(Debug)]
pub struct MockLink {
    name: String,
    bus: SharedBus,
}

impl SerialLink for MockLink {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_available(&mut self, dst: &mut BytesMut) -> Result<usize> {
        let mut bus = lock(&self.bus);
        let device = bus
            .devices
            .get_mut(&self.name)
            .filter(|d| !d.failing)
            .ok_or_else(|| HardwareError::disconnected(&self.name))?;

        let n = device.inbound.len();
        dst.extend_from_slice(&device.inbound);
        device.inbound.clear();
        Ok(n)
    }

    fn write_byte(&mut self, byte: u8) -> Result<()> {
        let mut bus = lock(&self.bus);
        let device = bus
            .devices
            .get_mut(&self.name)
            .filter(|d| !d.failing)
            .ok_or_else(|| HardwareError::disconnected(&self.name))?;
        if device.failing_writes {
            return Err(HardwareError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "write rejected",
            )));
        }

        device.written.push(byte);
        if byte == HANDSHAKE_REQUEST
            && let Some(responder) = device.responder
        {
            device
                .inbound
                .extend(std::iter::repeat_n(SYNC_BYTE, responder.sync_len));
            device
                .inbound
                .extend_from_slice(&[FRAME_WHEEL_ID, responder.wheel_id]);
        }
        Ok(())
    }
}

impl Drop for MockLink {
    fn drop(&mut self) {
        if let Some(device) = lock(&self.bus).devices.get_mut(&self.name) {
            device.open = false;
        }
    }
}

/// Mock implementation of [`PortProbe`].
///
/// Probes settle on the next [`step`](PortProbe::step): the device is
/// opened then, and the link is handed back in the result.
#[derive(Debug)]
pub struct MockProbe {
    bus: SharedBus,
    pending: BTreeSet<String>,
}

impl PortProbe for MockProbe {
    fn probe(&mut self, port: &str) {
        self.pending.insert(port.to_string());
    }

    fn step(&mut self) -> Vec<ProbeResult> {
        std::mem::take(&mut self.pending)
            .into_iter()
            .map(|port| match open_link(&self.bus, &port) {
                Ok(link) => ProbeResult::available(port, link),
                Err(_) => ProbeResult::unavailable(port),
            })
            .collect()
    }
}

/// Handle for scripting mock devices.
#[derive(Debug, Clone)]
pub struct MockSerialHandle {
    bus: SharedBus,
}

impl MockSerialHandle {
    /// Create a probe bound to this bus.
    pub fn probe(&self) -> MockProbe {
        MockProbe {
            bus: self.bus.clone(),
            pending: BTreeSet::new(),
        }
    }

    /// Make a port visible to enumeration.
    pub fn plug(&self, name: &str) {
        lock(&self.bus)
            .devices
            .entry(name.to_string())
            .or_insert_with(MockDevice::new);
    }

    /// Remove a port from enumeration; an open link starts failing.
    pub fn unplug(&self, name: &str) {
        lock(&self.bus).devices.remove(name);
    }

    /// Make a port refuse (or accept) being opened.
    pub fn set_openable(&self, name: &str, openable: bool) {
        self.with_device(name, |d| d.openable = openable);
    }

    /// Make every read and write on an open link fail.
    pub fn set_failing(&self, name: &str, failing: bool) {
        self.with_device(name, |d| d.failing = failing);
    }

    /// Make writes fail while reads keep working.
    pub fn set_failing_writes(&self, name: &str, failing: bool) {
        self.with_device(name, |d| d.failing_writes = failing);
    }

    /// Reply to every handshake request with `sync_len` sync bytes followed
    /// by the wheel identity frame.
    pub fn respond_to_handshake(&self, name: &str, sync_len: usize, wheel_id: u8) {
        self.with_device(name, |d| {
            d.responder = Some(Responder { sync_len, wheel_id });
        });
    }

    /// Queue bytes as if the device had sent them.
    ///
    /// Bytes sent to a closed port are lost, as on a real line.
    pub fn emit(&self, name: &str, bytes: &[u8]) {
        self.with_device(name, |d| {
            if d.open {
                d.inbound.extend_from_slice(bytes);
            }
        });
    }

    /// Every byte the host has written to the port so far.
    pub fn written(&self, name: &str) -> Vec<u8> {
        lock(&self.bus)
            .devices
            .get(name)
            .map(|d| d.written.clone())
            .unwrap_or_default()
    }

    /// Forget the bytes the host has written so far.
    pub fn clear_written(&self, name: &str) {
        self.with_device(name, |d| d.written.clear());
    }

    pub fn is_open(&self, name: &str) -> bool {
        lock(&self.bus).devices.get(name).is_some_and(|d| d.open)
    }

    /// How many times the port has been opened.
    pub fn open_count(&self, name: &str) -> usize {
        lock(&self.bus)
            .devices
            .get(name)
            .map_or(0, |d| d.open_count)
    }

    fn with_device(&self, name: &str, f: impl FnOnce(&mut MockDevice)) {
        if let Some(device) = lock(&self.bus).devices.get_mut(name) {
            f(device);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enumeration_follows_plugging() {
        let (mut backend, handle) = MockSerial::new();
        handle.plug("COM3");
        handle.plug("COM4");
        assert_eq!(backend.visible_ports().unwrap().len(), 2);

        handle.unplug("COM3");
        let ports = backend.visible_ports().unwrap();
        assert!(ports.contains("COM4"));
        assert!(!ports.contains("COM3"));
    }

    #[test]
    fn test_open_is_exclusive_and_drop_closes() {
        let (mut backend, handle) = MockSerial::new();
        handle.plug("COM3");

        let link = backend.open("COM3").unwrap();
        assert!(handle.is_open("COM3"));
        assert!(backend.open("COM3").is_err());

        drop(link);
        assert!(!handle.is_open("COM3"));
        assert_eq!(handle.open_count("COM3"), 1);
    }

    #[test]
    fn test_unopenable_port() {
        let (mut backend, handle) = MockSerial::new();
        handle.plug("COM3");
        handle.set_openable("COM3", false);

        let mut probe = handle.probe();
        probe.probe("COM3");
        probe.probe("COM9");
        let results = probe.step();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| !r.is_available()));
        assert!(probe.step().is_empty());

        assert!(backend.open("COM3").is_err());
    }

    #[test]
    fn test_settled_open_hands_over_link() {
        let (mut backend, handle) = MockSerial::new();
        handle.plug("COM3");
        handle.respond_to_handshake("COM3", 2, 1);

        let mut probe = handle.probe();
        probe.probe("COM3");
        let result = probe.step().remove(0);
        assert!(result.is_available());
        assert!(handle.is_open("COM3"));
        assert_eq!(handle.open_count("COM3"), 1);
        assert!(backend.open("COM3").is_err());

        let mut link = result.link.unwrap();
        link.write_byte(0xFF).unwrap();
        let mut buf = BytesMut::new();
        assert_eq!(link.read_available(&mut buf).unwrap(), 4);

        drop(link);
        assert!(!handle.is_open("COM3"));
    }

    #[test]
    fn test_failing_writes_keep_reads() {
        let (mut backend, handle) = MockSerial::new();
        handle.plug("COM3");
        let mut link = backend.open("COM3").unwrap();

        handle.set_failing_writes("COM3", true);
        assert!(matches!(link.write_byte(0x01), Err(HardwareError::Io(_))));
        assert!(handle.written("COM3").is_empty());

        handle.emit("COM3", &[0x00, 0x01]);
        let mut buf = BytesMut::new();
        assert_eq!(link.read_available(&mut buf).unwrap(), 2);

        handle.set_failing_writes("COM3", false);
        link.write_byte(0x01).unwrap();
        assert_eq!(handle.written("COM3"), vec![0x01]);
    }

    #[test]
    fn test_handshake_responder() {
        let (mut backend, handle) = MockSerial::new();
        handle.plug("COM3");
        handle.respond_to_handshake("COM3", 4, 7);

        let mut link = backend.open("COM3").unwrap();
        link.write_byte(0xFF).unwrap();

        let mut buf = BytesMut::new();
        assert_eq!(link.read_available(&mut buf).unwrap(), 6);
        assert_eq!(&buf[..], &[0xFF, 0xFF, 0xFF, 0xFF, 0x05, 0x07]);
    }

    #[test]
    fn test_unplugged_link_fails() {
        let (mut backend, handle) = MockSerial::new();
        handle.plug("COM3");
        let mut link = backend.open("COM3").unwrap();

        handle.unplug("COM3");
        let mut buf = BytesMut::new();
        assert!(matches!(
            link.read_available(&mut buf),
            Err(HardwareError::Disconnected { .. })
        ));
        assert!(link.write_byte(0x01).is_err());
    }
}
