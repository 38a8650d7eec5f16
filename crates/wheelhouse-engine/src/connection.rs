//! Per-port connection lifecycle.
//!
//! Every serial port the OS reports gets a [`Port`] that walks the
//! following state machine. Each port moves independently; a failure on one
//! port never touches another.
//!
//! ```text
//!                 ┌───────────── rescan: port vanished ─────────────> Removed
//!                 │
//! Discovered ──probe──> Opening ──open + 0xFF──> Handshaking ──sync run──> Connected
//!     ^                    │                         │                       │ │ │
//!     │                    │ probe/open failed       │ no sync by deadline   │ │ │
//!     │                    v                         v                       │ │ │
//!     ├──────────── Unavailable                Incompatible (sticky)         │ │ │
//!     │                                                                      │ │ │
//!     ├──────────── Inactive    <── no bytes for one scan interval ──────────┘ │ │
//!     ├──────────── NotInSync   <── undecodable byte ──────────────────────────┘ │
//!     └──────────── Unavailable <── read/write failure ──────────────────────────┘
//! ```
//!
//! `Unavailable`, `Inactive` and `NotInSync` are retried on the next scan
//! exactly like `Discovered`. `Incompatible` is only left when the port
//! disappears from enumeration or the engine is paused.

use bytes::{Buf, BytesMut};
use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use wheelhouse_core::{
    EngineConfig, LockState, TagId, WheelId,
    constants::{HANDSHAKE_REQUEST, SYNC_BYTE},
};
use wheelhouse_hardware::{PortProbe, ProbeResult, SerialLink};
use wheelhouse_protocol::{DecodeOutcome, FrameDecoder, HostCommand, ProtocolError, find_sync_run};

use crate::series::TimeSeries;

/// Connection state of one port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PortState {
    /// Seen in enumeration, not yet tried.
    Discovered,

    /// Waiting for the availability probe to settle.
    Opening,

    /// Probe or open failed.
    Unavailable,

    /// Open; handshake request sent, waiting for the sync run.
    Handshaking,

    /// No sync run before the deadline. Not retried while the port stays
    /// plugged in.
    Incompatible,

    /// Handshake complete; frames are decoded.
    Connected,

    /// Connected port went silent for a scan interval.
    Inactive,

    /// Connected port sent an undecodable byte.
    NotInSync,

    /// Port vanished from enumeration.
    Removed,
}

impl fmt::Display for PortState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PortState::Discovered => "Discovered",
            PortState::Opening => "Opening",
            PortState::Unavailable => "Unavailable",
            PortState::Handshaking => "Handshaking",
            PortState::Incompatible => "Incompatible",
            PortState::Connected => "Connected",
            PortState::Inactive => "Inactive",
            PortState::NotInSync => "NotInSync",
            PortState::Removed => "Removed",
        };
        f.write_str(s)
    }
}

impl PortState {
    /// States that hold an open link.
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self, PortState::Handshaking | PortState::Connected)
    }

    /// States that are probed again on the next scan.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PortState::Discovered | PortState::Unavailable | PortState::Inactive | PortState::NotInSync
        )
    }

    /// Whether the lifecycle allows moving from this state to `target`.
    ///
    /// Every state may fall back to `Discovered` (pause) or `Removed`
    /// (unplugged).
    pub fn can_transition_to(&self, target: &PortState) -> bool {
        if matches!(target, PortState::Discovered | PortState::Removed) {
            return true;
        }
        match self {
            s if s.is_retryable() => *target == PortState::Opening,
            PortState::Opening => matches!(target, PortState::Handshaking | PortState::Unavailable),
            PortState::Handshaking => matches!(
                target,
                PortState::Connected | PortState::Incompatible | PortState::Unavailable
            ),
            PortState::Connected => matches!(
                target,
                PortState::Inactive | PortState::NotInSync | PortState::Unavailable
            ),
            _ => false,
        }
    }
}

/// A state change of one port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortTransition {
    pub port: String,
    pub from: PortState,
    pub to: PortState,
}

/// Result of servicing one port for one tick.
#[derive(Debug, Default)]
pub struct PortActivity {
    pub transitions: Vec<PortTransition>,

    /// Frames decoded this tick, if the port is connected.
    pub outcome: Option<DecodeOutcome>,
}

/// Result of [`ConnectionManager::send_lock`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockSend {
    /// The port is not connected, or already holds this decision.
    Skipped,

    Sent(LockState),

    /// The write failed and the port was closed.
    Failed(PortTransition),
}

/// One serial port and everything known about the wheel behind it.
pub struct Port {
    name: String,
    state: PortState,
    buffer: BytesMut,
    link: Option<Box<dyn SerialLink>>,
    last_activity: Option<Instant>,
    handshake_deadline: Option<Instant>,
    greeted: bool,
    wheel_id: WheelId,
    current_tag: TagId,
    last_temperature: Option<f64>,
    temperatures: TimeSeries,
    sent_lock: Option<LockState>,
}

impl fmt::Debug for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Port")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("buffered", &self.buffer.len())
            .field("wheel_id", &self.wheel_id)
            .field("current_tag", &self.current_tag)
            .field("sent_lock", &self.sent_lock)
            .finish_non_exhaustive()
    }
}

impl Port {
    fn new(name: &str, display_window: usize) -> Self {
        Self {
            name: name.to_string(),
            state: PortState::Discovered,
            buffer: BytesMut::new(),
            link: None,
            last_activity: None,
            handshake_deadline: None,
            greeted: false,
            wheel_id: WheelId::UNKNOWN,
            current_tag: TagId::sentinel(),
            last_temperature: None,
            temperatures: TimeSeries::new(display_window),
            sent_lock: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> PortState {
        self.state
    }

    /// Wheel identity reported after the last handshake.
    pub fn wheel_id(&self) -> WheelId {
        self.wheel_id
    }

    /// Tag most recently read on this wheel.
    pub fn current_tag(&self) -> &TagId {
        &self.current_tag
    }

    /// Latest temperature in °C.
    pub fn last_temperature(&self) -> Option<f64> {
        self.last_temperature
    }

    pub fn temperatures(&self) -> &TimeSeries {
        &self.temperatures
    }

    /// The device has identified itself since the last handshake.
    pub fn is_greeted(&self) -> bool {
        self.greeted
    }

    /// Lock decision last written to the device.
    pub fn sent_lock(&self) -> Option<LockState> {
        self.sent_lock
    }

    /// Bytes received but not yet decoded.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub(crate) fn set_current_tag(&mut self, tag: TagId) {
        self.current_tag = tag;
    }

    pub(crate) fn identify(&mut self, wheel_id: WheelId) {
        self.wheel_id = wheel_id;
        self.greeted = true;
    }

    pub(crate) fn record_temperature(&mut self, celsius: f64, at: NaiveDateTime) {
        self.last_temperature = Some(celsius);
        self.temperatures.push(at, celsius);
    }

    fn enter(&mut self, to: PortState) -> PortTransition {
        let from = self.state;
        debug_assert!(
            from.can_transition_to(&to),
            "invalid port transition {from} -> {to}"
        );
        self.state = to;
        debug!(port = %self.name, %from, %to, "port state changed");
        PortTransition {
            port: self.name.clone(),
            from,
            to,
        }
    }

    /// Drop the link and every piece of per-session state.
    fn close(&mut self, to: PortState) -> PortTransition {
        self.link = None;
        self.buffer.clear();
        self.handshake_deadline = None;
        self.last_activity = None;
        self.greeted = false;
        self.sent_lock = None;
        self.current_tag = TagId::sentinel();
        self.enter(to)
    }
}

/// Drives the lifecycle of every visible port.
#[derive(Debug)]
pub struct ConnectionManager {
    ports: BTreeMap<String, Port>,
    paused: bool,
    scan_interval: Duration,
    sync_length: usize,
    display_window: usize,
}

impl ConnectionManager {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            ports: BTreeMap::new(),
            paused: false,
            scan_interval: config.scan_interval(),
            sync_length: config.sync_length,
            display_window: config.display_window,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn ports(&self) -> impl Iterator<Item = &Port> {
        self.ports.values()
    }

    pub fn port(&self, name: &str) -> Option<&Port> {
        self.ports.get(name)
    }

    pub(crate) fn port_mut(&mut self, name: &str) -> Option<&mut Port> {
        self.ports.get_mut(name)
    }

    /// Names of ports holding an open link.
    pub fn open_ports(&self) -> Vec<String> {
        self.ports
            .values()
            .filter(|p| p.state.is_open())
            .map(|p| p.name.clone())
            .collect()
    }

    /// Names of connected ports whose current tag is `tag`.
    pub fn connected_ports_for(&self, tag: &TagId) -> Vec<String> {
        self.ports
            .values()
            .filter(|p| p.state == PortState::Connected && &p.current_tag == tag)
            .map(|p| p.name.clone())
            .collect()
    }

    /// Reconcile the port table with the ports the OS reports.
    ///
    /// New ports enter as `Discovered`; vanished ports are closed and
    /// dropped from the table.
    pub fn rescan(&mut self, visible: &BTreeSet<String>) -> Vec<PortTransition> {
        let mut transitions = Vec::new();
        if self.paused {
            return transitions;
        }

        let vanished: Vec<String> = self
            .ports
            .keys()
            .filter(|name| !visible.contains(*name))
            .cloned()
            .collect();
        for name in vanished {
            if let Some(mut port) = self.ports.remove(&name) {
                info!(port = %name, "port removed");
                transitions.push(port.close(PortState::Removed));
            }
        }

        for name in visible {
            if !self.ports.contains_key(name) {
                info!(port = %name, "port discovered");
                self.ports
                    .insert(name.clone(), Port::new(name, self.display_window));
                transitions.push(PortTransition {
                    port: name.clone(),
                    from: PortState::Removed,
                    to: PortState::Discovered,
                });
            }
        }

        transitions
    }

    /// Start an availability probe for every retryable port.
    pub fn request_probes(&mut self, probe: &mut dyn PortProbe) -> Vec<PortTransition> {
        if self.paused {
            return Vec::new();
        }
        self.ports
            .values_mut()
            .filter(|p| p.state.is_retryable())
            .map(|port| {
                probe.probe(&port.name);
                port.enter(PortState::Opening)
            })
            .collect()
    }

    /// Act on a settled probe: adopt the opened link and send the
    /// handshake request.
    ///
    /// Results for ports that are no longer `Opening` are ignored, and
    /// dropping their link closes the port again.
    pub fn apply_probe(&mut self, result: ProbeResult, now: Instant) -> Option<PortTransition> {
        if self.paused {
            return None;
        }
        let port = self
            .ports
            .get_mut(&result.port)
            .filter(|p| p.state == PortState::Opening)?;

        let Some(mut link) = result.link else {
            debug!(port = %port.name, "probe reports port unavailable");
            return Some(port.close(PortState::Unavailable));
        };

        port.buffer.clear();
        if let Err(e) = link.write_byte(HANDSHAKE_REQUEST) {
            warn!(port = %port.name, error = %e, "failed to send handshake request");
            return Some(port.close(PortState::Unavailable));
        }

        port.link = Some(link);
        port.last_activity = Some(now);
        port.handshake_deadline = Some(now + self.scan_interval);
        Some(port.enter(PortState::Handshaking))
    }

    /// Read whatever the port has buffered and advance its handshake or
    /// decode its frames.
    ///
    /// A desync is reported in the outcome but not acted on; the caller
    /// applies the frames decoded before it and then calls
    /// [`desync`](Self::desync).
    pub fn service(&mut self, name: &str, now: Instant) -> PortActivity {
        let mut activity = PortActivity::default();
        let sync_length = self.sync_length;
        let Some(port) = self.ports.get_mut(name).filter(|p| p.state.is_open()) else {
            return activity;
        };
        let Some(link) = port.link.as_mut() else {
            return activity;
        };

        match link.read_available(&mut port.buffer) {
            Ok(0) => {}
            Ok(_) => port.last_activity = Some(now),
            Err(e) => {
                warn!(port = %port.name, error = %e, "read failed");
                activity.transitions.push(port.close(PortState::Unavailable));
                return activity;
            }
        }

        if port.state == PortState::Handshaking {
            match find_sync_run(&port.buffer, sync_length) {
                Some(end) => {
                    port.buffer.advance(end);
                    port.handshake_deadline = None;
                    port.last_activity = Some(now);
                    info!(port = %port.name, "handshake complete");
                    activity.transitions.push(port.enter(PortState::Connected));
                }
                None => {
                    // Only a trailing run of sync bytes can still grow into
                    // a full run
                    let trailing = port
                        .buffer
                        .iter()
                        .rev()
                        .take_while(|&&b| b == SYNC_BYTE)
                        .count();
                    let stale = port.buffer.len() - trailing;
                    port.buffer.advance(stale);
                    return activity;
                }
            }
        }

        if !port.buffer.is_empty() {
            activity.outcome = Some(FrameDecoder::decode(&mut port.buffer));
        }
        activity
    }

    /// Reset a port whose stream became undecodable.
    pub fn desync(&mut self, name: &str, error: &ProtocolError) -> Option<PortTransition> {
        let port = self
            .ports
            .get_mut(name)
            .filter(|p| p.state == PortState::Connected)?;
        warn!(port = %port.name, error = %error, "stream out of sync, resetting port");
        Some(port.close(PortState::NotInSync))
    }

    /// Expire handshakes past their deadline and silent connections.
    pub fn check_timeouts(&mut self, now: Instant) -> Vec<PortTransition> {
        let mut transitions = Vec::new();
        for port in self.ports.values_mut() {
            match port.state {
                PortState::Handshaking if port.handshake_deadline.is_some_and(|d| now >= d) => {
                    warn!(port = %port.name, "no handshake reply, marking incompatible");
                    transitions.push(port.close(PortState::Incompatible));
                }
                PortState::Connected
                    if port
                        .last_activity
                        .is_some_and(|t| now.saturating_duration_since(t) > self.scan_interval) =>
                {
                    warn!(port = %port.name, "port silent, closing");
                    transitions.push(port.close(PortState::Inactive));
                }
                _ => {}
            }
        }
        transitions
    }

    /// Write a lock decision to a connected port.
    ///
    /// Unless `force` is set, nothing is written when the device already
    /// holds this decision.
    pub fn send_lock(&mut self, name: &str, decision: LockState, force: bool) -> LockSend {
        let Some(port) = self
            .ports
            .get_mut(name)
            .filter(|p| p.state == PortState::Connected)
        else {
            return LockSend::Skipped;
        };
        if !force && port.sent_lock == Some(decision) {
            return LockSend::Skipped;
        }
        let Some(link) = port.link.as_mut() else {
            return LockSend::Skipped;
        };

        match link.write_byte(HostCommand::from(decision).to_byte()) {
            Ok(()) => {
                port.sent_lock = Some(decision);
                LockSend::Sent(decision)
            }
            Err(e) => {
                warn!(port = %port.name, error = %e, "failed to send lock command");
                LockSend::Failed(port.close(PortState::Unavailable))
            }
        }
    }

    /// Close every port and stop scanning.
    ///
    /// Every port restarts from `Discovered` once resumed.
    pub fn pause(&mut self) -> Vec<PortTransition> {
        self.paused = true;
        self.ports
            .values_mut()
            .filter(|p| p.state != PortState::Discovered)
            .map(|p| p.close(PortState::Discovered))
            .collect()
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wheelhouse_hardware::mock::{MockSerial, MockSerialHandle};

    const PORT: &str = "COM3";

    fn manager() -> ConnectionManager {
        ConnectionManager::new(&EngineConfig::default())
    }

    fn visible(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    /// Bring `PORT` to `Handshaking` against a mock device.
    fn open_port(now: Instant) -> (ConnectionManager, MockSerial, MockSerialHandle) {
        let (backend, handle) = MockSerial::new();
        handle.plug(PORT);
        let mut probe = handle.probe();
        let mut cm = manager();

        cm.rescan(&visible(&[PORT]));
        cm.request_probes(&mut probe);
        let result = probe.step().remove(0);
        let t = cm.apply_probe(result, now).unwrap();
        assert_eq!(t.to, PortState::Handshaking);
        (cm, backend, handle)
    }

    #[test]
    fn test_transition_rules() {
        assert!(PortState::Discovered.can_transition_to(&PortState::Opening));
        assert!(PortState::Inactive.can_transition_to(&PortState::Opening));
        assert!(PortState::Connected.can_transition_to(&PortState::NotInSync));
        assert!(!PortState::Incompatible.can_transition_to(&PortState::Opening));
        assert!(!PortState::Discovered.can_transition_to(&PortState::Connected));
        assert!(PortState::Incompatible.can_transition_to(&PortState::Removed));
    }

    #[test]
    fn test_rescan_adds_and_removes() {
        let mut cm = manager();
        let t = cm.rescan(&visible(&["COM3", "COM4"]));
        assert_eq!(t.len(), 2);
        assert!(t.iter().all(|t| t.to == PortState::Discovered));

        let t = cm.rescan(&visible(&["COM4"]));
        assert_eq!(t.len(), 1);
        assert_eq!(t[0].port, "COM3");
        assert_eq!(t[0].to, PortState::Removed);
        assert!(cm.port("COM3").is_none());
    }

    #[test]
    fn test_handshake_request_is_sent_on_open() {
        let now = Instant::now();
        let (cm, _backend, handle) = open_port(now);
        assert_eq!(handle.written(PORT), vec![HANDSHAKE_REQUEST]);
        assert!(handle.is_open(PORT));
        // The link opened by the probe is adopted, not reopened
        assert_eq!(handle.open_count(PORT), 1);
        assert_eq!(cm.port(PORT).unwrap().state(), PortState::Handshaking);
    }

    #[test]
    fn test_stale_open_link_is_closed() {
        let (_backend, handle) = MockSerial::new();
        handle.plug(PORT);
        let mut probe = handle.probe();
        let mut cm = manager();

        cm.rescan(&visible(&[PORT]));
        cm.request_probes(&mut probe);
        cm.pause();
        cm.resume();

        let result = probe.step().remove(0);
        assert!(handle.is_open(PORT));
        assert!(cm.apply_probe(result, Instant::now()).is_none());
        assert!(!handle.is_open(PORT));
        assert!(handle.written(PORT).is_empty());
    }

    #[test]
    fn test_handshake_discards_noise_before_sync_run() {
        let now = Instant::now();
        let (mut cm, _backend, handle) = open_port(now);

        handle.emit(PORT, &[0x42, 0x13, 0xFF, 0xFF]);
        let activity = cm.service(PORT, now);
        assert!(activity.transitions.is_empty());
        assert_eq!(cm.port(PORT).unwrap().buffered(), 2);

        let mut reply = vec![0xFF; 8];
        reply.extend_from_slice(&[0x05, 0x02]);
        handle.emit(PORT, &reply);
        let activity = cm.service(PORT, now);
        assert_eq!(activity.transitions[0].to, PortState::Connected);
        let outcome = activity.outcome.unwrap();
        assert_eq!(
            outcome.messages,
            vec![wheelhouse_protocol::Message::WheelId(WheelId::new(2))]
        );
    }

    #[test]
    fn test_short_sync_run_times_out_incompatible() {
        let now = Instant::now();
        let (mut cm, _backend, handle) = open_port(now);

        handle.emit(PORT, &[0xFF; 9]);
        cm.service(PORT, now);
        assert_eq!(cm.port(PORT).unwrap().state(), PortState::Handshaking);

        assert!(cm.check_timeouts(now + Duration::from_secs(2)).is_empty());
        let t = cm.check_timeouts(now + Duration::from_secs(3));
        assert_eq!(t[0].to, PortState::Incompatible);
        assert!(!handle.is_open(PORT));

        // Sticky while still plugged in
        let mut probe = handle.probe();
        assert!(cm.request_probes(&mut probe).is_empty());
    }

    #[test]
    fn test_unavailable_probe_is_retried() {
        let (_backend, handle) = MockSerial::new();
        handle.plug(PORT);
        handle.set_openable(PORT, false);
        let mut probe = handle.probe();
        let mut cm = manager();
        let now = Instant::now();

        cm.rescan(&visible(&[PORT]));
        cm.request_probes(&mut probe);
        let result = probe.step().remove(0);
        let t = cm.apply_probe(result, now).unwrap();
        assert_eq!(t.to, PortState::Unavailable);

        assert_eq!(cm.request_probes(&mut probe).len(), 1);
        assert_eq!(cm.port(PORT).unwrap().state(), PortState::Opening);
    }

    #[test]
    fn test_read_failure_marks_unavailable() {
        let now = Instant::now();
        let (mut cm, _backend, handle) = open_port(now);
        handle.set_failing(PORT, true);

        let activity = cm.service(PORT, now);
        assert_eq!(activity.transitions[0].to, PortState::Unavailable);
        assert!(!handle.is_open(PORT));
    }

    #[test]
    fn test_send_lock_skips_repeats() {
        let now = Instant::now();
        let (mut cm, _backend, handle) = open_port(now);
        handle.emit(PORT, &[0xFF; 10]);
        cm.service(PORT, now);
        handle.clear_written(PORT);

        assert_eq!(
            cm.send_lock(PORT, LockState::Locked, false),
            LockSend::Sent(LockState::Locked)
        );
        assert_eq!(cm.send_lock(PORT, LockState::Locked, false), LockSend::Skipped);
        assert_eq!(
            cm.send_lock(PORT, LockState::Locked, true),
            LockSend::Sent(LockState::Locked)
        );
        assert_eq!(handle.written(PORT), vec![0x01, 0x01]);
    }

    #[test]
    fn test_pause_closes_everything() {
        let now = Instant::now();
        let (mut cm, _backend, handle) = open_port(now);

        let t = cm.pause();
        assert_eq!(t.len(), 1);
        assert_eq!(t[0].to, PortState::Discovered);
        assert!(!handle.is_open(PORT));
        assert!(cm.open_ports().is_empty());

        let mut probe = handle.probe();
        assert!(cm.request_probes(&mut probe).is_empty());
        cm.resume();
        assert_eq!(cm.request_probes(&mut probe).len(), 1);
    }
}
