//! Tick-driven wheel engine.
//!
//! The engine owns no clock and no thread. The host calls
//! [`Engine::tick`] at a fixed rate with the current monotonic and wall
//! time; each tick runs to completion without blocking:
//!
//! ```text
//! tick ──> drain settled probes ──> adopt opened links, send handshake
//!    │
//!    ├──(every scan interval)──> rescan ports, request probes
//!    │
//!    ├──> for each open port: read, handshake / decode, apply frames
//!    │         step ─────> distance, log, lock decision
//!    │         temperature ─> trail, log
//!    │         tag ──────> current tag, log, lock decision
//!    │         heartbeat ──> resend lock on disagreement
//!    │         wheel id ──> identify
//!    │
//!    └──(every scan interval)──> scheduled locks, timeouts
//! ```
//!
//! Lock commands go out only when the decision for a port changes, when a
//! port (re)connects, or when a heartbeat reports a state that disagrees
//! with the decision.

use chrono::NaiveDateTime;
use std::time::Instant;
use tracing::{debug, info, warn};
use wheelhouse_core::{
    EngineConfig, LockState, Result, StepDirection, TagId, TimeOfDay, celsius_from_raw,
};
use wheelhouse_hardware::{PortProbe, SerialBackend};
use wheelhouse_protocol::Message;

use crate::{
    connection::{ConnectionManager, LockSend, Port, PortState},
    events::EngineEvent,
    ledger::TagLedger,
    log::{EventLog, LogRecord},
    schedule::ScheduleEngine,
};

/// The running-wheel host engine.
#[derive(Debug)]
pub struct Engine<B, P, L> {
    config: EngineConfig,
    backend: B,
    probe: P,
    log: L,
    connections: ConnectionManager,
    ledger: TagLedger,
    schedules: ScheduleEngine,
    last_scan: Option<Instant>,
}

impl<B: SerialBackend, P: PortProbe, L: EventLog> Engine<B, P, L> {
    /// Create an engine and register the configured tag presets.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn new(config: EngineConfig, backend: B, probe: P, log: L) -> Result<Self> {
        config.validate()?;

        let mut ledger = TagLedger::new(config.display_window);
        for preset in &config.tags {
            ledger.register(&preset.id);
            if let Some(lock_distance) = preset.lock_distance {
                ledger.set_lock(&preset.id, lock_distance, true)?;
            }
            if let Some(schedule) = &preset.schedule {
                ledger.schedule_lock(&preset.id, schedule.distance, schedule.time)?;
            }
        }

        info!(
            tags = config.tags.len(),
            scan_interval_secs = config.scan_interval_secs,
            arc_length_cm = config.arc_length(),
            "engine initialized"
        );

        Ok(Self {
            connections: ConnectionManager::new(&config),
            schedules: ScheduleEngine::new(config.grace_window_secs()),
            ledger,
            config,
            backend,
            probe,
            log,
            last_scan: None,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    pub fn ledger(&self) -> &TagLedger {
        &self.ledger
    }

    pub fn log(&self) -> &L {
        &self.log
    }

    pub fn log_mut(&mut self) -> &mut L {
        &mut self.log
    }

    pub fn is_paused(&self) -> bool {
        self.connections.is_paused()
    }

    /// Run one engine tick.
    pub fn tick(&mut self, now: Instant, wall: NaiveDateTime) -> Vec<EngineEvent> {
        let mut events = Vec::new();

        // Always drain so the probe never accumulates stale results
        let settled = self.probe.step();
        if self.is_paused() {
            return events;
        }

        for result in settled {
            if let Some(t) = self.connections.apply_probe(result, now) {
                events.push(t.into());
            }
        }

        let scan_due = self
            .last_scan
            .is_none_or(|t| now.saturating_duration_since(t) >= self.config.scan_interval());
        if scan_due {
            self.last_scan = Some(now);
            self.scan(&mut events);
        }

        for name in self.connections.open_ports() {
            self.service_port(&name, now, wall, &mut events);
        }

        if scan_due {
            let time_of_day = TimeOfDay::from_naive_time(wall.time());
            for firing in self.schedules.evaluate(&mut self.ledger, time_of_day) {
                events.push(EngineEvent::ScheduleFired {
                    tag: firing.tag.clone(),
                    lock_distance: firing.lock_distance,
                });
                self.refresh_locks(&firing.tag, &mut events);
            }

            for t in self.connections.check_timeouts(now) {
                events.push(t.into());
            }
        }

        events
    }

    /// Close every port and stop scanning until [`resume`](Self::resume).
    pub fn pause(&mut self) -> Vec<EngineEvent> {
        info!("engine paused");
        self.connections
            .pause()
            .into_iter()
            .map(EngineEvent::from)
            .collect()
    }

    /// Resume scanning; the next tick rescans immediately.
    pub fn resume(&mut self) {
        info!("engine resumed");
        self.connections.resume();
        self.last_scan = None;
    }

    /// Make sure `tag` is known to the ledger.
    pub fn register_tag(&mut self, tag: &TagId) -> bool {
        self.ledger.register(tag)
    }

    /// Overwrite the distance of `tag`.
    ///
    /// # Errors
    /// Returns an error for negative or NaN distances.
    pub fn set_distance(
        &mut self,
        tag: &TagId,
        distance: f64,
        at: NaiveDateTime,
    ) -> Result<Vec<EngineEvent>> {
        self.ledger.set_distance(tag, distance, at)?;
        Ok(self.refreshed(tag))
    }

    /// Set the absolute lock distance of `tag` and cancel its schedule.
    ///
    /// # Errors
    /// Returns an error for negative or NaN distances.
    pub fn set_lock(&mut self, tag: &TagId, lock_distance: f64) -> Result<Vec<EngineEvent>> {
        self.ledger.set_lock(tag, lock_distance, true)?;
        Ok(self.refreshed(tag))
    }

    /// Lock `tag` after `delta` more centimetres and cancel its schedule.
    ///
    /// # Errors
    /// Returns an error if the resulting lock distance is invalid.
    pub fn add_lock(&mut self, tag: &TagId, delta: f64) -> Result<Vec<EngineEvent>> {
        self.ledger.add_lock(tag, delta, true)?;
        Ok(self.refreshed(tag))
    }

    /// Add `delta` to the lock distance of `tag` every day at `time_of_day`.
    ///
    /// # Errors
    /// Returns an error if `delta` is not finite.
    pub fn schedule_lock(&mut self, tag: &TagId, delta: f64, time_of_day: TimeOfDay) -> Result<()> {
        self.ledger.schedule_lock(tag, delta, time_of_day)
    }

    pub fn clear_schedule(&mut self, tag: &TagId) {
        self.ledger.clear_schedule(tag);
    }

    fn refreshed(&mut self, tag: &TagId) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        self.refresh_locks(tag, &mut events);
        events
    }

    fn scan(&mut self, events: &mut Vec<EngineEvent>) {
        match self.backend.visible_ports() {
            Ok(mut visible) => {
                visible.retain(|name| self.config.accepts_port(name));
                events.extend(self.connections.rescan(&visible).into_iter().map(EngineEvent::from));
            }
            Err(e) => warn!(error = %e, "port enumeration failed"),
        }
        events.extend(
            self.connections
                .request_probes(&mut self.probe)
                .into_iter()
                .map(EngineEvent::from),
        );
    }

    fn service_port(
        &mut self,
        name: &str,
        now: Instant,
        wall: NaiveDateTime,
        events: &mut Vec<EngineEvent>,
    ) {
        let activity = self.connections.service(name, now);

        let connected = activity
            .transitions
            .iter()
            .any(|t| t.to == PortState::Connected);
        events.extend(activity.transitions.into_iter().map(EngineEvent::from));
        if connected {
            self.dispatch_lock(name, false, events);
        }

        let Some(outcome) = activity.outcome else {
            return;
        };
        if outcome.checksum_mismatches > 0 {
            warn!(port = name, count = outcome.checksum_mismatches, "tag checksum mismatch");
            events.push(EngineEvent::ChecksumMismatch {
                port: name.to_string(),
                count: outcome.checksum_mismatches,
            });
        }
        for message in outcome.messages {
            // A failed lock write closes the port and resets its tag
            if self.connections.port(name).map(Port::state) != Some(PortState::Connected) {
                debug!(port = name, "port closed mid-batch, dropping remaining frames");
                return;
            }
            self.apply_message(name, message, wall, events);
        }
        if let Some(error) = &outcome.desync
            && let Some(t) = self.connections.desync(name, error)
        {
            events.push(t.into());
        }
    }

    fn apply_message(
        &mut self,
        name: &str,
        message: Message,
        wall: NaiveDateTime,
        events: &mut Vec<EngineEvent>,
    ) {
        let arc_length = self.config.arc_length();
        let vref = self.config.adc_vref;
        let Some(port) = self.connections.port_mut(name) else {
            return;
        };
        debug!(port = name, kind = message.kind(), "frame");

        match message {
            Message::Step(direction) => {
                let tag = port.current_tag().clone();
                self.ledger.add_distance(&tag, arc_length, wall);
                self.append_log(name, &tag, wall, Some(direction), events);
                self.dispatch_lock(name, false, events);
            }
            Message::Temperature { raw } => {
                port.record_temperature(celsius_from_raw(raw, vref), wall);
                let tag = port.current_tag().clone();
                self.append_log(name, &tag, wall, None, events);
            }
            Message::Tag(tag) => {
                port.set_current_tag(tag.clone());
                self.ledger.register(&tag);
                info!(port = name, tag = %tag, "tag read");
                events.push(EngineEvent::TagRead {
                    port: name.to_string(),
                    tag: tag.clone(),
                });
                self.append_log(name, &tag, wall, None, events);
                self.dispatch_lock(name, false, events);
            }
            Message::LockState(reported) => {
                let decision = self.ledger.lock_state(port.current_tag());
                if reported != decision {
                    debug!(port = name, ?reported, ?decision, "device disagrees with lock decision");
                    self.dispatch_lock(name, true, events);
                }
            }
            Message::WheelId(wheel_id) => {
                port.identify(wheel_id);
                info!(port = name, wheel = %wheel_id, "wheel identified");
                events.push(EngineEvent::WheelIdentified {
                    port: name.to_string(),
                    wheel_id,
                });
            }
        }
    }

    fn append_log(
        &mut self,
        name: &str,
        tag: &TagId,
        wall: NaiveDateTime,
        direction: Option<StepDirection>,
        events: &mut Vec<EngineEvent>,
    ) {
        let Some(port) = self.connections.port(name) else {
            return;
        };
        let state = self.ledger.state(tag);
        let record = LogRecord {
            tag: tag.clone(),
            timestamp: wall,
            wheel_id: port.wheel_id(),
            temperature: port.last_temperature(),
            lock_distance: state.lock_distance,
            distance: state.distance,
            direction,
        };
        if !self.log.append(&record) {
            warn!(port = name, tag = %tag, "activity log rejected record");
            events.push(EngineEvent::LogFailed {
                port: name.to_string(),
                tag: tag.clone(),
            });
        }
    }

    /// Send the current lock decision to every connected port reading `tag`.
    fn refresh_locks(&mut self, tag: &TagId, events: &mut Vec<EngineEvent>) {
        for name in self.connections.connected_ports_for(tag) {
            self.dispatch_lock(&name, false, events);
        }
    }

    fn dispatch_lock(&mut self, name: &str, force: bool, events: &mut Vec<EngineEvent>) {
        let Some(tag) = self.connections.port(name).map(|p| p.current_tag().clone()) else {
            return;
        };
        let decision: LockState = self.ledger.lock_state(&tag);

        match self.connections.send_lock(name, decision, force) {
            LockSend::Skipped => {}
            LockSend::Sent(state) => {
                info!(port = name, tag = %tag, ?state, "lock command sent");
                events.push(EngineEvent::LockCommandSent {
                    port: name.to_string(),
                    tag,
                    state,
                });
            }
            LockSend::Failed(t) => events.push(t.into()),
        }
    }
}
