//! Host engine for RFID running-wheel cages.
//!
//! Each cage holds a running wheel whose firmware streams hall-sensor
//! steps, temperature samples and RFID tag reads over a serial port, and
//! accepts single-byte lock commands back. The engine:
//!
//! - discovers ports and walks each through a handshake ([`connection`])
//! - decodes frames and attributes steps to the tag on the wheel
//! - keeps per-tag distance and lock distance ([`ledger`])
//! - fires once-per-day scheduled locks ([`schedule`])
//! - appends one activity record per step, temperature and tag ([`log`])
//! - returns every observable change as an [`EngineEvent`]
//!
//! # Examples
//!
//! ```
//! use chrono::Local;
//! use std::time::Instant;
//! use wheelhouse_core::EngineConfig;
//! use wheelhouse_engine::{Engine, MemoryLog};
//! use wheelhouse_hardware::mock::MockSerial;
//!
//! let (backend, handle) = MockSerial::new();
//! handle.plug("COM3");
//! handle.respond_to_handshake("COM3", 10, 2);
//!
//! let probe = handle.probe();
//! let mut engine = Engine::new(EngineConfig::default(), backend, probe, MemoryLog::new()).unwrap();
//!
//! let now = Instant::now();
//! engine.tick(now, Local::now().naive_local());
//! engine.tick(now, Local::now().naive_local());
//!
//! let port = engine.connections().port("COM3").unwrap();
//! assert_eq!(port.wheel_id().as_u8(), 2);
//! ```

pub mod connection;
pub mod engine;
pub mod events;
pub mod ledger;
pub mod log;
pub mod schedule;
pub mod series;

pub use connection::{ConnectionManager, Port, PortState, PortTransition};
pub use engine::Engine;
pub use events::EngineEvent;
pub use ledger::{Schedule, TagLedger, TagState};
pub use log::{EventLog, LogRecord, MemoryLog, TracingLog};
pub use schedule::ScheduleEngine;
pub use series::{Sample, TimeSeries};
