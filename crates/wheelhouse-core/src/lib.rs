//! Shared vocabulary for the running-wheel host engine.
//!
//! This crate holds the wire constants, value types, configuration and error
//! type used by every other `wheelhouse-*` crate.

pub mod config;
pub mod constants;
pub mod error;
pub mod types;

pub use config::{EngineConfig, SchedulePreset, TagPreset, WheelGeometry};
pub use error::{Error, Result};
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
