//! Append-only activity log.
//!
//! One record is written for every step, temperature sample and tag read.
//! Storage is out of scope for the engine; it only needs a sink that
//! accepts a record and reports whether it was kept.

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::info;
use wheelhouse_core::{StepDirection, TagId, WheelId};

/// One row of the activity log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogRecord {
    pub tag: TagId,
    pub timestamp: NaiveDateTime,
    pub wheel_id: WheelId,

    /// Latest temperature of the wheel in °C, if one was reported.
    pub temperature: Option<f64>,

    pub lock_distance: f64,
    pub distance: f64,

    /// Set for step records only.
    pub direction: Option<StepDirection>,
}

/// Destination for [`LogRecord`]s.
pub trait EventLog {
    /// Append one record.
    ///
    /// Returns `false` if the record could not be stored. The engine keeps
    /// running either way.
    fn append(&mut self, record: &LogRecord) -> bool;
}

/// Writes every record as a structured `tracing` event.
///
/// Records go to the `wheelhouse::activity` target so a subscriber can route
/// them separately from diagnostics.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLog;

impl EventLog for TracingLog {
    fn append(&mut self, record: &LogRecord) -> bool {
        info!(
            target: "wheelhouse::activity",
            tag = %record.tag,
            timestamp = %record.timestamp,
            wheel = %record.wheel_id,
            temperature = ?record.temperature,
            lock_distance = record.lock_distance,
            distance = record.distance,
            direction = ?record.direction,
            "activity"
        );
        true
    }
}

/// Keeps records in memory.
#[derive(Debug, Default, Clone)]
pub struct MemoryLog {
    records: Vec<LogRecord>,
    failing: bool,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[LogRecord] {
        &self.records
    }

    /// Reject every following append, as a full disk would.
    pub fn set_failing(&mut self, failing: bool) {
        self.failing = failing;
    }
}

impl EventLog for MemoryLog {
    fn append(&mut self, record: &LogRecord) -> bool {
        if self.failing {
            return false;
        }
        self.records.push(record.clone());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn record() -> LogRecord {
        LogRecord {
            tag: TagId::new("3A00112233").unwrap(),
            timestamp: NaiveDate::from_ymd_opt(2025, 3, 1)
                .unwrap()
                .and_hms_opt(9, 30, 0)
                .unwrap(),
            wheel_id: WheelId::new(2),
            temperature: Some(21.5),
            lock_distance: f64::INFINITY,
            distance: 12.566,
            direction: Some(StepDirection::Forward),
        }
    }

    #[test]
    fn test_memory_log_failure_toggle() {
        let mut log = MemoryLog::new();
        assert!(log.append(&record()));
        log.set_failing(true);
        assert!(!log.append(&record()));
        log.set_failing(false);
        assert!(log.append(&record()));
        assert_eq!(log.records().len(), 2);
    }

    #[test]
    fn test_record_serializes() {
        let json = serde_json::to_value(record()).unwrap();
        assert_eq!(json["tag"], "3A00112233");
        assert_eq!(json["wheel_id"], 2);
        assert_eq!(json["temperature"], 21.5);
    }

    #[test]
    fn test_tracing_log_accepts() {
        assert!(TracingLog.append(&record()));
    }
}
