//! Once-per-day scheduled locks.
//!
//! A schedule fires at most once per arming. It fires on the first
//! evaluation whose time of day falls inside the grace window that opens at
//! the scheduled time, and re-arms on the first evaluation outside it:
//!
//! ```text
//!            scheduled           scheduled + grace
//! ─────────────┼──────────────────────┼──────────────────────>
//!   re-arm     │  fire (if armed)     │   re-arm
//! ```
//!
//! Elapsed time is measured modulo one day, so a window that opens at
//! 23:59:59 is still open at 00:00:05.

use tracing::{info, warn};
use wheelhouse_core::{TagId, TimeOfDay};

use crate::ledger::TagLedger;

/// A schedule that fired during one evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct Firing {
    pub tag: TagId,

    /// Absolute lock distance after the schedule applied.
    pub lock_distance: f64,
}

/// Evaluates every enabled schedule against the time of day.
#[derive(Debug, Clone, Copy)]
pub struct ScheduleEngine {
    grace_secs: u32,
}

impl ScheduleEngine {
    pub fn new(grace_secs: u32) -> Self {
        Self { grace_secs }
    }

    pub fn grace_secs(&self) -> u32 {
        self.grace_secs
    }

    /// Whether `now` lies in the firing window opened at `scheduled`.
    #[must_use]
    pub fn in_window(&self, scheduled: TimeOfDay, now: TimeOfDay) -> bool {
        now.seconds_since(scheduled) <= self.grace_secs
    }

    /// Run every enabled schedule once.
    ///
    /// A firing schedule adds its distance to the tag's current distance
    /// and leaves the schedule enabled but disarmed.
    pub fn evaluate(&self, ledger: &mut TagLedger, now: TimeOfDay) -> Vec<Firing> {
        let mut fired = Vec::new();

        for tag in ledger.scheduled_tags() {
            let schedule = ledger.state(&tag).schedule;
            let in_window = self.in_window(schedule.time_of_day, now);

            if schedule.armed && in_window {
                match ledger.add_lock(&tag, schedule.distance, false) {
                    Ok(lock_distance) => {
                        info!(tag = %tag, lock_distance, at = %now, "scheduled lock fired");
                        fired.push(Firing {
                            tag: tag.clone(),
                            lock_distance,
                        });
                    }
                    Err(e) => warn!(tag = %tag, error = %e, "scheduled lock rejected"),
                }
                ledger.update(&tag, |state| state.schedule.armed = false);
            } else if !schedule.armed && !in_window {
                ledger.update(&tag, |state| state.schedule.armed = true);
            }
        }

        fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rstest::rstest;

    fn tag() -> TagId {
        TagId::new("3A00112233").unwrap()
    }

    fn time(hhmmss: u32) -> TimeOfDay {
        TimeOfDay::from_hhmmss(hhmmss).unwrap()
    }

    fn ledger_with(distance: f64, delta: f64, at: u32) -> TagLedger {
        let mut ledger = TagLedger::new(10);
        let wall = NaiveDate::from_ymd_opt(2025, 3, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        ledger.set_distance(&tag(), distance, wall).unwrap();
        ledger.schedule_lock(&tag(), delta, time(at)).unwrap();
        ledger
    }

    #[rstest]
    #[case(180000, 180000, true)]
    #[case(180000, 180015, true)]
    #[case(180000, 180016, false)]
    #[case(180000, 175959, false)]
    #[case(235959, 5, true)]
    #[case(235959, 15, false)]
    fn test_window(#[case] scheduled: u32, #[case] now: u32, #[case] expected: bool) {
        let engine = ScheduleEngine::new(15);
        assert_eq!(engine.in_window(time(scheduled), time(now)), expected);
    }

    #[test]
    fn test_fires_once_per_window() {
        let engine = ScheduleEngine::new(15);
        let mut ledger = ledger_with(100.0, 50.0, 180000);

        assert!(engine.evaluate(&mut ledger, time(175957)).is_empty());

        let fired = engine.evaluate(&mut ledger, time(180003));
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].lock_distance, 150.0);
        assert_eq!(ledger.lock(&tag()), 150.0);

        assert!(engine.evaluate(&mut ledger, time(180006)).is_empty());
        assert_eq!(ledger.lock(&tag()), 150.0);

        let schedule = ledger.state(&tag()).schedule;
        assert!(schedule.enabled && !schedule.armed);
    }

    #[test]
    fn test_rearms_after_window() {
        let engine = ScheduleEngine::new(15);
        let mut ledger = ledger_with(0.0, 10.0, 120000);

        assert_eq!(engine.evaluate(&mut ledger, time(120001)).len(), 1);
        assert!(engine.evaluate(&mut ledger, time(120100)).is_empty());
        assert!(ledger.state(&tag()).schedule.armed);

        // Next day
        assert_eq!(engine.evaluate(&mut ledger, time(120002)).len(), 1);
    }

    #[test]
    fn test_fires_across_midnight() {
        let engine = ScheduleEngine::new(15);
        let mut ledger = ledger_with(20.0, 30.0, 235959);

        let fired = engine.evaluate(&mut ledger, time(5));
        assert_eq!(fired.len(), 1);
        assert_eq!(ledger.lock(&tag()), 50.0);
    }

    #[test]
    fn test_disabled_schedule_never_fires() {
        let engine = ScheduleEngine::new(15);
        let mut ledger = ledger_with(0.0, 10.0, 120000);
        ledger.clear_schedule(&tag());

        assert!(engine.evaluate(&mut ledger, time(120001)).is_empty());
        assert_eq!(ledger.lock(&tag()), f64::INFINITY);
    }
}
