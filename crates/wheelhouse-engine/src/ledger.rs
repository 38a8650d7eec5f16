//! Per-tag distance and lock bookkeeping.
//!
//! Every tag carries a cumulative distance, a lock distance, and an optional
//! scheduled lock. The lock decision is never stored: it is recomputed on
//! every read as `distance >= lock_distance`, so a tag that has never been
//! given a lock distance (`+∞`) never locks.
//!
//! Records are plain `Copy` values. Updates copy the record out, modify the
//! copy, and store it back, so no caller ever holds a reference into the
//! registry while it changes.

use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::BTreeMap;
use wheelhouse_core::{Error, LockState, Result, TagId, TimeOfDay};

use crate::series::TimeSeries;

/// Scheduled lock for one tag.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Schedule {
    /// The schedule is active.
    pub enabled: bool,

    /// The schedule will fire the next time its window is reached.
    pub armed: bool,

    /// Distance added to the current distance when the schedule fires.
    pub distance: f64,

    pub time_of_day: TimeOfDay,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            enabled: false,
            armed: false,
            distance: 0.0,
            time_of_day: TimeOfDay::MIDNIGHT,
        }
    }
}

/// Value record for one tag.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TagState {
    /// Cumulative distance in centimetres.
    pub distance: f64,

    /// Distance at which the wheel locks for this tag.
    pub lock_distance: f64,

    pub schedule: Schedule,
}

impl Default for TagState {
    fn default() -> Self {
        Self {
            distance: 0.0,
            lock_distance: f64::INFINITY,
            schedule: Schedule::default(),
        }
    }
}

impl TagState {
    /// Boundary-inclusive lock decision.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.distance >= self.lock_distance
    }

    #[must_use]
    pub fn lock_state(&self) -> LockState {
        LockState::from_locked(self.is_locked())
    }
}

fn check_distance(what: &str, value: f64) -> Result<()> {
    if value.is_nan() || value < 0.0 {
        return Err(Error::InvalidDistance(format!(
            "{what} must be a non-negative number, got {value}"
        )));
    }
    Ok(())
}

/// Registry of every tag seen or registered during the run.
///
/// Tags are created lazily on first reference and never removed.
#[derive(Debug, Clone)]
pub struct TagLedger {
    tags: BTreeMap<TagId, TagState>,
    trails: BTreeMap<TagId, TimeSeries>,
    display_window: usize,
}

impl TagLedger {
    pub fn new(display_window: usize) -> Self {
        Self {
            tags: BTreeMap::new(),
            trails: BTreeMap::new(),
            display_window,
        }
    }

    /// Make sure a record exists for `tag`.
    ///
    /// Returns `true` if the tag was new.
    pub fn register(&mut self, tag: &TagId) -> bool {
        if self.tags.contains_key(tag) {
            return false;
        }
        self.tags.insert(tag.clone(), TagState::default());
        true
    }

    pub fn contains(&self, tag: &TagId) -> bool {
        self.tags.contains_key(tag)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TagId, &TagState)> {
        self.tags.iter()
    }

    /// Copy of the record for `tag`; defaults if the tag is unknown.
    pub fn state(&self, tag: &TagId) -> TagState {
        self.tags.get(tag).copied().unwrap_or_default()
    }

    pub fn distance(&self, tag: &TagId) -> f64 {
        self.state(tag).distance
    }

    /// Overwrite the distance, e.g. to reset it.
    ///
    /// # Errors
    /// Returns `Error::InvalidDistance` for negative or NaN values.
    pub fn set_distance(&mut self, tag: &TagId, distance: f64, at: NaiveDateTime) -> Result<()> {
        check_distance("distance", distance)?;
        self.update(tag, |state| state.distance = distance);
        self.record_sample(tag, distance, at);
        Ok(())
    }

    /// Add travelled distance and return the new total.
    ///
    /// Negative or NaN deltas are ignored so distance never decreases.
    pub fn add_distance(&mut self, tag: &TagId, delta: f64, at: NaiveDateTime) -> f64 {
        let delta = if delta.is_nan() { 0.0 } else { delta.max(0.0) };
        let state = self.update(tag, |state| state.distance += delta);
        self.record_sample(tag, state.distance, at);
        state.distance
    }

    pub fn lock(&self, tag: &TagId) -> f64 {
        self.state(tag).lock_distance
    }

    /// Set the absolute lock distance.
    ///
    /// With `clear_schedule` any pending scheduled lock is disabled, so an
    /// immediate change and a scheduled one never both apply.
    ///
    /// # Errors
    /// Returns `Error::InvalidDistance` for negative or NaN values.
    pub fn set_lock(&mut self, tag: &TagId, lock_distance: f64, clear_schedule: bool) -> Result<()> {
        check_distance("lock distance", lock_distance)?;
        self.update(tag, |state| {
            state.lock_distance = lock_distance;
            if clear_schedule {
                state.schedule.enabled = false;
            }
        });
        Ok(())
    }

    /// Set the lock distance relative to the current distance.
    ///
    /// Returns the new absolute lock distance.
    ///
    /// # Errors
    /// Returns `Error::InvalidDistance` if the resulting lock distance is
    /// negative or NaN.
    pub fn add_lock(&mut self, tag: &TagId, delta: f64, clear_schedule: bool) -> Result<f64> {
        let lock_distance = self.distance(tag) + delta;
        self.set_lock(tag, lock_distance, clear_schedule)?;
        Ok(lock_distance)
    }

    /// Arm a once-per-day lock that adds `delta` at `time_of_day`.
    ///
    /// # Errors
    /// Returns `Error::InvalidDistance` if `delta` is not finite.
    pub fn schedule_lock(&mut self, tag: &TagId, delta: f64, time_of_day: TimeOfDay) -> Result<()> {
        if !delta.is_finite() {
            return Err(Error::InvalidDistance(format!(
                "scheduled distance must be finite, got {delta}"
            )));
        }
        self.update(tag, |state| {
            state.schedule = Schedule {
                enabled: true,
                armed: true,
                distance: delta,
                time_of_day,
            };
        });
        Ok(())
    }

    pub fn clear_schedule(&mut self, tag: &TagId) {
        self.update(tag, |state| state.schedule.enabled = false);
    }

    pub fn is_locked(&self, tag: &TagId) -> bool {
        self.state(tag).is_locked()
    }

    pub fn lock_state(&self, tag: &TagId) -> LockState {
        self.state(tag).lock_state()
    }

    /// Distance trail for display.
    pub fn trail(&self, tag: &TagId) -> Option<&TimeSeries> {
        self.trails.get(tag)
    }

    /// Tags with an enabled schedule.
    pub fn scheduled_tags(&self) -> Vec<TagId> {
        self.tags
            .iter()
            .filter(|(_, state)| state.schedule.enabled)
            .map(|(tag, _)| tag.clone())
            .collect()
    }

    /// Copy the record out, apply `f`, store it back, and return the result.
    pub(crate) fn update(&mut self, tag: &TagId, f: impl FnOnce(&mut TagState)) -> TagState {
        let mut state = self.state(tag);
        f(&mut state);
        self.tags.insert(tag.clone(), state);
        state
    }

    fn record_sample(&mut self, tag: &TagId, distance: f64, at: NaiveDateTime) {
        let window = self.display_window;
        self.trails
            .entry(tag.clone())
            .or_insert_with(|| TimeSeries::new(window))
            .push(at, distance);
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

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_unknown_tag_never_locks() {
        let ledger = TagLedger::new(10);
        assert_eq!(ledger.lock(&tag()), f64::INFINITY);
        assert!(!ledger.is_locked(&tag()));
        assert!(!ledger.contains(&tag()));
    }

    #[rstest]
    #[case(0.0)]
    #[case(125.5)]
    #[case(f64::INFINITY)]
    fn test_set_lock_then_get(#[case] lock: f64) {
        let mut ledger = TagLedger::new(10);
        ledger.set_lock(&tag(), lock, true).unwrap();
        assert_eq!(ledger.lock(&tag()), lock);
    }

    #[rstest]
    #[case(-1.0)]
    #[case(f64::NAN)]
    fn test_set_lock_rejects_invalid(#[case] lock: f64) {
        let mut ledger = TagLedger::new(10);
        assert!(ledger.set_lock(&tag(), lock, true).is_err());
        assert!(!ledger.contains(&tag()));
    }

    #[test]
    fn test_lock_boundary_is_inclusive() {
        let mut ledger = TagLedger::new(10);
        ledger.set_distance(&tag(), 100.0, at()).unwrap();
        ledger.set_lock(&tag(), 100.0, true).unwrap();
        assert!(ledger.is_locked(&tag()));
        assert_eq!(ledger.lock_state(&tag()), LockState::Locked);

        ledger.set_lock(&tag(), 100.000_001, true).unwrap();
        assert!(!ledger.is_locked(&tag()));
    }

    #[test]
    fn test_add_lock_is_relative_to_distance() {
        let mut ledger = TagLedger::new(10);
        ledger.set_distance(&tag(), 40.0, at()).unwrap();
        let lock = ledger.add_lock(&tag(), 60.0, true).unwrap();
        assert_eq!(lock, 100.0);
        assert_eq!(ledger.lock(&tag()), 100.0);
    }

    #[test]
    fn test_set_lock_clears_pending_schedule() {
        let mut ledger = TagLedger::new(10);
        let time = TimeOfDay::new(18, 0, 0).unwrap();
        ledger.schedule_lock(&tag(), 50.0, time).unwrap();
        assert!(ledger.state(&tag()).schedule.enabled);

        ledger.set_lock(&tag(), 10.0, false).unwrap();
        assert!(ledger.state(&tag()).schedule.enabled);

        ledger.set_lock(&tag(), 10.0, true).unwrap();
        assert!(!ledger.state(&tag()).schedule.enabled);
    }

    #[test]
    fn test_schedule_lock_stores_time() {
        let mut ledger = TagLedger::new(10);
        let time = TimeOfDay::from_hhmmss(235959).unwrap();
        ledger.schedule_lock(&tag(), 50.0, time).unwrap();

        let schedule = ledger.state(&tag()).schedule;
        assert!(schedule.enabled && schedule.armed);
        assert_eq!(schedule.distance, 50.0);
        assert_eq!(schedule.time_of_day.hhmmss(), 235959);
        assert_eq!(ledger.scheduled_tags(), vec![tag()]);

        ledger.clear_schedule(&tag());
        assert!(ledger.scheduled_tags().is_empty());
    }

    #[test]
    fn test_distance_never_decreases_through_steps() {
        let mut ledger = TagLedger::new(10);
        assert_eq!(ledger.add_distance(&tag(), 5.0, at()), 5.0);
        assert_eq!(ledger.add_distance(&tag(), -3.0, at()), 5.0);
        assert_eq!(ledger.add_distance(&tag(), f64::NAN, at()), 5.0);
        assert_eq!(ledger.trail(&tag()).unwrap().len(), 3);
    }

    #[test]
    fn test_set_distance_resets_and_records_sample() {
        let mut ledger = TagLedger::new(10);
        ledger.add_distance(&tag(), 50.0, at());
        ledger.set_distance(&tag(), 0.0, at()).unwrap();
        assert_eq!(ledger.distance(&tag()), 0.0);
        assert_eq!(ledger.trail(&tag()).unwrap().latest().unwrap().value, 0.0);
        assert!(ledger.set_distance(&tag(), -1.0, at()).is_err());
    }

    #[test]
    fn test_state_is_a_copy() {
        let mut ledger = TagLedger::new(10);
        let mut copy = ledger.state(&tag());
        copy.distance = 999.0;
        assert_eq!(ledger.distance(&tag()), 0.0);

        ledger.register(&tag());
        assert!(!ledger.register(&tag()));
        assert_eq!(ledger.len(), 1);
    }
}
