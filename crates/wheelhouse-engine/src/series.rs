//! Bounded display trails.

use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::VecDeque;

/// One timestamped sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sample {
    pub at: NaiveDateTime,
    pub value: f64,
}

/// Fixed-capacity time series; the oldest sample is evicted first.
///
/// Only the display window lives here. Long-term retention belongs to the
/// event log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSeries {
    samples: VecDeque<Sample>,
    capacity: usize,
}

impl TimeSeries {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity.min(64)),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, at: NaiveDateTime, value: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(Sample { at, value });
    }

    pub fn latest(&self) -> Option<&Sample> {
        self.samples.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(second: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 1)
            .unwrap()
            .and_hms_opt(12, 0, second)
            .unwrap()
    }

    #[test]
    fn test_oldest_sample_is_evicted() {
        let mut series = TimeSeries::new(3);
        for i in 0..5 {
            series.push(at(i), f64::from(i));
        }

        assert_eq!(series.len(), 3);
        let values: Vec<f64> = series.iter().map(|s| s.value).collect();
        assert_eq!(values, vec![2.0, 3.0, 4.0]);
        assert_eq!(series.latest().unwrap().at, at(4));
    }

    #[test]
    fn test_zero_capacity_keeps_latest() {
        let mut series = TimeSeries::new(0);
        series.push(at(0), 1.0);
        series.push(at(1), 2.0);
        assert_eq!(series.len(), 1);
        assert_eq!(series.latest().unwrap().value, 2.0);
    }
}
