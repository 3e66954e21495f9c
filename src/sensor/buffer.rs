//! In-memory reading store shared by all sensor implementations.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use crate::sensor::traits::Reading;

/// Per-measurement, append-only sequences of readings.
///
/// Insertion order is time order. The buffer is guarded by its own lock,
/// so the measurement path and the storage path may use it concurrently.
#[derive(Debug, Default)]
pub struct MeasurementBuffer {
    data: Mutex<BTreeMap<String, Vec<Reading>>>,
}

impl MeasurementBuffer {
    /// Create a buffer with an empty series for each measurement name.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let data = names
            .into_iter()
            .map(|n| (n.into(), Vec::new()))
            .collect();
        Self {
            data: Mutex::new(data),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Vec<Reading>>> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Measurement names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    /// Whether `measurement` is known to this buffer.
    pub fn contains(&self, measurement: &str) -> bool {
        self.lock().contains_key(measurement)
    }

    /// Append a reading.
    pub fn push(&self, measurement: &str, reading: Reading) {
        let mut data = self.lock();
        match data.get_mut(measurement) {
            Some(series) => series.push(reading),
            None => {
                data.insert(measurement.to_string(), vec![reading]);
            }
        }
    }

    /// Readings with `start <= timestamp < end`.
    pub fn range(&self, measurement: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<Reading> {
        self.lock()
            .get(measurement)
            .map(|series| {
                series
                    .iter()
                    .filter(|r| r.timestamp >= start && r.timestamp < end)
                    .copied()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Most recent reading per measurement.
    pub fn latest(&self) -> BTreeMap<String, Option<Reading>> {
        self.lock()
            .iter()
            .map(|(name, series)| (name.clone(), series.last().copied()))
            .collect()
    }

    /// Remove readings with `start <= timestamp < end`.
    pub fn clear_range(&self, measurement: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> usize {
        let mut data = self.lock();
        let Some(series) = data.get_mut(measurement) else {
            return 0;
        };
        let before = series.len();
        series.retain(|r| r.timestamp < start || r.timestamp >= end);
        before - series.len()
    }

    /// Total buffered readings across all measurements.
    pub fn len(&self) -> usize {
        self.lock().values().map(Vec::len).sum()
    }

    /// Whether no readings are buffered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::seconds(secs)
    }

    fn filled() -> MeasurementBuffer {
        let buffer = MeasurementBuffer::new(["airT", "bp"]);
        for s in 0..5 {
            buffer.push("airT", Reading::new(at(s), s as f64));
        }
        buffer
    }

    #[test]
    fn test_range_is_half_open() {
        let buffer = filled();
        let got = buffer.range("airT", at(1), at(3));
        assert_eq!(got, vec![Reading::new(at(1), 1.0), Reading::new(at(2), 2.0)]);
        assert!(buffer.range("airT", at(5), at(6)).is_empty());
        assert!(buffer.range("unknown", at(0), at(10)).is_empty());
    }

    #[test]
    fn test_latest_marks_empty_series() {
        let buffer = filled();
        let latest = buffer.latest();
        assert_eq!(latest["airT"], Some(Reading::new(at(4), 4.0)));
        assert_eq!(latest["bp"], None);
    }

    #[test]
    fn test_clear_range_keeps_outside() {
        let buffer = filled();
        assert_eq!(buffer.clear_range("airT", at(0), at(3)), 3);
        assert_eq!(buffer.range("airT", at(0), at(10)).len(), 2);
        // nothing matches: no-op
        assert_eq!(buffer.clear_range("airT", at(0), at(3)), 0);
        assert_eq!(buffer.clear_range("unknown", at(0), at(3)), 0);
    }

    #[test]
    fn test_push_unknown_measurement_creates_series() {
        let buffer = MeasurementBuffer::default();
        assert!(buffer.is_empty());
        buffer.push("raw", Reading::new(at(0), 1.5));
        assert!(buffer.contains("raw"));
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.names(), vec!["raw".to_string()]);
    }
}
