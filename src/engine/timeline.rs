//! Minute-granularity event timelines for trend charts.
//!
//! Each timeline maps a minute label (ISO-8601 truncated to minute precision,
//! e.g. `2026-08-06T14:03`) to an event count. Buckets accumulate for the
//! process lifetime; there is no eviction.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Truncate a timestamp to its minute label.
pub fn minute_label(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M").to_string()
}

/// A monotonically growing per-minute event counter.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Timeline(BTreeMap<String, u64>);

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment the bucket for the given minute label.
    pub fn increment(&mut self, label: &str) {
        *self.0.entry(label.to_string()).or_insert(0) += 1;
    }

    /// Increment the bucket covering `at`.
    pub fn record(&mut self, at: DateTime<Utc>) {
        self.increment(&minute_label(at));
    }

    pub fn count(&self, label: &str) -> u64 {
        self.0.get(label).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn buckets(&self) -> &BTreeMap<String, u64> {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_minute_label_truncation() {
        let at = Utc.with_ymd_and_hms(2026, 8, 6, 14, 3, 59).unwrap();
        assert_eq!(minute_label(at), "2026-08-06T14:03");
    }

    #[test]
    fn test_same_minute_accumulates() {
        let mut timeline = Timeline::new();
        let at = Utc.with_ymd_and_hms(2026, 8, 6, 14, 3, 1).unwrap();
        timeline.record(at);
        timeline.record(at + chrono::Duration::seconds(30));
        assert_eq!(timeline.count("2026-08-06T14:03"), 2);
        assert_eq!(timeline.len(), 1);
    }

    #[test]
    fn test_distinct_minutes_get_distinct_buckets() {
        let mut timeline = Timeline::new();
        let at = Utc.with_ymd_and_hms(2026, 8, 6, 14, 3, 59).unwrap();
        timeline.record(at);
        timeline.record(at + chrono::Duration::seconds(1));
        assert_eq!(timeline.count("2026-08-06T14:03"), 1);
        assert_eq!(timeline.count("2026-08-06T14:04"), 1);
    }

    #[test]
    fn test_absent_bucket_counts_zero() {
        let timeline = Timeline::new();
        assert_eq!(timeline.count("2026-01-01T00:00"), 0);
        assert!(timeline.is_empty());
    }
}
