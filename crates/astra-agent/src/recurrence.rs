//! Recurrence tracking for anomaly types.
//!
//! Per-type running counts and timestamp sequences answer three questions at
//! decision time: how often has this type ever occurred, how many times
//! within the sliding window, and when was the previous occurrence. A flat
//! global log is kept for introspection and compacted when it outgrows its
//! cap.

use astra_proto::RecurrenceInfo;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

/// Cap on the global (type, timestamp) introspection log.
const GLOBAL_LOG_CAP: usize = 1_000;

#[derive(Debug, Default)]
struct TypeRecord {
    count: u64,
    timestamps: Vec<DateTime<Utc>>,
}

struct IndexInner {
    by_type: HashMap<String, TypeRecord>,
    global_log: Vec<(String, DateTime<Utc>)>,
}

/// Recurrence index owned exclusively by the handler.
///
/// Updates for a single type are linearized under the index mutex, so two
/// concurrent submissions of the same type observe strictly increasing
/// counts.
pub struct RecurrenceIndex {
    window: ChronoDuration,
    inner: Mutex<IndexInner>,
}

impl RecurrenceIndex {
    pub fn new(window: Duration) -> Self {
        Self {
            window: ChronoDuration::from_std(window)
                .unwrap_or_else(|_| ChronoDuration::seconds(3600)),
            inner: Mutex::new(IndexInner {
                by_type: HashMap::new(),
                global_log: Vec::new(),
            }),
        }
    }

    /// Record an occurrence and return the post-update snapshot.
    pub fn update(&self, anomaly_type: &str, now: DateTime<Utc>) -> RecurrenceInfo {
        let mut inner = self.inner.lock();

        let record = inner.by_type.entry(anomaly_type.to_string()).or_default();
        record.count += 1;
        record.timestamps.push(now);

        let window_start = now - self.window;
        let total_in_window = record
            .timestamps
            .iter()
            .filter(|ts| **ts >= window_start)
            .count() as u64;

        // Penultimate occurrence (the current one is last)
        let last_occurrence = if record.timestamps.len() > 1 {
            Some(record.timestamps[record.timestamps.len() - 2])
        } else {
            None
        };
        let time_since_last_s = last_occurrence
            .map(|prev| (now - prev).num_milliseconds().max(0) as f64 / 1000.0);

        // Keep the per-type sequence from growing without bound: entries
        // older than the window can be dropped once the window count and
        // penultimate timestamp no longer need them.
        if record.timestamps.len() > GLOBAL_LOG_CAP {
            let keep_from = record.timestamps.len() - 2;
            let mut kept: Vec<DateTime<Utc>> = record
                .timestamps
                .iter()
                .take(keep_from)
                .filter(|ts| **ts >= window_start)
                .cloned()
                .collect();
            kept.extend_from_slice(&record.timestamps[keep_from..]);
            record.timestamps = kept;
        }

        inner.global_log.push((anomaly_type.to_string(), now));
        if inner.global_log.len() > GLOBAL_LOG_CAP {
            self.compact(&mut inner, now);
        }

        RecurrenceInfo {
            count: inner.by_type[anomaly_type].count,
            total_in_window,
            last_occurrence,
            time_since_last_s,
        }
    }

    fn compact(&self, inner: &mut IndexInner, now: DateTime<Utc>) {
        let window_start = now - self.window;
        inner.global_log.retain(|(_, ts)| *ts >= window_start);
        // A burst inside the window can still exceed the cap; hard-trim the
        // oldest entries.
        if inner.global_log.len() > GLOBAL_LOG_CAP {
            let excess = inner.global_log.len() - GLOBAL_LOG_CAP;
            inner.global_log.drain(..excess);
        }
    }

    /// Total occurrences of a type (0 when never seen).
    pub fn count(&self, anomaly_type: &str) -> u64 {
        self.inner
            .lock()
            .by_type
            .get(anomaly_type)
            .map_or(0, |r| r.count)
    }

    /// The global introspection log, optionally filtered by type.
    pub fn log(&self, anomaly_type: Option<&str>) -> Vec<(String, DateTime<Utc>)> {
        let inner = self.inner.lock();
        match anomaly_type {
            Some(t) => inner
                .global_log
                .iter()
                .filter(|(ty, _)| ty == t)
                .cloned()
                .collect(),
            None => inner.global_log.clone(),
        }
    }

    pub fn tracked_types(&self) -> usize {
        self.inner.lock().by_type.len()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.by_type.clear();
        inner.global_log.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> RecurrenceIndex {
        RecurrenceIndex::new(Duration::from_secs(3600))
    }

    #[test]
    fn test_first_occurrence() {
        let idx = index();
        let info = idx.update("thermal_fault", Utc::now());
        assert_eq!(info.count, 1);
        assert_eq!(info.total_in_window, 1);
        assert!(info.last_occurrence.is_none());
        assert!(info.time_since_last_s.is_none());
    }

    #[test]
    fn test_count_monotonic_and_window() {
        let idx = index();
        let base = Utc::now();
        for i in 0..3 {
            let info = idx.update("thermal_fault", base + ChronoDuration::seconds(i));
            assert_eq!(info.count, (i + 1) as u64);
            assert_eq!(info.total_in_window, (i + 1) as u64);
        }
    }

    #[test]
    fn test_window_excludes_old_occurrences() {
        let idx = index();
        let base = Utc::now();
        idx.update("power_fault", base - ChronoDuration::seconds(7200));
        let info = idx.update("power_fault", base);
        assert_eq!(info.count, 2);
        assert_eq!(info.total_in_window, 1, "old occurrence outside window");
        // Penultimate timestamp still reported even when outside the window
        assert!(info.last_occurrence.is_some());
        assert!(info.time_since_last_s.unwrap() >= 7199.0);
    }

    #[test]
    fn test_types_tracked_independently() {
        let idx = index();
        idx.update("thermal_fault", Utc::now());
        idx.update("power_fault", Utc::now());
        idx.update("power_fault", Utc::now());
        assert_eq!(idx.count("thermal_fault"), 1);
        assert_eq!(idx.count("power_fault"), 2);
        assert_eq!(idx.count("comms_fault"), 0);
        assert_eq!(idx.tracked_types(), 2);
    }

    #[test]
    fn test_time_since_last_non_negative() {
        let idx = index();
        let base = Utc::now();
        idx.update("thermal_fault", base);
        let info = idx.update("thermal_fault", base + ChronoDuration::seconds(5));
        assert!(info.time_since_last_s.unwrap() >= 0.0);
        assert!((info.time_since_last_s.unwrap() - 5.0).abs() < 0.5);
    }

    #[test]
    fn test_global_log_compaction() {
        let idx = RecurrenceIndex::new(Duration::from_secs(60));
        let base = Utc::now();
        // Old entries fall out on compaction
        for i in 0..600 {
            idx.update("old_fault", base - ChronoDuration::seconds(3600 + i));
        }
        for i in 0..600 {
            idx.update("new_fault", base + ChronoDuration::milliseconds(i));
        }
        let log = idx.log(None);
        assert!(log.len() <= 1_000);
        assert!(log.iter().any(|(t, _)| t == "new_fault"));
        // Counts survive compaction
        assert_eq!(idx.count("old_fault"), 600);
    }

    #[test]
    fn test_log_filter_by_type() {
        let idx = index();
        idx.update("a", Utc::now());
        idx.update("b", Utc::now());
        idx.update("a", Utc::now());
        assert_eq!(idx.log(Some("a")).len(), 2);
        assert_eq!(idx.log(Some("b")).len(), 1);
        assert_eq!(idx.log(None).len(), 3);
    }

    #[test]
    fn test_clear() {
        let idx = index();
        idx.update("a", Utc::now());
        idx.clear();
        assert_eq!(idx.count("a"), 0);
        assert!(idx.log(None).is_empty());
    }
}
