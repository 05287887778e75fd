//! Persistent per-run metrics storage.
//!
//! Each HIL run gets its own directory under the results root holding
//! `latency_summary.json` (aggregate statistics) and `latency_raw.csv` (one
//! row per measurement). Inter-run comparison computes mean/p95 deltas for
//! every metric type present in both runs.

use crate::latency::{LatencyCollector, LatencyStats, LatencySummary};
use crate::MetricsError;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{error, info};

const SUMMARY_FILE: &str = "latency_summary.json";
const RAW_FILE: &str = "latency_raw.csv";

/// On-disk summary for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub timestamp: String,
    pub total_measurements: usize,
    pub measurement_types: HashMap<String, u64>,
    pub stats: HashMap<String, LatencyStats>,
    pub stats_by_satellite: HashMap<String, HashMap<String, LatencyStats>>,
}

/// Paths written by [`MetricsStorage::save_latency_stats`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedPaths {
    pub summary: PathBuf,
    pub raw: PathBuf,
}

/// Mean/p95 delta for one metric type between two runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricDelta {
    pub this_mean_ms: f64,
    pub other_mean_ms: f64,
    pub diff_ms: f64,
    pub this_p95_ms: f64,
    pub other_p95_ms: f64,
}

/// Comparison report between two runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunComparison {
    pub run1: String,
    pub run2: String,
    pub timestamp: String,
    pub metrics: HashMap<String, MetricDelta>,
}

/// Manages the `<results>/<run_id>/` directory for one run.
pub struct MetricsStorage {
    run_id: String,
    results_dir: PathBuf,
    metrics_dir: PathBuf,
}

impl MetricsStorage {
    pub fn new(run_id: &str, results_dir: &Path) -> Result<Self, MetricsError> {
        if run_id.trim().is_empty() {
            return Err(MetricsError::InvalidInput(
                "run_id must be non-empty".to_string(),
            ));
        }
        let metrics_dir = results_dir.join(run_id);
        std::fs::create_dir_all(&metrics_dir)?;
        Ok(Self {
            run_id: run_id.to_string(),
            results_dir: results_dir.to_path_buf(),
            metrics_dir,
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn metrics_dir(&self) -> &Path {
        &self.metrics_dir
    }

    /// Save aggregated and raw latency metrics for this run.
    pub fn save_latency_stats(
        &self,
        collector: &LatencyCollector,
    ) -> Result<SavedPaths, MetricsError> {
        let LatencySummary {
            total_measurements,
            measurement_types,
            stats,
            stats_by_satellite,
        } = collector.summary();

        let summary = RunSummary {
            run_id: self.run_id.clone(),
            timestamp: Utc::now().to_rfc3339(),
            total_measurements,
            measurement_types,
            stats,
            stats_by_satellite,
        };

        let summary_path = self.metrics_dir.join(SUMMARY_FILE);
        let content = serde_json::to_string_pretty(&summary)
            .map_err(|e| MetricsError::InvalidInput(e.to_string()))?;
        std::fs::write(&summary_path, content)?;

        let raw_path = self.metrics_dir.join(RAW_FILE);
        collector.export_csv(&raw_path)?;

        info!(run = %self.run_id, dir = %self.metrics_dir.display(), "latency metrics saved");
        Ok(SavedPaths {
            summary: summary_path,
            raw: raw_path,
        })
    }

    /// Load this run's summary, if present and parseable.
    pub fn run_metrics(&self) -> Option<RunSummary> {
        let summary_path = self.metrics_dir.join(SUMMARY_FILE);
        let content = std::fs::read_to_string(&summary_path).ok()?;
        match serde_json::from_str(&content) {
            Ok(summary) => Some(summary),
            Err(e) => {
                error!(path = %summary_path.display(), error = %e, "unparseable run summary");
                None
            }
        }
    }

    /// Compare this run against a historical run: mean/p95 deltas for each
    /// metric type present in both.
    pub fn compare_runs(&self, other_run_id: &str) -> Result<RunComparison, MetricsError> {
        let other = MetricsStorage::new(other_run_id, &self.results_dir)?;
        let other_metrics = other.run_metrics().ok_or_else(|| {
            MetricsError::InvalidInput(format!("could not load metrics for run {other_run_id}"))
        })?;
        let this_metrics = self.run_metrics().ok_or_else(|| {
            MetricsError::InvalidInput(format!("could not load metrics for run {}", self.run_id))
        })?;

        let mut metrics = HashMap::new();
        for (metric_type, this_stats) in &this_metrics.stats {
            let Some(other_stats) = other_metrics.stats.get(metric_type) else {
                continue;
            };
            metrics.insert(
                metric_type.clone(),
                MetricDelta {
                    this_mean_ms: this_stats.mean_ms,
                    other_mean_ms: other_stats.mean_ms,
                    diff_ms: this_stats.mean_ms - other_stats.mean_ms,
                    this_p95_ms: this_stats.p95_ms,
                    other_p95_ms: other_stats.p95_ms,
                },
            );
        }

        Ok(RunComparison {
            run1: self.run_id.clone(),
            run2: other_run_id.to_string(),
            timestamp: Utc::now().to_rfc3339(),
            metrics,
        })
    }

    /// Recent run IDs under the results root, newest first. Only
    /// directories containing a summary count as runs.
    pub fn recent_runs(results_dir: &Path, limit: usize) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(results_dir) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir() && e.path().join(SUMMARY_FILE).exists())
            .filter_map(|e| e.file_name().into_string().ok())
            .collect();
        names.sort_by(|a, b| b.cmp(a));
        names.truncate(limit);
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled_collector(base_ms: f64) -> LatencyCollector {
        let mut collector = LatencyCollector::new();
        for i in 0..10 {
            collector
                .record_fault_detection("SAT1", i as f64, base_ms + i as f64)
                .expect("record");
            collector
                .record_agent_decision("SAT2", i as f64, base_ms * 2.0 + i as f64)
                .expect("record");
        }
        collector
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = MetricsStorage::new("run-001", dir.path()).expect("storage");
        let paths = storage
            .save_latency_stats(&filled_collector(10.0))
            .expect("save");

        assert!(paths.summary.exists());
        assert!(paths.raw.exists());

        let summary = storage.run_metrics().expect("reload");
        assert_eq!(summary.run_id, "run-001");
        assert_eq!(summary.total_measurements, 20);
        assert_eq!(summary.measurement_types["fault_detection"], 10);
        assert!(summary.stats.contains_key("agent_decision"));
        assert!(summary.stats_by_satellite.contains_key("SAT1"));
    }

    #[test]
    fn test_missing_run_metrics_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = MetricsStorage::new("run-empty", dir.path()).expect("storage");
        assert!(storage.run_metrics().is_none());
    }

    #[test]
    fn test_compare_runs_deltas() {
        let dir = tempfile::tempdir().expect("tempdir");

        let fast = MetricsStorage::new("run-fast", dir.path()).expect("storage");
        fast.save_latency_stats(&filled_collector(10.0)).expect("save");

        let slow = MetricsStorage::new("run-slow", dir.path()).expect("storage");
        slow.save_latency_stats(&filled_collector(20.0)).expect("save");

        let comparison = slow.compare_runs("run-fast").expect("compare");
        assert_eq!(comparison.run1, "run-slow");
        assert_eq!(comparison.run2, "run-fast");
        let delta = &comparison.metrics["fault_detection"];
        assert!((delta.diff_ms - 10.0).abs() < 1e-9);
        assert!(delta.this_p95_ms > delta.other_p95_ms);
    }

    #[test]
    fn test_compare_missing_run_errors() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = MetricsStorage::new("run-x", dir.path()).expect("storage");
        storage
            .save_latency_stats(&filled_collector(5.0))
            .expect("save");
        assert!(storage.compare_runs("run-never-happened").is_err());
    }

    #[test]
    fn test_recent_runs_sorted_and_filtered() {
        let dir = tempfile::tempdir().expect("tempdir");
        for run in ["run-2024a", "run-2024b", "run-2024c"] {
            let storage = MetricsStorage::new(run, dir.path()).expect("storage");
            storage
                .save_latency_stats(&filled_collector(1.0))
                .expect("save");
        }
        // Directory without a summary is not a run
        std::fs::create_dir_all(dir.path().join("not-a-run")).expect("mkdir");

        let runs = MetricsStorage::recent_runs(dir.path(), 2);
        assert_eq!(runs, vec!["run-2024c", "run-2024b"]);

        let all = MetricsStorage::recent_runs(dir.path(), 10);
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_recent_runs_missing_root() {
        let runs = MetricsStorage::recent_runs(Path::new("/nonexistent/results"), 5);
        assert!(runs.is_empty());
    }

    #[test]
    fn test_empty_run_id_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(MetricsStorage::new("  ", dir.path()).is_err());
    }
}
