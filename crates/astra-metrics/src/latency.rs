//! High-resolution latency tracking for HIL validation runs.

use crate::MetricsError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

/// What a latency measurement timed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    FaultDetection,
    AgentDecision,
    RecoveryAction,
}

impl std::fmt::Display for MetricType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::FaultDetection => "fault_detection",
            Self::AgentDecision => "agent_decision",
            Self::RecoveryAction => "recovery_action",
        };
        write!(f, "{s}")
    }
}

/// Single latency measurement point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatencyMeasurement {
    pub timestamp: DateTime<Utc>,
    pub metric_type: MetricType,
    pub satellite_id: String,
    pub duration_ms: f64,
    pub scenario_time_s: f64,
}

/// Aggregate statistics over one measurement population.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatencyStats {
    pub count: usize,
    pub mean_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

/// Deterministic percentile: sort, then pick `min(floor(p·n), n-1)`.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() as f64 * p) as usize).min(sorted.len() - 1);
    sorted[idx]
}

fn stats_for(durations: &[f64]) -> LatencyStats {
    let mut sorted = durations.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let count = sorted.len();
    let sum: f64 = sorted.iter().sum();
    LatencyStats {
        count,
        mean_ms: if count > 0 { sum / count as f64 } else { 0.0 },
        min_ms: sorted.first().copied().unwrap_or(0.0),
        max_ms: sorted.last().copied().unwrap_or(0.0),
        p50_ms: percentile(&sorted, 0.5),
        p95_ms: percentile(&sorted, 0.95),
        p99_ms: percentile(&sorted, 0.99),
    }
}

fn validate_inputs(sat_id: &str, scenario_time_s: f64, duration_ms: f64) -> Result<(), MetricsError> {
    if sat_id.trim().is_empty() {
        return Err(MetricsError::InvalidInput(
            "satellite_id must be a non-empty string".to_string(),
        ));
    }
    if !scenario_time_s.is_finite() || scenario_time_s < 0.0 {
        return Err(MetricsError::InvalidInput(format!(
            "scenario_time_s must be non-negative, got {scenario_time_s}"
        )));
    }
    if !duration_ms.is_finite() || duration_ms < 0.0 {
        return Err(MetricsError::InvalidInput(format!(
            "duration_ms must be non-negative, got {duration_ms}"
        )));
    }
    Ok(())
}

/// Human-readable summary of a collector, ready for persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatencySummary {
    pub total_measurements: usize,
    pub measurement_types: HashMap<String, u64>,
    pub stats: HashMap<String, LatencyStats>,
    pub stats_by_satellite: HashMap<String, HashMap<String, LatencyStats>>,
}

/// Captures timing data across the swarm during a scenario run.
#[derive(Debug, Default)]
pub struct LatencyCollector {
    pub measurements: Vec<LatencyMeasurement>,
    measurement_log: HashMap<String, u64>,
}

impl LatencyCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(
        &mut self,
        metric_type: MetricType,
        sat_id: &str,
        scenario_time_s: f64,
        duration_ms: f64,
    ) -> Result<(), MetricsError> {
        validate_inputs(sat_id, scenario_time_s, duration_ms)?;
        self.measurements.push(LatencyMeasurement {
            timestamp: Utc::now(),
            metric_type,
            satellite_id: sat_id.to_string(),
            duration_ms,
            scenario_time_s,
        });
        *self
            .measurement_log
            .entry(metric_type.to_string())
            .or_default() += 1;
        debug!(sat = sat_id, metric = %metric_type, duration_ms, "latency recorded");
        Ok(())
    }

    /// Time from fault injection to first detection.
    pub fn record_fault_detection(
        &mut self,
        sat_id: &str,
        scenario_time_s: f64,
        detection_delay_ms: f64,
    ) -> Result<(), MetricsError> {
        self.record(
            MetricType::FaultDetection,
            sat_id,
            scenario_time_s,
            detection_delay_ms,
        )
    }

    /// Time for the agent to produce a decision.
    pub fn record_agent_decision(
        &mut self,
        sat_id: &str,
        scenario_time_s: f64,
        decision_time_ms: f64,
    ) -> Result<(), MetricsError> {
        self.record(
            MetricType::AgentDecision,
            sat_id,
            scenario_time_s,
            decision_time_ms,
        )
    }

    /// Time to execute a recovery action.
    pub fn record_recovery_action(
        &mut self,
        sat_id: &str,
        scenario_time_s: f64,
        action_time_ms: f64,
    ) -> Result<(), MetricsError> {
        self.record(
            MetricType::RecoveryAction,
            sat_id,
            scenario_time_s,
            action_time_ms,
        )
    }

    /// Aggregate statistics per metric type.
    pub fn stats(&self) -> HashMap<String, LatencyStats> {
        let mut by_type: HashMap<String, Vec<f64>> = HashMap::new();
        for m in &self.measurements {
            by_type
                .entry(m.metric_type.to_string())
                .or_default()
                .push(m.duration_ms);
        }
        by_type
            .into_iter()
            .map(|(k, durations)| (k, stats_for(&durations)))
            .collect()
    }

    /// Statistics per satellite, then per metric type.
    pub fn stats_by_satellite(&self) -> HashMap<String, HashMap<String, LatencyStats>> {
        let mut by_sat: HashMap<String, HashMap<String, Vec<f64>>> = HashMap::new();
        for m in &self.measurements {
            by_sat
                .entry(m.satellite_id.clone())
                .or_default()
                .entry(m.metric_type.to_string())
                .or_default()
                .push(m.duration_ms);
        }
        by_sat
            .into_iter()
            .map(|(sat, metrics)| {
                let stats = metrics
                    .into_iter()
                    .map(|(k, durations)| (k, stats_for(&durations)))
                    .collect();
                (sat, stats)
            })
            .collect()
    }

    /// Export raw measurements to CSV with the fixed column layout
    /// `timestamp, metric_type, satellite_id, duration_ms, scenario_time_s`.
    pub fn export_csv(&self, path: &Path) -> Result<(), MetricsError> {
        if self.measurements.is_empty() {
            return Err(MetricsError::NoMeasurements);
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut out = String::from("timestamp,metric_type,satellite_id,duration_ms,scenario_time_s\n");
        for m in &self.measurements {
            out.push_str(&format!(
                "{},{},{},{},{}\n",
                m.timestamp.to_rfc3339(),
                m.metric_type,
                m.satellite_id,
                m.duration_ms,
                m.scenario_time_s
            ));
        }
        std::fs::write(path, out)?;
        info!(count = self.measurements.len(), path = %path.display(), "exported latency measurements");
        Ok(())
    }

    pub fn summary(&self) -> LatencySummary {
        LatencySummary {
            total_measurements: self.measurements.len(),
            measurement_types: self.measurement_log.clone(),
            stats: self.stats(),
            stats_by_satellite: self.stats_by_satellite(),
        }
    }

    pub fn reset(&mut self) {
        self.measurements.clear();
        self.measurement_log.clear();
    }

    pub fn len(&self) -> usize {
        self.measurements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }
}
