//! Ground-truth accuracy metrics for classification validation.
//!
//! Scenario ground truth is kept per satellite in timestamp order; the
//! "what was true at time t" lookup is a binary search for the latest event
//! at or before t. Derived statistics cover per-fault precision/recall/F1
//! and a confusion matrix with an explicit `nominal` row/column.

use crate::MetricsError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use tracing::{info, warn};

/// Ground truth event during a scenario. `expected_fault = None` is nominal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundTruthEvent {
    pub timestamp_s: f64,
    pub satellite_id: String,
    pub expected_fault: Option<String>,
    pub confidence: f64,
}

/// One classification attempt by the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentClassification {
    pub timestamp_s: f64,
    pub satellite_id: String,
    pub predicted_fault: Option<String>,
    pub confidence: f64,
    pub is_correct: bool,
}

/// Per-fault-type derived statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaultTypeStats {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub true_positives: u64,
    pub false_positives: u64,
    pub false_negatives: u64,
    pub total_predictions: u64,
    pub correct_predictions: u64,
    pub avg_confidence: f64,
}

/// Overall accuracy statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccuracyStats {
    pub total_classifications: u64,
    pub correct_classifications: u64,
    pub overall_accuracy: f64,
    pub by_fault_type: HashMap<String, FaultTypeStats>,
    pub confidence_mean: f64,
    pub confidence_std: f64,
}

/// Per-satellite accuracy rollup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SatelliteAccuracy {
    pub total_classifications: u64,
    pub correct_classifications: u64,
    pub accuracy: f64,
    pub avg_confidence: f64,
}

fn validate_common(sat_id: &str, timestamp_s: f64, confidence: f64) -> Result<(), MetricsError> {
    if sat_id.trim().is_empty() {
        return Err(MetricsError::InvalidInput(
            "satellite_id must be a non-empty string".to_string(),
        ));
    }
    if !timestamp_s.is_finite() || timestamp_s < 0.0 {
        return Err(MetricsError::InvalidInput(format!(
            "timestamp_s must be non-negative, got {timestamp_s}"
        )));
    }
    if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
        return Err(MetricsError::InvalidInput(format!(
            "confidence must be between 0 and 1, got {confidence}"
        )));
    }
    Ok(())
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

/// Validates agent classification accuracy against scenario ground truth.
#[derive(Debug, Default)]
pub struct AccuracyCollector {
    classifications: Vec<AgentClassification>,
    truth_by_satellite: HashMap<String, Vec<GroundTruthEvent>>,
}

impl AccuracyCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record scenario ground truth. Events are kept sorted per satellite;
    /// the insert position comes from a binary search so out-of-order
    /// recording is fine.
    pub fn record_ground_truth(
        &mut self,
        sat_id: &str,
        scenario_time_s: f64,
        fault_type: Option<&str>,
        confidence: f64,
    ) -> Result<(), MetricsError> {
        validate_common(sat_id, scenario_time_s, confidence)?;
        let event = GroundTruthEvent {
            timestamp_s: scenario_time_s,
            satellite_id: sat_id.to_string(),
            expected_fault: fault_type.map(str::to_string),
            confidence,
        };
        let events = self.truth_by_satellite.entry(sat_id.to_string()).or_default();
        let idx = events.partition_point(|e| e.timestamp_s <= scenario_time_s);
        events.insert(idx, event);
        Ok(())
    }

    /// Record one agent classification attempt.
    pub fn record_classification(
        &mut self,
        sat_id: &str,
        scenario_time_s: f64,
        predicted_fault: Option<&str>,
        confidence: f64,
        is_correct: bool,
    ) -> Result<(), MetricsError> {
        validate_common(sat_id, scenario_time_s, confidence)?;
        self.classifications.push(AgentClassification {
            timestamp_s: scenario_time_s,
            satellite_id: sat_id.to_string(),
            predicted_fault: predicted_fault.map(str::to_string),
            confidence,
            is_correct,
        });
        Ok(())
    }

    /// Ground-truth fault for a satellite at a point in time: the latest
    /// event with `timestamp_s <= t`, found by binary search. `None` when
    /// the time precedes all events or the satellite is unknown.
    pub fn find_ground_truth(&self, sat_id: &str, timestamp_s: f64) -> Option<String> {
        let events = match self.truth_by_satellite.get(sat_id) {
            Some(events) if !events.is_empty() => events,
            _ => {
                warn!(sat = sat_id, "no ground truth recorded for satellite");
                return None;
            }
        };
        let idx = events.partition_point(|e| e.timestamp_s <= timestamp_s);
        if idx == 0 {
            return None;
        }
        events[idx - 1].expected_fault.clone()
    }

    /// Comprehensive accuracy statistics.
    pub fn accuracy_stats(&self) -> AccuracyStats {
        let total = self.classifications.len() as u64;
        let correct = self.classifications.iter().filter(|c| c.is_correct).count() as u64;
        let confidences: Vec<f64> = self.classifications.iter().map(|c| c.confidence).collect();

        AccuracyStats {
            total_classifications: total,
            correct_classifications: correct,
            overall_accuracy: if total > 0 {
                correct as f64 / total as f64
            } else {
                0.0
            },
            by_fault_type: self.per_fault_stats(),
            confidence_mean: mean(&confidences),
            confidence_std: std_dev(&confidences),
        }
    }

    /// Precision, recall, and F1 per fault type.
    fn per_fault_stats(&self) -> HashMap<String, FaultTypeStats> {
        let mut fault_types: BTreeSet<String> = BTreeSet::new();
        for c in &self.classifications {
            if let Some(fault) = &c.predicted_fault {
                fault_types.insert(fault.clone());
            }
        }
        for events in self.truth_by_satellite.values() {
            for e in events {
                if let Some(fault) = &e.expected_fault {
                    fault_types.insert(fault.clone());
                }
            }
        }

        let mut stats = HashMap::new();
        for fault_type in fault_types {
            let tp = self
                .classifications
                .iter()
                .filter(|c| c.predicted_fault.as_deref() == Some(&fault_type) && c.is_correct)
                .count() as u64;
            let fp = self
                .classifications
                .iter()
                .filter(|c| c.predicted_fault.as_deref() == Some(&fault_type) && !c.is_correct)
                .count() as u64;
            let fn_ = self
                .classifications
                .iter()
                .filter(|c| {
                    c.predicted_fault.as_deref() != Some(&fault_type)
                        && !c.is_correct
                        && self.find_ground_truth(&c.satellite_id, c.timestamp_s).as_deref()
                            == Some(&fault_type)
                })
                .count() as u64;

            let precision = if tp + fp > 0 {
                tp as f64 / (tp + fp) as f64
            } else {
                0.0
            };
            let recall = if tp + fn_ > 0 {
                tp as f64 / (tp + fn_) as f64
            } else {
                0.0
            };
            let f1 = if precision + recall > 0.0 {
                2.0 * precision * recall / (precision + recall)
            } else {
                0.0
            };

            let predictions: Vec<f64> = self
                .classifications
                .iter()
                .filter(|c| c.predicted_fault.as_deref() == Some(&fault_type))
                .map(|c| c.confidence)
                .collect();

            stats.insert(
                fault_type,
                FaultTypeStats {
                    precision,
                    recall,
                    f1,
                    true_positives: tp,
                    false_positives: fp,
                    false_negatives: fn_,
                    total_predictions: predictions.len() as u64,
                    correct_predictions: tp,
                    avg_confidence: mean(&predictions),
                },
            );
        }
        stats
    }

    /// Accuracy per satellite.
    pub fn stats_by_satellite(&self) -> HashMap<String, SatelliteAccuracy> {
        let mut by_sat: HashMap<String, Vec<&AgentClassification>> = HashMap::new();
        for c in &self.classifications {
            by_sat.entry(c.satellite_id.clone()).or_default().push(c);
        }

        by_sat
            .into_iter()
            .map(|(sat, classifications)| {
                let total = classifications.len() as u64;
                let correct = classifications.iter().filter(|c| c.is_correct).count() as u64;
                let confidences: Vec<f64> =
                    classifications.iter().map(|c| c.confidence).collect();
                (
                    sat,
                    SatelliteAccuracy {
                        total_classifications: total,
                        correct_classifications: correct,
                        accuracy: if total > 0 {
                            correct as f64 / total as f64
                        } else {
                            0.0
                        },
                        avg_confidence: mean(&confidences),
                    },
                )
            })
            .collect()
    }

    /// Predicted vs actual cross-tabulation. Nominal predictions and nominal
    /// ground truth appear as the `nominal` row/column.
    pub fn confusion_matrix(&self) -> HashMap<String, HashMap<String, u64>> {
        let mut confusion: HashMap<String, HashMap<String, u64>> = HashMap::new();
        for c in &self.classifications {
            let actual = self
                .find_ground_truth(&c.satellite_id, c.timestamp_s)
                .unwrap_or_else(|| "nominal".to_string());
            let predicted = c
                .predicted_fault
                .clone()
                .unwrap_or_else(|| "nominal".to_string());
            *confusion
                .entry(predicted)
                .or_default()
                .entry(actual)
                .or_default() += 1;
        }
        confusion
    }

    /// Export classifications to CSV for external analysis.
    pub fn export_csv(&self, path: &Path) -> Result<(), MetricsError> {
        if self.classifications.is_empty() {
            return Err(MetricsError::NoMeasurements);
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut out =
            String::from("timestamp_s,satellite_id,predicted_fault,confidence,is_correct\n");
        for c in &self.classifications {
            out.push_str(&format!(
                "{},{},{},{},{}\n",
                c.timestamp_s,
                c.satellite_id,
                c.predicted_fault.as_deref().unwrap_or("nominal"),
                c.confidence,
                c.is_correct
            ));
        }
        std::fs::write(path, out)?;
        info!(count = self.classifications.len(), path = %path.display(), "exported classifications");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.classifications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classifications.is_empty()
    }
}
