//! HIL validation metrics for AstraGuard.
//!
//! Three collectors feed the hardware-in-the-loop harness: latency timing
//! across the swarm, classification accuracy against scenario ground truth,
//! and per-run persistent storage with inter-run comparison.

#![forbid(unsafe_code)]

pub mod accuracy;
pub mod latency;
pub mod storage;

pub use accuracy::{
    AccuracyCollector, AccuracyStats, AgentClassification, FaultTypeStats, GroundTruthEvent,
    SatelliteAccuracy,
};
pub use latency::{
    LatencyCollector, LatencyMeasurement, LatencyStats, LatencySummary, MetricType,
};
pub use storage::{MetricDelta, MetricsStorage, RunComparison, RunSummary, SavedPaths};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("no measurements to export")]
    NoMeasurements,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
