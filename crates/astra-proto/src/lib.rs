//! Domain types for the AstraGuard anomaly-response pipeline.
//!
//! Defines the telemetry sample accepted at the ingest boundary, the mission
//! phase vocabulary, and the decision/feedback records produced by the
//! phase-aware handler.

#![forbid(unsafe_code)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ─── Limits ──────────────────────────────────────────────────────────────────

/// Capacity of the bounded in-memory decision history ring.
pub const MAX_ANOMALY_HISTORY_SIZE: usize = 10_000;

/// Maximum telemetry samples accepted in one batch.
pub const MAX_BATCH_SIZE: usize = 1_000;

/// Maximum entries returned by a history query.
pub const MAX_HISTORY_QUERY_LIMIT: usize = 1_000;

/// Default sliding window for recurrence counting, in seconds.
pub const DEFAULT_RECURRENCE_WINDOW_SECS: u64 = 3_600;

// ─── Validation errors ───────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        min: f64,
        max: f64,
        value: f64,
    },
    #[error("{field} must be non-negative, got {value}")]
    Negative { field: &'static str, value: f64 },
    #[error("{field} must be a finite number")]
    NotFinite { field: &'static str },
    #[error("{field} must be a non-empty string")]
    Empty { field: &'static str },
    #[error("{field} exceeds maximum length of {max}")]
    TooLong { field: &'static str, max: usize },
    #[error("unknown mission phase '{0}'")]
    UnknownPhase(String),
}

fn check_finite(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ValidationError::NotFinite { field })
    }
}

fn check_range(
    field: &'static str,
    value: f64,
    min: f64,
    max: f64,
) -> Result<(), ValidationError> {
    check_finite(field, value)?;
    if value < min || value > max {
        return Err(ValidationError::OutOfRange {
            field,
            min,
            max,
            value,
        });
    }
    Ok(())
}

fn check_non_negative(field: &'static str, value: f64) -> Result<(), ValidationError> {
    check_finite(field, value)?;
    if value < 0.0 {
        return Err(ValidationError::Negative { field, value });
    }
    Ok(())
}

/// Validate an anomaly type label (non-empty, bounded, snake_case-ish).
pub fn validate_anomaly_type(label: &str) -> Result<(), ValidationError> {
    if label.trim().is_empty() {
        return Err(ValidationError::Empty {
            field: "anomaly_type",
        });
    }
    if label.len() > 64 {
        return Err(ValidationError::TooLong {
            field: "anomaly_type",
            max: 64,
        });
    }
    Ok(())
}

/// Validate a score expected in the unit interval.
pub fn validate_unit_interval(field: &'static str, value: f64) -> Result<(), ValidationError> {
    check_range(field, value, 0.0, 1.0)
}

// ─── Telemetry ───────────────────────────────────────────────────────────────

/// One telemetry sample pushed by a spacecraft or simulator.
///
/// Required channels are voltage, temperature, and gyro; the rest are
/// optional bus/compute channels. Range checks run once at the ingest
/// boundary; everything downstream may assume a validated sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetrySample {
    /// Bus voltage in volts.
    pub voltage: f64,
    /// Temperature in degrees Celsius.
    pub temperature: f64,
    /// Gyroscope rate in rad/s (signed).
    pub gyro: f64,

    pub current: Option<f64>,
    pub wheel_speed: Option<f64>,
    pub cpu_usage: Option<f64>,
    pub memory_usage: Option<f64>,
    pub network_latency: Option<f64>,
    pub disk_io: Option<f64>,
    pub error_rate: Option<f64>,
    pub response_time: Option<f64>,
    pub active_connections: Option<u32>,

    /// Sample timestamp; filled with the ingest time when absent.
    pub timestamp: Option<DateTime<Utc>>,
}

impl TelemetrySample {
    /// Minimal sample with only the required channels.
    pub fn new(voltage: f64, temperature: f64, gyro: f64) -> Self {
        Self {
            voltage,
            temperature,
            gyro,
            current: None,
            wheel_speed: None,
            cpu_usage: None,
            memory_usage: None,
            network_latency: None,
            disk_io: None,
            error_rate: None,
            response_time: None,
            active_connections: None,
            timestamp: None,
        }
    }

    /// Boundary validation. Rejected samples never reach the pipeline.
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_range("voltage", self.voltage, 0.0, 50.0)?;
        check_range("temperature", self.temperature, -100.0, 150.0)?;
        check_finite("gyro", self.gyro)?;

        if let Some(v) = self.current {
            check_non_negative("current", v)?;
        }
        if let Some(v) = self.wheel_speed {
            check_non_negative("wheel_speed", v)?;
        }
        if let Some(v) = self.cpu_usage {
            check_range("cpu_usage", v, 0.0, 100.0)?;
        }
        if let Some(v) = self.memory_usage {
            check_range("memory_usage", v, 0.0, 100.0)?;
        }
        if let Some(v) = self.network_latency {
            check_non_negative("network_latency", v)?;
        }
        if let Some(v) = self.disk_io {
            check_non_negative("disk_io", v)?;
        }
        if let Some(v) = self.error_rate {
            check_non_negative("error_rate", v)?;
        }
        if let Some(v) = self.response_time {
            check_non_negative("response_time", v)?;
        }
        Ok(())
    }

    /// The sample timestamp, defaulting to now.
    pub fn effective_timestamp(&self) -> DateTime<Utc> {
        self.timestamp.unwrap_or_else(Utc::now)
    }

    /// Feature vector handed to the classifier. Order is part of the model
    /// contract: `[voltage, temperature, |gyro|, current, wheel_speed]`.
    pub fn features(&self) -> [f64; 5] {
        [
            self.voltage,
            self.temperature,
            self.gyro.abs(),
            self.current.unwrap_or(1.0),
            self.wheel_speed.unwrap_or(5.0),
        ]
    }
}

// ─── Mission phase ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MissionPhase {
    Launch,
    Deployment,
    NominalOps,
    PayloadOps,
    SafeMode,
}

impl MissionPhase {
    /// Legal non-forced successors. SAFE_MODE is reachable from every phase;
    /// leaving SAFE_MODE goes through NOMINAL_OPS only.
    pub fn allowed_successors(self) -> &'static [MissionPhase] {
        match self {
            Self::Launch => &[Self::Deployment, Self::SafeMode],
            Self::Deployment => &[Self::NominalOps, Self::SafeMode],
            Self::NominalOps => &[Self::PayloadOps, Self::SafeMode],
            Self::PayloadOps => &[Self::NominalOps, Self::SafeMode],
            Self::SafeMode => &[Self::NominalOps],
        }
    }

    pub fn can_transition_to(self, target: MissionPhase) -> bool {
        self.allowed_successors().contains(&target)
    }

    /// Operator-facing description of the phase.
    pub fn description(self) -> &'static str {
        match self {
            Self::Launch => "Ascent and early orbit; only survival-critical actions permitted",
            Self::Deployment => "Appendage deployment and checkout",
            Self::NominalOps => "Routine on-orbit operations",
            Self::PayloadOps => "Payload active; attitude and thermal margins are tight",
            Self::SafeMode => "Minimal power-positive configuration awaiting ground recovery",
        }
    }

    /// Resolve a policy-file phase name. Unknown names are a validation
    /// error rather than a silent default.
    pub fn parse(name: &str) -> Result<Self, ValidationError> {
        match name {
            "LAUNCH" => Ok(Self::Launch),
            "DEPLOYMENT" => Ok(Self::Deployment),
            "NOMINAL_OPS" => Ok(Self::NominalOps),
            "PAYLOAD_OPS" => Ok(Self::PayloadOps),
            "SAFE_MODE" => Ok(Self::SafeMode),
            other => Err(ValidationError::UnknownPhase(other.to_string())),
        }
    }

    pub const ALL: [MissionPhase; 5] = [
        Self::Launch,
        Self::Deployment,
        Self::NominalOps,
        Self::PayloadOps,
        Self::SafeMode,
    ];
}

impl std::fmt::Display for MissionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Launch => "LAUNCH",
            Self::Deployment => "DEPLOYMENT",
            Self::NominalOps => "NOMINAL_OPS",
            Self::PayloadOps => "PAYLOAD_OPS",
            Self::SafeMode => "SAFE_MODE",
        };
        write!(f, "{s}")
    }
}

/// A committed phase change, appended to the state machine's transition log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub from: MissionPhase,
    pub to: MissionPhase,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
    pub forced: bool,
}

// ─── Severity & escalation ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Fixed bucket map over the normalized score:
    /// ≥0.8 CRITICAL, ≥0.6 HIGH, ≥0.4 MEDIUM, else LOW.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            Self::Critical
        } else if score >= 0.6 {
            Self::High
        } else if score >= 0.4 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        };
        write!(f, "{s}")
    }
}

/// How hard the system reacts, ordered from informational to forcing
/// SAFE_MODE on the vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EscalationLevel {
    None,
    Log,
    Warn,
    Mask,
    EscalateSafeMode,
}

impl std::fmt::Display for EscalationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::None => "NONE",
            Self::Log => "LOG",
            Self::Warn => "WARN",
            Self::Mask => "MASK",
            Self::EscalateSafeMode => "ESCALATE_SAFE_MODE",
        };
        write!(f, "{s}")
    }
}

// ─── Recurrence ──────────────────────────────────────────────────────────────

/// Recurrence snapshot for one anomaly type at decision time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurrenceInfo {
    /// Total occurrences of this type observed in this run.
    pub count: u64,
    /// Occurrences within the sliding window (includes the current one).
    pub total_in_window: u64,
    /// Timestamp of the penultimate occurrence, if any.
    pub last_occurrence: Option<DateTime<Utc>>,
    /// Seconds since the penultimate occurrence, if any.
    pub time_since_last_s: Option<f64>,
}

// ─── Explanation ─────────────────────────────────────────────────────────────

/// Operator-readable reasoning attached to every decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Explanation {
    pub primary_factor: String,
    pub secondary_factors: Vec<String>,
    pub mission_phase_constraint: String,
    pub confidence: f64,
}

// ─── Decision ────────────────────────────────────────────────────────────────

/// The complete, auditable output of the phase-aware handler for one anomaly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyDecision {
    /// `DECISION_<epoch_ms>_<8-hex>`, unique within a process.
    pub decision_id: String,
    pub timestamp: DateTime<Utc>,
    pub anomaly_type: String,
    pub severity_score: f64,
    pub detection_confidence: f64,
    pub mission_phase: MissionPhase,
    pub severity: Severity,
    pub recommended_action: String,
    pub escalation_level: EscalationLevel,
    pub should_escalate_to_safe_mode: bool,
    pub reasoning: String,
    pub recurrence_info: RecurrenceInfo,
    pub explanation: Explanation,
}

// ─── Feedback ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackLabel {
    Correct,
    Insufficient,
    Wrong,
}

/// Durable record of a decision, eligible for operator labelling and
/// eventual retraining export. Append-only until labelled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackEvent {
    /// Equal to the originating decision_id.
    pub fault_id: String,
    pub anomaly_type: String,
    pub recovery_action: String,
    pub mission_phase: MissionPhase,
    pub timestamp: DateTime<Utc>,
    pub confidence: f64,
    pub label: Option<FeedbackLabel>,
    pub notes: Option<String>,
}

// ─── History query ───────────────────────────────────────────────────────────

/// Filter over the bounded decision history. Matching entries come back
/// newest-first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryQuery {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub severity_min: Option<f64>,
    pub limit: Option<usize>,
}

impl HistoryQuery {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(min) = self.severity_min {
            validate_unit_interval("severity_min", min)?;
        }
        if let Some(limit) = self.limit
            && limit > MAX_HISTORY_QUERY_LIMIT
        {
            return Err(ValidationError::OutOfRange {
                field: "limit",
                min: 1.0,
                max: MAX_HISTORY_QUERY_LIMIT as f64,
                value: limit as f64,
            });
        }
        Ok(())
    }

    /// The effective limit, clamped to the query maximum.
    pub fn effective_limit(&self) -> usize {
        self.limit
            .unwrap_or(MAX_HISTORY_QUERY_LIMIT)
            .min(MAX_HISTORY_QUERY_LIMIT)
    }
}

// ─── Resource status ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResourceLevel {
    #[default]
    Nominal,
    Elevated,
    Critical,
}

/// Read-mostly snapshot published by the resource monitor. The detector
/// reads it opportunistically and never blocks on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceStatus {
    pub cpu_pct: f64,
    pub mem_pct: f64,
    pub disk_pct: f64,
    pub overall: ResourceLevel,
    pub sampled_at: DateTime<Utc>,
}

impl Default for ResourceStatus {
    fn default() -> Self {
        Self {
            cpu_pct: 0.0,
            mem_pct: 0.0,
            disk_pct: 0.0,
            overall: ResourceLevel::Nominal,
            sampled_at: Utc::now(),
        }
    }
}
