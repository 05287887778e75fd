//! Phase-aware anomaly handler for AstraGuard.
//!
//! The orchestrator that turns a classified anomaly into an auditable
//! decision: it snapshots the mission phase, updates recurrence tracking,
//! queries the policy engine, forces SAFE_MODE when the verdict demands it,
//! and records the decision to the bounded history and the feedback journal.
//!
//! After input validation, this path never fails: every internal error
//! degrades into a complete decision rather than an exception to the caller.

#![forbid(unsafe_code)]

pub mod explain;
pub mod feedback;
pub mod history;
pub mod recurrence;

pub use explain::build_explanation;
pub use feedback::{FeedbackError, FeedbackRecorder};
pub use history::{DecisionHistory, DecisionStats};
pub use recurrence::RecurrenceIndex;

use astra_policy::{EvaluationContext, PolicyEngine};
use astra_proto::{
    validate_anomaly_type, validate_unit_interval, AnomalyDecision, EscalationLevel,
    HistoryQuery, MissionPhase, ValidationError, MAX_ANOMALY_HISTORY_SIZE,
};
use astra_state::MissionStateMachine;
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

#[derive(Debug, Clone)]
pub struct HandlerConfig {
    pub recurrence_window: Duration,
    pub history_capacity: usize,
    pub feedback_path: PathBuf,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            recurrence_window: Duration::from_secs(
                astra_proto::DEFAULT_RECURRENCE_WINDOW_SECS,
            ),
            history_capacity: MAX_ANOMALY_HISTORY_SIZE,
            feedback_path: PathBuf::from("feedback_pending.json"),
        }
    }
}

/// Per-(type, severity) decision counters.
#[derive(Debug, Default)]
pub struct HandlerMetrics {
    anomalies_by_type: Mutex<HashMap<(String, String), u64>>,
}

impl HandlerMetrics {
    fn inc(&self, anomaly_type: &str, severity: &str) {
        *self
            .anomalies_by_type
            .lock()
            .entry((anomaly_type.to_string(), severity.to_string()))
            .or_default() += 1;
    }

    pub fn snapshot(&self) -> HashMap<(String, String), u64> {
        self.anomalies_by_type.lock().clone()
    }
}

/// Memory accounting for the status surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryStats {
    pub history_len: usize,
    pub history_capacity: usize,
    pub tracked_anomaly_types: usize,
    pub anomaly_log_len: usize,
    pub feedback_events: usize,
}

/// Orchestrates anomaly response based on mission phase constraints.
///
/// Exclusively owns the recurrence index, the bounded decision history, and
/// the feedback journal writer. The state machine and policy engine are
/// shared with the rest of the service.
pub struct PhaseAwareHandler {
    state_machine: Arc<MissionStateMachine>,
    policy_engine: Arc<PolicyEngine>,
    recurrence: RecurrenceIndex,
    history: DecisionHistory,
    feedback: FeedbackRecorder,
    pub metrics: HandlerMetrics,
}

impl PhaseAwareHandler {
    pub fn new(
        config: HandlerConfig,
        state_machine: Arc<MissionStateMachine>,
        policy_engine: Arc<PolicyEngine>,
    ) -> Self {
        info!(
            window_secs = config.recurrence_window.as_secs(),
            history_capacity = config.history_capacity,
            "phase-aware handler initialized"
        );
        Self {
            state_machine,
            policy_engine,
            recurrence: RecurrenceIndex::new(config.recurrence_window),
            history: DecisionHistory::new(config.history_capacity),
            feedback: FeedbackRecorder::new(config.feedback_path),
            metrics: HandlerMetrics::default(),
        }
    }

    /// Process one anomaly with phase-aware logic and policy enforcement.
    ///
    /// Validation failures reject the call; everything after validation
    /// produces exactly one decision.
    pub fn handle(
        &self,
        anomaly_type: &str,
        severity_score: f64,
        confidence: f64,
        metadata: Option<HashMap<String, Value>>,
    ) -> Result<AnomalyDecision, HandlerError> {
        validate_anomaly_type(anomaly_type)?;
        validate_unit_interval("severity_score", severity_score)?;
        validate_unit_interval("confidence", confidence)?;
        let metadata = metadata.unwrap_or_default();

        let now = Utc::now();
        let current_phase = self.state_machine.current_phase();

        let recurrence_info = self.recurrence.update(anomaly_type, now);

        let context = EvaluationContext {
            confidence,
            recurrence: Some(recurrence_info.clone()),
            metadata,
        };
        let policy_decision =
            self.policy_engine
                .evaluate(current_phase, anomaly_type, severity_score, &context);

        let should_escalate =
            policy_decision.escalation_level == EscalationLevel::EscalateSafeMode;

        let explanation = build_explanation(
            &policy_decision.reasoning,
            &recurrence_info,
            current_phase,
            confidence,
        );

        let decision = AnomalyDecision {
            decision_id: generate_decision_id(now),
            timestamp: now,
            anomaly_type: anomaly_type.to_string(),
            severity_score,
            detection_confidence: confidence,
            mission_phase: current_phase,
            severity: policy_decision.severity,
            recommended_action: policy_decision.recommended_action.clone(),
            escalation_level: policy_decision.escalation_level,
            should_escalate_to_safe_mode: should_escalate,
            reasoning: policy_decision.reasoning.clone(),
            recurrence_info,
            explanation,
        };

        // Escalation runs to completion before bookkeeping; a failure here
        // is logged but never withholds the decision.
        if should_escalate {
            self.execute_escalation(&decision);
        }

        // Metric update is best-effort; the decision stands regardless.
        self.metrics
            .inc(anomaly_type, &policy_decision.severity.to_string());

        info!(
            decision_id = %decision.decision_id,
            anomaly_type,
            severity = %decision.severity,
            phase = %current_phase,
            action = %decision.recommended_action,
            escalation = %decision.escalation_level,
            recurrence = decision.recurrence_info.count,
            "anomaly decision"
        );

        // Feedback journal write is not cancellable and never blocks the
        // decision from being returned.
        self.feedback.record(&decision);
        self.history.append(decision.clone());

        Ok(decision)
    }

    /// Acknowledge a non-anomalous classification.
    ///
    /// Produces a complete NO_ACTION decision without touching recurrence
    /// tracking, the history ring, or the feedback journal: quiet telemetry
    /// must never accumulate toward recurrence escalation.
    pub fn acknowledge_nominal(
        &self,
        score: f64,
        confidence: f64,
    ) -> Result<AnomalyDecision, HandlerError> {
        validate_unit_interval("severity_score", score)?;
        validate_unit_interval("confidence", confidence)?;

        let now = Utc::now();
        let current_phase = self.state_machine.current_phase();
        let recurrence_info = astra_proto::RecurrenceInfo {
            count: 0,
            total_in_window: 0,
            last_occurrence: None,
            time_since_last_s: None,
        };
        let reasoning = format!(
            "telemetry nominal (score {score:.2}) during {current_phase}; no response required"
        );
        let explanation =
            build_explanation(&reasoning, &recurrence_info, current_phase, confidence);

        Ok(AnomalyDecision {
            decision_id: generate_decision_id(now),
            timestamp: now,
            anomaly_type: "nominal".to_string(),
            severity_score: score,
            detection_confidence: confidence,
            mission_phase: current_phase,
            severity: astra_proto::Severity::Low,
            recommended_action: "NO_ACTION".to_string(),
            escalation_level: EscalationLevel::None,
            should_escalate_to_safe_mode: false,
            reasoning,
            recurrence_info,
            explanation,
        })
    }

    fn execute_escalation(&self, decision: &AnomalyDecision) {
        warn!(
            decision_id = %decision.decision_id,
            anomaly_type = %decision.anomaly_type,
            severity_score = decision.severity_score,
            phase = %decision.mission_phase,
            "escalating to SAFE_MODE"
        );
        let outcome = self.state_machine.force_safe_mode(&format!(
            "{} at {} severity (decision {})",
            decision.anomaly_type, decision.severity, decision.decision_id
        ));
        info!(decision_id = %decision.decision_id, message = %outcome.message, "escalation executed");
    }

    // ─── Introspection ───────────────────────────────────────────────────────

    pub fn history(&self) -> &DecisionHistory {
        &self.history
    }

    pub fn feedback(&self) -> &FeedbackRecorder {
        &self.feedback
    }

    pub fn query_history(&self, query: &HistoryQuery) -> Result<Vec<AnomalyDecision>, HandlerError> {
        query.validate()?;
        Ok(self.history.query(query))
    }

    pub fn decision_stats(&self) -> DecisionStats {
        self.history.stats()
    }

    /// Phase constraints for inspection (current phase when `None`).
    pub fn phase_constraints(&self, phase: Option<MissionPhase>) -> astra_policy::PhasePolicy {
        let phase = phase.unwrap_or_else(|| self.state_machine.current_phase());
        self.policy_engine.phase_constraints(phase)
    }

    /// The flat anomaly log, optionally filtered by type.
    pub fn anomaly_log(
        &self,
        anomaly_type: Option<&str>,
    ) -> Vec<(String, chrono::DateTime<Utc>)> {
        self.recurrence.log(anomaly_type)
    }

    /// Clear recurrence tracking (testing and operator reset).
    pub fn clear_anomaly_history(&self) {
        self.recurrence.clear();
        info!("anomaly history cleared");
    }

    pub fn memory_stats(&self) -> MemoryStats {
        MemoryStats {
            history_len: self.history.len(),
            history_capacity: self.history.capacity(),
            tracked_anomaly_types: self.recurrence.tracked_types(),
            anomaly_log_len: self.recurrence.log(None).len(),
            feedback_events: self.feedback.all().len(),
        }
    }
}

/// `DECISION_<epoch_ms>_<8-hex>`, unique within a process.
fn generate_decision_id(now: chrono::DateTime<Utc>) -> String {
    let epoch_ms = now.timestamp_millis();
    let suffix = &Uuid::new_v4().simple().to_string()[..8];
    format!("DECISION_{epoch_ms}_{suffix}")
}
