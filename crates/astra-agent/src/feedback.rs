//! Feedback journal for the operator review loop.
//!
//! Every decision appends one [`FeedbackEvent`] to an append-only JSON
//! journal. Operators later label events `correct`, `insufficient`, or
//! `wrong`; labelled events feed the retraining export. Journal I/O failures
//! are logged and must never block the decision path.

use astra_persist::JournalStore;
use astra_proto::{AnomalyDecision, FeedbackEvent, FeedbackLabel};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, error};

#[derive(Debug, Error)]
pub enum FeedbackError {
    #[error("no feedback event with fault_id '{0}'")]
    NotFound(String),
    #[error("journal io: {0}")]
    Io(#[from] std::io::Error),
}

pub struct FeedbackRecorder {
    journal: JournalStore,
}

impl FeedbackRecorder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            journal: JournalStore::new(path),
        }
    }

    /// Append the feedback event for one decision. Failures are swallowed
    /// after logging: the decision has already been made and must be
    /// returned regardless.
    pub fn record(&self, decision: &AnomalyDecision) {
        let event = FeedbackEvent {
            fault_id: decision.decision_id.clone(),
            anomaly_type: decision.anomaly_type.clone(),
            recovery_action: decision.recommended_action.clone(),
            mission_phase: decision.mission_phase,
            timestamp: decision.timestamp,
            confidence: decision.detection_confidence,
            label: None,
            notes: None,
        };

        match self.journal.append(&event) {
            Ok(total) => {
                debug!(decision_id = %decision.decision_id, total_events = total, "feedback event recorded");
            }
            Err(e) => {
                error!(
                    decision_id = %decision.decision_id,
                    error = %e,
                    "failed to write feedback journal"
                );
            }
        }
    }

    /// All events, labelled and pending.
    pub fn all(&self) -> Vec<FeedbackEvent> {
        self.journal.load()
    }

    /// Events still waiting for an operator label.
    pub fn pending(&self) -> Vec<FeedbackEvent> {
        self.all().into_iter().filter(|e| e.label.is_none()).collect()
    }

    /// Apply an operator label to one event.
    pub fn label(
        &self,
        fault_id: &str,
        label: FeedbackLabel,
        notes: Option<String>,
    ) -> Result<(), FeedbackError> {
        let mut events: Vec<FeedbackEvent> = self.journal.load();
        let event = events
            .iter_mut()
            .find(|e| e.fault_id == fault_id)
            .ok_or_else(|| FeedbackError::NotFound(fault_id.to_string()))?;
        event.label = Some(label);
        event.notes = notes;
        self.journal.save(&events)?;
        Ok(())
    }
}
