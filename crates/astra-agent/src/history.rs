//! Bounded in-memory decision history.
//!
//! A FIFO ring of the most recent decisions. Appends evict the oldest entry
//! at capacity; queries return the youngest matching entries in reverse
//! chronological order. The ring is linearizable: all access goes through
//! one mutex.

use astra_proto::{AnomalyDecision, HistoryQuery, MAX_ANOMALY_HISTORY_SIZE};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

pub struct DecisionHistory {
    capacity: usize,
    ring: Mutex<VecDeque<AnomalyDecision>>,
}

impl DecisionHistory {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be > 0");
        Self {
            capacity,
            ring: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(MAX_ANOMALY_HISTORY_SIZE)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.ring.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.lock().is_empty()
    }

    /// Append a decision, evicting the oldest entry when full.
    pub fn append(&self, decision: AnomalyDecision) {
        let mut ring = self.ring.lock();
        if ring.len() == self.capacity {
            ring.pop_front();
        }
        ring.push_back(decision);
    }

    /// Youngest matching entries, newest first.
    pub fn query(&self, query: &HistoryQuery) -> Vec<AnomalyDecision> {
        let ring = self.ring.lock();
        let limit = query.effective_limit();
        ring.iter()
            .rev()
            .filter(|d| {
                query.start_time.is_none_or(|t| d.timestamp >= t)
                    && query.end_time.is_none_or(|t| d.timestamp <= t)
                    && query.severity_min.is_none_or(|min| d.severity_score >= min)
            })
            .take(limit)
            .cloned()
            .collect()
    }

    /// The most recent decision, if any.
    pub fn latest(&self) -> Option<AnomalyDecision> {
        self.ring.lock().back().cloned()
    }

    /// Aggregate statistics over the retained decisions.
    pub fn stats(&self) -> DecisionStats {
        let ring = self.ring.lock();
        let total = ring.len();
        let mut by_phase: HashMap<String, u64> = HashMap::new();
        let mut by_type: HashMap<String, u64> = HashMap::new();
        let mut escalations = 0u64;

        for decision in ring.iter() {
            *by_phase
                .entry(decision.mission_phase.to_string())
                .or_default() += 1;
            *by_type.entry(decision.anomaly_type.clone()).or_default() += 1;
            if decision.should_escalate_to_safe_mode {
                escalations += 1;
            }
        }

        DecisionStats {
            total_decisions: total as u64,
            total_escalations: escalations,
            escalation_rate: if total > 0 {
                escalations as f64 / total as f64
            } else {
                0.0
            },
            by_phase,
            by_anomaly_type: by_type,
        }
    }
}

/// Summary over the bounded history, used by the status and history
/// surfaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionStats {
    pub total_decisions: u64,
    pub total_escalations: u64,
    pub escalation_rate: f64,
    pub by_phase: HashMap<String, u64>,
    pub by_anomaly_type: HashMap<String, u64>,
}
