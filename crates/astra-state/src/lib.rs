//! Mission phase state machine for AstraGuard.
//!
//! Holds the single current [`MissionPhase`], governs transitions against the
//! allowed-successor table, and keeps an ordered transition log. SAFE_MODE is
//! always reachable; forced transitions always succeed and are recorded as
//! such.

#![forbid(unsafe_code)]

use astra_proto::{MissionPhase, PhaseTransition};
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

/// Transition log entries kept in memory.
const TRANSITION_LOG_CAP: usize = 256;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("invalid transition {from} -> {to}; allowed: {allowed:?}")]
    InvalidTransition {
        from: MissionPhase,
        to: MissionPhase,
        allowed: Vec<MissionPhase>,
    },
}

/// Outcome of a phase change request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub success: bool,
    pub previous_phase: MissionPhase,
    pub new_phase: MissionPhase,
    pub message: String,
}

struct MachineInner {
    phase: MissionPhase,
    log: Vec<PhaseTransition>,
}

/// The state machine exclusively owns the current phase and its log.
///
/// All mutation happens under one critical section; reads return the most
/// recently committed phase. Transitions are totally ordered.
pub struct MissionStateMachine {
    inner: Mutex<MachineInner>,
}

impl MissionStateMachine {
    /// New machine starting in LAUNCH.
    pub fn new() -> Self {
        Self::starting_in(MissionPhase::Launch)
    }

    pub fn starting_in(phase: MissionPhase) -> Self {
        Self {
            inner: Mutex::new(MachineInner {
                phase,
                log: Vec::new(),
            }),
        }
    }

    pub fn current_phase(&self) -> MissionPhase {
        self.inner.lock().phase
    }

    /// Request a phase change.
    ///
    /// Without `force`, the target must be in the allowed-successor set of
    /// the current phase. With `force`, the transition always commits and is
    /// logged with `forced = true`.
    pub fn set_phase(
        &self,
        target: MissionPhase,
        force: bool,
        reason: &str,
    ) -> Result<TransitionOutcome, StateError> {
        let mut inner = self.inner.lock();
        let current = inner.phase;

        if current == target {
            return Ok(TransitionOutcome {
                success: true,
                previous_phase: current,
                new_phase: target,
                message: format!("already in {target}"),
            });
        }

        if !force && !current.can_transition_to(target) {
            warn!(from = %current, to = %target, "transition rejected");
            return Err(StateError::InvalidTransition {
                from: current,
                to: target,
                allowed: current.allowed_successors().to_vec(),
            });
        }

        let transition = PhaseTransition {
            from: current,
            to: target,
            timestamp: Utc::now(),
            reason: reason.to_string(),
            forced: force,
        };
        inner.phase = target;
        inner.log.push(transition);
        if inner.log.len() > TRANSITION_LOG_CAP {
            let excess = inner.log.len() - TRANSITION_LOG_CAP;
            inner.log.drain(..excess);
        }

        info!(from = %current, to = %target, forced = force, reason, "phase transition");

        Ok(TransitionOutcome {
            success: true,
            previous_phase: current,
            new_phase: target,
            message: if force {
                format!("forced transition {current} -> {target}: {reason}")
            } else {
                format!("transition {current} -> {target}: {reason}")
            },
        })
    }

    /// Force the vehicle into SAFE_MODE. Always succeeds.
    pub fn force_safe_mode(&self, reason: &str) -> TransitionOutcome {
        // force=true cannot produce InvalidTransition
        match self.set_phase(MissionPhase::SafeMode, true, reason) {
            Ok(outcome) => outcome,
            Err(_) => unreachable!("forced transitions always succeed"),
        }
    }

    /// Recent transitions, oldest first. `limit` keeps the newest entries.
    pub fn phase_history(&self, limit: Option<usize>) -> Vec<PhaseTransition> {
        let inner = self.inner.lock();
        let log = &inner.log;
        let start = limit.map_or(0, |n| log.len().saturating_sub(n));
        log[start..].to_vec()
    }

    /// Snapshot of the phase plus its constraints, for the status surface.
    pub fn describe(&self) -> PhaseDescription {
        let phase = self.current_phase();
        PhaseDescription {
            phase,
            description: phase.description().to_string(),
            allowed_successors: phase.allowed_successors().to_vec(),
            recent_transitions: self.phase_history(Some(10)),
        }
    }
}

impl Default for MissionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseDescription {
    pub phase: MissionPhase,
    pub description: String,
    pub allowed_successors: Vec<MissionPhase>,
    pub recent_transitions: Vec<PhaseTransition>,
}
