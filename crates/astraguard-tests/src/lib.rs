//! Shared fixtures for the AstraGuard integration tests.

use astra_agent::{HandlerConfig, PhaseAwareHandler};
use astra_policy::PolicyEngine;
use astra_proto::MissionPhase;
use astra_state::MissionStateMachine;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// A handler wired with default policies, starting in the given phase, with
/// its feedback journal under `dir`.
pub fn handler_in_phase(
    dir: &Path,
    phase: MissionPhase,
) -> (Arc<MissionStateMachine>, PhaseAwareHandler) {
    let state = Arc::new(MissionStateMachine::starting_in(phase));
    let policy = Arc::new(PolicyEngine::with_defaults());
    let handler = PhaseAwareHandler::new(
        HandlerConfig {
            recurrence_window: Duration::from_secs(3600),
            history_capacity: 10_000,
            feedback_path: dir.join("feedback_pending.json"),
        },
        state.clone(),
        policy,
    );
    (state, handler)
}

/// Like [`handler_in_phase`], but with a caller-chosen history capacity and
/// recurrence window.
pub fn handler_with_limits(
    dir: &Path,
    phase: MissionPhase,
    capacity: usize,
    window: Duration,
) -> (Arc<MissionStateMachine>, PhaseAwareHandler) {
    let state = Arc::new(MissionStateMachine::starting_in(phase));
    let policy = Arc::new(PolicyEngine::with_defaults());
    let handler = PhaseAwareHandler::new(
        HandlerConfig {
            recurrence_window: window,
            history_capacity: capacity,
            feedback_path: dir.join("feedback_pending.json"),
        },
        state.clone(),
        policy,
    );
    (state, handler)
}
