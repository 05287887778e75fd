//! Operator-readable explanations for anomaly decisions.
//!
//! Bridges the gap between raw scores and the narrative an operator needs:
//! the policy reasoning becomes the primary factor, recurrence data the
//! secondary factors.

use astra_proto::{Explanation, MissionPhase, RecurrenceInfo};

pub fn build_explanation(
    policy_reasoning: &str,
    recurrence: &RecurrenceInfo,
    phase: MissionPhase,
    confidence: f64,
) -> Explanation {
    let mut secondary = vec![
        format!("Recurrence count: {}", recurrence.count),
        format!("Recent occurrences: {}", recurrence.total_in_window),
    ];
    if let Some(seconds) = recurrence.time_since_last_s {
        secondary.push(format!("Seconds since previous occurrence: {seconds:.1}"));
    }

    Explanation {
        primary_factor: policy_reasoning.to_string(),
        secondary_factors: secondary,
        mission_phase_constraint: phase.to_string(),
        confidence: confidence.clamp(0.0, 1.0),
    }
}
