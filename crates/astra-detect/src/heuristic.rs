//! Rule-based fallback detection.
//!
//! Sanity-check rules over physical constraints, active whenever the model
//! path is unavailable. Conservative by construction: prefers a false alarm
//! over a missed fault, and degrades to a pessimistic verdict if the rules
//! themselves cannot be evaluated.

use astra_proto::TelemetrySample;
use rand::Rng;

/// Score contribution when the bus voltage leaves the [7,9] V band.
const POWER_CONTRIBUTION: f64 = 0.4;
/// Score contribution when temperature exceeds 40 °C.
const THERMAL_CONTRIBUTION: f64 = 0.3;
/// Score contribution when |gyro| exceeds 0.1 rad/s.
const ATTITUDE_CONTRIBUTION: f64 = 0.3;

/// Anomaly verdict above this score.
const ANOMALY_THRESHOLD: f64 = 0.5;

/// Per-rule contributions for one sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuleBreakdown {
    pub power: f64,
    pub thermal: f64,
    pub attitude: f64,
}

impl RuleBreakdown {
    pub fn total(&self) -> f64 {
        self.power + self.thermal + self.attitude
    }
}

pub fn evaluate_rules(sample: &TelemetrySample) -> RuleBreakdown {
    let mut breakdown = RuleBreakdown {
        power: 0.0,
        thermal: 0.0,
        attitude: 0.0,
    };
    if sample.voltage < 7.0 || sample.voltage > 9.0 {
        breakdown.power = POWER_CONTRIBUTION;
    }
    if sample.temperature > 40.0 {
        breakdown.thermal = THERMAL_CONTRIBUTION;
    }
    if sample.gyro.abs() > 0.1 {
        breakdown.attitude = ATTITUDE_CONTRIBUTION;
    }
    breakdown
}

/// Rule-based detection: `(is_anomalous, score)`.
///
/// Small uniform noise in [0, 0.1) keeps repeated simulator runs from
/// producing byte-identical traces; the score is capped at 1.0. If the
/// channels cannot be evaluated the verdict is pessimistic: `(true, 0.6)`.
pub fn heuristic_detection(sample: &TelemetrySample) -> (bool, f64) {
    if !sample.voltage.is_finite() || !sample.temperature.is_finite() || !sample.gyro.is_finite()
    {
        return (true, 0.6);
    }

    let mut score = evaluate_rules(sample).total();
    score += rand::thread_rng().gen_range(0.0..0.1);
    let score = score.min(1.0);
    (score > ANOMALY_THRESHOLD, score)
}

/// Coarse fault label from the dominant rule trigger.
///
/// Multiple triggered rules collapse into `combined_fault`; an anomalous
/// verdict with no triggered rule labels as `unclassified_fault`.
pub fn classify_label(sample: &TelemetrySample, is_anomalous: bool) -> String {
    let breakdown = evaluate_rules(sample);
    let triggered = [
        (breakdown.power > 0.0, "power_fault"),
        (breakdown.thermal > 0.0, "thermal_fault"),
        (breakdown.attitude > 0.0, "attitude_fault"),
    ];
    let hits: Vec<&str> = triggered
        .iter()
        .filter(|(hit, _)| *hit)
        .map(|(_, label)| *label)
        .collect();

    match hits.as_slice() {
        [] if is_anomalous => "unclassified_fault".to_string(),
        [] => "nominal".to_string(),
        [single] => (*single).to_string(),
        _ => "combined_fault".to_string(),
    }
}
