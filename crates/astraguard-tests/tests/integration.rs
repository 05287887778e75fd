//! End-to-end scenario tests for the AstraGuard decision pipeline.
//!
//! Each test drives the real components together: detector → handler →
//! policy engine → state machine, with the feedback journal on a temp
//! filesystem. The scenarios mirror the mission-operations playbook:
//! nominal telemetry, a thermal spike on the fallback path, a critical
//! combined fault, recurrence escalation, loader failure bursts, and
//! history eviction under sustained load.

use astra_detect::{Detector, DetectorConfig, DetectorKind};
use astra_health::{HealthMonitor, HealthStatus};
use astra_proto::{
    EscalationLevel, HistoryQuery, MissionPhase, Severity, TelemetrySample,
};
use astra_reliability::{CircuitBreakerConfig, RetryPolicy};
use astraguard_tests::{handler_in_phase, handler_with_limits};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

fn fast_detector_config(model_path: Option<PathBuf>) -> DetectorConfig {
    DetectorConfig {
        model_path,
        model_load_timeout: Duration::from_millis(250),
        inference_timeout: Duration::from_millis(250),
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        },
        breaker: CircuitBreakerConfig {
            failure_threshold: 5,
            success_threshold: 2,
            recovery_timeout: Duration::from_secs(60),
        },
    }
}

// ─── Scenario 1: Nominal sample in NOMINAL_OPS ────────────────────────────────

#[tokio::test]
async fn test_nominal_sample_produces_no_action() {
    let dir = tempfile::tempdir().expect("tempdir");
    let monitor = Arc::new(HealthMonitor::new());
    let detector = Detector::new(fast_detector_config(None), monitor.clone());
    let (state, handler) = handler_in_phase(dir.path(), MissionPhase::NominalOps);

    let sample = TelemetrySample::new(8.0, 25.0, 0.02);
    let detection = detector.detect(&sample).await.expect("detection");
    assert!(!detection.is_anomalous);
    assert!(detection.score < 0.5);

    let decision = handler
        .handle(&detection.label, detection.score, 1.0 - detection.score, None)
        .expect("decision");
    assert_eq!(decision.recommended_action, "NO_ACTION");
    assert_eq!(decision.escalation_level, EscalationLevel::None);
    assert!(!decision.should_escalate_to_safe_mode);
    // No phase change
    assert_eq!(state.current_phase(), MissionPhase::NominalOps);
}

// ─── Scenario 2: Thermal spike on the forced heuristic path ──────────────────

#[tokio::test]
async fn test_thermal_spike_heuristic_path() {
    let dir = tempfile::tempdir().expect("tempdir");
    let monitor = Arc::new(HealthMonitor::new());
    // Model configured but absent: the loader fails and the heuristic serves
    let detector = Detector::new(
        fast_detector_config(Some(PathBuf::from("/nonexistent/model.json"))),
        monitor.clone(),
    );
    let (_state, handler) = handler_in_phase(dir.path(), MissionPhase::NominalOps);

    let sample = TelemetrySample::new(8.0, 45.0, 0.02);
    let detection = detector.detect(&sample).await.expect("detection");

    assert_eq!(detection.detector, DetectorKind::Heuristic);
    assert!(detection.score >= 0.3, "thermal rule fired, got {}", detection.score);
    assert!(detection.label.contains("thermal"));

    let component = monitor.get(astra_detect::COMPONENT).expect("registered");
    assert_eq!(component.status, HealthStatus::Degraded);
    assert!(component.fallback_active);

    // The decision still comes back despite the degraded detector
    let decision = handler
        .handle(&detection.label, detection.score, detection.score, None)
        .expect("decision");
    assert_eq!(decision.anomaly_type, detection.label);
}

// ─── Scenario 3: Critical combined fault escalates to SAFE_MODE ──────────────

#[tokio::test]
async fn test_critical_combined_fault_forces_safe_mode() {
    let dir = tempfile::tempdir().expect("tempdir");
    let monitor = Arc::new(HealthMonitor::new());
    let detector = Detector::new(fast_detector_config(None), monitor);
    let (state, handler) = handler_in_phase(dir.path(), MissionPhase::NominalOps);

    // Bad voltage, hot, tumbling: every rule fires
    let sample = TelemetrySample::new(6.0, 55.0, 0.3);
    let detection = detector.detect(&sample).await.expect("detection");
    assert!(detection.is_anomalous);
    assert!(detection.score >= 0.9);

    let decision = handler
        .handle(&detection.label, detection.score, detection.score, None)
        .expect("decision");
    assert_eq!(decision.severity, Severity::Critical);
    assert!(decision.should_escalate_to_safe_mode);
    assert!(!decision.reasoning.is_empty());
    assert_eq!(state.current_phase(), MissionPhase::SafeMode);
}

// ─── Scenario 4: Recurrence escalation within the window ─────────────────────

#[test]
fn test_recurrence_escalation_on_third_occurrence() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (state, handler) = handler_in_phase(dir.path(), MissionPhase::NominalOps);

    let d1 = handler.handle("thermal_fault", 0.7, 0.9, None).expect("d1");
    let d2 = handler.handle("thermal_fault", 0.7, 0.9, None).expect("d2");
    assert_eq!(d1.escalation_level, EscalationLevel::Warn);
    assert_eq!(d2.escalation_level, EscalationLevel::Warn);
    assert_eq!(state.current_phase(), MissionPhase::NominalOps);

    let d3 = handler.handle("thermal_fault", 0.7, 0.9, None).expect("d3");
    assert_eq!(d3.escalation_level, EscalationLevel::EscalateSafeMode);
    assert_eq!(d3.recurrence_info.total_in_window, 3);
    assert_eq!(state.current_phase(), MissionPhase::SafeMode);
}

// ─── Scenario 5: Loader failure burst opens the breaker ──────────────────────

#[tokio::test]
async fn test_loader_failures_open_breaker_then_short_circuit() {
    let monitor = Arc::new(HealthMonitor::new());
    let detector = Detector::new(
        fast_detector_config(Some(PathBuf::from("/nonexistent/model.json"))),
        monitor,
    );

    for _ in 0..5 {
        assert!(!detector.load_model().await);
    }
    assert_eq!(
        detector.loader_breaker_state(),
        astra_reliability::CircuitState::Open
    );

    // Open breaker: the loader no longer touches the model file, and
    // detection still answers from the heuristic path.
    let errors_before = detector.metrics.model_load_errors.get();
    let detection = detector
        .detect(&TelemetrySample::new(8.0, 25.0, 0.02))
        .await
        .expect("detection");
    assert_eq!(detection.detector, DetectorKind::Heuristic);
    assert_eq!(detector.metrics.model_load_errors.get(), errors_before);
}

// ─── Scenario 6: Bounded history eviction under sustained load ───────────────

#[test]
fn test_history_eviction_keeps_most_recent() {
    let dir = tempfile::tempdir().expect("tempdir");
    // Small feedback journal churn would dominate here; use a dedicated
    // handler with a 1000-entry ring to keep the test quick.
    let (_state, handler) = handler_with_limits(
        dir.path(),
        MissionPhase::NominalOps,
        1_000,
        Duration::from_secs(3600),
    );

    for _ in 0..1_050 {
        handler
            .handle("sensor_noise", 0.1, 0.9, None)
            .expect("decision");
    }

    assert_eq!(handler.history().len(), 1_000);

    let all = handler
        .query_history(&HistoryQuery::default())
        .expect("query");
    assert_eq!(all.len(), 1_000);
    // Newest first: the most recent decision is the 1050th submitted,
    // the oldest retained is the 51st.
    assert_eq!(all[0].recurrence_info.count, 1_050);
    assert_eq!(all.last().unwrap().recurrence_info.count, 51);
}

// ─── Pipeline + collectors together ──────────────────────────────────────────

#[tokio::test]
async fn test_pipeline_feeds_hil_collectors() {
    use astra_metrics::{AccuracyCollector, LatencyCollector};

    let dir = tempfile::tempdir().expect("tempdir");
    let monitor = Arc::new(HealthMonitor::new());
    let detector = Detector::new(fast_detector_config(None), monitor);
    let (_state, handler) = handler_in_phase(dir.path(), MissionPhase::NominalOps);

    let mut latency = LatencyCollector::new();
    let mut accuracy = AccuracyCollector::new();
    accuracy
        .record_ground_truth("SAT1", 0.0, Some("thermal_fault"), 1.0)
        .expect("truth");

    let sample = TelemetrySample::new(8.0, 45.0, 0.02);
    let started = std::time::Instant::now();
    let detection = detector.detect(&sample).await.expect("detection");
    let decision = handler
        .handle(&detection.label, detection.score, detection.score, None)
        .expect("decision");
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

    latency
        .record_fault_detection("SAT1", 10.0, elapsed_ms)
        .expect("latency");

    let truth = accuracy.find_ground_truth("SAT1", 10.0);
    let correct = truth.as_deref() == Some(detection.label.as_str());
    accuracy
        .record_classification(
            "SAT1",
            10.0,
            Some(&detection.label),
            decision.detection_confidence,
            correct,
        )
        .expect("classification");

    assert_eq!(latency.len(), 1);
    let stats = accuracy.accuracy_stats();
    assert_eq!(stats.total_classifications, 1);
    assert_eq!(stats.correct_classifications, 1, "thermal label matches truth");
}
