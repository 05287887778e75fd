//! Service wiring.
//!
//! [`Service`] owns every pipeline component for one instance and is built
//! explicitly at startup. There are no module-level singletons: commands
//! receive the service by reference and components find each other through
//! it.

use astra_agent::{HandlerConfig, PhaseAwareHandler};
use astra_config::{PolicyFileLoader, ServiceConfig};
use astra_detect::{Detection, Detector, DetectorConfig};
use astra_health::{HealthMonitor, HealthStatus, ResourceMonitor};
use astra_policy::PolicyEngine;
use astra_proto::{AnomalyDecision, TelemetrySample, MAX_BATCH_SIZE};
use astra_state::{MissionStateMachine, PhaseDescription};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Detect(#[from] astra_detect::DetectError),
    #[error(transparent)]
    Handler(#[from] astra_agent::HandlerError),
    #[error("batch of {0} samples exceeds the {MAX_BATCH_SIZE}-sample cap")]
    BatchTooLarge(usize),
}

/// Everything the pipeline produced for one sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleOutcome {
    pub sample_timestamp: DateTime<Utc>,
    pub detection: Detection,
    pub decision: AnomalyDecision,
}

/// Batch processing summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub total_processed: usize,
    pub anomalies_detected: usize,
    pub results: Vec<SampleOutcome>,
}

/// Status surface for `astrad status` and liveness checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub overall: HealthStatus,
    pub components: HashMap<String, astra_health::ComponentHealth>,
    pub phase: PhaseDescription,
    pub uptime_secs: u64,
    pub memory: astra_agent::MemoryStats,
}

pub struct Service {
    pub config: ServiceConfig,
    pub health: Arc<HealthMonitor>,
    pub resources: Arc<ResourceMonitor>,
    pub state_machine: Arc<MissionStateMachine>,
    pub policy_engine: Arc<PolicyEngine>,
    pub detector: Detector,
    pub handler: PhaseAwareHandler,
    latest: Mutex<Option<SampleOutcome>>,
    started: Instant,
}

impl Service {
    /// Build the full pipeline from configuration. Policy files are loaded
    /// and validated here; a bad policy file fails startup rather than
    /// silently falling back.
    pub fn init(config: ServiceConfig) -> anyhow::Result<Self> {
        let health = Arc::new(HealthMonitor::new());
        let resources = Arc::new(ResourceMonitor::default());
        let state_machine = Arc::new(MissionStateMachine::new());

        let policy_set = PolicyFileLoader::load(config.policy_path.as_deref())?;
        let policy_engine = Arc::new(PolicyEngine::new(policy_set)?);

        let detector = Detector::new(
            DetectorConfig {
                model_path: config.model_path.clone(),
                model_load_timeout: Duration::from_secs(config.model_load_timeout_secs),
                inference_timeout: Duration::from_secs(config.inference_timeout_secs),
                ..DetectorConfig::default()
            },
            health.clone(),
        )
        .with_resource_monitor(resources.clone());

        let handler = PhaseAwareHandler::new(
            HandlerConfig {
                recurrence_window: Duration::from_secs(config.recurrence_window_secs),
                history_capacity: config.history_capacity,
                feedback_path: config.feedback_path.clone(),
            },
            state_machine.clone(),
            policy_engine.clone(),
        );

        info!(
            state_path = %config.state_path.display(),
            model = config.model_path.is_some(),
            "service initialized"
        );

        Ok(Self {
            config,
            health,
            resources,
            state_machine,
            policy_engine,
            detector,
            handler,
            latest: Mutex::new(None),
            started: Instant::now(),
        })
    }

    /// Run one sample through the full pipeline:
    /// validate → detect → classify → policy → decision.
    pub async fn process_sample(
        &self,
        sample: TelemetrySample,
    ) -> Result<SampleOutcome, ServiceError> {
        let detection = self.detector.detect(&sample).await?;

        // Confidence reflects how far the score sits from the decision
        // boundary, on whichever side it landed.
        let confidence = if detection.is_anomalous {
            detection.score
        } else {
            1.0 - detection.score
        }
        .clamp(0.0, 1.0);

        // Quiet telemetry is acknowledged without entering recurrence
        // tracking or the history ring; only anomalies go through the full
        // phase-aware path.
        let decision = if detection.is_anomalous {
            let mut metadata = HashMap::new();
            metadata.insert("voltage".to_string(), serde_json::json!(sample.voltage));
            metadata.insert(
                "temperature".to_string(),
                serde_json::json!(sample.temperature),
            );
            metadata.insert("gyro".to_string(), serde_json::json!(sample.gyro));
            metadata.insert(
                "detector".to_string(),
                serde_json::json!(detection.detector.to_string()),
            );
            self.handler.handle(
                &detection.label,
                detection.score,
                confidence,
                Some(metadata),
            )?
        } else {
            self.handler.acknowledge_nominal(detection.score, confidence)?
        };

        let outcome = SampleOutcome {
            sample_timestamp: sample.effective_timestamp(),
            detection,
            decision,
        };
        *self.latest.lock() = Some(outcome.clone());
        Ok(outcome)
    }

    /// Process up to [`MAX_BATCH_SIZE`] samples in submission order.
    pub async fn process_batch(
        &self,
        samples: Vec<TelemetrySample>,
    ) -> Result<BatchOutcome, ServiceError> {
        if samples.len() > MAX_BATCH_SIZE {
            return Err(ServiceError::BatchTooLarge(samples.len()));
        }

        let mut results = Vec::with_capacity(samples.len());
        let mut anomalies = 0;
        for sample in samples {
            let outcome = self.process_sample(sample).await?;
            if outcome.detection.is_anomalous {
                anomalies += 1;
            }
            results.push(outcome);
        }

        Ok(BatchOutcome {
            total_processed: results.len(),
            anomalies_detected: anomalies,
            results,
        })
    }

    /// The last processed sample and its decision.
    pub fn latest(&self) -> Option<SampleOutcome> {
        self.latest.lock().clone()
    }

    pub fn status(&self) -> ServiceStatus {
        ServiceStatus {
            overall: self.health.overall(),
            components: self.health.get_all(),
            phase: self.state_machine.describe(),
            uptime_secs: self.started.elapsed().as_secs(),
            memory: self.handler.memory_stats(),
        }
    }
}
