//! Anomaly detection engine for AstraGuard.
//!
//! Two classification paths: a native model loaded from a versioned,
//! checksummed file, and a rule-based heuristic that needs nothing but the
//! sample itself. Model loading runs behind the reliability fabric
//! (circuit breaker observing whole retry bursts, timeout innermost) so a
//! broken model file can never stall or crash the decision pipeline; a
//! model failure at classification time latches heuristic mode until an
//! operator resets it.

#![forbid(unsafe_code)]

pub mod heuristic;
pub mod model;

pub use heuristic::{classify_label, evaluate_rules, heuristic_detection};
pub use model::{AnomalyModel, ModelFile, NativeModel, MODEL_FORMAT};

use astra_health::HealthMonitor;
use astra_health::ResourceMonitor;
use astra_proto::{ResourceLevel, TelemetrySample, ValidationError};
use astra_reliability::{
    with_timeout, CircuitBreaker, CircuitBreakerConfig, CircuitError, RetryPolicy, TimeoutError,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

/// Component name in the health registry.
pub const COMPONENT: &str = "anomaly_detector";

// ─── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("invalid telemetry: {0}")]
    Validation(#[from] ValidationError),
    #[error("model load failed: {0}")]
    ModelLoad(String),
    #[error("model io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Timeout(#[from] TimeoutError),
    #[error("model inference failed: {0}")]
    Inference(String),
}

impl DetectError {
    /// Transient errors worth retrying during model load.
    fn is_transient(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Timeout(_))
    }
}

// ─── Config ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Path to the native model file. `None` means permanent heuristic mode.
    pub model_path: Option<PathBuf>,
    pub model_load_timeout: Duration,
    pub inference_timeout: Duration,
    pub retry: RetryPolicy,
    pub breaker: CircuitBreakerConfig,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            model_load_timeout: Duration::from_secs(10),
            inference_timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
            breaker: CircuitBreakerConfig::default(),
        }
    }
}

// ─── Metrics ─────────────────────────────────────────────────────────────────

/// A thread-safe u64 counter backed by an atomic.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Atomic counters for the detection pipeline.
#[derive(Debug, Default)]
pub struct DetectorMetrics {
    /// Detections served by the model path.
    pub model_detections: Counter,
    /// Detections served by the heuristic path.
    pub heuristic_detections: Counter,
    /// Model load failures (transient and permanent).
    pub model_load_errors: Counter,
    /// Times the heuristic fallback was activated by a failure.
    pub fallback_activations: Counter,
    model_latency_us: Counter,
    heuristic_latency_us: Counter,
}

impl DetectorMetrics {
    fn observe_latency(&self, kind: DetectorKind, elapsed: Duration) {
        let us = elapsed.as_micros() as u64;
        match kind {
            DetectorKind::Model => self.model_latency_us.add(us),
            DetectorKind::Heuristic => self.heuristic_latency_us.add(us),
        }
    }

    /// Mean detection latency in milliseconds per path.
    pub fn mean_latency_ms(&self, kind: DetectorKind) -> Option<f64> {
        let (total_us, count) = match kind {
            DetectorKind::Model => (self.model_latency_us.get(), self.model_detections.get()),
            DetectorKind::Heuristic => (
                self.heuristic_latency_us.get(),
                self.heuristic_detections.get(),
            ),
        };
        if count == 0 {
            return None;
        }
        Some(total_us as f64 / count as f64 / 1000.0)
    }
}

// ─── Detection result ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorKind {
    Model,
    Heuristic,
}

impl std::fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Model => write!(f, "model"),
            Self::Heuristic => write!(f, "heuristic"),
        }
    }
}

/// Detector output for one validated sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub is_anomalous: bool,
    /// Normalized anomaly score in [0,1].
    pub score: f64,
    /// Coarse fault label (`thermal_fault`, `power_fault`, ...).
    pub label: String,
    pub detector: DetectorKind,
}

// ─── Detector ────────────────────────────────────────────────────────────────

/// The detection engine. One instance per service, created at init and
/// shared by reference.
pub struct Detector {
    config: DetectorConfig,
    model: RwLock<Option<Arc<dyn AnomalyModel>>>,
    /// Latched after a model failure at classification time; only
    /// [`Detector::reset_model_path`] clears it.
    heuristic_latched: AtomicBool,
    model_loaded: AtomicBool,
    loader_breaker: CircuitBreaker,
    pub metrics: DetectorMetrics,
    health: Arc<HealthMonitor>,
    resources: Option<Arc<ResourceMonitor>>,
}

impl Detector {
    pub fn new(config: DetectorConfig, health: Arc<HealthMonitor>) -> Self {
        health.register(COMPONENT);
        let breaker = CircuitBreaker::new("anomaly_model_loader", config.breaker.clone());
        Self {
            config,
            model: RwLock::new(None),
            heuristic_latched: AtomicBool::new(false),
            model_loaded: AtomicBool::new(false),
            loader_breaker: breaker,
            metrics: DetectorMetrics::default(),
            health,
            resources: None,
        }
    }

    pub fn with_resource_monitor(mut self, resources: Arc<ResourceMonitor>) -> Self {
        self.resources = Some(resources);
        self
    }

    /// Inject an already-built model (used by tests and embedded callers).
    pub fn with_model(self, model: Arc<dyn AnomalyModel>) -> Self {
        *self.model.write() = Some(model);
        self.model_loaded.store(true, Ordering::SeqCst);
        self
    }

    /// Whether the heuristic path is currently serving classifications.
    pub fn heuristic_mode(&self) -> bool {
        self.heuristic_latched.load(Ordering::SeqCst)
            || !self.model_loaded.load(Ordering::SeqCst)
    }

    pub fn loader_breaker_state(&self) -> astra_reliability::CircuitState {
        self.loader_breaker.state()
    }

    /// Re-enable the model path after a latch: clears the latch, drops the
    /// loaded model, and resets the loader breaker so the next detection
    /// reloads from disk.
    pub fn reset_model_path(&self) {
        self.heuristic_latched.store(false, Ordering::SeqCst);
        self.model_loaded.store(false, Ordering::SeqCst);
        *self.model.write() = None;
        self.loader_breaker.reset();
        info!(component = COMPONENT, "model path reset by operator");
    }

    // ─── Model loading ───────────────────────────────────────────────────────

    async fn load_impl(&self, path: &Path) -> Result<NativeModel, DetectError> {
        with_timeout("model_load", self.config.model_load_timeout, async {
            if !path.exists() {
                return Err(DetectError::ModelLoad(format!(
                    "model file not found at {}",
                    path.display()
                )));
            }
            let content = tokio::fs::read_to_string(path).await?;
            let file: ModelFile = serde_json::from_str(&content)
                .map_err(|e| DetectError::ModelLoad(format!("unparseable model file: {e}")))?;
            file.into_model()
        })
        .await?
    }

    /// Attempt to load the model through the guarded path:
    /// breaker(retry(timeout(read + validate))). The breaker sees the final
    /// outcome of each retry burst; while OPEN the loader short-circuits to
    /// heuristic mode without touching the filesystem.
    ///
    /// Returns `true` when the model path is active afterwards.
    pub async fn load_model(&self) -> bool {
        let Some(path) = self.config.model_path.clone() else {
            self.health.mark_degraded(
                COMPONENT,
                "no model configured, heuristic mode active",
                true,
                Some(meta("mode", "heuristic")),
            );
            return false;
        };

        let outcome = self
            .loader_breaker
            .call(
                || async {
                    self.config
                        .retry
                        .run("model_load", || self.load_impl(&path), DetectError::is_transient)
                        .await
                },
                |_| true,
            )
            .await;

        match outcome {
            Ok(native) => {
                *self.model.write() = Some(Arc::new(native));
                self.model_loaded.store(true, Ordering::SeqCst);
                self.health
                    .mark_healthy(COMPONENT, Some(meta("mode", "model-based")));
                info!(component = COMPONENT, path = %path.display(), "model loaded");
                true
            }
            Err(CircuitError::Open { name }) => {
                warn!(breaker = %name, "model loader open, staying in heuristic mode");
                self.metrics.fallback_activations.inc();
                self.health.mark_degraded(
                    COMPONENT,
                    "model loader circuit open, heuristic mode active",
                    true,
                    Some(meta("mode", "heuristic")),
                );
                false
            }
            Err(CircuitError::Inner(e)) => {
                warn!(component = COMPONENT, error = %e, "model load failed");
                self.metrics.model_load_errors.inc();
                self.health.mark_degraded(
                    COMPONENT,
                    &format!("model load failed: {e}"),
                    true,
                    Some(meta("mode", "heuristic")),
                );
                false
            }
        }
    }

    // ─── Classification ──────────────────────────────────────────────────────

    /// Classify one sample.
    ///
    /// Rejects only samples that fail validation. After validation every
    /// internal failure degrades to the heuristic path, so the caller always
    /// receives a [`Detection`].
    pub async fn detect(&self, sample: &TelemetrySample) -> Result<Detection, DetectError> {
        sample.validate()?;

        // Advisory resource gate: log and proceed
        if let Some(resources) = &self.resources
            && resources.latest().overall == ResourceLevel::Critical
        {
            warn!(component = COMPONENT, "resources critical, proceeding with detection");
        }

        // Lazily (re)load until the model path is up; the breaker keeps this
        // cheap when the loader is persistently failing.
        if !self.model_loaded.load(Ordering::SeqCst)
            && !self.heuristic_latched.load(Ordering::SeqCst)
            && self.config.model_path.is_some()
        {
            self.load_model().await;
        }

        let started = Instant::now();

        if !self.heuristic_mode() {
            let model = self.model.read().clone();
            if let Some(model) = model {
                match self.model_detect(&*model, sample).await {
                    Ok(detection) => {
                        self.health.mark_healthy(COMPONENT, None);
                        self.metrics.model_detections.inc();
                        self.metrics
                            .observe_latency(DetectorKind::Model, started.elapsed());
                        return Ok(detection);
                    }
                    Err(e) => {
                        warn!(
                            component = COMPONENT,
                            error = %e,
                            "model classification failed, latching heuristic mode"
                        );
                        self.heuristic_latched.store(true, Ordering::SeqCst);
                        self.metrics.fallback_activations.inc();
                        self.health.mark_degraded(
                            COMPONENT,
                            &format!("model classification failed: {e}"),
                            true,
                            Some(meta("mode", "heuristic")),
                        );
                    }
                }
            }
        }

        // Heuristic path
        let (is_anomalous, score) = heuristic_detection(sample);
        let label = classify_label(sample, is_anomalous);

        if self.heuristic_mode() {
            self.health.mark_degraded(
                COMPONENT,
                "heuristic detection active",
                true,
                Some(meta("mode", "heuristic")),
            );
        }

        self.metrics.heuristic_detections.inc();
        self.metrics
            .observe_latency(DetectorKind::Heuristic, started.elapsed());

        Ok(Detection {
            is_anomalous,
            score,
            label,
            detector: DetectorKind::Heuristic,
        })
    }

    async fn model_detect(
        &self,
        model: &dyn AnomalyModel,
        sample: &TelemetrySample,
    ) -> Result<Detection, DetectError> {
        let features = sample.features();

        let is_anomalous = with_timeout(
            "model_predict",
            self.config.inference_timeout,
            model.predict(&features),
        )
        .await??;

        let score = with_timeout(
            "model_score",
            self.config.inference_timeout,
            model.score_samples(&features),
        )
        .await??
        .unwrap_or(0.5)
        .clamp(0.0, 1.0);

        let label = classify_label(sample, is_anomalous);
        Ok(Detection {
            is_anomalous,
            score,
            label,
            detector: DetectorKind::Model,
        })
    }
}

fn meta(key: &str, value: &str) -> std::collections::HashMap<String, serde_json::Value> {
    let mut map = std::collections::HashMap::new();
    map.insert(key.to_string(), serde_json::json!(value));
    map
}
