//! Classifier capability and the on-disk model format.
//!
//! The native model is a logistic scorer over the five-channel feature
//! vector, stored as versioned JSON with a sha256 payload checksum. The
//! format tag and checksum are validated before the model is trusted.

use crate::DetectError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Format tag expected in every model file.
pub const MODEL_FORMAT: &str = "astra-linear-v1";

/// A loaded classifier. `predict` is required; scoring is optional and the
/// detector defaults the score to 0.5 when a model cannot provide one.
#[async_trait]
pub trait AnomalyModel: Send + Sync {
    fn name(&self) -> &str;

    async fn predict(&self, features: &[f64; 5]) -> Result<bool, DetectError>;

    /// Raw anomaly score in [0,1], if the model supports scoring.
    async fn score_samples(&self, features: &[f64; 5]) -> Result<Option<f64>, DetectError>;
}

/// On-disk shape of a native model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelFile {
    pub format: String,
    pub weights: [f64; 5],
    pub bias: f64,
    /// Scores above this are anomalous.
    pub threshold: f64,
    /// sha256 hex over the canonical payload (format, weights, bias,
    /// threshold).
    pub checksum: String,
}

impl ModelFile {
    /// Canonical checksum for a payload. Exposed so tooling can author
    /// valid model files.
    pub fn checksum_for(format: &str, weights: &[f64; 5], bias: f64, threshold: f64) -> String {
        let canonical = serde_json::json!({
            "format": format,
            "weights": weights,
            "bias": bias,
            "threshold": threshold,
        })
        .to_string();
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn new(weights: [f64; 5], bias: f64, threshold: f64) -> Self {
        let checksum = Self::checksum_for(MODEL_FORMAT, &weights, bias, threshold);
        Self {
            format: MODEL_FORMAT.to_string(),
            weights,
            bias,
            threshold,
            checksum,
        }
    }

    /// Validate the format tag and checksum, producing the runtime model.
    pub fn into_model(self) -> Result<NativeModel, DetectError> {
        if self.format != MODEL_FORMAT {
            return Err(DetectError::ModelLoad(format!(
                "unsupported model format '{}', expected '{MODEL_FORMAT}'",
                self.format
            )));
        }
        let expected =
            Self::checksum_for(&self.format, &self.weights, self.bias, self.threshold);
        if expected != self.checksum {
            return Err(DetectError::ModelLoad(
                "model checksum mismatch, file is corrupt or tampered".to_string(),
            ));
        }
        if !self.threshold.is_finite() || !(0.0..=1.0).contains(&self.threshold) {
            return Err(DetectError::ModelLoad(format!(
                "model threshold {} outside [0,1]",
                self.threshold
            )));
        }
        Ok(NativeModel {
            weights: self.weights,
            bias: self.bias,
            threshold: self.threshold,
        })
    }
}

/// Logistic scorer over the feature vector.
#[derive(Debug, Clone)]
pub struct NativeModel {
    weights: [f64; 5],
    bias: f64,
    threshold: f64,
}

impl NativeModel {
    fn score(&self, features: &[f64; 5]) -> f64 {
        let raw: f64 = self
            .weights
            .iter()
            .zip(features)
            .map(|(w, x)| w * x)
            .sum::<f64>()
            + self.bias;
        1.0 / (1.0 + (-raw).exp())
    }
}

#[async_trait]
impl AnomalyModel for NativeModel {
    fn name(&self) -> &str {
        MODEL_FORMAT
    }

    async fn predict(&self, features: &[f64; 5]) -> Result<bool, DetectError> {
        let score = self.score(features);
        if !score.is_finite() {
            return Err(DetectError::Inference(
                "model produced a non-finite score".to_string(),
            ));
        }
        Ok(score > self.threshold)
    }

    async fn score_samples(&self, features: &[f64; 5]) -> Result<Option<f64>, DetectError> {
        let score = self.score(features);
        if !score.is_finite() {
            return Err(DetectError::Inference(
                "model produced a non-finite score".to_string(),
            ));
        }
        Ok(Some(score.clamp(0.0, 1.0)))
    }
}
