//! Service configuration for AstraGuard.
//!
//! [`ServiceConfig`] carries the tunables for one service instance: paths,
//! capacities, and timeout overrides. Values come from defaults, then an
//! optional JSON file, then `ASTRA_*` environment variables (highest
//! precedence). Policy files load separately through [`PolicyFileLoader`].

#![forbid(unsafe_code)]

use astra_policy::{PhasePolicy, PolicyError, PolicySet};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config: {0}")]
    Invalid(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Policy(#[from] PolicyError),
}

/// Configuration for one AstraGuard service instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Persistent state directory (journals, run results).
    pub state_path: PathBuf,

    /// Native model file. `None` runs the detector in heuristic mode.
    pub model_path: Option<PathBuf>,

    /// Policy file overriding the built-in phase policies.
    pub policy_path: Option<PathBuf>,

    /// Root directory for HIL run results.
    pub results_dir: PathBuf,

    /// Feedback journal location.
    pub feedback_path: PathBuf,

    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    #[serde(default = "default_recurrence_window")]
    pub recurrence_window_secs: u64,

    #[serde(default = "default_model_load_timeout")]
    pub model_load_timeout_secs: u64,

    #[serde(default = "default_inference_timeout")]
    pub inference_timeout_secs: u64,

    /// Arbitrary key-value labels for this instance.
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

fn default_history_capacity() -> usize {
    10_000
}

fn default_recurrence_window() -> u64 {
    3_600
}

fn default_model_load_timeout() -> u64 {
    10
}

fn default_inference_timeout() -> u64 {
    10
}

impl Default for ServiceConfig {
    fn default() -> Self {
        let state_path = PathBuf::from("/var/lib/astraguard");
        Self {
            model_path: None,
            policy_path: None,
            results_dir: state_path.join("results"),
            feedback_path: state_path.join("feedback_pending.json"),
            state_path,
            history_capacity: default_history_capacity(),
            recurrence_window_secs: default_recurrence_window(),
            model_load_timeout_secs: default_model_load_timeout(),
            inference_timeout_secs: default_inference_timeout(),
            labels: HashMap::new(),
        }
    }
}

impl ServiceConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Invalid(format!("read {}: {e}", path.display())))?;
        let mut config: Self = serde_json::from_str(&data)
            .map_err(|e| ConfigError::Invalid(format!("parse {}: {e}", path.display())))?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        std::fs::write(path, data)?;
        Ok(())
    }

    /// `ASTRA_*` environment variables win over the file.
    pub fn apply_env_overrides(&mut self) {
        if let Some(value) = env_u64("ASTRA_MODEL_LOAD_TIMEOUT_SECS") {
            self.model_load_timeout_secs = value;
        }
        if let Some(value) = env_u64("ASTRA_INFERENCE_TIMEOUT_SECS") {
            self.inference_timeout_secs = value;
        }
        if let Some(value) = env_u64("ASTRA_RECURRENCE_WINDOW_SECS") {
            self.recurrence_window_secs = value;
        }
        if let Some(value) = env_u64("ASTRA_HISTORY_CAPACITY") {
            self.history_capacity = value as usize;
        }
        if let Ok(path) = std::env::var("ASTRA_MODEL_PATH")
            && !path.trim().is_empty()
        {
            self.model_path = Some(PathBuf::from(path));
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.history_capacity == 0 {
            return Err(ConfigError::Invalid(
                "history_capacity must be > 0".to_string(),
            ));
        }
        if self.recurrence_window_secs == 0 {
            return Err(ConfigError::Invalid(
                "recurrence_window_secs must be > 0".to_string(),
            ));
        }
        if self.model_load_timeout_secs == 0 || self.inference_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "timeouts must be > 0 seconds".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_u64(name: &str) -> Option<u64> {
    let raw = std::env::var(name).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(var = name, value = %raw, "ignoring unparseable environment override");
            None
        }
    }
}

// ─── Policy file loading ─────────────────────────────────────────────────────

/// Loads phase policies from a JSON file keyed by phase name.
///
/// Phase names resolve to [`astra_policy::PolicySet`] variants at load time;
/// unknown names fail the load. The built-in defaults are used when no file
/// is configured.
pub struct PolicyFileLoader;

impl PolicyFileLoader {
    /// Load and validate a policy set from `path`, or the built-in defaults
    /// when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<PolicySet, ConfigError> {
        let Some(path) = path else {
            info!("no policy file configured, using built-in defaults");
            return Ok(PolicySet::builtin_default());
        };

        let data = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Invalid(format!("read {}: {e}", path.display())))?;
        let named: HashMap<String, PhasePolicy> = serde_json::from_str(&data)
            .map_err(|e| ConfigError::Invalid(format!("parse {}: {e}", path.display())))?;

        let set = PolicySet::from_named(named)?;
        set.validate()?;
        info!(path = %path.display(), "policy file loaded");
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");

        let config = ServiceConfig::default();
        config.save(&path).expect("save");

        let loaded = ServiceConfig::load(&path).expect("load");
        assert_eq!(loaded.history_capacity, 10_000);
        assert_eq!(loaded.recurrence_window_secs, 3_600);
        assert!(loaded.model_path.is_none());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "state_path": "/tmp/astra",
                "model_path": null,
                "policy_path": null,
                "results_dir": "/tmp/astra/results",
                "feedback_path": "/tmp/astra/feedback.json"
            }"#,
        )
        .expect("write");

        let loaded = ServiceConfig::load(&path).expect("load");
        assert_eq!(loaded.model_load_timeout_secs, 10);
        assert_eq!(loaded.history_capacity, 10_000);
    }

    #[test]
    fn test_validation_rejects_zero_capacity() {
        let mut config = ServiceConfig::default();
        config.history_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = ServiceConfig::default();
        config.model_load_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unparseable_file_errors() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        std::fs::write(&path, "not json at all").expect("write");
        assert!(ServiceConfig::load(&path).is_err());
    }

    #[test]
    fn test_policy_loader_defaults() {
        let set = PolicyFileLoader::load(None).expect("defaults");
        assert!(set.get(astra_policy::Phase::NominalOps).is_some());
    }

    #[test]
    fn test_policy_loader_valid_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("policies.json");
        std::fs::write(
            &path,
            r#"{
                "NOMINAL_OPS": {
                    "allowed_actions": ["NO_ACTION", "LOG_ONLY"],
                    "forbidden_actions": [],
                    "threshold_multiplier": 1.0,
                    "escalation_rules": {
                        "recurrence_threshold": 3,
                        "critical_always_escalates": true
                    },
                    "rules": []
                }
            }"#,
        )
        .expect("write");

        let set = PolicyFileLoader::load(Some(&path)).expect("load");
        assert!(set.get(astra_policy::Phase::NominalOps).is_some());
    }

    #[test]
    fn test_policy_loader_unknown_phase_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("policies.json");
        std::fs::write(
            &path,
            r#"{
                "ORBIT_RAISING": {
                    "allowed_actions": [],
                    "forbidden_actions": [],
                    "threshold_multiplier": 1.0,
                    "escalation_rules": {
                        "recurrence_threshold": 3,
                        "critical_always_escalates": true
                    },
                    "rules": []
                }
            }"#,
        )
        .expect("write");

        assert!(PolicyFileLoader::load(Some(&path)).is_err());
    }

    #[test]
    fn test_policy_loader_invalid_multiplier_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("policies.json");
        std::fs::write(
            &path,
            r#"{
                "NOMINAL_OPS": {
                    "allowed_actions": [],
                    "forbidden_actions": [],
                    "threshold_multiplier": -2.0,
                    "escalation_rules": {
                        "recurrence_threshold": 3,
                        "critical_always_escalates": true
                    },
                    "rules": []
                }
            }"#,
        )
        .expect("write");

        assert!(PolicyFileLoader::load(Some(&path)).is_err());
    }
}
