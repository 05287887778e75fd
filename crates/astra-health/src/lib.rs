//! Component health registry and resource monitoring for AstraGuard.
//!
//! Every pipeline component registers here and reports HEALTHY / DEGRADED /
//! FAILED on each call. The registry is the source of truth for the status
//! surface and the `astrad status` exit code.

#![forbid(unsafe_code)]

use astra_proto::{ResourceLevel, ResourceStatus};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, error, info, warn};

// ─── Component health ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Failed,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Healthy => "HEALTHY",
            Self::Degraded => "DEGRADED",
            Self::Failed => "FAILED",
        };
        write!(f, "{s}")
    }
}

/// Health record for one registered component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    pub fallback_active: bool,
    pub last_error: Option<String>,
    pub error_count: u64,
    pub metadata: HashMap<String, serde_json::Value>,
    pub updated_at: DateTime<Utc>,
}

impl ComponentHealth {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: HealthStatus::Healthy,
            fallback_active: false,
            last_error: None,
            error_count: 0,
            metadata: HashMap::new(),
            updated_at: Utc::now(),
        }
    }
}

/// Process-wide health registry. One instance is created at service init and
/// shared by reference; there are no hidden globals.
pub struct HealthMonitor {
    components: RwLock<HashMap<String, ComponentHealth>>,
}

impl HealthMonitor {
    pub fn new() -> Self {
        Self {
            components: RwLock::new(HashMap::new()),
        }
    }

    /// Register a component. Idempotent: re-registering keeps existing state.
    pub fn register(&self, name: &str) {
        let mut components = self.components.write();
        if !components.contains_key(name) {
            debug!(component = name, "registered");
            components.insert(name.to_string(), ComponentHealth::new(name));
        }
    }

    pub fn mark_healthy(&self, name: &str, metadata: Option<HashMap<String, serde_json::Value>>) {
        let mut components = self.components.write();
        let entry = components
            .entry(name.to_string())
            .or_insert_with(|| ComponentHealth::new(name));
        if entry.status != HealthStatus::Healthy {
            info!(component = name, previous = %entry.status, "component healthy");
        }
        entry.status = HealthStatus::Healthy;
        entry.fallback_active = false;
        entry.last_error = None;
        if let Some(meta) = metadata {
            entry.metadata = meta;
        }
        entry.updated_at = Utc::now();
    }

    pub fn mark_degraded(
        &self,
        name: &str,
        error_msg: &str,
        fallback_active: bool,
        metadata: Option<HashMap<String, serde_json::Value>>,
    ) {
        let mut components = self.components.write();
        let entry = components
            .entry(name.to_string())
            .or_insert_with(|| ComponentHealth::new(name));
        if entry.status != HealthStatus::Degraded {
            warn!(component = name, error = error_msg, fallback_active, "component degraded");
        }
        entry.status = HealthStatus::Degraded;
        entry.fallback_active = fallback_active;
        entry.last_error = Some(error_msg.to_string());
        entry.error_count += 1;
        if let Some(meta) = metadata {
            entry.metadata.extend(meta);
        }
        entry.updated_at = Utc::now();
    }

    /// FAILED is sticky: only an explicit [`HealthMonitor::mark_healthy`]
    /// recovers the component.
    pub fn mark_failed(&self, name: &str, error_msg: &str) {
        let mut components = self.components.write();
        let entry = components
            .entry(name.to_string())
            .or_insert_with(|| ComponentHealth::new(name));
        if entry.status != HealthStatus::Failed {
            error!(component = name, error = error_msg, "component failed");
        }
        entry.status = HealthStatus::Failed;
        entry.last_error = Some(error_msg.to_string());
        entry.error_count += 1;
        entry.updated_at = Utc::now();
    }

    pub fn get(&self, name: &str) -> Option<ComponentHealth> {
        self.components.read().get(name).cloned()
    }

    pub fn get_all(&self) -> HashMap<String, ComponentHealth> {
        self.components.read().clone()
    }

    /// Worst status across all components, or HEALTHY when nothing is
    /// registered yet.
    pub fn overall(&self) -> HealthStatus {
        let components = self.components.read();
        let mut overall = HealthStatus::Healthy;
        for component in components.values() {
            match component.status {
                HealthStatus::Failed => return HealthStatus::Failed,
                HealthStatus::Degraded => overall = HealthStatus::Degraded,
                HealthStatus::Healthy => {}
            }
        }
        overall
    }
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// Map the overall status to the `astrad status` process exit code:
/// 0 healthy, 1 any FAILED, 2 any DEGRADED. (3 is reserved for a missing
/// dependency and decided by the caller.)
pub fn status_exit_code(status: HealthStatus) -> i32 {
    match status {
        HealthStatus::Healthy => 0,
        HealthStatus::Failed => 1,
        HealthStatus::Degraded => 2,
    }
}

// ─── Resource monitor ────────────────────────────────────────────────────────

/// Thresholds over cpu/mem/disk percentages for the advisory resource level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceThresholds {
    pub elevated_pct: f64,
    pub critical_pct: f64,
}

impl Default for ResourceThresholds {
    fn default() -> Self {
        Self {
            elevated_pct: 80.0,
            critical_pct: 95.0,
        }
    }
}

/// Samples cpu/mem/disk and publishes a read-mostly [`ResourceStatus`].
///
/// The detector reads the latest snapshot opportunistically; resource gating
/// is advisory and never blocks the decision path.
pub struct ResourceMonitor {
    thresholds: ResourceThresholds,
    latest: RwLock<ResourceStatus>,
    system: parking_lot::Mutex<sysinfo::System>,
}

impl ResourceMonitor {
    pub fn new(thresholds: ResourceThresholds) -> Self {
        Self {
            thresholds,
            latest: RwLock::new(ResourceStatus::default()),
            system: parking_lot::Mutex::new(sysinfo::System::new()),
        }
    }

    /// Refresh the snapshot from the host. Called from a periodic task.
    pub fn sample(&self) -> ResourceStatus {
        let (cpu_pct, mem_pct) = {
            let mut system = self.system.lock();
            system.refresh_cpu_usage();
            system.refresh_memory();
            let cpu = system.global_cpu_usage() as f64;
            let mem = if system.total_memory() > 0 {
                system.used_memory() as f64 / system.total_memory() as f64 * 100.0
            } else {
                0.0
            };
            (cpu, mem)
        };

        let disk_pct = sysinfo::Disks::new_with_refreshed_list()
            .iter()
            .map(|d| {
                if d.total_space() > 0 {
                    (d.total_space() - d.available_space()) as f64 / d.total_space() as f64
                        * 100.0
                } else {
                    0.0
                }
            })
            .fold(0.0_f64, f64::max);

        let status = ResourceStatus {
            cpu_pct,
            mem_pct,
            disk_pct,
            overall: self.classify(cpu_pct, mem_pct, disk_pct),
            sampled_at: Utc::now(),
        };

        if status.overall == ResourceLevel::Critical {
            warn!(cpu = cpu_pct, mem = mem_pct, disk = disk_pct, "resources critical");
        }

        *self.latest.write() = status.clone();
        status
    }

    fn classify(&self, cpu: f64, mem: f64, disk: f64) -> ResourceLevel {
        let peak = cpu.max(mem).max(disk);
        if peak >= self.thresholds.critical_pct {
            ResourceLevel::Critical
        } else if peak >= self.thresholds.elevated_pct {
            ResourceLevel::Elevated
        } else {
            ResourceLevel::Nominal
        }
    }

    /// Most recently published snapshot. Never blocks on sampling.
    pub fn latest(&self) -> ResourceStatus {
        self.latest.read().clone()
    }
}

impl Default for ResourceMonitor {
    fn default() -> Self {
        Self::new(ResourceThresholds::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_is_idempotent() {
        let monitor = HealthMonitor::new();
        monitor.register("detector");
        monitor.mark_degraded("detector", "model missing", true, None);
        monitor.register("detector");

        let health = monitor.get("detector").expect("registered");
        assert_eq!(health.status, HealthStatus::Degraded);
        assert!(health.fallback_active);
    }

    #[test]
    fn test_mark_transitions() {
        let monitor = HealthMonitor::new();
        monitor.register("detector");

        monitor.mark_degraded("detector", "fallback", true, None);
        assert_eq!(
            monitor.get("detector").unwrap().status,
            HealthStatus::Degraded
        );
        assert_eq!(monitor.get("detector").unwrap().error_count, 1);

        monitor.mark_failed("detector", "dead");
        assert_eq!(monitor.get("detector").unwrap().status, HealthStatus::Failed);
        assert_eq!(monitor.get("detector").unwrap().error_count, 2);

        monitor.mark_healthy("detector", None);
        let health = monitor.get("detector").unwrap();
        assert_eq!(health.status, HealthStatus::Healthy);
        assert!(!health.fallback_active);
        assert!(health.last_error.is_none());
    }

    #[test]
    fn test_overall_worst_wins() {
        let monitor = HealthMonitor::new();
        assert_eq!(monitor.overall(), HealthStatus::Healthy);

        monitor.register("a");
        monitor.register("b");
        monitor.register("c");
        assert_eq!(monitor.overall(), HealthStatus::Healthy);

        monitor.mark_degraded("b", "meh", false, None);
        assert_eq!(monitor.overall(), HealthStatus::Degraded);

        monitor.mark_failed("c", "dead");
        assert_eq!(monitor.overall(), HealthStatus::Failed);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(status_exit_code(HealthStatus::Healthy), 0);
        assert_eq!(status_exit_code(HealthStatus::Failed), 1);
        assert_eq!(status_exit_code(HealthStatus::Degraded), 2);
    }

    #[test]
    fn test_metadata_merge_on_degraded() {
        let monitor = HealthMonitor::new();
        let mut meta = HashMap::new();
        meta.insert("mode".to_string(), serde_json::json!("heuristic"));
        monitor.mark_degraded("detector", "fallback", true, Some(meta));

        let mut more = HashMap::new();
        more.insert("reason".to_string(), serde_json::json!("model missing"));
        monitor.mark_degraded("detector", "fallback", true, Some(more));

        let health = monitor.get("detector").unwrap();
        assert_eq!(health.metadata.len(), 2);
    }

    #[test]
    fn test_resource_classify() {
        let monitor = ResourceMonitor::default();
        assert_eq!(monitor.classify(10.0, 10.0, 10.0), ResourceLevel::Nominal);
        assert_eq!(monitor.classify(85.0, 10.0, 10.0), ResourceLevel::Elevated);
        assert_eq!(monitor.classify(10.0, 96.0, 10.0), ResourceLevel::Critical);
    }

    #[test]
    fn test_resource_sample_publishes() {
        let monitor = ResourceMonitor::default();
        let status = monitor.sample();
        let latest = monitor.latest();
        assert_eq!(status.overall, latest.overall);
        assert!(latest.cpu_pct >= 0.0);
        assert!(latest.mem_pct >= 0.0);
    }
}
