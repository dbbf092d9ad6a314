//! Layered configuration.
//!
//! Defaults, then an optional `swarmflow.yaml`, then `SWARMFLOW_*`
//! environment variables (`__` separates nesting). Sections convert into
//! the runtime configuration types used by the services.

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::collections::{EvictionPolicy, PressureConfig};
use crate::services::batch_processor::BatchConfig;
use crate::services::circuit_breaker::CircuitBreakerConfig;
use crate::services::coordinator::CoordinatorConfig;
use crate::services::memory_service::MemoryConfig;
use crate::services::verification::VerificationConfig;

/// Top-level configuration for the coordinator and its services.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SwarmConfig {
    /// Swarm name, recorded in the unified state
    pub name: String,
    /// Dispatcher tick interval
    pub dispatch_interval_ms: u64,
    /// Stuck-agent health-check interval
    pub health_check_interval_ms: u64,
    /// Work-stealing rebalance interval
    pub rebalance_interval_ms: u64,
    /// How long `stop()` waits for in-flight tasks before failing the rest
    pub drain_timeout_ms: u64,
    /// Default per-task execution timeout
    pub task_timeout_ms: u64,
    /// Default per-task retry budget
    pub task_max_retries: u32,
    pub memory: MemorySection,
    pub breaker: BreakerSection,
    pub verification: VerificationSection,
    pub pressure: PressureSection,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            name: "swarmflow".to_string(),
            dispatch_interval_ms: 250,
            health_check_interval_ms: 5_000,
            rebalance_interval_ms: 10_000,
            drain_timeout_ms: 30_000,
            task_timeout_ms: 300_000,
            task_max_retries: 3,
            memory: MemorySection::default(),
            breaker: BreakerSection::default(),
            verification: VerificationSection::default(),
            pressure: PressureSection::default(),
        }
    }
}

impl SwarmConfig {
    /// Load configuration: defaults ← `swarmflow.yaml` ← `SWARMFLOW_*` env.
    pub fn load() -> Result<Self> {
        Self::load_from(PathBuf::from("swarmflow.yaml"))
    }

    /// Load with an explicit yaml path (absent files are skipped).
    pub fn load_from(path: PathBuf) -> Result<Self> {
        Figment::from(Serialized::defaults(SwarmConfig::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed("SWARMFLOW_").split("__"))
            .extract()
            .context("Failed to load configuration")
    }

    /// Coordinator timer intervals and task defaults.
    pub fn coordinator(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            dispatch_interval: Duration::from_millis(self.dispatch_interval_ms),
            health_check_interval: Duration::from_millis(self.health_check_interval_ms),
            rebalance_interval: Duration::from_millis(self.rebalance_interval_ms),
            drain_timeout: Duration::from_millis(self.drain_timeout_ms),
            task_timeout_ms: self.task_timeout_ms,
            task_max_retries: self.task_max_retries,
        }
    }
}

/// Memory substrate settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemorySection {
    pub max_entries: usize,
    pub max_entries_per_agent: usize,
    pub high_water_mark: f64,
    pub kb_trim_suffix: usize,
    pub eviction: EvictionPolicy,
    pub batch_max_size: usize,
    pub batch_max_wait_ms: u64,
    pub batch_max_queue: usize,
}

impl Default for MemorySection {
    fn default() -> Self {
        let defaults = MemoryConfig::default();
        Self {
            max_entries: defaults.max_entries,
            max_entries_per_agent: defaults.max_entries_per_agent,
            high_water_mark: defaults.high_water_mark,
            kb_trim_suffix: defaults.kb_trim_suffix,
            eviction: defaults.eviction,
            batch_max_size: defaults.batch.max_batch_size,
            batch_max_wait_ms: defaults.batch.max_wait.as_millis() as u64,
            batch_max_queue: defaults.batch.max_queue_size,
        }
    }
}

impl From<MemorySection> for MemoryConfig {
    fn from(section: MemorySection) -> Self {
        Self {
            max_entries: section.max_entries,
            max_entries_per_agent: section.max_entries_per_agent,
            high_water_mark: section.high_water_mark,
            kb_trim_suffix: section.kb_trim_suffix,
            eviction: section.eviction,
            batch: BatchConfig {
                max_batch_size: section.batch_max_size,
                max_wait: Duration::from_millis(section.batch_max_wait_ms),
                max_queue_size: section.batch_max_queue,
            },
        }
    }
}

/// Circuit breaker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerSection {
    pub failure_threshold: u32,
    pub open_timeout_ms: u64,
    pub success_threshold: u32,
    pub enabled: bool,
}

impl Default for BreakerSection {
    fn default() -> Self {
        let defaults = CircuitBreakerConfig::default();
        Self {
            failure_threshold: defaults.failure_threshold,
            open_timeout_ms: defaults.open_timeout.num_milliseconds() as u64,
            success_threshold: defaults.success_threshold,
            enabled: defaults.enabled,
        }
    }
}

impl From<BreakerSection> for CircuitBreakerConfig {
    fn from(section: BreakerSection) -> Self {
        Self {
            failure_threshold: section.failure_threshold,
            open_timeout: chrono::Duration::milliseconds(section.open_timeout_ms as i64),
            success_threshold: section.success_threshold,
            enabled: section.enabled,
        }
    }
}

/// Verification pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationSection {
    pub enabled: bool,
    pub status_dir: PathBuf,
    pub fail_fast: bool,
    pub poll_interval_ms: u64,
}

impl Default for VerificationSection {
    fn default() -> Self {
        let defaults = VerificationConfig::default();
        Self {
            enabled: defaults.enabled,
            status_dir: defaults.status_dir,
            fail_fast: defaults.fail_fast,
            poll_interval_ms: defaults.poll_interval.as_millis() as u64,
        }
    }
}

impl From<VerificationSection> for VerificationConfig {
    fn from(section: VerificationSection) -> Self {
        Self {
            enabled: section.enabled,
            status_dir: section.status_dir,
            fail_fast: section.fail_fast,
            poll_interval: Duration::from_millis(section.poll_interval_ms),
        }
    }
}

/// Memory-pressure monitor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PressureSection {
    pub max_bytes: u64,
    pub check_interval_ms: u64,
}

impl Default for PressureSection {
    fn default() -> Self {
        let defaults = PressureConfig::default();
        Self {
            max_bytes: defaults.max_bytes,
            check_interval_ms: defaults.check_interval.as_millis() as u64,
        }
    }
}

impl From<PressureSection> for PressureConfig {
    fn from(section: PressureSection) -> Self {
        Self {
            max_bytes: section.max_bytes,
            check_interval: Duration::from_millis(section.check_interval_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_sane() {
        let config = SwarmConfig::default();
        assert_eq!(config.name, "swarmflow");
        assert!(config.dispatch_interval_ms > 0);
        assert!(config.memory.high_water_mark > 0.0 && config.memory.high_water_mark <= 1.0);
        assert!(config.breaker.failure_threshold > 0);
    }

    #[test]
    fn test_yaml_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::with_suffix(".yaml").unwrap();
        writeln!(
            file,
            "name: custom\ndispatch_interval_ms: 50\nbreaker:\n  failure_threshold: 9"
        )
        .unwrap();

        let config = SwarmConfig::load_from(file.path().to_path_buf()).unwrap();
        assert_eq!(config.name, "custom");
        assert_eq!(config.dispatch_interval_ms, 50);
        assert_eq!(config.breaker.failure_threshold, 9);
        // Untouched values keep their defaults
        assert_eq!(
            config.task_max_retries,
            SwarmConfig::default().task_max_retries
        );
    }

    #[test]
    fn test_missing_yaml_is_fine() {
        let config = SwarmConfig::load_from(PathBuf::from("/definitely/not/here.yaml")).unwrap();
        assert_eq!(config.name, "swarmflow");
    }

    #[test]
    fn test_section_conversions() {
        let config = SwarmConfig::default();
        let memory: MemoryConfig = config.memory.clone().into();
        assert_eq!(memory.max_entries, config.memory.max_entries);

        let breaker: CircuitBreakerConfig = config.breaker.clone().into();
        assert_eq!(
            breaker.open_timeout.num_milliseconds() as u64,
            config.breaker.open_timeout_ms
        );

        let verification: VerificationConfig = config.verification.clone().into();
        assert_eq!(verification.status_dir, config.verification.status_dir);
    }
}
