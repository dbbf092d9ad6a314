//! Per-agent circuit breaker.
//!
//! Detects repeated failures on an agent and removes it from dispatch until
//! a timed half-open probe shows recovery, preventing one bad agent from
//! eating the whole objective's retry budget.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Configuration for per-agent circuit breakers.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit.
    pub failure_threshold: u32,
    /// How long an open circuit blocks before admitting a half-open probe.
    pub open_timeout: Duration,
    /// Successful probes in half-open required to close.
    pub success_threshold: u32,
    /// Whether breakers are enforced at all.
    pub enabled: bool,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            open_timeout: Duration::minutes(1),
            success_threshold: 1,
            enabled: true,
        }
    }
}

/// State of one agent's circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Requests flow normally
    Closed,
    /// Dispatch is blocked
    Open,
    /// A single probe is testing recovery
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

/// Circuit state for one agent.
#[derive(Debug, Clone)]
struct Circuit {
    state: CircuitState,
    failure_count: u32,
    half_open_successes: u32,
    opened_at: Option<DateTime<Utc>>,
    open_count: u32,
}

impl Circuit {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            half_open_successes: 0,
            opened_at: None,
            open_count: 0,
        }
    }

    fn record_success(&mut self, config: &CircuitBreakerConfig) {
        match self.state {
            CircuitState::HalfOpen => {
                self.half_open_successes += 1;
                if self.half_open_successes >= config.success_threshold {
                    self.close();
                }
            }
            // Success always collapses to closed and resets the count
            CircuitState::Closed | CircuitState::Open => self.close(),
        }
    }

    fn record_failure(&mut self, config: &CircuitBreakerConfig) {
        match self.state {
            CircuitState::Closed => {
                self.failure_count += 1;
                if self.failure_count >= config.failure_threshold {
                    self.open();
                }
            }
            // Any failure during the probe reopens
            CircuitState::HalfOpen => self.open(),
            CircuitState::Open => {}
        }
    }

    /// Whether execution may proceed, applying the timed open → half-open
    /// transition as a side effect.
    fn can_execute(&mut self, config: &CircuitBreakerConfig, now: DateTime<Utc>) -> bool {
        match self.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => match self.opened_at {
                Some(opened_at) if now >= opened_at + config.open_timeout => {
                    self.state = CircuitState::HalfOpen;
                    self.half_open_successes = 0;
                    true
                }
                _ => false,
            },
        }
    }

    fn open(&mut self) {
        self.state = CircuitState::Open;
        self.opened_at = Some(Utc::now());
        self.half_open_successes = 0;
        self.open_count += 1;
    }

    fn close(&mut self) {
        self.state = CircuitState::Closed;
        self.opened_at = None;
        self.failure_count = 0;
        self.half_open_successes = 0;
    }
}

/// Statistics for one agent's circuit.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitStats {
    pub agent_id: Uuid,
    pub state: String,
    pub failure_count: u32,
    pub open_count: u32,
    pub opened_at: Option<DateTime<Utc>>,
}

/// Service managing one circuit per agent.
pub struct CircuitBreakerService {
    config: CircuitBreakerConfig,
    circuits: Arc<RwLock<HashMap<Uuid, Circuit>>>,
}

impl CircuitBreakerService {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            circuits: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Whether the given agent may receive work.
    ///
    /// Returns true unless the agent's circuit is open; an expired open
    /// circuit transitions to half-open here and admits a single probe.
    pub async fn can_execute(&self, agent_id: Uuid) -> bool {
        if !self.config.enabled {
            return true;
        }
        let mut circuits = self.circuits.write().await;
        let circuit = circuits.entry(agent_id).or_insert_with(Circuit::new);
        circuit.can_execute(&self.config, Utc::now())
    }

    /// Record a successful execution on the agent.
    pub async fn record_success(&self, agent_id: Uuid) {
        if !self.config.enabled {
            return;
        }
        let mut circuits = self.circuits.write().await;
        let circuit = circuits.entry(agent_id).or_insert_with(Circuit::new);
        circuit.record_success(&self.config);
    }

    /// Record a failed execution on the agent.
    pub async fn record_failure(&self, agent_id: Uuid) {
        if !self.config.enabled {
            return;
        }
        let mut circuits = self.circuits.write().await;
        let circuit = circuits.entry(agent_id).or_insert_with(Circuit::new);
        let was_closed = circuit.state != CircuitState::Open;
        circuit.record_failure(&self.config);
        if was_closed && circuit.state == CircuitState::Open {
            tracing::warn!(
                agent_id = %agent_id,
                failure_count = circuit.failure_count,
                open_count = circuit.open_count,
                "Circuit opened for agent"
            );
        }
    }

    /// Current state of an agent's circuit, if one exists.
    pub async fn state(&self, agent_id: Uuid) -> Option<CircuitState> {
        self.circuits.read().await.get(&agent_id).map(|c| c.state)
    }

    /// Statistics for every tracked circuit.
    pub async fn stats(&self) -> Vec<CircuitStats> {
        self.circuits
            .read()
            .await
            .iter()
            .map(|(agent_id, c)| CircuitStats {
                agent_id: *agent_id,
                state: c.state.as_str().to_string(),
                failure_count: c.failure_count,
                open_count: c.open_count,
                opened_at: c.opened_at,
            })
            .collect()
    }

    /// Manually reset one agent's circuit.
    pub async fn reset(&self, agent_id: Uuid) {
        if let Some(circuit) = self.circuits.write().await.get_mut(&agent_id) {
            circuit.close();
            circuit.open_count = 0;
        }
    }
}
