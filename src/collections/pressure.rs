//! Memory-pressure monitor.
//!
//! Samples resident memory at a configured interval and, when the byte
//! threshold is exceeded, invokes registered cleanup callbacks in
//! registration order. Pressure never fails caller operations; it only
//! triggers cleanup.

use anyhow::{Context, Result};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use sysinfo::{MemoryRefreshKind, RefreshKind, System};
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, info, warn};

/// Cleanup callback invoked when memory pressure is detected.
pub type CleanupCallback = Box<dyn Fn() + Send + Sync>;

/// Configuration for the pressure monitor.
#[derive(Debug, Clone)]
pub struct PressureConfig {
    /// Resident-memory threshold in bytes
    pub max_bytes: u64,
    /// Sampling interval
    pub check_interval: Duration,
}

impl Default for PressureConfig {
    fn default() -> Self {
        Self {
            max_bytes: 2 * 1024 * 1024 * 1024,
            check_interval: Duration::from_secs(30),
        }
    }
}

/// Background monitor that samples resident memory and drives cleanup.
pub struct PressureMonitor {
    config: PressureConfig,
    system: Arc<Mutex<System>>,
    callbacks: Arc<Mutex<Vec<CleanupCallback>>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl PressureMonitor {
    pub fn new(config: PressureConfig) -> Self {
        let refresh = RefreshKind::new().with_memory(MemoryRefreshKind::everything());
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            system: Arc::new(Mutex::new(System::new_with_specifics(refresh))),
            callbacks: Arc::new(Mutex::new(Vec::new())),
            shutdown_tx,
        }
    }

    /// Register a cleanup callback. Callbacks run in registration order.
    pub fn register_cleanup(&self, callback: CleanupCallback) {
        self.callbacks
            .lock()
            .expect("pressure callback lock poisoned")
            .push(callback);
    }

    /// Sample resident memory in bytes.
    pub fn sample_used_bytes(&self) -> u64 {
        let mut sys = self.system.lock().expect("sysinfo lock poisoned");
        sys.refresh_memory();
        sys.used_memory()
    }

    /// Sample once and run cleanup when the threshold is exceeded.
    /// Returns true when cleanup was triggered.
    pub fn check_now(&self) -> bool {
        run_check(&self.config, &self.system, &self.callbacks)
    }

    /// Start the background sampling loop. Returns its join handle.
    pub fn start(&self) -> tokio::task::JoinHandle<()> {
        let config = self.config.clone();
        let system = Arc::clone(&self.system);
        let callbacks = Arc::clone(&self.callbacks);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let mut tick = interval(config.check_interval);
            info!(
                max_bytes = config.max_bytes,
                interval_ms = config.check_interval.as_millis() as u64,
                "Pressure monitor started"
            );
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        run_check(&config, &system, &callbacks);
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Pressure monitor stopped");
                        break;
                    }
                }
            }
        })
    }

    /// Stop the background loop.
    pub fn shutdown(&self) -> Result<()> {
        self.shutdown_tx
            .send(())
            .map(|_| ())
            .context("Failed to signal pressure monitor shutdown")
    }
}

fn run_check(
    config: &PressureConfig,
    system: &Mutex<System>,
    callbacks: &Mutex<Vec<CleanupCallback>>,
) -> bool {
    let used = {
        let mut sys = system.lock().expect("sysinfo lock poisoned");
        sys.refresh_memory();
        sys.used_memory()
    };
    if used <= config.max_bytes {
        debug!(used_bytes = used, max_bytes = config.max_bytes, "Memory within bounds");
        return false;
    }

    warn!(
        used_bytes = used,
        max_bytes = config.max_bytes,
        "Memory pressure detected, running cleanup callbacks"
    );
    let callbacks = callbacks.lock().expect("pressure callback lock poisoned");
    for callback in callbacks.iter() {
        callback();
    }
    true
}
