/**
 * Navigation Manager
 *
 * Process-facing facade: holds the configuration, starts and stops one
 * executor. start/stop are idempotent and may be called from any thread.
 */

use std::sync::atomic::{AtomicBool, Ordering};

use log::{info, warn};
use parking_lot::Mutex;

use crate::config::LrnConfig;
use crate::error::{Error, Result};
use crate::sensors::SensorReading;
use super::executor::{Links, RoverExecutor};

pub struct LrnManager {
    config: Mutex<Option<LrnConfig>>,
    executor: Mutex<Option<RoverExecutor>>,
    running: AtomicBool,
    links: Links,
}

impl LrnManager {
    pub fn new() -> Self {
        Self::with_links(Links::default())
    }

    pub fn with_links(links: Links) -> Self {
        Self {
            config: Mutex::new(None),
            executor: Mutex::new(None),
            running: AtomicBool::new(false),
            links,
        }
    }

    /// Store the configuration used by the next start; always succeeds
    pub fn load_configuration(&self, config: LrnConfig) -> bool {
        *self.config.lock() = Some(config);
        info!("Configuration loaded");
        true
    }

    pub fn config(&self) -> Option<LrnConfig> {
        self.config.lock().clone()
    }

    pub fn start(&self) -> Result<()> {
        let mut slot = self.executor.lock();
        if self.running.load(Ordering::SeqCst) {
            warn!("Navigation already running");
            return Ok(());
        }

        let config = self.config.lock().clone().ok_or(Error::NotConfigured)?;
        info!("Starting Navigation...");

        let mut executor = RoverExecutor::new(config, self.links.clone());
        executor.start()?;
        *slot = Some(executor);
        self.running.store(true, Ordering::SeqCst);

        info!("Starting Navigation...OK");
        Ok(())
    }

    pub fn stop(&self) {
        let mut slot = self.executor.lock();
        if let Some(mut executor) = slot.take() {
            info!("Stopping Navigation...");
            executor.stop();
        }
        if self.running.swap(false, Ordering::SeqCst) {
            info!("Stopping Navigation...OK");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Latest sensor values while running
    pub fn sensors(&self) -> Option<SensorReading> {
        self.executor.lock().as_ref().and_then(|e| e.sensors())
    }
}

impl Default for LrnManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for LrnManager {
    fn drop(&mut self) {
        self.stop();
    }
}
