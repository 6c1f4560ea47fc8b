//! Engine configuration

use std::time::Duration;

use aura_event_bus::solar::SiteLocation;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("tick interval must be between 1 and 1000 milliseconds, got {0}")]
    InvalidTickInterval(u64),

    #[error("step timeout must be at least one second, got {0}")]
    InvalidStepTimeout(u64),

    #[error("shutdown grace must be at least one second, got {0}")]
    InvalidShutdownGrace(u64),
}

/// Tunables for the engine and its drivers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Clock tick interval in milliseconds (1..=1000).
    pub tick_interval_ms: u64,

    /// Per-step acknowledgment timeout in seconds.
    pub step_timeout_secs: u64,

    /// How long shutdown waits for in-flight chains before aborting them.
    pub shutdown_grace_secs: u64,

    /// Site location for the daily solar-schedule computation. Without it
    /// solar triggers never become satisfied.
    pub location: Option<SiteLocation>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            step_timeout_secs: 5,
            shutdown_grace_secs: 10,
            location: None,
        }
    }
}

impl EngineConfig {
    /// Check the tunables against their permitted ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_ms == 0 || self.tick_interval_ms > 1000 {
            return Err(ConfigError::InvalidTickInterval(self.tick_interval_ms));
        }
        if self.step_timeout_secs == 0 {
            return Err(ConfigError::InvalidStepTimeout(self.step_timeout_secs));
        }
        if self.shutdown_grace_secs == 0 {
            return Err(ConfigError::InvalidShutdownGrace(self.shutdown_grace_secs));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}
