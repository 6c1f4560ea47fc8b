//! Periodic clock-tick driver
//!
//! Time, schedule, and solar triggers are all matched against clock ticks,
//! so the tick interval bounds trigger latency. Intervals coarser than one
//! second are rejected; time triggers are declared to the minute and must
//! never skip their matching minute.

use std::time::Duration;

use aura_core::Event;
use chrono::Local;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::SharedEventBus;

/// Coarsest permitted tick interval.
pub const MAX_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Clock driver errors
#[derive(Debug, Error)]
pub enum ClockError {
    #[error("tick interval must be between 1ms and 1s, got {0:?}")]
    InvalidInterval(Duration),
}

/// Publishes a [`Event::clock_tick`] at a fixed interval.
pub struct ClockDriver {
    bus: SharedEventBus,
    interval: Duration,
}

impl ClockDriver {
    /// Create a driver ticking at `interval` (1ms..=1s).
    pub fn new(bus: SharedEventBus, interval: Duration) -> Result<Self, ClockError> {
        if interval < Duration::from_millis(1) || interval > MAX_TICK_INTERVAL {
            return Err(ClockError::InvalidInterval(interval));
        }
        Ok(Self { bus, interval })
    }

    /// Spawn the tick loop; it runs until the shutdown signal flips to true.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        info!(interval = ?self.interval, "starting clock driver");
        tokio::spawn(self.run(shutdown))
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.bus.publish(Event::clock_tick(Local::now()));
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("clock driver stopping");
                        return;
                    }
                }
            }
        }
    }
}
