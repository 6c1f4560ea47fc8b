//! Automation Engine
//!
//! This crate provides the evaluation core for Aura: it turns stored
//! automation definitions plus a live event stream into executed action
//! chains and audit records.
//!
//! # Architecture
//!
//! ```text
//! adapters → EventBus → TriggerLatch (edge) → Combinator (and/or)
//!          → ConditionEvaluator → InFlightSet (try-lock) → ChainExecutor
//!          → AuditLog
//! ```
//!
//! One event-processing loop owns all trigger latch state, so edge
//! transitions are race-free; every permitted fire runs as an independent
//! cancellable task against a snapshot of the automation's actions.
//!
//! # Wiring
//!
//! ```ignore
//! let bus = Arc::new(EventBus::new());
//! let rules = Arc::new(RuleStore::new());
//! let states = Arc::new(StateStore::new());
//! let audit = Arc::new(AuditLog::new());
//!
//! let engine = AutomationEngine::new(
//!     rules.clone(), states.clone(), bus.clone(), audit.clone(),
//!     sink, scenes, EngineConfig::default(),
//! )?;
//! let handle = engine.spawn();
//!
//! // Drivers feed the bus; adapters call bus.publish(...) directly.
//! let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//! ClockDriver::new(bus.clone(), Duration::from_secs(1))?.spawn(shutdown_rx);
//! ```

pub mod config;
pub mod engine;
pub mod eval;
pub mod runtime;
pub mod scheduler;
pub mod trigger_eval;

pub use config::{ConfigError, EngineConfig};
pub use engine::{AutomationEngine, EngineHandle};
pub use eval::ConditionEvaluator;
pub use runtime::AutomationRuntime;
pub use scheduler::{InFlightClaim, InFlightSet};
pub use trigger_eval::{match_event, SolarTable, TriggerLatch};
