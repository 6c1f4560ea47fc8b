//! Action-chain execution for Aura automations
//!
//! Once the engine decides an automation fires, it snapshots the action
//! list and hands it to this crate. Each chain runs as an independent
//! task: it may suspend at delays and while awaiting device
//! acknowledgments without blocking the event loop or other chains, and
//! it closes exactly one execution record when it terminates.
//!
//! # Key Types
//!
//! - [`ChainExecutor`] - Runs snapshots through the chain state machine
//! - [`ChainSnapshot`] - Actions + version captured at fire time
//! - [`CommandSink`] - Outbound seam implemented by the adapter layer
//! - [`SceneCatalog`] - Resolves scenes to their action lists at execution time

pub mod chain;
pub mod scene;
pub mod sink;

pub use chain::{ChainExecutor, ChainSnapshot, ChainState, DEFAULT_STEP_TIMEOUT};
pub use scene::{SceneCatalog, StaticSceneCatalog};
pub use sink::{CommandSink, SinkError};
