//! Automation rule model and rule store
//!
//! This crate defines what users declare:
//!
//! ```text
//! AUTOMATION = TRIGGERS (and/or) → CONDITIONS (all) → ACTIONS (ordered)
//! ```
//!
//! - **Triggers**: external signals that can transition from unsatisfied
//!   to satisfied; combined with AND or OR logic
//! - **Conditions**: conjunctive gates checked at fire time
//! - **Actions**: the ordered chain executed once the automation fires
//! - **Recurrence**: a gate limiting when trigger evaluation is permitted
//!
//! Definitions are pure data (internally tagged serde enums, so every
//! variant round-trips losslessly); the evaluation semantics live in
//! `aura-engine`. The [`RuleStore`] is the single write path: validation,
//! monotonic versioning, reordering by stable action id, the change feed,
//! and the event-key index all live there.

pub mod action;
pub mod automation;
pub mod condition;
pub mod recurrence;
pub mod store;
pub mod trigger;

pub use action::{
    Action, DelayAction, DeviceCommandAction, NotifyAction, SceneActivateAction, splice_by_id,
};
pub use automation::{Automation, AutomationDraft, TriggerLogic, ValidationError};
pub use condition::{Condition, DeviceStateEqualsCondition, TimeWindowCondition};
pub use recurrence::{Recurrence, RecurrenceKind};
pub use store::{RuleChange, RuleStore, StoreError, StoreResult};
pub use trigger::{
    BatteryLowTrigger, CompareOp, DeviceOfflineTrigger, DeviceStateTrigger, LocationTrigger,
    ScheduleTrigger, SensorThresholdTrigger, SolarEventTrigger, TimeTrigger, Trigger,
};
