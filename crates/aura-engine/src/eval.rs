//! Condition evaluation at fire time
//!
//! Conditions are stateless and purely conjunctive: every condition must
//! hold against the world snapshot at the instant the combinator decides
//! to fire. A false condition converts the fire into a suppressed audit
//! record; it is not an error.

use std::sync::Arc;

use aura_automation::Condition;
use aura_state_store::StateStore;
use chrono::{DateTime, Local};
use tracing::trace;

/// Evaluates conditions against the state store and the fire instant.
pub struct ConditionEvaluator {
    states: Arc<StateStore>,
}

impl ConditionEvaluator {
    pub fn new(states: Arc<StateStore>) -> Self {
        Self { states }
    }

    /// Evaluate a single condition at the given wall-clock instant.
    ///
    /// The instant is the triggering event's timestamp, not the system
    /// clock, so replays evaluate identically.
    pub fn evaluate(&self, condition: &Condition, now: DateTime<Local>) -> bool {
        let holds = match condition {
            Condition::TimeWindow(w) => w.contains(now.time()),
            // Unknown devices evaluate false.
            Condition::DeviceStateEquals(c) => self.states.is_state(&c.device_id, &c.state),
        };
        trace!(kind = condition.kind(), holds, "evaluated condition");
        holds
    }

    /// All conditions must hold. An empty list holds trivially.
    pub fn evaluate_all(&self, conditions: &[Condition], now: DateTime<Local>) -> bool {
        conditions.iter().all(|c| self.evaluate(c, now))
    }
}
