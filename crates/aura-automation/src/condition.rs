//! Condition definitions
//!
//! Conditions gate a fire at the instant the combinator decides to fire;
//! they are never themselves a source of firing. All conditions on an
//! automation are conjunctive.

use aura_core::DeviceId;
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

/// Condition definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "condition", rename_all = "snake_case")]
pub enum Condition {
    /// The wall clock must fall inside a window.
    TimeWindow(TimeWindowCondition),

    /// A device's last known state must equal a value.
    DeviceStateEquals(DeviceStateEqualsCondition),
}

impl Condition {
    /// Short name of the condition kind (matches the serde tag).
    pub fn kind(&self) -> &'static str {
        match self {
            Condition::TimeWindow(_) => "time_window",
            Condition::DeviceStateEquals(_) => "device_state_equals",
        }
    }
}

/// Wall-clock window, half-open `[start, end)`, wrapping midnight when
/// `start > end`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeWindowCondition {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindowCondition {
    /// Whether a wall-clock time falls inside the window.
    pub fn contains(&self, t: NaiveTime) -> bool {
        if self.start <= self.end {
            self.start <= t && t < self.end
        } else {
            t >= self.start || t < self.end
        }
    }
}

/// Device state equality check against the world snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStateEqualsCondition {
    pub device_id: DeviceId,
    pub state: String,
}
