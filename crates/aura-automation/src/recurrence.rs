//! Recurrence gates
//!
//! A recurrence limits *when trigger evaluation is permitted at all*; it is
//! a gate, not a trigger. While an automation is gated out, events are
//! dropped for its triggers and their latch state freezes (it neither
//! arms nor resets), so re-entering the permitted window cannot fire
//! spuriously from stale latch state.

use std::collections::BTreeSet;

use aura_core::Weekday;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Recurrence cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurrenceKind {
    Daily,
    Weekly,
    Monthly,
    Custom,
}

/// Recurrence gate attached to an automation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recurrence {
    /// Disabled recurrences permit everything.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    pub kind: RecurrenceKind,

    /// Days of week, used by `weekly`, `monthly`, and `custom`.
    #[serde(default)]
    pub weekdays: BTreeSet<Weekday>,
}

fn default_enabled() -> bool {
    true
}

impl Recurrence {
    /// Whether trigger evaluation is permitted on the given date.
    ///
    /// `monthly` permits the first occurrence in the month of a listed
    /// weekday (calendar day 7 or earlier), or the 1st of the month when
    /// no weekdays are listed.
    pub fn permits(&self, date: NaiveDate) -> bool {
        if !self.enabled {
            return true;
        }

        let weekday = Weekday::from(date.weekday());
        match self.kind {
            RecurrenceKind::Daily => true,
            RecurrenceKind::Weekly | RecurrenceKind::Custom => self.weekdays.contains(&weekday),
            RecurrenceKind::Monthly => {
                if self.weekdays.is_empty() {
                    date.day() == 1
                } else {
                    date.day() <= 7 && self.weekdays.contains(&weekday)
                }
            }
        }
    }
}
