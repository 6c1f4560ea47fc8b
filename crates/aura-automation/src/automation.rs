//! Automation definitions and write-time validation
//!
//! An automation ties together triggers, a combination policy, conditions,
//! and an ordered action chain. Definitions enter the system as an
//! [`AutomationDraft`] which is validated before anything is stored;
//! invalid drafts are rejected synchronously and nothing is persisted.

use aura_core::AutomationId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::action::Action;
use crate::condition::Condition;
use crate::recurrence::{Recurrence, RecurrenceKind};
use crate::trigger::Trigger;

/// Validation errors
///
/// Identifier syntax is enforced by the id newtypes themselves, at
/// construction and deserialization time; these variants cover the
/// structural invariants on top of that.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("automation name must not be empty")]
    EmptyName,

    #[error("automation must declare at least one trigger")]
    NoTriggers,

    #[error("automation must declare at least one action")]
    NoActions,

    #[error("battery threshold must be at most 100 percent, got {0}")]
    BatteryThresholdTooHigh(u8),

    #[error("sensor threshold value must be finite")]
    NonFiniteThreshold,

    #[error("sensor metric must not be empty")]
    EmptyMetric,

    #[error("device state must not be empty")]
    EmptyState,

    #[error("device command must not be empty")]
    EmptyCommand,

    #[error("notification message must not be empty")]
    EmptyMessage,

    #[error("delay must last at least one second")]
    ZeroDelay,

    #[error("duplicate action id: {0}")]
    DuplicateActionId(String),

    #[error("schedule must list at least one weekday")]
    EmptyScheduleDays,

    #[error("{0:?} recurrence must list at least one weekday")]
    EmptyRecurrenceDays(RecurrenceKind),

    #[error("time window start and end must differ")]
    DegenerateTimeWindow,
}

/// How an automation's triggers combine into a fire decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerLogic {
    /// Fire on any trigger's rising edge.
    #[default]
    Or,

    /// Fire when the last still-unarmed trigger arms, completing the
    /// conjunction.
    And,
}

/// An automation definition as written by the editor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationDraft {
    pub name: String,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    pub triggers: Vec<Trigger>,

    #[serde(default)]
    pub logic: TriggerLogic,

    #[serde(default)]
    pub conditions: Vec<Condition>,

    pub actions: Vec<Action>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<Recurrence>,
}

fn default_enabled() -> bool {
    true
}

impl AutomationDraft {
    /// Check every structural invariant. Called by the rule store before
    /// any write takes effect.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if self.triggers.is_empty() {
            return Err(ValidationError::NoTriggers);
        }
        if self.actions.is_empty() {
            return Err(ValidationError::NoActions);
        }

        for trigger in &self.triggers {
            match trigger {
                Trigger::SensorThreshold(t) => {
                    if t.metric.trim().is_empty() {
                        return Err(ValidationError::EmptyMetric);
                    }
                    if !t.value.is_finite() {
                        return Err(ValidationError::NonFiniteThreshold);
                    }
                }
                Trigger::DeviceState(t) => {
                    if t.state.trim().is_empty() {
                        return Err(ValidationError::EmptyState);
                    }
                }
                Trigger::BatteryLow(t) => {
                    if t.threshold_percent > 100 {
                        return Err(ValidationError::BatteryThresholdTooHigh(t.threshold_percent));
                    }
                }
                Trigger::Schedule(t) => {
                    if t.days.is_empty() {
                        return Err(ValidationError::EmptyScheduleDays);
                    }
                }
                _ => {}
            }
        }

        for condition in &self.conditions {
            if let Condition::TimeWindow(w) = condition {
                if w.start == w.end {
                    return Err(ValidationError::DegenerateTimeWindow);
                }
            }
        }

        let mut seen = std::collections::HashSet::new();
        for action in &self.actions {
            if !seen.insert(action.id().clone()) {
                return Err(ValidationError::DuplicateActionId(action.id().to_string()));
            }
            match action {
                Action::DeviceCommand(a) => {
                    if a.command.trim().is_empty() {
                        return Err(ValidationError::EmptyCommand);
                    }
                }
                Action::Notify(a) => {
                    if a.message.trim().is_empty() {
                        return Err(ValidationError::EmptyMessage);
                    }
                }
                Action::Delay(a) => {
                    if a.seconds == 0 {
                        return Err(ValidationError::ZeroDelay);
                    }
                }
                Action::SceneActivate(_) => {}
            }
        }

        if let Some(recurrence) = &self.recurrence {
            let needs_days = matches!(
                recurrence.kind,
                RecurrenceKind::Weekly | RecurrenceKind::Custom
            );
            if recurrence.enabled && needs_days && recurrence.weekdays.is_empty() {
                return Err(ValidationError::EmptyRecurrenceDays(recurrence.kind));
            }
        }

        Ok(())
    }
}

/// A stored automation.
///
/// `id` is stable and immutable; `version` is bumped on every edit.
/// Running chains operate on the trigger/action snapshot captured at fire
/// time, so a concurrently edited automation never leaks partially-new
/// steps into an in-flight execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Automation {
    pub id: AutomationId,
    pub name: String,
    pub enabled: bool,
    pub triggers: Vec<Trigger>,
    pub logic: TriggerLogic,
    pub conditions: Vec<Condition>,
    pub actions: Vec<Action>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<Recurrence>,
    pub version: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_fired_at: Option<DateTime<Utc>>,
}

impl Automation {
    pub(crate) fn from_draft(id: AutomationId, draft: AutomationDraft) -> Self {
        Self {
            id,
            name: draft.name,
            enabled: draft.enabled,
            triggers: draft.triggers,
            logic: draft.logic,
            conditions: draft.conditions,
            actions: draft.actions,
            recurrence: draft.recurrence,
            version: 1,
            last_fired_at: None,
        }
    }

    /// Re-derive the draft shape, e.g. for round-tripping to an editor.
    pub fn to_draft(&self) -> AutomationDraft {
        AutomationDraft {
            name: self.name.clone(),
            enabled: self.enabled,
            triggers: self.triggers.clone(),
            logic: self.logic,
            conditions: self.conditions.clone(),
            actions: self.actions.clone(),
            recurrence: self.recurrence.clone(),
        }
    }
}
