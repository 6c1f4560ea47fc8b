//! The rule store
//!
//! The single write path for automation definitions. Every write validates
//! first (nothing is persisted on failure), bumps the monotonic version,
//! and publishes a [`RuleChange`] so the engine can rebuild runtime trigger
//! state for exactly that automation without disturbing others or any
//! in-flight execution.
//!
//! The store also maintains an [`EventKey`] index so the engine resolves
//! the candidate automations for an event in one lookup instead of
//! scanning every rule per event.

use std::collections::HashSet;

use aura_core::{ActionId, AutomationId, Event, EventKey};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::action::splice_by_id;
use crate::automation::{Automation, AutomationDraft, ValidationError};

/// Capacity of the change-notification feed.
const CHANGE_FEED_CAPACITY: usize = 256;

/// Rule store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("automation not found: {0}")]
    NotFound(AutomationId),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("unknown action id: {0}")]
    UnknownAction(ActionId),

    #[error("index {index} out of bounds for {len} items")]
    IndexOutOfBounds { index: usize, len: usize },
}

/// Result type for rule store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Change notification published after every successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleChange {
    /// Created or edited; runtime trigger state must be rebuilt.
    Saved(AutomationId),

    /// Deleted; runtime trigger state must be dropped.
    Removed(AutomationId),
}

/// In-memory store of automation definitions.
pub struct RuleStore {
    automations: DashMap<AutomationId, Automation>,
    index: DashMap<EventKey, HashSet<AutomationId>>,
    changes: broadcast::Sender<RuleChange>,
}

impl RuleStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            automations: DashMap::new(),
            index: DashMap::new(),
            changes,
        }
    }

    /// Validate and store a new automation. Returns its generated id.
    pub fn create(&self, draft: AutomationDraft) -> StoreResult<AutomationId> {
        draft.validate()?;

        let id = AutomationId::generate();
        let automation = Automation::from_draft(id.clone(), draft);
        info!(automation = %id, name = %automation.name, "created automation");

        self.index_automation(&automation);
        self.automations.insert(id.clone(), automation);
        self.notify(RuleChange::Saved(id.clone()));
        Ok(id)
    }

    /// Validate and replace an automation's definition. The id stays
    /// stable, the version is bumped, and `last_fired_at` is preserved.
    /// Returns the new version.
    pub fn update(&self, id: &AutomationId, draft: AutomationDraft) -> StoreResult<u64> {
        draft.validate()?;

        let updated = {
            let mut entry = self
                .automations
                .get_mut(id)
                .ok_or_else(|| StoreError::NotFound(id.clone()))?;

            let mut updated = Automation::from_draft(id.clone(), draft);
            updated.version = entry.version + 1;
            updated.last_fired_at = entry.last_fired_at;
            *entry = updated.clone();
            updated
        };

        info!(automation = %id, version = updated.version, "updated automation");
        self.unindex(id);
        self.index_automation(&updated);
        self.notify(RuleChange::Saved(id.clone()));
        Ok(updated.version)
    }

    /// Delete an automation, returning its last definition.
    pub fn delete(&self, id: &AutomationId) -> StoreResult<Automation> {
        let (_, automation) = self
            .automations
            .remove(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        info!(automation = %id, name = %automation.name, "deleted automation");
        self.unindex(id);
        self.notify(RuleChange::Removed(id.clone()));
        Ok(automation)
    }

    /// Fetch one automation by id.
    pub fn get(&self, id: &AutomationId) -> Option<Automation> {
        self.automations.get(id).map(|a| a.value().clone())
    }

    /// List automations, optionally restricted to enabled ones.
    pub fn list(&self, enabled_only: bool) -> Vec<Automation> {
        let mut automations: Vec<Automation> = self
            .automations
            .iter()
            .filter(|a| !enabled_only || a.enabled)
            .map(|a| a.value().clone())
            .collect();
        automations.sort_by(|a, b| a.id.cmp(&b.id));
        automations
    }

    /// Number of stored automations.
    pub fn len(&self) -> usize {
        self.automations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.automations.is_empty()
    }

    /// Enable or disable an automation. Counts as an edit.
    pub fn set_enabled(&self, id: &AutomationId, enabled: bool) -> StoreResult<u64> {
        let version = self.edit(id, |automation| {
            automation.enabled = enabled;
            Ok(())
        })?;
        info!(automation = %id, enabled, "toggled automation");
        Ok(version)
    }

    /// Flip the enabled flag, returning the new state.
    pub fn toggle(&self, id: &AutomationId) -> StoreResult<bool> {
        let mut now_enabled = false;
        self.edit(id, |automation| {
            automation.enabled = !automation.enabled;
            now_enabled = automation.enabled;
            Ok(())
        })?;
        info!(automation = %id, enabled = now_enabled, "toggled automation");
        Ok(now_enabled)
    }

    /// Move the action with `action_id` to `new_index`.
    ///
    /// A pure splice over a copy; snapshots held by running chains are
    /// unaffected. Returns the new version.
    pub fn reorder_actions(
        &self,
        id: &AutomationId,
        action_id: &ActionId,
        new_index: usize,
    ) -> StoreResult<u64> {
        self.edit(id, |automation| {
            let len = automation.actions.len();
            if new_index >= len {
                return Err(StoreError::IndexOutOfBounds {
                    index: new_index,
                    len,
                });
            }
            let reordered = splice_by_id(&automation.actions, action_id, new_index)
                .ok_or_else(|| StoreError::UnknownAction(action_id.clone()))?;
            automation.actions = reordered;
            Ok(())
        })
    }

    /// Move the trigger at `from` to `to`. Returns the new version.
    pub fn reorder_triggers(&self, id: &AutomationId, from: usize, to: usize) -> StoreResult<u64> {
        self.edit(id, |automation| {
            let len = automation.triggers.len();
            if from >= len || to >= len {
                let index = if from >= len { from } else { to };
                return Err(StoreError::IndexOutOfBounds { index, len });
            }
            let trigger = automation.triggers.remove(from);
            automation.triggers.insert(to, trigger);
            Ok(())
        })
    }

    /// Stamp the last-fired time.
    ///
    /// Runtime bookkeeping, not an edit: the version is untouched and no
    /// [`RuleChange`] is published, so firing never causes a latch rebuild
    /// of the automation that just fired.
    pub fn mark_fired(&self, id: &AutomationId, at: DateTime<Utc>) {
        if let Some(mut automation) = self.automations.get_mut(id) {
            automation.last_fired_at = Some(at);
            debug!(automation = %id, "marked automation fired");
        }
    }

    /// Enabled automations whose triggers care about this event's key.
    pub fn ids_for(&self, event: &Event) -> Vec<AutomationId> {
        let Some(ids) = self.index.get(&event.key()) else {
            return Vec::new();
        };
        let mut candidates: Vec<AutomationId> = ids
            .iter()
            .filter(|id| self.automations.get(*id).is_some_and(|a| a.enabled))
            .cloned()
            .collect();
        candidates.sort();
        candidates
    }

    /// Enabled automations relevant to an event, resolved via the index.
    pub fn automations_for(&self, event: &Event) -> Vec<Automation> {
        self.ids_for(event)
            .iter()
            .filter_map(|id| self.get(id))
            .collect()
    }

    /// Subscribe to change notifications.
    pub fn subscribe_changes(&self) -> broadcast::Receiver<RuleChange> {
        self.changes.subscribe()
    }

    // --- Internal helpers ---

    /// Apply an in-place edit: bump the version, refresh the index, and
    /// publish the change. The closure runs under the entry lock.
    fn edit<F>(&self, id: &AutomationId, f: F) -> StoreResult<u64>
    where
        F: FnOnce(&mut Automation) -> StoreResult<()>,
    {
        let (version, snapshot) = {
            let mut entry = self
                .automations
                .get_mut(id)
                .ok_or_else(|| StoreError::NotFound(id.clone()))?;
            f(&mut entry)?;
            entry.version += 1;
            (entry.version, entry.clone())
        };

        self.unindex(id);
        self.index_automation(&snapshot);
        self.notify(RuleChange::Saved(id.clone()));
        Ok(version)
    }

    fn index_automation(&self, automation: &Automation) {
        for trigger in &automation.triggers {
            self.index
                .entry(trigger.key())
                .or_default()
                .insert(automation.id.clone());
        }
    }

    fn unindex(&self, id: &AutomationId) {
        self.index.retain(|_, ids| {
            ids.remove(id);
            !ids.is_empty()
        });
    }

    fn notify(&self, change: RuleChange) {
        // Send errors just mean nobody is listening yet
        let _ = self.changes.send(change);
    }
}

impl Default for RuleStore {
    fn default() -> Self {
        Self::new()
    }
}
