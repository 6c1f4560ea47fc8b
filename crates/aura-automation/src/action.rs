//! Action definitions
//!
//! Actions form an ordered chain executed once an automation fires. Every
//! action carries a stable id so the editor can reorder steps without
//! touching running snapshots: reordering is a pure splice over a copy of
//! the list, keyed by that id.

use aura_core::{ActionId, DeviceId, SceneId};
use serde::{Deserialize, Serialize};

/// Action definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Send a command to a device and await acknowledgment.
    DeviceCommand(DeviceCommandAction),

    /// Dispatch a notification (fire-and-forget).
    Notify(NotifyAction),

    /// Suspend this chain for a duration.
    Delay(DelayAction),

    /// Expand a scene's own action list as a nested chain segment.
    SceneActivate(SceneActivateAction),
}

impl Action {
    /// Stable id used for reordering.
    pub fn id(&self) -> &ActionId {
        match self {
            Action::DeviceCommand(a) => &a.id,
            Action::Notify(a) => &a.id,
            Action::Delay(a) => &a.id,
            Action::SceneActivate(a) => &a.id,
        }
    }

    /// Short name of the action kind (matches the serde tag).
    pub fn kind(&self) -> &'static str {
        match self {
            Action::DeviceCommand(_) => "device_command",
            Action::Notify(_) => "notify",
            Action::Delay(_) => "delay",
            Action::SceneActivate(_) => "scene_activate",
        }
    }

    /// Whether a failure of this step must terminate the chain.
    pub fn is_critical(&self) -> bool {
        match self {
            Action::DeviceCommand(a) => a.critical,
            Action::SceneActivate(a) => a.critical,
            Action::Notify(_) | Action::Delay(_) => false,
        }
    }
}

/// Device command step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceCommandAction {
    pub id: ActionId,

    /// Device the command is addressed to.
    pub target: DeviceId,

    /// Command name understood by the adapter layer.
    pub command: String,

    /// Free-form command parameters.
    #[serde(default)]
    pub params: serde_json::Value,

    /// Stop the chain as failed when this step fails or times out.
    #[serde(default)]
    pub critical: bool,
}

/// Notification step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyAction {
    pub id: ActionId,

    pub message: String,

    /// Delivery channels; empty means the collaborator's default.
    #[serde(default)]
    pub channels: Vec<String>,
}

/// Delay step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelayAction {
    pub id: ActionId,

    /// Seconds to suspend this chain; other chains are unaffected.
    pub seconds: u64,
}

/// Scene activation step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneActivateAction {
    pub id: ActionId,

    pub scene_id: SceneId,

    /// Stop the chain as failed when the scene's segment fails.
    #[serde(default)]
    pub critical: bool,
}

/// Splice `actions` so the action with `action_id` lands at `new_index`.
///
/// Pure: returns a fresh list and leaves the input untouched, so snapshots
/// held by running chains never observe the permutation. Returns `None`
/// when the id is unknown or the index is out of bounds.
pub fn splice_by_id(actions: &[Action], action_id: &ActionId, new_index: usize) -> Option<Vec<Action>> {
    if new_index >= actions.len() {
        return None;
    }
    let from = actions.iter().position(|a| a.id() == action_id)?;

    let mut reordered = actions.to_vec();
    let action = reordered.remove(from);
    reordered.insert(new_index, action);
    Some(reordered)
}
