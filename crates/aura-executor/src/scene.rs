//! Scene resolution
//!
//! A scene is a named, reusable action list. `SceneActivate` steps expand
//! through the catalog at execution time, so editing a scene affects the
//! next activation, never a chain that is already running its expansion.

use aura_automation::Action;
use aura_core::SceneId;
use dashmap::DashMap;

/// Resolves scene identifiers to their action lists.
pub trait SceneCatalog: Send + Sync {
    /// The scene's actions, or `None` if the scene is unknown.
    fn resolve(&self, scene_id: &SceneId) -> Option<Vec<Action>>;
}

/// In-memory catalog, suitable for embedders and tests.
pub struct StaticSceneCatalog {
    scenes: DashMap<SceneId, Vec<Action>>,
}

impl StaticSceneCatalog {
    pub fn new() -> Self {
        Self {
            scenes: DashMap::new(),
        }
    }

    /// Register or replace a scene.
    pub fn insert(&self, scene_id: SceneId, actions: Vec<Action>) {
        self.scenes.insert(scene_id, actions);
    }

    /// Remove a scene.
    pub fn remove(&self, scene_id: &SceneId) {
        self.scenes.remove(scene_id);
    }
}

impl Default for StaticSceneCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneCatalog for StaticSceneCatalog {
    fn resolve(&self, scene_id: &SceneId) -> Option<Vec<Action>> {
        self.scenes.get(scene_id).map(|actions| actions.clone())
    }
}
