//! Scene registry with atomic get-or-create
//!
//! Lookups and lazy creation go through the `DashMap` entry API, so two
//! callers racing on the same unknown id always end up with the same
//! `Arc<Scene>`.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use dss_protocol::{GroupId, SceneId, ZoneId};

use crate::scene::Scene;

/// Result of offering a scene to [`SceneRegistry::add`]
#[derive(Debug, Clone)]
pub enum Admission {
    /// The scene was not callable and was ignored
    Rejected,
    /// The scene was new and has been stored
    Inserted(Arc<Scene>),
    /// A scene with this id existed and took over the offered metadata
    Updated {
        scene: Arc<Scene>,
        became_callable: bool,
    },
}

impl Admission {
    /// Whether the registry now holds a callable scene it did not have before
    pub fn is_new_callable(&self) -> bool {
        match self {
            Admission::Rejected => false,
            Admission::Inserted(_) => true,
            Admission::Updated {
                became_callable, ..
            } => *became_callable,
        }
    }

    pub fn scene(&self) -> Option<&Arc<Scene>> {
        match self {
            Admission::Rejected => None,
            Admission::Inserted(scene) | Admission::Updated { scene, .. } => Some(scene),
        }
    }
}

/// Owns the mapping of scene ids to scenes
#[derive(Debug, Default)]
pub struct SceneRegistry {
    scenes: DashMap<SceneId, Arc<Scene>>,
}

impl SceneRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the scene for `id`, creating a provisional one if absent
    pub fn get(&self, id: &SceneId) -> Arc<Scene> {
        self.get_or_insert_with(id, || Scene::provisional(id.clone())).0
    }

    /// Store `scene` unless its id is already known
    ///
    /// Returns the registered instance and whether `scene` was inserted.
    pub fn get_or_insert(&self, scene: Scene) -> (Arc<Scene>, bool) {
        let id = scene.id().clone();
        self.get_or_insert_with(&id, move || scene)
    }

    fn get_or_insert_with(&self, id: &SceneId, make: impl FnOnce() -> Scene) -> (Arc<Scene>, bool) {
        match self.scenes.entry(id.clone()) {
            Entry::Occupied(entry) => (Arc::clone(entry.get()), false),
            Entry::Vacant(entry) => {
                let scene = Arc::new(make());
                entry.insert(Arc::clone(&scene));
                tracing::trace!("Registered scene {}", id);
                (scene, true)
            }
        }
    }

    /// Add a callable scene
    ///
    /// Non-callable scenes are ignored. When the id already exists the
    /// registered instance is kept and updated in place.
    pub fn add(&self, scene: Scene) -> Admission {
        if !scene.is_callable() {
            tracing::debug!("Ignoring non-callable scene {}", scene.id());
            return Admission::Rejected;
        }

        match self.scenes.entry(scene.id().clone()) {
            Entry::Occupied(entry) => {
                let existing = Arc::clone(entry.get());
                let became_callable = existing.merge_from(&scene);
                Admission::Updated {
                    scene: existing,
                    became_callable,
                }
            }
            Entry::Vacant(entry) => {
                let scene = Arc::new(scene);
                entry.insert(Arc::clone(&scene));
                Admission::Inserted(scene)
            }
        }
    }

    /// Look up a scene without creating it
    pub fn find(&self, id: &SceneId) -> Option<Arc<Scene>> {
        self.scenes.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Remove a scene; a later `get` creates a fresh provisional scene
    pub fn remove(&self, id: &SceneId) -> Option<Arc<Scene>> {
        self.scenes.remove(id).map(|(_, scene)| scene)
    }

    pub fn contains(&self, id: &SceneId) -> bool {
        self.scenes.contains_key(id)
    }

    /// Snapshot of all registered scenes, sorted by id
    pub fn list(&self) -> Vec<Arc<Scene>> {
        let mut scenes: Vec<_> = self
            .scenes
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        scenes.sort_by(|a, b| a.id().cmp(b.id()));
        scenes
    }

    /// Scenes addressing exactly this zone/group pair
    pub fn scenes_in(&self, zone: ZoneId, group: GroupId) -> Vec<Arc<Scene>> {
        self.scenes
            .iter()
            .filter(|entry| {
                let scene = entry.value();
                scene.zone() == Some(zone) && scene.group() == Some(group)
            })
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }
}
