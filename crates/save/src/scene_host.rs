// ---------------------------------------------------------------------------
// scene_host – what the save core needs from the engine's scene management
// ---------------------------------------------------------------------------

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use bevy::prelude::*;

use crate::records::{PrefabRef, SceneName};
use crate::saveable::SharedObject;

/// Engine-side scene operations. The plugin owns one behind
/// `SceneHostResource`.
pub trait SceneHost: Send + Sync {
    /// Every live saveable object in `scene`. Used as the fallback scan.
    fn loaded_objects(&self, scene: &SceneName) -> Vec<SharedObject>;
    /// Instantiate a runtime object from its template.
    fn instantiate_prefab(&self, prefab: &PrefabRef) -> Option<SharedObject>;
    fn move_to_scene(&self, object: &SharedObject, scene: &SceneName);
    fn destroy(&self, object: &SharedObject);
    fn loaded_scenes(&self) -> Vec<SceneName>;
}

impl<H: SceneHost + ?Sized> SceneHost for Arc<H> {
    fn loaded_objects(&self, scene: &SceneName) -> Vec<SharedObject> {
        (**self).loaded_objects(scene)
    }
    fn instantiate_prefab(&self, prefab: &PrefabRef) -> Option<SharedObject> {
        (**self).instantiate_prefab(prefab)
    }
    fn move_to_scene(&self, object: &SharedObject, scene: &SceneName) {
        (**self).move_to_scene(object, scene)
    }
    fn destroy(&self, object: &SharedObject) {
        (**self).destroy(object)
    }
    fn loaded_scenes(&self) -> Vec<SceneName> {
        (**self).loaded_scenes()
    }
}

pub type PrefabFactory = Box<dyn Fn() -> SharedObject + Send + Sync>;

#[derive(Default)]
struct HostState {
    scenes: BTreeSet<SceneName>,
    objects: Vec<SharedObject>,
}

/// In-process scene host: a flat list of objects tagged by scene and a
/// table of prefab factories. Used headless and in tests.
#[derive(Default)]
pub struct MemorySceneHost {
    state: Mutex<HostState>,
    prefabs: HashMap<PrefabRef, PrefabFactory>,
}

impl MemorySceneHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_prefab(
        &mut self,
        prefab: impl Into<PrefabRef>,
        factory: impl Fn() -> SharedObject + Send + Sync + 'static,
    ) {
        let prefab = prefab.into();
        if self.prefabs.contains_key(&prefab) {
            warn!(
                "MemorySceneHost: duplicate prefab '{}', ignoring second registration",
                prefab.0
            );
            return;
        }
        self.prefabs.insert(prefab, Box::new(factory));
    }

    fn state(&self) -> std::sync::MutexGuard<'_, HostState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn load_scene(&self, scene: impl Into<SceneName>) {
        self.state().scenes.insert(scene.into());
    }

    /// Unload `scene`, dropping the host's strong handles to its objects.
    pub fn unload_scene(&self, scene: &SceneName) -> Vec<SharedObject> {
        let mut state = self.state();
        state.scenes.remove(scene);
        let (gone, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut state.objects)
            .into_iter()
            .partition(|o| &o.scene() == scene);
        state.objects = kept;
        gone
    }

    /// Add an object that already exists, e.g. a scene-authored entity.
    pub fn spawn(&self, object: SharedObject) -> SharedObject {
        self.state().objects.push(object.clone());
        object
    }

    pub fn object_count(&self) -> usize {
        self.state().objects.len()
    }
}

impl SceneHost for MemorySceneHost {
    fn loaded_objects(&self, scene: &SceneName) -> Vec<SharedObject> {
        let state = self.state();
        if !state.scenes.contains(scene) && scene != &SceneName::manager() {
            return Vec::new();
        }
        state
            .objects
            .iter()
            .filter(|o| &o.scene() == scene)
            .cloned()
            .collect()
    }

    fn instantiate_prefab(&self, prefab: &PrefabRef) -> Option<SharedObject> {
        let factory = self.prefabs.get(prefab)?;
        Some(self.spawn(factory()))
    }

    fn move_to_scene(&self, object: &SharedObject, scene: &SceneName) {
        object.write().set_scene(scene.clone());
    }

    fn destroy(&self, object: &SharedObject) {
        self.state().objects.retain(|o| !o.ptr_eq(object));
    }

    fn loaded_scenes(&self) -> Vec<SceneName> {
        self.state().scenes.iter().cloned().collect()
    }
}
