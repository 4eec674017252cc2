// ---------------------------------------------------------------------------
// dynamic_objects – entities created at runtime
// ---------------------------------------------------------------------------
//
// Runtime-created entities are not part of any scene file, so a load has to
// recreate them from their prefab before their records can be applied. They
// are tracked per scene with the same Loaded/Unloaded cache as scene
// entities, keyed by the scene they currently live in.

use std::collections::BTreeMap;

use bevy::prelude::*;

use crate::identity::SaveId;
use crate::records::{DynamicRecord, SceneName};
use crate::saveable::SharedObject;
use crate::scene_cache::{RegisterOutcome, SceneCache};
use crate::scene_host::SceneHost;
use crate::type_registry::ConvertCx;

pub type DynamicScenes = BTreeMap<SceneName, BTreeMap<SaveId, DynamicRecord>>;

#[derive(Default)]
pub struct DynamicObjectManager {
    scenes: BTreeMap<SceneName, SceneCache<DynamicRecord>>,
}

impl DynamicObjectManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn cache_mut(&mut self, scene: &SceneName) -> &mut SceneCache<DynamicRecord> {
        self.scenes
            .entry(scene.clone())
            .or_insert_with(|| SceneCache::new(scene.clone()))
    }

    pub fn cache(&self, scene: &SceneName) -> Option<&SceneCache<DynamicRecord>> {
        self.scenes.get(scene)
    }

    pub fn scenes(&self) -> impl Iterator<Item = &SceneName> {
        self.scenes.keys()
    }

    /// Start tracking a runtime-created object under its current scene.
    pub fn track(&mut self, object: &SharedObject) -> RegisterOutcome {
        let scene = object.scene();
        self.cache_mut(&scene).register(object)
    }

    /// Instantiate the record's prefab, give it the record's ID, put it in
    /// the record's scene and track it. `None` (logged) if the prefab cannot
    /// be resolved or the ID cannot be applied.
    pub fn create_from_record(
        &mut self,
        id: &SaveId,
        record: &DynamicRecord,
        host: &dyn SceneHost,
    ) -> Option<SharedObject> {
        let Some(object) = host.instantiate_prefab(&record.prefab) else {
            error!(
                "DynamicObjects: cannot resolve prefab '{}' for '{id}'",
                record.prefab.0
            );
            return None;
        };
        if let Err(e) = object.write().force_id(id) {
            error!("DynamicObjects: cannot apply id '{id}' to new instance: {e}");
            host.destroy(&object);
            return None;
        }
        let scene = &record.entity.header.scene;
        host.move_to_scene(&object, scene);
        object.write().set_scene(scene.clone());
        match self.cache_mut(scene).register(&object) {
            RegisterOutcome::Duplicate => {
                host.destroy(&object);
                None
            }
            _ => Some(object),
        }
    }

    /// Forget every trace of `id`, live or recorded, so no later save or
    /// load brings it back. Returns whether anything was tracked.
    pub fn mark_destroyed(&mut self, id: &SaveId) -> bool {
        let mut found = false;
        for cache in self.scenes.values_mut() {
            found |= cache.forget(id);
        }
        if !found {
            debug!("DynamicObjects: '{id}' destroyed but was not tracked");
        }
        found
    }

    /// Move a tracked object between two loaded scenes. Identity is kept.
    pub fn change_scene(
        &mut self,
        object: &SharedObject,
        from: &SceneName,
        to: &SceneName,
        host: &dyn SceneHost,
    ) -> bool {
        let loaded = |s: &SceneName| self.scenes.get(s).map_or(true, SceneCache::is_loaded);
        if !loaded(from) || !loaded(to) {
            warn!("DynamicObjects: cannot move object from '{from}' to '{to}', both scenes must be loaded");
            return false;
        }
        let id = object.get_or_create_id();
        if !self.cache_mut(from).forget(&id) {
            warn!("DynamicObjects: '{id}' is not tracked in '{from}'");
            return false;
        }
        host.move_to_scene(object, to);
        object.write().set_scene(to.clone());
        !matches!(self.cache_mut(to).register(object), RegisterOutcome::Duplicate)
    }

    /// Records for every scene without changing state.
    pub fn snapshot_all(&self, cx: &ConvertCx<'_>) -> DynamicScenes {
        self.scenes
            .iter()
            .map(|(scene, cache)| (scene.clone(), cache.snapshot(cx)))
            .collect()
    }

    pub fn serialize_scene(&mut self, scene: &SceneName, cx: &ConvertCx<'_>) -> usize {
        self.cache_mut(scene).serialize(cx)
    }

    /// Recreate every recorded object of an unloaded scene that has no live
    /// instance yet. Returns how many were created.
    pub fn recreate_missing(&mut self, scene: &SceneName, host: &dyn SceneHost) -> usize {
        let Some(records) = self.scenes.get(scene).and_then(SceneCache::records) else {
            return 0;
        };
        let live: Vec<SaveId> = self.scenes[scene]
            .live_objects()
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        let missing: Vec<(SaveId, DynamicRecord)> = records
            .iter()
            .filter(|(id, _)| !live.contains(id))
            .map(|(id, r)| (id.clone(), r.clone()))
            .collect();
        missing
            .iter()
            .filter(|(id, record)| self.create_from_record(id, record, host).is_some())
            .count()
    }

    pub fn restore_scene(
        &mut self,
        scene: &SceneName,
        host: &dyn SceneHost,
        cx: &ConvertCx<'_>,
    ) -> usize {
        self.cache_mut(scene).restore(host, cx)
    }

    /// Replace the records of `scene`; live objects stay pending.
    pub fn install(&mut self, scene: &SceneName, records: BTreeMap<SaveId, DynamicRecord>) {
        self.cache_mut(scene).install_records(records);
    }

    /// Every tracked live object, across scenes.
    pub fn live_objects(&self) -> Vec<(SaveId, SharedObject)> {
        self.scenes
            .values()
            .flat_map(SceneCache::live_objects)
            .collect()
    }

    pub fn is_tracked(&self, id: &SaveId) -> bool {
        self.scenes.values().any(|c| c.contains(id))
    }
}
