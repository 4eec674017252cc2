// ---------------------------------------------------------------------------
// save_context – the save subsystem: registry, scene caches, dynamic objects
// ---------------------------------------------------------------------------
//
// Ordering rules:
//   - capture: dynamic objects are snapshotted before scene entities
//   - apply: every dynamic object (all scenes) is created and restored
//     before any scene entity is restored
//   - scene unload: dynamics of the scene serialize before its entities
//
// Reference resolution during restore goes through a `ResolverIndex` built
// up front, so no cache is borrowed while entities are being written.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use bevy::prelude::*;

use crate::bundle_io::SaveBundle;
use crate::dynamic_objects::DynamicObjectManager;
use crate::identity::SaveId;
use crate::records::{CachedRecord, EntityRecord, SceneName};
use crate::saveable::SharedObject;
use crate::scene_cache::{RegisterOutcome, SceneCache};
use crate::scene_host::SceneHost;
use crate::type_registry::reference::ObjectResolver;
use crate::type_registry::{ConvertCx, Converter, TypeRegistry};

/// Live objects and records visible to references during a restore.
#[derive(Default)]
pub struct ResolverIndex {
    live: HashMap<SaveId, SharedObject>,
    records: HashMap<SaveId, EntityRecord>,
}

impl ResolverIndex {
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }
}

impl ObjectResolver for ResolverIndex {
    fn live(&self, id: &SaveId) -> Option<SharedObject> {
        self.live.get(id).cloned()
    }

    fn record(&self, id: &SaveId) -> Option<EntityRecord> {
        self.records.get(id).cloned()
    }
}

/// Counts from `SaveSubsystem::apply_bundle`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub destroyed: usize,
    pub created: usize,
    pub restored: usize,
}

#[derive(Resource)]
pub struct SaveSubsystem {
    registry: Arc<TypeRegistry>,
    scenes: BTreeMap<SceneName, SceneCache<EntityRecord>>,
    dynamic: DynamicObjectManager,
    is_loading: bool,
}

impl Default for SaveSubsystem {
    fn default() -> Self {
        Self::new(TypeRegistry::with_builtins())
    }
}

impl SaveSubsystem {
    pub fn new(registry: TypeRegistry) -> Self {
        let manager = SceneName::manager();
        let mut scenes = BTreeMap::new();
        scenes.insert(manager.clone(), SceneCache::new(manager));
        Self {
            registry: Arc::new(registry),
            scenes,
            dynamic: DynamicObjectManager::new(),
            is_loading: false,
        }
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// Add an explicit converter. Only possible before the registry has
    /// been shared with background work.
    pub fn register_converter<T: 'static>(&mut self, converter: Converter) -> bool {
        match Arc::get_mut(&mut self.registry) {
            Some(registry) => {
                registry.register::<T>(converter);
                true
            }
            None => {
                warn!(
                    "SaveSubsystem: registry already shared, converter for '{}' not added",
                    std::any::type_name::<T>()
                );
                false
            }
        }
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.is_loading = loading;
    }

    pub fn cache(&self, scene: &SceneName) -> Option<&SceneCache<EntityRecord>> {
        self.scenes.get(scene)
    }

    fn cache_mut(&mut self, scene: &SceneName) -> &mut SceneCache<EntityRecord> {
        self.scenes
            .entry(scene.clone())
            .or_insert_with(|| SceneCache::new(scene.clone()))
    }

    pub fn tracked_scenes(&self) -> Vec<SceneName> {
        let mut scenes: BTreeSet<SceneName> = self.scenes.keys().cloned().collect();
        scenes.extend(self.dynamic.scenes().cloned());
        scenes.into_iter().collect()
    }

    pub fn dynamic(&self) -> &DynamicObjectManager {
        &self.dynamic
    }

    pub fn dynamic_mut(&mut self) -> &mut DynamicObjectManager {
        &mut self.dynamic
    }

    /// Register a scene entity under its current scene.
    pub fn register(&mut self, object: &SharedObject) -> RegisterOutcome {
        let scene = object.scene();
        self.cache_mut(&scene).register(object)
    }

    /// Register, destroying `object` if another live instance already holds
    /// its ID.
    pub fn register_or_destroy(
        &mut self,
        object: &SharedObject,
        host: &dyn SceneHost,
    ) -> RegisterOutcome {
        let outcome = self.register(object);
        if outcome == RegisterOutcome::Duplicate {
            warn!(
                "SaveSubsystem: destroying duplicate instance of '{}'",
                object.get_or_create_id()
            );
            host.destroy(object);
        }
        outcome
    }

    pub fn unregister(&mut self, id: &SaveId) -> bool {
        for cache in self.scenes.values_mut() {
            if cache.forget(id) {
                return true;
            }
        }
        warn!("SaveSubsystem: unregister of unknown id '{id}'");
        false
    }

    pub fn unregister_all_associated(&mut self, association_id: &str) -> usize {
        self.scenes
            .values_mut()
            .map(|c| c.unregister_all_associated(association_id))
            .sum()
    }

    pub fn is_tracked(&self, id: &SaveId) -> bool {
        self.scenes.values().any(|c| c.contains(id)) || self.dynamic.is_tracked(id)
    }

    /// Live object for `id` in any scene, falling back to host scans.
    pub fn find(&self, id: &SaveId, host: &dyn SceneHost) -> Option<SharedObject> {
        self.scenes.values().find_map(|c| c.find(id, host)).or_else(|| {
            self.dynamic
                .live_objects()
                .into_iter()
                .find_map(|(k, o)| (&k == id).then_some(o))
        })
    }

    fn loaded_scenes(host: &dyn SceneHost) -> BTreeSet<SceneName> {
        let mut scenes: BTreeSet<SceneName> = host.loaded_scenes().into_iter().collect();
        scenes.insert(SceneName::manager());
        scenes
    }

    // =======================================================================
    // Scene lifecycle
    // =======================================================================

    /// The scene is about to unload: dynamics first, then scene entities.
    pub fn on_before_serialize(&mut self, scene: &SceneName) -> usize {
        let registry = Arc::clone(&self.registry);
        let cx = ConvertCx::new(&registry);
        let dynamic = self.dynamic.serialize_scene(scene, &cx);
        let statics = self.cache_mut(scene).serialize(&cx);
        debug!("SaveSubsystem: serialized '{scene}' ({dynamic} dynamic, {statics} scene)");
        dynamic + statics
    }

    /// The scene's entities exist again: recreate its runtime objects.
    pub fn on_before_restore(&mut self, scene: &SceneName, host: &dyn SceneHost) -> usize {
        self.dynamic.recreate_missing(scene, host)
    }

    /// Apply the scene's records: dynamics first, then scene entities.
    pub fn on_after_restore(&mut self, scene: &SceneName, host: &dyn SceneHost) -> usize {
        let registry = Arc::clone(&self.registry);
        let index = self.build_index(host);
        let cx = ConvertCx::with_resolver(&registry, &index);
        let dynamic = self.dynamic.restore_scene(scene, host, &cx);
        let statics = self.cache_mut(scene).restore(host, &cx);
        debug!("SaveSubsystem: restored '{scene}' ({dynamic} dynamic, {statics} scene)");
        dynamic + statics
    }

    /// Every live object and every parked record currently known.
    pub fn build_index(&self, host: &dyn SceneHost) -> ResolverIndex {
        let mut index = ResolverIndex::default();
        for scene in Self::loaded_scenes(host) {
            for object in host.loaded_objects(&scene) {
                if let Ok(id) = object.id() {
                    index.live.entry(id).or_insert(object);
                }
            }
        }
        for cache in self.scenes.values() {
            for (id, object) in cache.live_objects() {
                index.live.entry(id).or_insert(object);
            }
            if let Some(records) = cache.records() {
                for (id, record) in records {
                    index.records.insert(id.clone(), record.clone());
                }
            }
        }
        for (id, object) in self.dynamic.live_objects() {
            index.live.entry(id).or_insert(object);
        }
        for scene in self.dynamic.scenes() {
            let records = self.dynamic.cache(scene).and_then(SceneCache::records);
            for (id, record) in records.into_iter().flatten() {
                index.records.insert(id.clone(), record.entity().clone());
            }
        }
        index
    }

    // =======================================================================
    // Whole-save capture and apply
    // =======================================================================

    /// Snapshot everything into a bundle. Live objects in loaded scenes that
    /// were never registered are registered first.
    pub fn capture_bundle(&mut self, host: &dyn SceneHost) -> SaveBundle {
        for scene in Self::loaded_scenes(host) {
            for object in host.loaded_objects(&scene) {
                let id = object.get_or_create_id();
                if !self.is_tracked(&id) {
                    debug!("SaveSubsystem: registering missed entity '{id}'");
                    self.register(&object);
                }
            }
        }

        let registry = Arc::clone(&self.registry);
        let cx = ConvertCx::new(&registry);
        let dynamic = self.dynamic.snapshot_all(&cx);
        let scenes = self
            .scenes
            .iter()
            .map(|(scene, cache)| (scene.clone(), cache.snapshot(&cx)))
            .collect();
        SaveBundle { scenes, dynamic }
    }

    /// Make the world match `bundle`.
    ///
    /// 1. Live runtime objects absent from the bundle are destroyed.
    /// 2. Every cache takes the bundle's records; scenes the bundle does not
    ///    mention are cleared.
    /// 3. Missing runtime objects of loaded scenes are recreated.
    /// 4. Dynamics of every loaded scene are restored, then scene entities.
    ///
    /// Unloaded scenes keep their records until they load.
    pub fn apply_bundle(&mut self, bundle: SaveBundle, host: &dyn SceneHost) -> ApplyReport {
        let mut report = ApplyReport::default();
        let loaded = Self::loaded_scenes(host);
        let SaveBundle {
            scenes: mut static_records,
            dynamic: mut dynamic_records,
        } = bundle;

        let wanted: HashMap<SaveId, SceneName> = dynamic_records
            .iter()
            .flat_map(|(scene, records)| records.keys().map(|id| (id.clone(), scene.clone())))
            .collect();
        for (id, object) in self.dynamic.live_objects() {
            match wanted.get(&id) {
                None => {
                    host.destroy(&object);
                    self.dynamic.mark_destroyed(&id);
                    report.destroyed += 1;
                }
                Some(scene) if &object.scene() != scene => {
                    let from = object.scene();
                    self.dynamic.change_scene(&object, &from, scene, host);
                }
                Some(_) => {}
            }
        }

        let dynamic_scenes: HashSet<SceneName> = self
            .dynamic
            .scenes()
            .cloned()
            .chain(dynamic_records.keys().cloned())
            .collect();
        for scene in dynamic_scenes {
            let records = dynamic_records.remove(&scene).unwrap_or_default();
            self.dynamic.install(&scene, records);
        }
        let static_scenes: HashSet<SceneName> = self
            .scenes
            .keys()
            .cloned()
            .chain(static_records.keys().cloned())
            .collect();
        for scene in static_scenes {
            let records = static_records.remove(&scene).unwrap_or_default();
            self.cache_mut(&scene).install_records(records);
        }

        for scene in &loaded {
            report.created += self.dynamic.recreate_missing(scene, host);
        }

        let registry = Arc::clone(&self.registry);
        let index = self.build_index(host);
        let cx = ConvertCx::with_resolver(&registry, &index);
        for scene in &loaded {
            report.restored += self.dynamic.restore_scene(scene, host, &cx);
        }
        for scene in &loaded {
            if let Some(cache) = self.scenes.get_mut(scene) {
                report.restored += cache.restore(host, &cx);
            }
        }
        info!(
            "SaveSubsystem: applied bundle ({} restored, {} created, {} destroyed)",
            report.restored, report.created, report.destroyed
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::saveable::GameObject;
    use crate::scene_host::MemorySceneHost;
    use crate::test_support::{Crate, Door};

    fn host() -> MemorySceneHost {
        let mut host = MemorySceneHost::new();
        host.register_prefab(Crate::PREFAB, || SharedObject::new(Crate::default()));
        host.load_scene("Harbor");
        host
    }

    fn spawn_crate(host: &MemorySceneHost, contents: u32) -> SharedObject {
        let mut c = Crate::with_guid();
        c.go = GameObject::in_scene("Harbor");
        c.contents = contents;
        host.spawn(SharedObject::new(c))
    }

    #[test]
    fn test_manager_scene_always_present() {
        let subsystem = SaveSubsystem::default();
        assert!(subsystem.cache(&SceneName::manager()).is_some());
        let bundle = SaveSubsystem::default().capture_bundle(&MemorySceneHost::new());
        assert!(bundle.scenes.contains_key(&SceneName::manager()));
    }

    #[test]
    fn test_capture_registers_missed_entities() {
        let host = host();
        let door = host.spawn(SharedObject::new(Door::in_scene("Harbor")));
        let mut subsystem = SaveSubsystem::default();
        let bundle = subsystem.capture_bundle(&host);
        let id = door.id().unwrap();
        assert!(bundle.scenes[&SceneName::from("Harbor")].contains_key(&id));
        assert!(subsystem.is_tracked(&id));
    }

    #[test]
    fn test_duplicate_registration_destroys_second_instance() {
        let host = host();
        let mut subsystem = SaveSubsystem::default();
        let first = host.spawn(SharedObject::new(Door::in_scene("Harbor")));
        let second = host.spawn(SharedObject::new(Door::in_scene("Harbor")));
        second.write().force_id(&first.id().unwrap()).unwrap();

        assert_eq!(subsystem.register_or_destroy(&first, &host), RegisterOutcome::Registered);
        assert_eq!(subsystem.register_or_destroy(&second, &host), RegisterOutcome::Duplicate);
        assert_eq!(host.object_count(), 1);
        let found = subsystem.find(&first.id().unwrap(), &host).unwrap();
        assert!(found.ptr_eq(&first));
    }

    #[test]
    fn test_apply_destroys_dynamics_missing_from_bundle() {
        let host = host();
        let mut subsystem = SaveSubsystem::default();
        let kept = spawn_crate(&host, 1);
        subsystem.dynamic_mut().track(&kept);
        let bundle = subsystem.capture_bundle(&host);

        let extra = spawn_crate(&host, 2);
        subsystem.dynamic_mut().track(&extra);
        let report = subsystem.apply_bundle(bundle, &host);
        assert_eq!(report.destroyed, 1);
        assert_eq!(report.created, 0);
        assert!(!subsystem.is_tracked(&extra.id().unwrap()));
        assert!(subsystem.is_tracked(&kept.id().unwrap()));
        assert_eq!(host.object_count(), 1);
    }

    #[test]
    fn test_apply_recreates_missing_dynamics() {
        let host = host();
        let mut subsystem = SaveSubsystem::default();
        let original = spawn_crate(&host, 4);
        subsystem.dynamic_mut().track(&original);
        let id = original.id().unwrap();
        let bundle = subsystem.capture_bundle(&host);

        host.destroy(&original);
        subsystem.dynamic_mut().mark_destroyed(&id);
        drop(original);

        let report = subsystem.apply_bundle(bundle, &host);
        assert_eq!(report.created, 1);
        let recreated = subsystem.find(&id, &host).unwrap();
        assert_eq!(recreated.with::<Crate, _>(|c| c.contents), Some(4));
    }

    #[test]
    fn test_lifecycle_unload_and_reload() {
        let host = host();
        let mut subsystem = SaveSubsystem::default();
        let door = host.spawn(SharedObject::new(Door::in_scene("Harbor")));
        door.with_mut::<Door, _>(|d| d.label = "Quay".into());
        subsystem.register(&door);
        let id = door.id().unwrap();
        let harbor = SceneName::from("Harbor");

        subsystem.on_before_serialize(&harbor);
        host.unload_scene(&harbor);
        drop(door);
        assert_eq!(subsystem.cache(&harbor).unwrap().record_count(), 1);

        host.load_scene("Harbor");
        let reloaded = host.spawn(SharedObject::new(Door::in_scene("Harbor")));
        reloaded.write().force_id(&id).unwrap();
        assert_eq!(subsystem.register(&reloaded), RegisterOutcome::Parked);
        subsystem.on_before_restore(&harbor, &host);
        assert_eq!(subsystem.on_after_restore(&harbor, &host), 1);
        assert_eq!(reloaded.with::<Door, _>(|d| d.label.clone()).unwrap(), "Quay");
    }
}
