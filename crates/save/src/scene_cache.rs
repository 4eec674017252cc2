// ---------------------------------------------------------------------------
// scene_cache – per-scene map of saveable entities, live or recorded
// ---------------------------------------------------------------------------
//
// A scene is either Loaded (weak handles to live entities) or Unloaded
// (records of those entities), never both. `serialize` moves Loaded to
// Unloaded; `restore` moves Unloaded back to Loaded, applying each record to
// the live entity that now carries its ID. Registrations arriving while the
// scene is Unloaded are parked and become the live map on restore.

use std::collections::{BTreeMap, HashMap};

use bevy::prelude::*;

use crate::identity::SaveId;
use crate::records::{CachedRecord, SceneName};
use crate::saveable::{SharedObject, WeakObject};
use crate::scene_host::SceneHost;
use crate::type_registry::ConvertCx;

/// Result of `SceneCache::register`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    Registered,
    /// The same instance was already registered.
    AlreadyRegistered,
    /// Replaced a dead handle under the same ID.
    Reattached,
    /// A different live instance already holds the ID; nothing changed.
    Duplicate,
    /// The scene is unloaded; the entity waits for the next restore.
    Parked,
}

#[derive(Clone)]
pub enum CacheState<R> {
    Loaded { live: HashMap<SaveId, WeakObject> },
    Unloaded { records: BTreeMap<SaveId, R> },
}

pub struct SceneCache<R> {
    scene: SceneName,
    state: CacheState<R>,
    pending: HashMap<SaveId, WeakObject>,
}

fn insert_handle(
    map: &mut HashMap<SaveId, WeakObject>,
    id: SaveId,
    object: &SharedObject,
) -> Result<bool, SaveId> {
    match map.get(&id).map(WeakObject::upgrade) {
        Some(Some(existing)) if existing.ptr_eq(object) => Ok(false),
        Some(Some(_)) => Err(id),
        Some(None) => {
            map.insert(id, object.downgrade());
            Ok(true)
        }
        None => {
            map.insert(id, object.downgrade());
            Ok(false)
        }
    }
}

impl<R: CachedRecord> SceneCache<R> {
    pub fn new(scene: SceneName) -> Self {
        Self {
            scene,
            state: CacheState::Loaded {
                live: HashMap::new(),
            },
            pending: HashMap::new(),
        }
    }

    pub fn scene(&self) -> &SceneName {
        &self.scene
    }

    pub fn state(&self) -> &CacheState<R> {
        &self.state
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.state, CacheState::Loaded { .. })
    }

    /// Track `object`, generating its ID if needed.
    pub fn register(&mut self, object: &SharedObject) -> RegisterOutcome {
        let id = object.get_or_create_id();
        let (map, fresh) = match &mut self.state {
            CacheState::Loaded { live } => (live, RegisterOutcome::Registered),
            CacheState::Unloaded { .. } => (&mut self.pending, RegisterOutcome::Parked),
        };
        let was_present = map.contains_key(&id);
        match insert_handle(map, id, object) {
            Ok(true) => RegisterOutcome::Reattached,
            Ok(false) if was_present => RegisterOutcome::AlreadyRegistered,
            Ok(false) => fresh,
            Err(id) => {
                warn!(
                    "SceneCache[{}]: duplicate registration for '{id}', keeping the first instance",
                    self.scene
                );
                RegisterOutcome::Duplicate
            }
        }
    }

    /// Drop `id` from every map of this cache. Returns whether it was known.
    pub fn forget(&mut self, id: &SaveId) -> bool {
        let tracked = match &mut self.state {
            CacheState::Loaded { live } => live.remove(id).is_some(),
            CacheState::Unloaded { records } => records.remove(id).is_some(),
        };
        self.pending.remove(id).is_some() || tracked
    }

    /// Stop tracking `id`. Returns false (with a warning) if it was unknown.
    pub fn unregister(&mut self, id: &SaveId) -> bool {
        let removed = self.forget(id);
        if !removed {
            warn!(
                "SceneCache[{}]: unregister of unknown id '{id}'",
                self.scene
            );
        }
        removed
    }

    /// Drop every entry, live or recorded, whose association ID matches.
    /// Returns how many IDs were dropped.
    pub fn unregister_all_associated(&mut self, association_id: &str) -> usize {
        let matches = |id: &SaveId| id.association_id() == association_id;
        let before = self.len() + self.pending.len();
        match &mut self.state {
            CacheState::Loaded { live } => live.retain(|id, _| !matches(id)),
            CacheState::Unloaded { records } => records.retain(|id, _| !matches(id)),
        }
        self.pending.retain(|id, _| !matches(id));
        before - (self.len() + self.pending.len())
    }

    /// Records for every tracked entity without changing state. Live
    /// entities are snapshotted; failures are logged and left out.
    pub fn snapshot(&self, cx: &ConvertCx<'_>) -> BTreeMap<SaveId, R> {
        match &self.state {
            CacheState::Unloaded { records } => records.clone(),
            CacheState::Loaded { live } => {
                let mut out = BTreeMap::new();
                for (id, handle) in live {
                    let Some(object) = handle.upgrade() else {
                        continue;
                    };
                    let guard = object.read();
                    if guard.skip_save() {
                        continue;
                    }
                    match R::capture(guard.as_ref(), cx) {
                        Ok(record) => {
                            out.insert(id.clone(), record);
                        }
                        Err(e) => error!(
                            "SceneCache[{}]: snapshot of '{id}' failed, skipping: {e}",
                            self.scene
                        ),
                    }
                }
                out
            }
        }
    }

    /// Loaded -> Unloaded. Returns the number of records kept.
    pub fn serialize(&mut self, cx: &ConvertCx<'_>) -> usize {
        if !self.is_loaded() {
            debug!("SceneCache[{}]: already serialized", self.scene);
            return self.len();
        }
        let records = self.snapshot(cx);
        let count = records.len();
        self.state = CacheState::Unloaded { records };
        count
    }

    /// Replace whatever the cache holds with `records`. Live entities are
    /// kept as pending so the next `restore` can apply to them.
    pub fn install_records(&mut self, records: BTreeMap<SaveId, R>) {
        let previous = std::mem::replace(&mut self.state, CacheState::Unloaded { records });
        if let CacheState::Loaded { live } = previous {
            for (id, handle) in live {
                if handle.is_alive() {
                    self.pending.entry(id).or_insert(handle);
                }
            }
        }
    }

    /// Unloaded -> Loaded. Each record is applied to the live entity with
    /// its ID (pending registrations first, then a host scan). Records with
    /// no live entity are dropped; records never spawn entities.
    /// Returns the number of entities restored.
    pub fn restore(&mut self, host: &dyn SceneHost, cx: &ConvertCx<'_>) -> usize {
        let records = match std::mem::replace(
            &mut self.state,
            CacheState::Loaded {
                live: HashMap::new(),
            },
        ) {
            CacheState::Unloaded { records } => records,
            loaded @ CacheState::Loaded { .. } => {
                debug!("SceneCache[{}]: already loaded", self.scene);
                self.state = loaded;
                return 0;
            }
        };

        let mut live: HashMap<SaveId, WeakObject> = self
            .pending
            .drain()
            .filter(|(_, handle)| handle.is_alive())
            .collect();
        let mut scanned: Option<HashMap<SaveId, SharedObject>> = None;
        let mut restored = 0;

        for (id, record) in &records {
            let object = match live.get(id).and_then(WeakObject::upgrade) {
                Some(object) => object,
                None => {
                    let scan = scanned.get_or_insert_with(|| scan_scene(host, &self.scene));
                    match scan.get(id) {
                        Some(object) => {
                            live.insert(id.clone(), object.downgrade());
                            object.clone()
                        }
                        None => {
                            debug!(
                                "SceneCache[{}]: no live entity for '{id}', record dropped",
                                self.scene
                            );
                            continue;
                        }
                    }
                }
            };
            let result = object.write().load_from_snapshot(record.entity(), cx);
            match result {
                Ok(()) => restored += 1,
                Err(e) => error!(
                    "SceneCache[{}]: restore of '{id}' failed, skipping: {e}",
                    self.scene
                ),
            }
        }

        self.state = CacheState::Loaded { live };
        restored
    }

    /// Live entity for `id`, falling back to a scan of the host's scene.
    pub fn find(&self, id: &SaveId, host: &dyn SceneHost) -> Option<SharedObject> {
        let tracked = match &self.state {
            CacheState::Loaded { live } => live.get(id),
            CacheState::Unloaded { .. } => self.pending.get(id),
        };
        if let Some(object) = tracked.and_then(WeakObject::upgrade) {
            return Some(object);
        }
        host.loaded_objects(&self.scene)
            .into_iter()
            .find(|o| o.id().as_ref() == Ok(id))
    }

    pub fn contains(&self, id: &SaveId) -> bool {
        match &self.state {
            CacheState::Loaded { live } => live.contains_key(id),
            CacheState::Unloaded { records } => {
                records.contains_key(id) || self.pending.contains_key(id)
            }
        }
    }

    /// Tracked live entities, dead handles skipped.
    pub fn live_objects(&self) -> Vec<(SaveId, SharedObject)> {
        let map = match &self.state {
            CacheState::Loaded { live } => live,
            CacheState::Unloaded { .. } => &self.pending,
        };
        map.iter()
            .filter_map(|(id, h)| h.upgrade().map(|o| (id.clone(), o)))
            .collect()
    }

    pub fn records(&self) -> Option<&BTreeMap<SaveId, R>> {
        match &self.state {
            CacheState::Unloaded { records } => Some(records),
            CacheState::Loaded { .. } => None,
        }
    }

    /// Entries in the current state's map.
    pub fn len(&self) -> usize {
        match &self.state {
            CacheState::Loaded { live } => live.len(),
            CacheState::Unloaded { records } => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn live_count(&self) -> usize {
        match &self.state {
            CacheState::Loaded { live } => live.len(),
            CacheState::Unloaded { .. } => 0,
        }
    }

    pub fn record_count(&self) -> usize {
        self.records().map_or(0, BTreeMap::len)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

fn scan_scene(host: &dyn SceneHost, scene: &SceneName) -> HashMap<SaveId, SharedObject> {
    host.loaded_objects(scene)
        .into_iter()
        .filter_map(|o| o.id().ok().map(|id| (id, o)))
        .collect()
}
