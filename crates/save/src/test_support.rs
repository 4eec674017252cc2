//! Small saveable types shared by the unit tests.

use std::collections::HashMap;

use crate::identity::{SaveId, UniqueId};
use crate::records::{EntityRecord, PrefabRef};
use crate::saveable::{GameObject, SaveableEntity, SharedObject};
use crate::type_registry::reference::{ObjectResolver, RecordTag};
use crate::SaveFields;

#[derive(Default, SaveFields)]
pub struct Door {
    #[save(skip)]
    pub uid: UniqueId,
    #[save(skip)]
    pub go: GameObject,
    pub open: bool,
    pub label: String,
}

impl Door {
    pub fn with_guid() -> Self {
        Self {
            uid: UniqueId::generate(),
            ..Default::default()
        }
    }

    pub fn in_scene(scene: &str) -> Self {
        Self {
            uid: UniqueId::generate(),
            go: GameObject::in_scene(scene),
            ..Default::default()
        }
    }
}

impl SaveableEntity for Door {
    const TYPE_NAME: &'static str = "Door";
    const RECORD_TYPE: &'static str = "DoorRecord";

    fn unique_id(&self) -> &UniqueId {
        &self.uid
    }
    fn unique_id_mut(&mut self) -> &mut UniqueId {
        &mut self.uid
    }
    fn game_object(&self) -> &GameObject {
        &self.go
    }
    fn game_object_mut(&mut self) -> &mut GameObject {
        &mut self.go
    }
}

pub struct DoorRecordTag;

impl RecordTag for DoorRecordTag {
    const RECORD_TYPE: Option<&'static str> = Some("DoorRecord");
}

/// Runtime-created prop.
#[derive(Default, SaveFields)]
pub struct Crate {
    #[save(skip)]
    pub uid: UniqueId,
    #[save(skip)]
    pub go: GameObject,
    pub contents: u32,
}

impl Crate {
    pub const PREFAB: &'static str = "props/crate";

    pub fn with_guid() -> Self {
        Self {
            uid: UniqueId::generate(),
            ..Default::default()
        }
    }
}

impl SaveableEntity for Crate {
    const TYPE_NAME: &'static str = "Crate";

    fn unique_id(&self) -> &UniqueId {
        &self.uid
    }
    fn unique_id_mut(&mut self) -> &mut UniqueId {
        &mut self.uid
    }
    fn game_object(&self) -> &GameObject {
        &self.go
    }
    fn game_object_mut(&mut self) -> &mut GameObject {
        &mut self.go
    }
    fn prefab(&self) -> Option<PrefabRef> {
        Some(PrefabRef::from(Self::PREFAB))
    }
}

#[derive(Default, SaveFields)]
pub struct Pedestal {
    #[save(skip)]
    pub uid: UniqueId,
    #[save(skip)]
    pub go: GameObject,
}

impl SaveableEntity for Pedestal {
    const TYPE_NAME: &'static str = "Pedestal";
    const SINGLETON: bool = true;

    fn unique_id(&self) -> &UniqueId {
        &self.uid
    }
    fn unique_id_mut(&mut self) -> &mut UniqueId {
        &mut self.uid
    }
    fn game_object(&self) -> &GameObject {
        &self.go
    }
    fn game_object_mut(&mut self) -> &mut GameObject {
        &mut self.go
    }
}

#[derive(Default)]
pub struct MapResolver {
    pub live: HashMap<SaveId, SharedObject>,
    pub records: HashMap<SaveId, EntityRecord>,
}

impl MapResolver {
    pub fn with_live(objects: &[SharedObject]) -> Self {
        let mut resolver = Self::default();
        for obj in objects {
            if let Ok(id) = obj.id() {
                resolver.live.insert(id, obj.clone());
            }
        }
        resolver
    }

    pub fn with_records(records: &[EntityRecord]) -> Self {
        let mut resolver = Self::default();
        for record in records {
            resolver.records.insert(record.header.id.clone(), record.clone());
        }
        resolver
    }
}

impl ObjectResolver for MapResolver {
    fn live(&self, id: &SaveId) -> Option<SharedObject> {
        self.live.get(id).cloned()
    }

    fn record(&self, id: &SaveId) -> Option<EntityRecord> {
        self.records.get(id).cloned()
    }
}
