// ---------------------------------------------------------------------------
// records – persisted snapshot structures
// ---------------------------------------------------------------------------

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::identity::SaveId;
use crate::save_error::SaveError;
use crate::saveable::SaveableObject;
use crate::saved_value::SavedValue;
use crate::type_registry::ConvertCx;

/// Name of a scene, as used for per-scene record files.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SceneName(pub String);

impl SceneName {
    /// Scene of the persistent save manager. Always considered loaded.
    pub const MANAGER: &'static str = "SaveManager";

    pub fn manager() -> Self {
        Self(Self::MANAGER.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SceneName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SceneName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifies the template a dynamic object is instantiated from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrefabRef(pub String);

impl From<&str> for PrefabRef {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Fields common to every entity record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordHeader {
    pub id: SaveId,
    /// Groups records of one logical object (the GUID segment of the ID).
    pub association_id: String,
    pub scene: SceneName,
    pub type_name: String,
    pub record_type: String,
    pub game_object_active: bool,
    pub script_enabled: bool,
    pub position: [f32; 3],
    pub rotation: [f32; 4],
}

/// Persisted snapshot of one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub header: RecordHeader,
    /// Saved field values by field name.
    pub fields: BTreeMap<String, SavedValue>,
}

impl EntityRecord {
    pub fn id(&self) -> &SaveId {
        &self.header.id
    }

    pub fn field(&self, name: &str) -> Option<&SavedValue> {
        self.fields.get(name)
    }
}

/// Record of an entity created at runtime, plus what it was created from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicRecord {
    pub entity: EntityRecord,
    pub prefab: PrefabRef,
}

/// What a scene cache needs from the records it parks.
pub trait CachedRecord: Clone + Send + Sync + 'static {
    fn capture(object: &dyn SaveableObject, cx: &ConvertCx<'_>) -> Result<Self, SaveError>;
    fn entity(&self) -> &EntityRecord;
}

impl CachedRecord for EntityRecord {
    fn capture(object: &dyn SaveableObject, cx: &ConvertCx<'_>) -> Result<Self, SaveError> {
        object.create_snapshot(cx)
    }

    fn entity(&self) -> &EntityRecord {
        self
    }
}

impl CachedRecord for DynamicRecord {
    fn capture(object: &dyn SaveableObject, cx: &ConvertCx<'_>) -> Result<Self, SaveError> {
        let entity = object.create_snapshot(cx)?;
        let prefab = object.prefab().ok_or_else(|| SaveError::Snapshot {
            id: entity.header.id.to_string(),
            reason: "runtime object has no prefab to recreate it from".to_string(),
        })?;
        Ok(DynamicRecord { entity, prefab })
    }

    fn entity(&self) -> &EntityRecord {
        &self.entity
    }
}
