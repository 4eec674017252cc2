// ---------------------------------------------------------------------------
// saveable – the entity contract and shared handles to live entities
// ---------------------------------------------------------------------------
//
// Gameplay types implement `SaveableEntity` (plus `SaveFields`, usually
// derived). Caches, the dynamic object manager and references only ever see
// the type-erased `SaveableObject` behind a `SharedObject`, which is what the
// scene host hands out for live objects.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::{
    Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, TryLockError, Weak,
};

use bevy::math::{Quat, Vec3};

use crate::field_engine::{capture_fields, restore_fields, SaveFields};
use crate::identity::{compose_id, IdentityError, SaveId, UniqueId};
use crate::records::{EntityRecord, PrefabRef, RecordHeader, SceneName};
use crate::save_error::SaveError;
use crate::type_registry::ConvertCx;

/// Engine-side state every saveable entity carries: where it lives and
/// whether it is switched on.
#[derive(Debug, Clone, PartialEq)]
pub struct GameObject {
    pub scene: SceneName,
    pub active: bool,
    /// The entity's own behaviour toggle, separate from `active`.
    pub enabled: bool,
    pub position: Vec3,
    pub rotation: Quat,
}

impl GameObject {
    pub fn in_scene(scene: impl Into<SceneName>) -> Self {
        Self {
            scene: scene.into(),
            ..Default::default()
        }
    }
}

impl Default for GameObject {
    fn default() -> Self {
        Self {
            scene: SceneName::manager(),
            active: true,
            enabled: true,
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }
}

/// Contract a gameplay type implements to take part in saving.
pub trait SaveableEntity: SaveFields + Send + Sync + 'static {
    /// Stable name used in IDs and in saved references.
    const TYPE_NAME: &'static str;
    /// Name of the record family this type snapshots into.
    const RECORD_TYPE: &'static str = "EntityRecord";
    /// Singletons are identified by their type name alone.
    const SINGLETON: bool = false;

    fn unique_id(&self) -> &UniqueId;
    fn unique_id_mut(&mut self) -> &mut UniqueId;
    fn game_object(&self) -> &GameObject;
    fn game_object_mut(&mut self) -> &mut GameObject;

    fn skip_save(&self) -> bool {
        false
    }

    /// Template to re-instantiate from, for entities created at runtime.
    fn prefab(&self) -> Option<PrefabRef> {
        None
    }

    /// Hook for data the field engine cannot see.
    fn after_snapshot(&self, _record: &mut EntityRecord) {}

    fn after_restore(&mut self, _record: &EntityRecord) {}
}

/// Type-erased view of a `SaveableEntity`.
pub trait SaveableObject: Send + Sync + 'static {
    /// Fails if a non-singleton has not been given a GUID yet.
    fn id(&self) -> Result<SaveId, IdentityError>;
    /// Generates and stores a GUID on first call.
    fn get_or_create_id(&mut self) -> SaveId;
    /// Adopt `id`, used when recreating an object from its record.
    fn force_id(&mut self, id: &SaveId) -> Result<(), IdentityError>;
    fn type_name(&self) -> &'static str;
    fn record_type(&self) -> &'static str;
    fn scene(&self) -> SceneName;
    fn set_scene(&mut self, scene: SceneName);
    fn skip_save(&self) -> bool;
    fn prefab(&self) -> Option<PrefabRef>;
    fn create_snapshot(&self, cx: &ConvertCx<'_>) -> Result<EntityRecord, SaveError>;
    fn load_from_snapshot(
        &mut self,
        record: &EntityRecord,
        cx: &ConvertCx<'_>,
    ) -> Result<(), SaveError>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: SaveableEntity> SaveableObject for T {
    fn id(&self) -> Result<SaveId, IdentityError> {
        compose_id(T::TYPE_NAME, T::SINGLETON, self.unique_id())
    }

    fn get_or_create_id(&mut self) -> SaveId {
        if T::SINGLETON {
            return SaveId::singleton(T::TYPE_NAME);
        }
        SaveId::new(T::TYPE_NAME, self.unique_id_mut().get_or_create())
    }

    fn force_id(&mut self, id: &SaveId) -> Result<(), IdentityError> {
        if T::SINGLETON {
            return if id.as_str() == T::TYPE_NAME {
                Ok(())
            } else {
                Err(IdentityError::MalformedId {
                    id: id.to_string(),
                })
            };
        }
        let guid = id.guid().ok_or_else(|| IdentityError::MalformedId {
            id: id.to_string(),
        })?;
        self.unique_id_mut().set(guid);
        Ok(())
    }

    fn type_name(&self) -> &'static str {
        T::TYPE_NAME
    }

    fn record_type(&self) -> &'static str {
        T::RECORD_TYPE
    }

    fn scene(&self) -> SceneName {
        self.game_object().scene.clone()
    }

    fn set_scene(&mut self, scene: SceneName) {
        self.game_object_mut().scene = scene;
    }

    fn skip_save(&self) -> bool {
        SaveableEntity::skip_save(self)
    }

    fn prefab(&self) -> Option<PrefabRef> {
        SaveableEntity::prefab(self)
    }

    fn create_snapshot(&self, cx: &ConvertCx<'_>) -> Result<EntityRecord, SaveError> {
        let id = SaveableObject::id(self)?;
        let go = self.game_object();
        let mut record = EntityRecord {
            header: RecordHeader {
                association_id: id.association_id(),
                id,
                scene: go.scene.clone(),
                type_name: T::TYPE_NAME.to_string(),
                record_type: T::RECORD_TYPE.to_string(),
                game_object_active: go.active,
                script_enabled: go.enabled,
                position: go.position.to_array(),
                rotation: go.rotation.to_array(),
            },
            fields: capture_fields(self, cx),
        };
        self.after_snapshot(&mut record);
        Ok(record)
    }

    fn load_from_snapshot(
        &mut self,
        record: &EntityRecord,
        cx: &ConvertCx<'_>,
    ) -> Result<(), SaveError> {
        let header = &record.header;
        if header.type_name != T::TYPE_NAME {
            return Err(SaveError::Restore {
                id: header.id.to_string(),
                reason: format!(
                    "record is for type '{}', entity is '{}'",
                    header.type_name,
                    T::TYPE_NAME
                ),
            });
        }
        if !T::SINGLETON && !self.unique_id().is_assigned() {
            self.force_id(&header.id)?;
        }
        let go = self.game_object_mut();
        go.active = header.game_object_active;
        go.enabled = header.script_enabled;
        go.position = Vec3::from_array(header.position);
        go.rotation = Quat::from_array(header.rotation);
        restore_fields(self, &record.fields, cx);
        self.after_restore(record);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ---------------------------------------------------------------------------
// Shared handles
// ---------------------------------------------------------------------------

struct ObjectSlot {
    type_id: TypeId,
    type_name: &'static str,
    record_type: &'static str,
    inner: RwLock<Box<dyn SaveableObject>>,
}

/// Strong handle to a live saveable object. Cloning shares the object.
#[derive(Clone)]
pub struct SharedObject(Arc<ObjectSlot>);

/// Weak handle held by scene caches; does not keep the object alive.
#[derive(Clone)]
pub struct WeakObject(Weak<ObjectSlot>);

impl SharedObject {
    pub fn new<T: SaveableEntity>(entity: T) -> Self {
        Self(Arc::new(ObjectSlot {
            type_id: TypeId::of::<T>(),
            type_name: T::TYPE_NAME,
            record_type: T::RECORD_TYPE,
            inner: RwLock::new(Box::new(entity)),
        }))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Box<dyn SaveableObject>> {
        self.0.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Box<dyn SaveableObject>> {
        self.0.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// `None` while the object is being written, e.g. mid-restore.
    pub fn try_read(&self) -> Option<RwLockReadGuard<'_, Box<dyn SaveableObject>>> {
        match self.0.inner.try_read() {
            Ok(guard) => Some(guard),
            Err(TryLockError::Poisoned(p)) => Some(p.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    /// Run `f` on the object if it is a `T`.
    pub fn with<T: SaveableEntity, U>(&self, f: impl FnOnce(&T) -> U) -> Option<U> {
        let guard = self.read();
        guard.as_any().downcast_ref::<T>().map(f)
    }

    pub fn with_mut<T: SaveableEntity, U>(&self, f: impl FnOnce(&mut T) -> U) -> Option<U> {
        let mut guard = self.write();
        guard.as_any_mut().downcast_mut::<T>().map(f)
    }

    pub fn is<T: 'static>(&self) -> bool {
        self.0.type_id == TypeId::of::<T>()
    }

    pub fn type_name(&self) -> &'static str {
        self.0.type_name
    }

    pub fn record_type(&self) -> &'static str {
        self.0.record_type
    }

    pub fn id(&self) -> Result<SaveId, IdentityError> {
        self.read().id()
    }

    pub fn get_or_create_id(&self) -> SaveId {
        self.write().get_or_create_id()
    }

    pub fn scene(&self) -> SceneName {
        self.read().scene()
    }

    /// Snapshot without blocking. `None` if the object is locked.
    pub fn try_snapshot(&self, cx: &ConvertCx<'_>) -> Option<Result<EntityRecord, SaveError>> {
        self.try_read().map(|guard| guard.create_snapshot(cx))
    }

    pub fn ptr_eq(&self, other: &SharedObject) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn downgrade(&self) -> WeakObject {
        WeakObject(Arc::downgrade(&self.0))
    }
}

impl fmt::Debug for SharedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SharedObject").field(&self.0.type_name).finish()
    }
}

impl WeakObject {
    pub fn upgrade(&self) -> Option<SharedObject> {
        self.0.upgrade().map(SharedObject)
    }

    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Door, Pedestal};
    use crate::type_registry::TypeRegistry;

    #[test]
    fn test_id_before_guid_fails_loudly() {
        let door = Door::default();
        let err = SaveableObject::id(&door).unwrap_err();
        let msg = format!("{err}");
        assert!(msg.contains("Door"), "got: {msg}");
    }

    #[test]
    fn test_get_or_create_id_is_stable() {
        let mut door = Door::default();
        let first = door.get_or_create_id();
        let second = door.get_or_create_id();
        assert_eq!(first, second);
        assert_eq!(SaveableObject::id(&door).unwrap(), first);
        assert!(first.as_str().starts_with("Door_"));
    }

    #[test]
    fn test_singleton_id() {
        let mut pedestal = Pedestal::default();
        assert_eq!(SaveableObject::id(&pedestal).unwrap().as_str(), "Pedestal");
        assert_eq!(pedestal.get_or_create_id().as_str(), "Pedestal");
    }

    #[test]
    fn test_snapshot_restores_into_fresh_instance() {
        let registry = TypeRegistry::with_builtins();
        let cx = ConvertCx::new(&registry);
        let mut door = Door::with_guid();
        door.open = true;
        door.label = "North".into();
        door.go.position = Vec3::new(1.0, 2.0, 3.0);
        door.go.enabled = false;
        let record = door.create_snapshot(&cx).unwrap();
        assert_eq!(record.header.association_id, door.uid.guid().unwrap().to_string());

        let mut fresh = Door::default();
        fresh.load_from_snapshot(&record, &cx).unwrap();
        assert_eq!(SaveableObject::id(&fresh).unwrap(), SaveableObject::id(&door).unwrap());
        assert!(fresh.open);
        assert_eq!(fresh.label, "North");
        assert_eq!(fresh.go.position, Vec3::new(1.0, 2.0, 3.0));
        assert!(!fresh.go.enabled);
    }

    #[test]
    fn test_restore_rejects_foreign_record() {
        let registry = TypeRegistry::with_builtins();
        let cx = ConvertCx::new(&registry);
        let record = Pedestal::default().create_snapshot(&cx).unwrap();
        let err = Door::default().load_from_snapshot(&record, &cx).unwrap_err();
        assert!(matches!(err, SaveError::Restore { .. }));
    }

    #[test]
    fn test_shared_handles() {
        let shared = SharedObject::new(Door::with_guid());
        assert!(shared.is::<Door>());
        assert!(!shared.is::<Pedestal>());
        assert_eq!(shared.with::<Door, _>(|d| d.open), Some(false));
        shared.with_mut::<Door, _>(|d| d.open = true);
        assert_eq!(shared.with::<Door, _>(|d| d.open), Some(true));

        let weak = shared.downgrade();
        assert!(weak.upgrade().unwrap().ptr_eq(&shared));
        drop(shared);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_try_snapshot_while_written_is_none() {
        let registry = TypeRegistry::with_builtins();
        let cx = ConvertCx::new(&registry);
        let shared = SharedObject::new(Door::with_guid());
        let guard = shared.write();
        assert!(shared.try_snapshot(&cx).is_none());
        drop(guard);
        assert!(shared.try_snapshot(&cx).unwrap().is_ok());
    }
}
