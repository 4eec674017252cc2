// ---------------------------------------------------------------------------
// reference – object references and the six ways to unwrap them
// ---------------------------------------------------------------------------
//
// A saved reference carries the target's ID plus the runtime and record type
// names it was captured with. On load the same saved reference can land in
// six differently-typed fields:
//
//   1. `ObjectRef<T, R>`   runtime type and record type both declared
//   2. `ObjectRef<T>`      runtime type declared, record type inferred
//   3. `UntypedRef`        no type constraint
//   4. `ObjectHandle<T>`   the live runtime object itself
//   5. `EntityRecord`      the target's record itself
//   6. `BaseRef`           the live object through its abstract base
//
// Each conversion checks the captured type names against its declared ones
// and fails with a logged warning, never a panic, on mismatch.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;

use bevy::prelude::*;

use super::{ConvertCx, ConvertError, Converter, TypeRegistry};
use crate::identity::SaveId;
use crate::records::EntityRecord;
use crate::saveable::{SaveableEntity, SharedObject};
use crate::saved_value::{SavableKind, SavedReference, SavedValue};
use crate::type_info::{Describe, GenericShape, ReferenceOps, TypeInfo, TypeKind};

/// Runtime side of a reference.
#[derive(Clone)]
pub enum Reference {
    /// Points at a live object.
    Live(SharedObject),
    /// Points at an object whose scene is unloaded; the record stands in.
    Saved(Box<EntityRecord>),
    /// Could not be resolved, or was never set (`None`).
    Unresolved(Option<SaveId>),
}

impl Default for Reference {
    fn default() -> Self {
        Reference::Unresolved(None)
    }
}

impl fmt::Debug for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reference::Live(obj) => write!(f, "Live({})", obj.type_name()),
            Reference::Saved(rec) => write!(f, "Saved({})", rec.header.id),
            Reference::Unresolved(id) => write!(f, "Unresolved({id:?})"),
        }
    }
}

impl Reference {
    pub fn live(&self) -> Option<&SharedObject> {
        match self {
            Reference::Live(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Reference::Unresolved(None))
    }

    /// Runtime and record type names of the target, when known.
    fn target_types(&self) -> Option<(String, String)> {
        match self {
            Reference::Live(obj) => {
                Some((obj.type_name().to_string(), obj.record_type().to_string()))
            }
            Reference::Saved(rec) => {
                Some((rec.header.type_name.clone(), rec.header.record_type.clone()))
            }
            Reference::Unresolved(_) => None,
        }
    }
}

/// Looks up reference targets while a scene is being restored.
pub trait ObjectResolver {
    fn live(&self, id: &SaveId) -> Option<SharedObject>;
    fn record(&self, id: &SaveId) -> Option<EntityRecord>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReferenceError {
    /// The saved reference's types are not assignable to the target field.
    TypeMismatch { source: String, target: String },
    /// The target must be a live object but only a record (or nothing) exists.
    NotLive { id: SaveId },
    /// Neither a live object nor a record exists for the ID.
    Missing { id: Option<SaveId> },
    /// The live target is locked by the restore in progress.
    Busy { id: SaveId },
}

impl fmt::Display for ReferenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceError::TypeMismatch { source, target } => {
                write!(f, "reference to {source} cannot be assigned to {target}")
            }
            ReferenceError::NotLive { id } => write!(f, "'{id}' is not a live object"),
            ReferenceError::Missing { id: Some(id) } => {
                write!(f, "nothing to resolve for '{id}'")
            }
            ReferenceError::Missing { id: None } => write!(f, "reference is empty"),
            ReferenceError::Busy { id } => write!(f, "'{id}' is locked by another restore"),
        }
    }
}

impl std::error::Error for ReferenceError {}

fn mismatch(saved: &SavedReference, target: &str) -> ReferenceError {
    let err = ReferenceError::TypeMismatch {
        source: format!("{}<{}>", saved.runtime_type, saved.record_type),
        target: target.to_string(),
    };
    warn!("{err}");
    err
}

/// Resolve a saved reference: live object first, then record, else left
/// unresolved with its ID.
pub fn resolve(saved: &SavedReference, cx: &ConvertCx<'_>) -> Reference {
    let Some(id) = &saved.id else {
        return Reference::Unresolved(None);
    };
    let Some(resolver) = cx.resolver else {
        return Reference::Unresolved(Some(id.clone()));
    };
    if let Some(live) = resolver.live(id) {
        return Reference::Live(live);
    }
    if let Some(record) = resolver.record(id) {
        return Reference::Saved(Box::new(record));
    }
    Reference::Unresolved(Some(id.clone()))
}

/// Lower a runtime reference. A live target without identity cannot be
/// saved.
pub fn save_reference(
    reference: &Reference,
    runtime_type: &str,
    record_type: &str,
) -> Result<SavedValue, ConvertError> {
    let id = match reference {
        Reference::Live(obj) => Some(obj.id().map_err(|_| ConvertError::Unidentified {
            type_name: obj.type_name().to_string(),
        })?),
        Reference::Saved(rec) => Some(rec.header.id.clone()),
        Reference::Unresolved(id) => id.clone(),
    };
    Ok(SavedValue::Reference(SavedReference {
        id,
        runtime_type: runtime_type.to_string(),
        record_type: record_type.to_string(),
    }))
}

// ---------------------------------------------------------------------------
// Typed wrappers
// ---------------------------------------------------------------------------

/// Declares the record type a typed reference expects.
pub trait RecordTag: Send + Sync + 'static {
    /// `None` infers the record type from the runtime type.
    const RECORD_TYPE: Option<&'static str>;
}

/// Record type inferred from the referenced runtime type.
pub struct InferRecord;

impl RecordTag for InferRecord {
    const RECORD_TYPE: Option<&'static str> = None;
}

/// Reference to an entity of runtime type `T` whose record is `R`.
pub struct ObjectRef<T, R = InferRecord> {
    reference: Reference,
    _marker: PhantomData<fn() -> (T, R)>,
}

impl<T: SaveableEntity, R: RecordTag> ObjectRef<T, R> {
    /// Expected record type name for this wrapper.
    pub fn record_type() -> &'static str {
        R::RECORD_TYPE.unwrap_or(T::RECORD_TYPE)
    }

    /// `None` if `object` is not a `T`.
    pub fn to_object(object: &SharedObject) -> Option<Self> {
        object.is::<T>().then(|| Self::from_reference(Reference::Live(object.clone())))
    }

    pub fn none() -> Self {
        Self::from_reference(Reference::Unresolved(None))
    }

    fn from_reference(reference: Reference) -> Self {
        Self {
            reference,
            _marker: PhantomData,
        }
    }

    pub fn reference(&self) -> &Reference {
        &self.reference
    }

    pub fn get(&self) -> Option<&SharedObject> {
        self.reference.live()
    }
}

impl<T, R> Clone for ObjectRef<T, R> {
    fn clone(&self) -> Self {
        Self {
            reference: self.reference.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T, R> Default for ObjectRef<T, R> {
    fn default() -> Self {
        Self {
            reference: Reference::default(),
            _marker: PhantomData,
        }
    }
}

impl<T, R> fmt::Debug for ObjectRef<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ObjectRef").field(&self.reference).finish()
    }
}

/// Unwraps straight to the live runtime object.
pub struct ObjectHandle<T> {
    object: Option<SharedObject>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: SaveableEntity> ObjectHandle<T> {
    pub fn new(object: &SharedObject) -> Option<Self> {
        object.is::<T>().then(|| Self {
            object: Some(object.clone()),
            _marker: PhantomData,
        })
    }

    pub fn get(&self) -> Option<&SharedObject> {
        self.object.as_ref()
    }

    pub fn with<U>(&self, f: impl FnOnce(&T) -> U) -> Option<U> {
        self.object.as_ref()?.with::<T, U>(f)
    }
}

impl<T> Default for ObjectHandle<T> {
    fn default() -> Self {
        Self {
            object: None,
            _marker: PhantomData,
        }
    }
}

impl<T> Clone for ObjectHandle<T> {
    fn clone(&self) -> Self {
        Self {
            object: self.object.clone(),
            _marker: PhantomData,
        }
    }
}

/// Handle to any saveable object, typed only by the common base.
#[derive(Clone, Default)]
pub struct BaseRef(pub Option<SharedObject>);

/// Reference with no declared type; remembers what it was captured with.
#[derive(Clone, Default, Debug)]
pub struct UntypedRef {
    pub reference: Reference,
    pub runtime_type: String,
    pub record_type: String,
}

impl UntypedRef {
    pub fn to(object: &SharedObject) -> Self {
        Self {
            reference: Reference::Live(object.clone()),
            runtime_type: object.type_name().to_string(),
            record_type: object.record_type().to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// The six conversions
// ---------------------------------------------------------------------------

fn live_of_type<T: SaveableEntity>(
    reference: &Reference,
    saved: &SavedReference,
    target: &str,
) -> Result<(), ReferenceError> {
    match reference.live() {
        Some(obj) if !obj.is::<T>() => {
            let err = ReferenceError::TypeMismatch {
                source: obj.type_name().to_string(),
                target: target.to_string(),
            };
            warn!("{err} (id {:?})", saved.id);
            Err(err)
        }
        _ => Ok(()),
    }
}

/// 1. Both type arguments declared.
pub fn to_typed<T: SaveableEntity, R: RecordTag>(
    saved: &SavedReference,
    cx: &ConvertCx<'_>,
) -> Result<ObjectRef<T, R>, ReferenceError> {
    let target = std::any::type_name::<ObjectRef<T, R>>();
    if saved.runtime_type != T::TYPE_NAME || saved.record_type != ObjectRef::<T, R>::record_type() {
        return Err(mismatch(saved, target));
    }
    let reference = resolve(saved, cx);
    live_of_type::<T>(&reference, saved, target)?;
    Ok(ObjectRef::from_reference(reference))
}

/// 2. Runtime type declared, record type inferred from it.
pub fn to_inferred<T: SaveableEntity>(
    saved: &SavedReference,
    cx: &ConvertCx<'_>,
) -> Result<ObjectRef<T>, ReferenceError> {
    to_typed::<T, InferRecord>(saved, cx)
}

/// 3. No type constraint.
pub fn to_untyped(saved: &SavedReference, cx: &ConvertCx<'_>) -> UntypedRef {
    UntypedRef {
        reference: resolve(saved, cx),
        runtime_type: saved.runtime_type.clone(),
        record_type: saved.record_type.clone(),
    }
}

/// 4. The live runtime object. An empty reference yields an empty handle.
pub fn to_object<T: SaveableEntity>(
    saved: &SavedReference,
    cx: &ConvertCx<'_>,
) -> Result<ObjectHandle<T>, ReferenceError> {
    let target = std::any::type_name::<ObjectHandle<T>>();
    if saved.runtime_type != T::TYPE_NAME {
        return Err(mismatch(saved, target));
    }
    match resolve(saved, cx) {
        Reference::Live(obj) if obj.is::<T>() => Ok(ObjectHandle {
            object: Some(obj),
            _marker: PhantomData,
        }),
        Reference::Live(obj) => {
            let err = ReferenceError::TypeMismatch {
                source: obj.type_name().to_string(),
                target: target.to_string(),
            };
            warn!("{err}");
            Err(err)
        }
        Reference::Unresolved(None) => Ok(ObjectHandle::default()),
        Reference::Saved(rec) => Err(ReferenceError::NotLive {
            id: rec.header.id.clone(),
        }),
        Reference::Unresolved(Some(id)) => Err(ReferenceError::NotLive { id }),
    }
}

/// 5. The target's record. A live target is snapshotted.
pub fn to_record(saved: &SavedReference, cx: &ConvertCx<'_>) -> Result<EntityRecord, ReferenceError> {
    match resolve(saved, cx) {
        Reference::Saved(rec) => Ok(*rec),
        Reference::Live(obj) => {
            let id = saved.id.clone().unwrap_or_else(|| SaveId::from_raw(""));
            match obj.try_snapshot(cx) {
                Some(Ok(record)) => Ok(record),
                Some(Err(e)) => {
                    warn!("Snapshot of referenced '{id}' failed: {e}");
                    Err(ReferenceError::Missing { id: Some(id) })
                }
                None => Err(ReferenceError::Busy { id }),
            }
        }
        Reference::Unresolved(id) => Err(ReferenceError::Missing { id }),
    }
}

/// 6. The live object through the common base. Any runtime type is
/// assignable.
pub fn to_base(saved: &SavedReference, cx: &ConvertCx<'_>) -> Result<BaseRef, ReferenceError> {
    match resolve(saved, cx) {
        Reference::Live(obj) => Ok(BaseRef(Some(obj))),
        Reference::Unresolved(None) => Ok(BaseRef(None)),
        Reference::Saved(rec) => Err(ReferenceError::NotLive {
            id: rec.header.id.clone(),
        }),
        Reference::Unresolved(Some(id)) => Err(ReferenceError::NotLive { id }),
    }
}

// ---------------------------------------------------------------------------
// Type descriptions and converters
// ---------------------------------------------------------------------------

fn object_ref_current<T: SaveableEntity, R: RecordTag>(v: &dyn Any) -> Option<Reference> {
    v.downcast_ref::<ObjectRef<T, R>>()
        .map(|r| r.reference.clone())
}

fn object_ref_assign<T: SaveableEntity, R: RecordTag>(
    target: &mut dyn Any,
    saved: &SavedReference,
    cx: &ConvertCx<'_>,
) -> Result<(), ConvertError> {
    let slot = target
        .downcast_mut::<ObjectRef<T, R>>()
        .ok_or(ConvertError::NotInstance {
            type_name: std::any::type_name::<ObjectRef<T, R>>(),
        })?;
    *slot = to_typed::<T, R>(saved, cx)?;
    Ok(())
}

impl<T: SaveableEntity, R: RecordTag> Describe for ObjectRef<T, R> {
    fn type_info() -> TypeInfo {
        TypeInfo::generic::<ObjectRef<T, R>>(
            TypeKind::Value,
            GenericShape::ObjectReference(ReferenceOps {
                runtime_type: T::TYPE_NAME,
                record_type: ObjectRef::<T, R>::record_type(),
                current: object_ref_current::<T, R>,
                assign: object_ref_assign::<T, R>,
            }),
        )
    }
}

fn object_handle_current<T: SaveableEntity>(v: &dyn Any) -> Option<Reference> {
    v.downcast_ref::<ObjectHandle<T>>().map(|h| match &h.object {
        Some(obj) => Reference::Live(obj.clone()),
        None => Reference::Unresolved(None),
    })
}

fn object_handle_assign<T: SaveableEntity>(
    target: &mut dyn Any,
    saved: &SavedReference,
    cx: &ConvertCx<'_>,
) -> Result<(), ConvertError> {
    let slot = target
        .downcast_mut::<ObjectHandle<T>>()
        .ok_or(ConvertError::NotInstance {
            type_name: std::any::type_name::<ObjectHandle<T>>(),
        })?;
    *slot = to_object::<T>(saved, cx)?;
    Ok(())
}

impl<T: SaveableEntity> Describe for ObjectHandle<T> {
    fn type_info() -> TypeInfo {
        TypeInfo::generic::<ObjectHandle<T>>(
            TypeKind::EngineObject,
            GenericShape::ObjectHandle(ReferenceOps {
                runtime_type: T::TYPE_NAME,
                record_type: T::RECORD_TYPE,
                current: object_handle_current::<T>,
                assign: object_handle_assign::<T>,
            }),
        )
    }
}

impl Describe for BaseRef {
    fn type_info() -> TypeInfo {
        TypeInfo::engine_object::<BaseRef>()
    }
}

impl Describe for UntypedRef {
    fn type_info() -> TypeInfo {
        TypeInfo::value::<UntypedRef>()
    }
}

impl Describe for EntityRecord {
    fn type_info() -> TypeInfo {
        TypeInfo::value::<EntityRecord>()
    }
}

fn expect_reference<'s>(
    saved: &'s SavedValue,
    target: &'static str,
) -> Result<Option<&'s SavedReference>, ConvertError> {
    match saved {
        SavedValue::Reference(r) => Ok(Some(r)),
        SavedValue::Null => Ok(None),
        other => Err(ConvertError::Mismatch {
            target,
            found: other.kind_name(),
        }),
    }
}

pub(super) fn register_reference_converters(registry: &mut TypeRegistry) {
    const UNTYPED: &str = "UntypedRef";
    const BASE: &str = "BaseRef";
    const RECORD: &str = "EntityRecord";

    registry.register::<UntypedRef>(Converter::new(
        UNTYPED,
        SavableKind::Reference,
        |value, _cx| {
            let r = value
                .downcast_ref::<UntypedRef>()
                .ok_or(ConvertError::NotInstance { type_name: UNTYPED })?;
            let (runtime, record) = r
                .reference
                .target_types()
                .unwrap_or_else(|| (r.runtime_type.clone(), r.record_type.clone()));
            save_reference(&r.reference, &runtime, &record)
        },
        |saved, target, cx| {
            let slot = target
                .downcast_mut::<UntypedRef>()
                .ok_or(ConvertError::NotInstance { type_name: UNTYPED })?;
            *slot = match expect_reference(saved, UNTYPED)? {
                Some(r) => to_untyped(r, cx),
                None => UntypedRef::default(),
            };
            Ok(())
        },
    ));

    registry.register::<BaseRef>(Converter::new(
        BASE,
        SavableKind::Reference,
        |value, _cx| {
            let r = value
                .downcast_ref::<BaseRef>()
                .ok_or(ConvertError::NotInstance { type_name: BASE })?;
            match &r.0 {
                Some(obj) => save_reference(
                    &Reference::Live(obj.clone()),
                    obj.type_name(),
                    obj.record_type(),
                ),
                None => Ok(SavedValue::Null),
            }
        },
        |saved, target, cx| {
            let slot = target
                .downcast_mut::<BaseRef>()
                .ok_or(ConvertError::NotInstance { type_name: BASE })?;
            *slot = match expect_reference(saved, BASE)? {
                Some(r) => to_base(r, cx)?,
                None => BaseRef(None),
            };
            Ok(())
        },
    ));

    registry.register::<EntityRecord>(Converter::new(
        RECORD,
        SavableKind::Record,
        |value, _cx| {
            value
                .downcast_ref::<EntityRecord>()
                .map(|r| SavedValue::Record(Box::new(r.clone())))
                .ok_or(ConvertError::NotInstance { type_name: RECORD })
        },
        |saved, target, cx| {
            let slot = target
                .downcast_mut::<EntityRecord>()
                .ok_or(ConvertError::NotInstance { type_name: RECORD })?;
            *slot = match saved {
                SavedValue::Record(record) => (**record).clone(),
                SavedValue::Reference(r) => to_record(r, cx)?,
                other => {
                    return Err(ConvertError::Mismatch {
                        target: RECORD,
                        found: other.kind_name(),
                    })
                }
            };
            Ok(())
        },
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Crate, Door, DoorRecordTag, MapResolver};

    fn door_ref(id: &SaveId) -> SavedReference {
        SavedReference::to(id.clone(), Door::TYPE_NAME, Door::RECORD_TYPE)
    }

    #[test]
    fn test_typed_resolves_live() {
        let registry = TypeRegistry::with_builtins();
        let door = SharedObject::new(Door::with_guid());
        let id = door.id().unwrap();
        let resolver = MapResolver::with_live(&[door.clone()]);
        let cx = ConvertCx::with_resolver(&registry, &resolver);

        let typed = to_typed::<Door, DoorRecordTag>(&door_ref(&id), &cx).unwrap();
        assert!(typed.get().unwrap().ptr_eq(&door));
        let inferred = to_inferred::<Door>(&door_ref(&id), &cx).unwrap();
        assert!(inferred.get().is_some());
    }

    #[test]
    fn test_typed_rejects_wrong_runtime_type() {
        let registry = TypeRegistry::with_builtins();
        let cx = ConvertCx::new(&registry);
        let saved = SavedReference::to(SaveId::from_raw("Crate_x"), Crate::TYPE_NAME, "EntityRecord");
        let err = to_typed::<Door, InferRecord>(&saved, &cx).unwrap_err();
        assert!(matches!(err, ReferenceError::TypeMismatch { .. }));
        let msg = format!("{err}");
        assert!(msg.contains("Crate"), "got: {msg}");
        assert!(msg.contains("Door"), "got: {msg}");
    }

    #[test]
    fn test_typed_rejects_wrong_record_type() {
        let registry = TypeRegistry::with_builtins();
        let cx = ConvertCx::new(&registry);
        let saved = SavedReference::to(SaveId::from_raw("Door_x"), Door::TYPE_NAME, "OtherRecord");
        assert!(to_typed::<Door, DoorRecordTag>(&saved, &cx).is_err());
    }

    #[test]
    fn test_untyped_accepts_anything() {
        let registry = TypeRegistry::with_builtins();
        let cx = ConvertCx::new(&registry);
        let saved = SavedReference::to(SaveId::from_raw("Crate_x"), "Crate", "EntityRecord");
        let untyped = to_untyped(&saved, &cx);
        assert_eq!(untyped.runtime_type, "Crate");
        assert!(matches!(untyped.reference, Reference::Unresolved(Some(_))));
    }

    #[test]
    fn test_object_requires_live_target() {
        let registry = TypeRegistry::with_builtins();
        let cx = ConvertCx::new(&registry);
        let saved = door_ref(&SaveId::from_raw("Door_gone"));
        assert!(matches!(
            to_object::<Door>(&saved, &cx),
            Err(ReferenceError::NotLive { .. })
        ));
        let empty = SavedReference::none(Door::TYPE_NAME, Door::RECORD_TYPE);
        assert!(to_object::<Door>(&empty, &cx).unwrap().get().is_none());
    }

    #[test]
    fn test_record_from_saved_and_live() {
        let registry = TypeRegistry::with_builtins();
        let door = SharedObject::new(Door::with_guid());
        let id = door.id().unwrap();
        let snapshot = door.read().create_snapshot(&ConvertCx::new(&registry)).unwrap();

        let live = MapResolver::with_live(&[door.clone()]);
        let cx = ConvertCx::with_resolver(&registry, &live);
        assert_eq!(to_record(&door_ref(&id), &cx).unwrap(), snapshot);

        let saved = MapResolver::with_records(&[snapshot.clone()]);
        let cx = ConvertCx::with_resolver(&registry, &saved);
        assert_eq!(to_record(&door_ref(&id), &cx).unwrap(), snapshot);
    }

    #[test]
    fn test_base_accepts_any_live_type() {
        let registry = TypeRegistry::with_builtins();
        let crate_obj = SharedObject::new(Crate::with_guid());
        let id = crate_obj.id().unwrap();
        let resolver = MapResolver::with_live(&[crate_obj.clone()]);
        let cx = ConvertCx::with_resolver(&registry, &resolver);
        let saved = SavedReference::to(id, Crate::TYPE_NAME, Crate::RECORD_TYPE);
        let base = to_base(&saved, &cx).unwrap();
        assert!(base.0.unwrap().ptr_eq(&crate_obj));
    }

    #[test]
    fn test_unidentified_live_target_cannot_be_saved() {
        let door = SharedObject::new(Door::default());
        let err = save_reference(&Reference::Live(door), "Door", "DoorRecord").unwrap_err();
        assert!(matches!(err, ConvertError::Unidentified { .. }));
    }
}
