// ---------------------------------------------------------------------------
// type_info – compile-time type shape descriptors
// ---------------------------------------------------------------------------
//
// Replaces runtime reflection: every type that can appear as a saved field
// implements `Describe`, which hands back a `TypeInfo` made of plain data and
// monomorphized function pointers. The registry and the field engine only
// ever look at `TypeInfo`, never at the concrete type.

use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;
use std::hash::Hash;

use bevy::color::Color;
use bevy::math::{Quat, Vec2, Vec3, Vec4};

use crate::saved_value::{SavedReference, SavedValue, StateMachineSnapshot};
use crate::state_machine::StateMachine;
use crate::type_registry::reference::Reference;
use crate::type_registry::{ConvertCx, ConvertError};
use crate::value_types::{ColorGradient, KeyframeCurve};

/// Implemented by every type that may appear as a saved field.
pub trait Describe: Any + Send + Sync {
    fn type_info() -> TypeInfo;
}

/// Implemented by field-less enums saved by variant name. Use `save_enum!`.
pub trait SaveEnum: Sized + Send + Sync + 'static {
    fn variant_name(&self) -> &'static str;
    fn from_variant_name(name: &str) -> Option<Self>;
}

/// Shape descriptor for one concrete type.
#[derive(Clone, Copy)]
pub struct TypeInfo {
    pub type_id: TypeId,
    pub type_name: &'static str,
    pub kind: TypeKind,
    /// Set when the type is an instance of a known open-generic shape.
    pub generic: Option<GenericShape>,
    /// Declared base type, walked by structural resolution.
    pub base: Option<BaseInfo>,
}

impl fmt::Debug for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeInfo")
            .field("type_name", &self.type_name)
            .field("kind", &self.kind.name())
            .field("generic", &self.generic.map(|g| g.definition()))
            .field("has_base", &self.base.is_some())
            .finish()
    }
}

#[derive(Clone, Copy)]
pub enum TypeKind {
    /// Bools, numbers and strings: pass through unchanged.
    Primitive(PassthroughOps),
    /// Field-less enums: pass through by variant name.
    Enum(PassthroughOps),
    /// `Option<T>`: `None` saves as `SavedValue::Null`.
    Nullable(NullableOps),
    /// List-like collections. Saved only with an explicit opt-in.
    Collection,
    /// Key/value collections. Saved only with an explicit opt-in.
    Dictionary,
    /// Handle to a live engine-managed object. Saved only with an explicit
    /// opt-in.
    EngineObject,
    /// Anything else; resolved through the type registry.
    Value,
}

impl TypeKind {
    pub fn name(&self) -> &'static str {
        match self {
            TypeKind::Primitive(_) => "Primitive",
            TypeKind::Enum(_) => "Enum",
            TypeKind::Nullable(_) => "Nullable",
            TypeKind::Collection => "Collection",
            TypeKind::Dictionary => "Dictionary",
            TypeKind::EngineObject => "EngineObject",
            TypeKind::Value => "Value",
        }
    }
}

#[derive(Clone, Copy)]
pub struct PassthroughOps {
    pub to_saved: fn(&dyn Any) -> Option<SavedValue>,
    pub from_saved: fn(&SavedValue, &mut dyn Any) -> bool,
}

#[derive(Clone, Copy)]
pub struct NullableOps {
    pub inner: fn() -> TypeInfo,
    /// Outer `None` means the value was not an instance of this type.
    pub get: fn(&dyn Any) -> Option<Option<&dyn Any>>,
    pub set_none: fn(&mut dyn Any) -> bool,
    pub get_or_insert_default: fn(&mut dyn Any) -> Option<&mut dyn Any>,
}

/// Known open-generic definitions the registry can match structurally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GenericDefinition {
    List,
    Dictionary,
    StateMachine,
    ObjectReference,
    ObjectHandle,
}

#[derive(Clone, Copy)]
pub enum GenericShape {
    List(ListOps),
    Dictionary(MapOps),
    StateMachine(StateMachineOps),
    ObjectReference(ReferenceOps),
    ObjectHandle(ReferenceOps),
}

impl GenericShape {
    pub fn definition(&self) -> GenericDefinition {
        match self {
            GenericShape::List(_) => GenericDefinition::List,
            GenericShape::Dictionary(_) => GenericDefinition::Dictionary,
            GenericShape::StateMachine(_) => GenericDefinition::StateMachine,
            GenericShape::ObjectReference(_) => GenericDefinition::ObjectReference,
            GenericShape::ObjectHandle(_) => GenericDefinition::ObjectHandle,
        }
    }
}

#[derive(Clone, Copy)]
pub struct ListOps {
    pub element: fn() -> TypeInfo,
    pub for_each: fn(&dyn Any, &mut dyn FnMut(&dyn Any)) -> bool,
    pub new_element: fn() -> Box<dyn Any>,
    pub rebuild: fn(&mut dyn Any, Vec<Box<dyn Any>>) -> bool,
}

#[derive(Clone, Copy)]
pub struct MapOps {
    pub key: fn() -> TypeInfo,
    pub value: fn() -> TypeInfo,
    pub for_each: fn(&dyn Any, &mut dyn FnMut(&dyn Any, &dyn Any)) -> bool,
    pub new_key: fn() -> Box<dyn Any>,
    pub new_value: fn() -> Box<dyn Any>,
    pub rebuild: fn(&mut dyn Any, Vec<(Box<dyn Any>, Box<dyn Any>)>) -> bool,
}

/// Borrowed parts of a state machine.
pub struct StateParts<'a> {
    pub current: &'a dyn Any,
    pub previous: Option<&'a dyn Any>,
    pub time_in_state: f32,
}

#[derive(Clone, Copy)]
pub struct StateMachineOps {
    pub state: fn() -> TypeInfo,
    pub parts: fn(&dyn Any) -> Option<StateParts<'_>>,
    pub new_state: fn() -> Box<dyn Any>,
    pub restore: fn(&mut dyn Any, Box<dyn Any>, Option<Box<dyn Any>>, f32) -> bool,
}

/// Operations on one instantiation of a reference wrapper. `assign` performs
/// the conversion matching the wrapper's declared type arguments.
#[derive(Clone, Copy)]
pub struct ReferenceOps {
    pub runtime_type: &'static str,
    pub record_type: &'static str,
    pub current: fn(&dyn Any) -> Option<Reference>,
    pub assign: fn(&mut dyn Any, &SavedReference, &ConvertCx<'_>) -> Result<(), ConvertError>,
}

#[derive(Clone, Copy)]
pub struct BaseInfo {
    pub info: fn() -> TypeInfo,
    pub upcast: fn(&dyn Any) -> Option<&dyn Any>,
    pub upcast_mut: fn(&mut dyn Any) -> Option<&mut dyn Any>,
}

impl TypeInfo {
    fn bare<T: Any>(kind: TypeKind) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            kind,
            generic: None,
            base: None,
        }
    }

    /// A type resolved purely through the registry's direct table.
    pub fn value<T: Any>() -> Self {
        Self::bare::<T>(TypeKind::Value)
    }

    pub fn primitive<T: Any>(ops: PassthroughOps) -> Self {
        Self::bare::<T>(TypeKind::Primitive(ops))
    }

    pub fn enumeration<T: SaveEnum>() -> Self {
        Self::bare::<T>(TypeKind::Enum(PassthroughOps {
            to_saved: enum_to_saved::<T>,
            from_saved: enum_from_saved::<T>,
        }))
    }

    pub fn engine_object<T: Any>() -> Self {
        Self::bare::<T>(TypeKind::EngineObject)
    }

    /// An instantiation of one of the known generic shapes.
    pub fn generic<T: Any>(kind: TypeKind, shape: GenericShape) -> Self {
        Self {
            generic: Some(shape),
            ..Self::bare::<T>(kind)
        }
    }

    /// A newtype over `B`. Its kind follows the base's container kind so the
    /// field opt-in rules still apply.
    pub fn derived<T: Any, B: Describe>(
        upcast: fn(&dyn Any) -> Option<&dyn Any>,
        upcast_mut: fn(&mut dyn Any) -> Option<&mut dyn Any>,
    ) -> Self {
        let kind = match B::type_info().kind {
            k @ (TypeKind::Collection | TypeKind::Dictionary | TypeKind::EngineObject) => k,
            _ => TypeKind::Value,
        };
        Self {
            base: Some(BaseInfo {
                info: B::type_info,
                upcast,
                upcast_mut,
            }),
            ..Self::bare::<T>(kind)
        }
    }

    pub fn is<T: Any>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    /// Unwraps `Option<T>` to `T`'s info; other types return themselves.
    pub fn non_nullable(&self) -> TypeInfo {
        match self.kind {
            TypeKind::Nullable(ops) => (ops.inner)().non_nullable(),
            _ => *self,
        }
    }
}

// ---------------------------------------------------------------------------
// Primitives
// ---------------------------------------------------------------------------

fn saved_integer(saved: &SavedValue) -> Option<i128> {
    match saved {
        SavedValue::Int(n) => Some(i128::from(*n)),
        SavedValue::UInt(n) => Some(i128::from(*n)),
        _ => None,
    }
}

macro_rules! describe_signed {
    ($($ty:ty),*) => {$(
        impl Describe for $ty {
            fn type_info() -> TypeInfo {
                fn to_saved(v: &dyn Any) -> Option<SavedValue> {
                    v.downcast_ref::<$ty>().map(|n| SavedValue::Int(*n as i64))
                }
                fn from_saved(saved: &SavedValue, target: &mut dyn Any) -> bool {
                    let (Some(slot), Some(n)) = (target.downcast_mut::<$ty>(), saved_integer(saved)) else {
                        return false;
                    };
                    match <$ty>::try_from(n) {
                        Ok(v) => {
                            *slot = v;
                            true
                        }
                        Err(_) => false,
                    }
                }
                TypeInfo::primitive::<$ty>(PassthroughOps { to_saved, from_saved })
            }
        }
    )*};
}

macro_rules! describe_unsigned {
    ($($ty:ty),*) => {$(
        impl Describe for $ty {
            fn type_info() -> TypeInfo {
                fn to_saved(v: &dyn Any) -> Option<SavedValue> {
                    v.downcast_ref::<$ty>().map(|n| SavedValue::UInt(*n as u64))
                }
                fn from_saved(saved: &SavedValue, target: &mut dyn Any) -> bool {
                    let (Some(slot), Some(n)) = (target.downcast_mut::<$ty>(), saved_integer(saved)) else {
                        return false;
                    };
                    match <$ty>::try_from(n) {
                        Ok(v) => {
                            *slot = v;
                            true
                        }
                        Err(_) => false,
                    }
                }
                TypeInfo::primitive::<$ty>(PassthroughOps { to_saved, from_saved })
            }
        }
    )*};
}

describe_signed!(i8, i16, i32, i64, isize);
describe_unsigned!(u8, u16, u32, u64, usize);

macro_rules! describe_float {
    ($($ty:ty),*) => {$(
        impl Describe for $ty {
            fn type_info() -> TypeInfo {
                fn to_saved(v: &dyn Any) -> Option<SavedValue> {
                    v.downcast_ref::<$ty>().map(|n| SavedValue::Float(f64::from(*n)))
                }
                fn from_saved(saved: &SavedValue, target: &mut dyn Any) -> bool {
                    let Some(slot) = target.downcast_mut::<$ty>() else {
                        return false;
                    };
                    match saved {
                        SavedValue::Float(f) => *slot = *f as $ty,
                        SavedValue::Int(n) => *slot = *n as $ty,
                        SavedValue::UInt(n) => *slot = *n as $ty,
                        _ => return false,
                    }
                    true
                }
                TypeInfo::primitive::<$ty>(PassthroughOps { to_saved, from_saved })
            }
        }
    )*};
}

describe_float!(f32, f64);

impl Describe for bool {
    fn type_info() -> TypeInfo {
        fn to_saved(v: &dyn Any) -> Option<SavedValue> {
            v.downcast_ref::<bool>().map(|b| SavedValue::Bool(*b))
        }
        fn from_saved(saved: &SavedValue, target: &mut dyn Any) -> bool {
            match (saved, target.downcast_mut::<bool>()) {
                (SavedValue::Bool(b), Some(slot)) => {
                    *slot = *b;
                    true
                }
                _ => false,
            }
        }
        TypeInfo::primitive::<bool>(PassthroughOps { to_saved, from_saved })
    }
}

impl Describe for String {
    fn type_info() -> TypeInfo {
        fn to_saved(v: &dyn Any) -> Option<SavedValue> {
            v.downcast_ref::<String>().map(|s| SavedValue::Str(s.clone()))
        }
        fn from_saved(saved: &SavedValue, target: &mut dyn Any) -> bool {
            match (saved, target.downcast_mut::<String>()) {
                (SavedValue::Str(s), Some(slot)) => {
                    slot.clone_from(s);
                    true
                }
                _ => false,
            }
        }
        TypeInfo::primitive::<String>(PassthroughOps { to_saved, from_saved })
    }
}

fn enum_to_saved<T: SaveEnum>(v: &dyn Any) -> Option<SavedValue> {
    v.downcast_ref::<T>()
        .map(|e| SavedValue::Enum(e.variant_name().to_string()))
}

fn enum_from_saved<T: SaveEnum>(saved: &SavedValue, target: &mut dyn Any) -> bool {
    let (SavedValue::Enum(name), Some(slot)) = (saved, target.downcast_mut::<T>()) else {
        return false;
    };
    match T::from_variant_name(name) {
        Some(v) => {
            *slot = v;
            true
        }
        None => false,
    }
}

/// Implement `SaveEnum` and `Describe` for a field-less enum.
///
/// ```ignore
/// save_enum!(DoorState { Open, Closed, Locked });
/// ```
#[macro_export]
macro_rules! save_enum {
    ($ty:ident { $($variant:ident),+ $(,)? }) => {
        impl $crate::SaveEnum for $ty {
            fn variant_name(&self) -> &'static str {
                match self {
                    $($ty::$variant => stringify!($variant),)+
                }
            }
            fn from_variant_name(name: &str) -> Option<Self> {
                match name {
                    $(stringify!($variant) => Some($ty::$variant),)+
                    _ => None,
                }
            }
        }
        impl $crate::Describe for $ty {
            fn type_info() -> $crate::TypeInfo {
                $crate::TypeInfo::enumeration::<$ty>()
            }
        }
    };
}

/// Implement `Describe` for a single-field tuple struct by declaring the
/// wrapped type as its base.
///
/// ```ignore
/// struct Inventory(HashMap<String, u32>);
/// describe_newtype!(Inventory => HashMap<String, u32>);
/// ```
#[macro_export]
macro_rules! describe_newtype {
    ($ty:ident => $base:ty) => {
        impl $crate::Describe for $ty {
            fn type_info() -> $crate::TypeInfo {
                fn upcast(v: &dyn ::std::any::Any) -> Option<&dyn ::std::any::Any> {
                    v.downcast_ref::<$ty>().map(|s| &s.0 as &dyn ::std::any::Any)
                }
                fn upcast_mut(v: &mut dyn ::std::any::Any) -> Option<&mut dyn ::std::any::Any> {
                    v.downcast_mut::<$ty>()
                        .map(|s| &mut s.0 as &mut dyn ::std::any::Any)
                }
                $crate::TypeInfo::derived::<$ty, $base>(upcast, upcast_mut)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Engine value types
// ---------------------------------------------------------------------------

macro_rules! describe_value {
    ($($ty:ty),*) => {$(
        impl Describe for $ty {
            fn type_info() -> TypeInfo {
                TypeInfo::value::<$ty>()
            }
        }
    )*};
}

describe_value!(
    Vec2,
    Vec3,
    Vec4,
    Quat,
    Color,
    KeyframeCurve,
    ColorGradient,
    StateMachineSnapshot
);

// ---------------------------------------------------------------------------
// Option
// ---------------------------------------------------------------------------

fn option_get<T: Any>(v: &dyn Any) -> Option<Option<&dyn Any>> {
    v.downcast_ref::<Option<T>>()
        .map(|o| o.as_ref().map(|t| t as &dyn Any))
}

fn option_set_none<T: Any>(v: &mut dyn Any) -> bool {
    match v.downcast_mut::<Option<T>>() {
        Some(slot) => {
            *slot = None;
            true
        }
        None => false,
    }
}

fn option_get_or_insert_default<T: Any + Default>(v: &mut dyn Any) -> Option<&mut dyn Any> {
    v.downcast_mut::<Option<T>>()
        .map(|slot| slot.get_or_insert_with(T::default) as &mut dyn Any)
}

impl<T: Describe + Default> Describe for Option<T> {
    fn type_info() -> TypeInfo {
        TypeInfo::bare::<Option<T>>(TypeKind::Nullable(NullableOps {
            inner: T::type_info,
            get: option_get::<T>,
            set_none: option_set_none::<T>,
            get_or_insert_default: option_get_or_insert_default::<T>,
        }))
    }
}

// ---------------------------------------------------------------------------
// Collections
// ---------------------------------------------------------------------------

fn new_default<T: Any + Default>() -> Box<dyn Any> {
    Box::new(T::default())
}

fn unbox_all<T: Any>(items: Vec<Box<dyn Any>>) -> impl Iterator<Item = T> {
    items
        .into_iter()
        .filter_map(|b| b.downcast::<T>().ok().map(|b| *b))
}

fn vec_for_each<T: Any>(v: &dyn Any, f: &mut dyn FnMut(&dyn Any)) -> bool {
    let Some(list) = v.downcast_ref::<Vec<T>>() else {
        return false;
    };
    list.iter().for_each(|item| f(item as &dyn Any));
    true
}

fn vec_rebuild<T: Any>(v: &mut dyn Any, items: Vec<Box<dyn Any>>) -> bool {
    let Some(list) = v.downcast_mut::<Vec<T>>() else {
        return false;
    };
    *list = unbox_all::<T>(items).collect();
    true
}

impl<T: Describe + Default> Describe for Vec<T> {
    fn type_info() -> TypeInfo {
        TypeInfo::generic::<Vec<T>>(
            TypeKind::Collection,
            GenericShape::List(ListOps {
                element: T::type_info,
                for_each: vec_for_each::<T>,
                new_element: new_default::<T>,
                rebuild: vec_rebuild::<T>,
            }),
        )
    }
}

fn deque_for_each<T: Any>(v: &dyn Any, f: &mut dyn FnMut(&dyn Any)) -> bool {
    let Some(list) = v.downcast_ref::<VecDeque<T>>() else {
        return false;
    };
    list.iter().for_each(|item| f(item as &dyn Any));
    true
}

fn deque_rebuild<T: Any>(v: &mut dyn Any, items: Vec<Box<dyn Any>>) -> bool {
    let Some(list) = v.downcast_mut::<VecDeque<T>>() else {
        return false;
    };
    *list = unbox_all::<T>(items).collect();
    true
}

impl<T: Describe + Default> Describe for VecDeque<T> {
    fn type_info() -> TypeInfo {
        TypeInfo::generic::<VecDeque<T>>(
            TypeKind::Collection,
            GenericShape::List(ListOps {
                element: T::type_info,
                for_each: deque_for_each::<T>,
                new_element: new_default::<T>,
                rebuild: deque_rebuild::<T>,
            }),
        )
    }
}

fn set_for_each<T: Any + Eq + Hash>(v: &dyn Any, f: &mut dyn FnMut(&dyn Any)) -> bool {
    let Some(set) = v.downcast_ref::<HashSet<T>>() else {
        return false;
    };
    set.iter().for_each(|item| f(item as &dyn Any));
    true
}

fn set_rebuild<T: Any + Eq + Hash>(v: &mut dyn Any, items: Vec<Box<dyn Any>>) -> bool {
    let Some(set) = v.downcast_mut::<HashSet<T>>() else {
        return false;
    };
    *set = unbox_all::<T>(items).collect();
    true
}

impl<T: Describe + Default + Eq + Hash> Describe for HashSet<T> {
    fn type_info() -> TypeInfo {
        TypeInfo::generic::<HashSet<T>>(
            TypeKind::Collection,
            GenericShape::List(ListOps {
                element: T::type_info,
                for_each: set_for_each::<T>,
                new_element: new_default::<T>,
                rebuild: set_rebuild::<T>,
            }),
        )
    }
}

fn unbox_pairs<K: Any, V: Any>(
    items: Vec<(Box<dyn Any>, Box<dyn Any>)>,
) -> impl Iterator<Item = (K, V)> {
    items.into_iter().filter_map(|(k, v)| {
        let k = k.downcast::<K>().ok()?;
        let v = v.downcast::<V>().ok()?;
        Some((*k, *v))
    })
}

fn hash_map_for_each<K: Any + Eq + Hash, V: Any>(
    v: &dyn Any,
    f: &mut dyn FnMut(&dyn Any, &dyn Any),
) -> bool {
    let Some(map) = v.downcast_ref::<HashMap<K, V>>() else {
        return false;
    };
    map.iter().for_each(|(k, v)| f(k as &dyn Any, v as &dyn Any));
    true
}

fn hash_map_rebuild<K: Any + Eq + Hash, V: Any>(
    v: &mut dyn Any,
    items: Vec<(Box<dyn Any>, Box<dyn Any>)>,
) -> bool {
    let Some(map) = v.downcast_mut::<HashMap<K, V>>() else {
        return false;
    };
    *map = unbox_pairs::<K, V>(items).collect();
    true
}

impl<K, V> Describe for HashMap<K, V>
where
    K: Describe + Default + Eq + Hash,
    V: Describe + Default,
{
    fn type_info() -> TypeInfo {
        TypeInfo::generic::<HashMap<K, V>>(
            TypeKind::Dictionary,
            GenericShape::Dictionary(MapOps {
                key: K::type_info,
                value: V::type_info,
                for_each: hash_map_for_each::<K, V>,
                new_key: new_default::<K>,
                new_value: new_default::<V>,
                rebuild: hash_map_rebuild::<K, V>,
            }),
        )
    }
}

fn btree_map_for_each<K: Any + Ord, V: Any>(
    v: &dyn Any,
    f: &mut dyn FnMut(&dyn Any, &dyn Any),
) -> bool {
    let Some(map) = v.downcast_ref::<BTreeMap<K, V>>() else {
        return false;
    };
    map.iter().for_each(|(k, v)| f(k as &dyn Any, v as &dyn Any));
    true
}

fn btree_map_rebuild<K: Any + Ord, V: Any>(
    v: &mut dyn Any,
    items: Vec<(Box<dyn Any>, Box<dyn Any>)>,
) -> bool {
    let Some(map) = v.downcast_mut::<BTreeMap<K, V>>() else {
        return false;
    };
    *map = unbox_pairs::<K, V>(items).collect();
    true
}

impl<K, V> Describe for BTreeMap<K, V>
where
    K: Describe + Default + Ord,
    V: Describe + Default,
{
    fn type_info() -> TypeInfo {
        TypeInfo::generic::<BTreeMap<K, V>>(
            TypeKind::Dictionary,
            GenericShape::Dictionary(MapOps {
                key: K::type_info,
                value: V::type_info,
                for_each: btree_map_for_each::<K, V>,
                new_key: new_default::<K>,
                new_value: new_default::<V>,
                rebuild: btree_map_rebuild::<K, V>,
            }),
        )
    }
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

fn state_machine_parts<S: Any + Clone + PartialEq>(v: &dyn Any) -> Option<StateParts<'_>> {
    v.downcast_ref::<StateMachine<S>>().map(|sm| StateParts {
        current: sm.current() as &dyn Any,
        previous: sm.previous().map(|p| p as &dyn Any),
        time_in_state: sm.time_in_state(),
    })
}

fn state_machine_restore<S: Any + Clone + PartialEq>(
    v: &mut dyn Any,
    current: Box<dyn Any>,
    previous: Option<Box<dyn Any>>,
    time_in_state: f32,
) -> bool {
    let Some(sm) = v.downcast_mut::<StateMachine<S>>() else {
        return false;
    };
    let Ok(current) = current.downcast::<S>() else {
        return false;
    };
    let previous = match previous {
        Some(p) => match p.downcast::<S>() {
            Ok(p) => Some(*p),
            Err(_) => return false,
        },
        None => None,
    };
    sm.restore(*current, previous, time_in_state);
    true
}

impl<S: Describe + Default + Clone + PartialEq> Describe for StateMachine<S> {
    fn type_info() -> TypeInfo {
        TypeInfo::generic::<StateMachine<S>>(
            TypeKind::Value,
            GenericShape::StateMachine(StateMachineOps {
                state: S::type_info,
                parts: state_machine_parts::<S>,
                new_state: new_default::<S>,
                restore: state_machine_restore::<S>,
            }),
        )
    }
}
