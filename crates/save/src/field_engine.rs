// ---------------------------------------------------------------------------
// field_engine – decides which fields of an entity are saved, and moves
// values between fields and `SavedValue`s
// ---------------------------------------------------------------------------
//
// Field selection rules, applied in order:
//   - `skip`, `read_only` and `delegate` fields are never saved
//   - caller-supplied and type-declared backing-field names are excluded
//   - fields whose type has no description are excluded
//   - after unwrapping `Option<T>`: engine-object handles need `reference`,
//     list and dictionary types need `collection`
//
// Everything else (primitives, enums, nullables, plain value types) is
// selected by default.

use std::any::Any;
use std::collections::BTreeMap;

use bevy::prelude::*;

use crate::saved_value::SavedValue;
use crate::type_info::{TypeInfo, TypeKind};
use crate::type_registry::{ConvertCx, ConvertError};

/// Per-field markers from `#[save(...)]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldAttrs {
    pub skip: bool,
    pub read_only: bool,
    pub delegate: bool,
    pub reference: bool,
    pub collection: bool,
}

/// Monomorphized accessors for one field of `T`.
pub struct FieldAccess<T> {
    pub get: fn(&T) -> &dyn Any,
    pub get_mut: fn(&mut T) -> &mut dyn Any,
}

impl<T> Clone for FieldAccess<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for FieldAccess<T> {}

pub struct FieldDescriptor<T> {
    pub name: &'static str,
    /// `None` for fields that can never be saved.
    pub type_info: Option<fn() -> TypeInfo>,
    pub attrs: FieldAttrs,
    pub access: Option<FieldAccess<T>>,
}

/// A field that passed selection.
pub struct SelectedField<T> {
    pub name: &'static str,
    pub info: TypeInfo,
    pub access: FieldAccess<T>,
}

/// Usually derived with `#[derive(SaveFields)]`.
pub trait SaveFields: Sized + 'static {
    fn field_descriptors() -> Vec<FieldDescriptor<Self>>;

    /// Names of backing fields that must never be saved on their own.
    fn excluded_backing_fields() -> &'static [&'static str] {
        &[]
    }
}

fn passes_opt_in(info: &TypeInfo, attrs: &FieldAttrs) -> bool {
    match info.non_nullable().kind {
        TypeKind::EngineObject => attrs.reference,
        TypeKind::Collection | TypeKind::Dictionary => attrs.collection,
        _ => true,
    }
}

/// Fields of `T` that should be saved, in declaration order.
pub fn get_serializable_fields<T: SaveFields>(exclude: &[&str]) -> Vec<SelectedField<T>> {
    let backing = T::excluded_backing_fields();
    T::field_descriptors()
        .into_iter()
        .filter_map(|field| {
            let attrs = field.attrs;
            if attrs.skip || attrs.read_only || attrs.delegate {
                return None;
            }
            if exclude.contains(&field.name) || backing.contains(&field.name) {
                return None;
            }
            let info = (field.type_info?)();
            let access = field.access?;
            passes_opt_in(&info, &attrs).then_some(SelectedField {
                name: field.name,
                info,
                access,
            })
        })
        .collect()
}

/// Lower one value of the described type.
pub fn try_get_serialized_data(
    value: &dyn Any,
    info: &TypeInfo,
    cx: &ConvertCx<'_>,
) -> Result<SavedValue, ConvertError> {
    match info.kind {
        TypeKind::Primitive(ops) | TypeKind::Enum(ops) => {
            (ops.to_saved)(value).ok_or(ConvertError::NotInstance {
                type_name: info.type_name,
            })
        }
        TypeKind::Nullable(ops) => match (ops.get)(value) {
            Some(Some(inner)) => try_get_serialized_data(inner, &(ops.inner)(), cx),
            Some(None) => Ok(SavedValue::Null),
            None => Err(ConvertError::NotInstance {
                type_name: info.type_name,
            }),
        },
        _ => {
            let (_, converter) =
                cx.registry
                    .try_get_serializer(info)
                    .ok_or(ConvertError::NoConverter {
                        type_name: info.type_name,
                    })?;
            converter.to_saved(value, cx)
        }
    }
}

/// Lift `saved` into `target`, which must be of the described type.
pub fn try_set_deserialized(
    saved: &SavedValue,
    target: &mut dyn Any,
    info: &TypeInfo,
    cx: &ConvertCx<'_>,
) -> Result<(), ConvertError> {
    match info.kind {
        TypeKind::Primitive(ops) | TypeKind::Enum(ops) => {
            if (ops.from_saved)(saved, target) {
                Ok(())
            } else {
                Err(ConvertError::Mismatch {
                    target: info.type_name,
                    found: saved.kind_name(),
                })
            }
        }
        TypeKind::Nullable(ops) => {
            if saved.is_null() {
                return if (ops.set_none)(target) {
                    Ok(())
                } else {
                    Err(ConvertError::NotInstance {
                        type_name: info.type_name,
                    })
                };
            }
            let inner = (ops.get_or_insert_default)(target).ok_or(ConvertError::NotInstance {
                type_name: info.type_name,
            })?;
            try_set_deserialized(saved, inner, &(ops.inner)(), cx)
        }
        _ => {
            let converter =
                cx.registry
                    .try_get_deserializer(info)
                    .ok_or(ConvertError::NoConverter {
                        type_name: info.type_name,
                    })?;
            converter.from_saved(saved, target, cx)
        }
    }
}

/// Lower every selected field of `entity`. Fields that fail are logged and
/// left out of the map.
pub fn capture_fields<T: SaveFields>(
    entity: &T,
    cx: &ConvertCx<'_>,
) -> BTreeMap<String, SavedValue> {
    let mut out = BTreeMap::new();
    for field in get_serializable_fields::<T>(&[]) {
        let value = (field.access.get)(entity);
        match try_get_serialized_data(value, &field.info, cx) {
            Ok(saved) => {
                out.insert(field.name.to_string(), saved);
            }
            Err(e) => warn!(
                "Field '{}' of {} not saved: {e}",
                field.name,
                std::any::type_name::<T>()
            ),
        }
    }
    out
}

/// Apply saved field values to `entity`. Fields missing from `fields` keep
/// their current value; fields that fail to convert are logged and skipped.
/// Returns the number of fields applied.
pub fn restore_fields<T: SaveFields>(
    entity: &mut T,
    fields: &BTreeMap<String, SavedValue>,
    cx: &ConvertCx<'_>,
) -> usize {
    let mut applied = 0;
    for field in get_serializable_fields::<T>(&[]) {
        let Some(saved) = fields.get(field.name) else {
            continue;
        };
        let target = (field.access.get_mut)(entity);
        match try_set_deserialized(saved, target, &field.info, cx) {
            Ok(()) => applied += 1,
            Err(e) => warn!(
                "Field '{}' of {} not restored: {e}",
                field.name,
                std::any::type_name::<T>()
            ),
        }
    }
    applied
}
