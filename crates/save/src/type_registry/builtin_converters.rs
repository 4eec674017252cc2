//! Built-in converters: engine math/color types, curves, gradients,
//! state-machine snapshots, and the generic list/dictionary/state-machine/
//! object-reference shapes.

use std::any::Any;

use bevy::color::Color;
use bevy::math::{Quat, Vec2, Vec3, Vec4};

use super::reference;
use super::{ConvertError, Converter, TypeRegistry};
use crate::field_engine::{try_get_serialized_data, try_set_deserialized};
use crate::saved_value::{
    SavableKind, SavedCurve, SavedGradient, SavedReference, SavedValue, StateMachineSnapshot,
};
use crate::type_info::{GenericDefinition, GenericShape};
use crate::value_types::{
    array_to_color, color_to_array, ColorGradient, GradientAlphaKey, GradientColorKey, Keyframe,
    KeyframeCurve,
};

/// Converter for a plain value type given infallible lowering and fallible
/// lifting functions.
fn value_converter<T: Any>(
    savable: SavableKind,
    lower: fn(&T) -> SavedValue,
    lift: fn(&SavedValue) -> Option<T>,
) -> Converter {
    let type_name = std::any::type_name::<T>();
    Converter::new(
        type_name,
        savable,
        move |value, _cx| {
            value
                .downcast_ref::<T>()
                .map(lower)
                .ok_or(ConvertError::NotInstance { type_name })
        },
        move |saved, target, _cx| {
            let slot = target
                .downcast_mut::<T>()
                .ok_or(ConvertError::NotInstance { type_name })?;
            *slot = lift(saved).ok_or(ConvertError::Mismatch {
                target: type_name,
                found: saved.kind_name(),
            })?;
            Ok(())
        },
    )
}

fn lower_curve(curve: &KeyframeCurve) -> SavedValue {
    SavedValue::Curve(SavedCurve {
        keys: curve
            .keys
            .iter()
            .map(|k| [k.time, k.value, k.in_tangent, k.out_tangent])
            .collect(),
    })
}

fn lift_curve(saved: &SavedValue) -> Option<KeyframeCurve> {
    let SavedValue::Curve(curve) = saved else {
        return None;
    };
    Some(KeyframeCurve {
        keys: curve
            .keys
            .iter()
            .map(|k| Keyframe {
                time: k[0],
                value: k[1],
                in_tangent: k[2],
                out_tangent: k[3],
            })
            .collect(),
    })
}

fn lower_gradient(gradient: &ColorGradient) -> SavedValue {
    SavedValue::Gradient(SavedGradient {
        colors: gradient
            .color_keys
            .iter()
            .map(|k| (k.time, color_to_array(k.color)))
            .collect(),
        alphas: gradient
            .alpha_keys
            .iter()
            .map(|k| (k.time, k.alpha))
            .collect(),
    })
}

fn lift_gradient(saved: &SavedValue) -> Option<ColorGradient> {
    let SavedValue::Gradient(gradient) = saved else {
        return None;
    };
    Some(ColorGradient {
        color_keys: gradient
            .colors
            .iter()
            .map(|(time, rgba)| GradientColorKey {
                time: *time,
                color: array_to_color(*rgba),
            })
            .collect(),
        alpha_keys: gradient
            .alphas
            .iter()
            .map(|(time, alpha)| GradientAlphaKey {
                time: *time,
                alpha: *alpha,
            })
            .collect(),
    })
}

pub(super) fn register_builtins(registry: &mut TypeRegistry) {
    registry.register::<Vec2>(value_converter::<Vec2>(
        SavableKind::Vec2,
        |v| SavedValue::Vec2(v.to_array()),
        |s| match s {
            SavedValue::Vec2(a) => Some(Vec2::from_array(*a)),
            _ => None,
        },
    ));
    registry.register::<Vec3>(value_converter::<Vec3>(
        SavableKind::Vec3,
        |v| SavedValue::Vec3(v.to_array()),
        |s| match s {
            SavedValue::Vec3(a) => Some(Vec3::from_array(*a)),
            _ => None,
        },
    ));
    registry.register::<Vec4>(value_converter::<Vec4>(
        SavableKind::Vec4,
        |v| SavedValue::Vec4(v.to_array()),
        |s| match s {
            SavedValue::Vec4(a) => Some(Vec4::from_array(*a)),
            _ => None,
        },
    ));
    registry.register::<Quat>(value_converter::<Quat>(
        SavableKind::Quat,
        |q| SavedValue::Quat(q.to_array()),
        |s| match s {
            SavedValue::Quat(a) => Some(Quat::from_array(*a)),
            _ => None,
        },
    ));
    registry.register::<Color>(value_converter::<Color>(
        SavableKind::Color,
        |c| SavedValue::Color(color_to_array(*c)),
        |s| match s {
            SavedValue::Color(a) => Some(array_to_color(*a)),
            _ => None,
        },
    ));
    registry.register::<KeyframeCurve>(value_converter::<KeyframeCurve>(
        SavableKind::Curve,
        lower_curve,
        lift_curve,
    ));
    registry.register::<ColorGradient>(value_converter::<ColorGradient>(
        SavableKind::Gradient,
        lower_gradient,
        lift_gradient,
    ));
    registry.register::<StateMachineSnapshot>(value_converter::<StateMachineSnapshot>(
        SavableKind::StateMachine,
        |snap| SavedValue::StateMachine(snap.clone()),
        |s| match s {
            SavedValue::StateMachine(snap) => Some(snap.clone()),
            _ => None,
        },
    ));

    registry.add_matcher(GenericDefinition::List, list_converter);
    registry.add_matcher(GenericDefinition::Dictionary, dictionary_converter);
    registry.add_matcher(GenericDefinition::StateMachine, state_machine_converter);
    registry.add_matcher(GenericDefinition::ObjectReference, object_reference_converter);
    registry.add_matcher(GenericDefinition::ObjectHandle, object_reference_converter);
}

fn list_converter(shape: GenericShape, type_name: &'static str) -> Option<Converter> {
    let GenericShape::List(ops) = shape else {
        return None;
    };
    Some(Converter::new(
        type_name,
        SavableKind::List,
        move |value, cx| {
            let element = (ops.element)();
            let mut items = Vec::new();
            let mut failure = None;
            let visited = (ops.for_each)(value, &mut |item: &dyn Any| {
                if failure.is_some() {
                    return;
                }
                match try_get_serialized_data(item, &element, cx) {
                    Ok(saved) => items.push(saved),
                    Err(e) => failure = Some(e),
                }
            });
            if !visited {
                return Err(ConvertError::NotInstance { type_name });
            }
            match failure {
                Some(e) => Err(e),
                None => Ok(SavedValue::List(items)),
            }
        },
        move |saved, target, cx| {
            let SavedValue::List(items) = saved else {
                return Err(ConvertError::Mismatch {
                    target: type_name,
                    found: saved.kind_name(),
                });
            };
            let element = (ops.element)();
            let mut built = Vec::with_capacity(items.len());
            for item in items {
                let mut slot = (ops.new_element)();
                try_set_deserialized(item, slot.as_mut(), &element, cx)?;
                built.push(slot);
            }
            if (ops.rebuild)(target, built) {
                Ok(())
            } else {
                Err(ConvertError::NotInstance { type_name })
            }
        },
    ))
}

fn dictionary_converter(shape: GenericShape, type_name: &'static str) -> Option<Converter> {
    let GenericShape::Dictionary(ops) = shape else {
        return None;
    };
    Some(Converter::new(
        type_name,
        SavableKind::Map,
        move |value, cx| {
            let (key_info, value_info) = ((ops.key)(), (ops.value)());
            let mut entries = Vec::new();
            let mut failure = None;
            let visited = (ops.for_each)(value, &mut |k: &dyn Any, v: &dyn Any| {
                if failure.is_some() {
                    return;
                }
                let pair = try_get_serialized_data(k, &key_info, cx)
                    .and_then(|k| Ok((k, try_get_serialized_data(v, &value_info, cx)?)));
                match pair {
                    Ok(pair) => entries.push(pair),
                    Err(e) => failure = Some(e),
                }
            });
            if !visited {
                return Err(ConvertError::NotInstance { type_name });
            }
            match failure {
                Some(e) => Err(e),
                None => Ok(SavedValue::Map(entries)),
            }
        },
        move |saved, target, cx| {
            let SavedValue::Map(entries) = saved else {
                return Err(ConvertError::Mismatch {
                    target: type_name,
                    found: saved.kind_name(),
                });
            };
            let (key_info, value_info) = ((ops.key)(), (ops.value)());
            let mut built = Vec::with_capacity(entries.len());
            for (k, v) in entries {
                let mut key = (ops.new_key)();
                let mut value = (ops.new_value)();
                try_set_deserialized(k, key.as_mut(), &key_info, cx)?;
                try_set_deserialized(v, value.as_mut(), &value_info, cx)?;
                built.push((key, value));
            }
            if (ops.rebuild)(target, built) {
                Ok(())
            } else {
                Err(ConvertError::NotInstance { type_name })
            }
        },
    ))
}

fn state_machine_converter(shape: GenericShape, type_name: &'static str) -> Option<Converter> {
    let GenericShape::StateMachine(ops) = shape else {
        return None;
    };
    Some(Converter::new(
        type_name,
        SavableKind::StateMachine,
        move |value, cx| {
            let state = (ops.state)();
            let parts = (ops.parts)(value).ok_or(ConvertError::NotInstance { type_name })?;
            let current = try_get_serialized_data(parts.current, &state, cx)?;
            let previous = match parts.previous {
                Some(p) => Some(Box::new(try_get_serialized_data(p, &state, cx)?)),
                None => None,
            };
            Ok(SavedValue::StateMachine(StateMachineSnapshot {
                current: Box::new(current),
                previous,
                time_in_state: parts.time_in_state,
            }))
        },
        move |saved, target, cx| {
            let SavedValue::StateMachine(snapshot) = saved else {
                return Err(ConvertError::Mismatch {
                    target: type_name,
                    found: saved.kind_name(),
                });
            };
            let state = (ops.state)();
            let mut current = (ops.new_state)();
            try_set_deserialized(&snapshot.current, current.as_mut(), &state, cx)?;
            let previous = match &snapshot.previous {
                Some(p) => {
                    let mut slot = (ops.new_state)();
                    try_set_deserialized(p, slot.as_mut(), &state, cx)?;
                    Some(slot)
                }
                None => None,
            };
            if (ops.restore)(target, current, previous, snapshot.time_in_state) {
                Ok(())
            } else {
                Err(ConvertError::NotInstance { type_name })
            }
        },
    ))
}

/// Shared by typed references and runtime object handles; the per-type
/// `assign` function picks the conversion.
fn object_reference_converter(shape: GenericShape, type_name: &'static str) -> Option<Converter> {
    let ops = match shape {
        GenericShape::ObjectReference(ops) | GenericShape::ObjectHandle(ops) => ops,
        _ => return None,
    };
    Some(Converter::new(
        type_name,
        SavableKind::Reference,
        move |value, _cx| {
            let current = (ops.current)(value).ok_or(ConvertError::NotInstance { type_name })?;
            reference::save_reference(&current, ops.runtime_type, ops.record_type)
        },
        move |saved, target, cx| match saved {
            SavedValue::Reference(saved_ref) => (ops.assign)(target, saved_ref, cx),
            SavedValue::Null => (ops.assign)(
                target,
                &SavedReference::none(ops.runtime_type, ops.record_type),
                cx,
            ),
            other => Err(ConvertError::Mismatch {
                target: type_name,
                found: other.kind_name(),
            }),
        },
    ))
}
