// ---------------------------------------------------------------------------
// saved_value – the savable representation space
// ---------------------------------------------------------------------------
//
// Every field that ends up in a record is lowered into a `SavedValue`. The
// set is closed: primitives and enums pass through, engine math types and
// curves map onto plain arrays, and generic shapes (lists, dictionaries,
// state machines, object references) map onto the structural variants.

use serde::{Deserialize, Serialize};

use crate::identity::SaveId;
use crate::records::EntityRecord;

/// Savable form of a value. `Null` is a real, meaningful value (absence of a
/// value), not an error marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SavedValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    /// Enum variant by name.
    Enum(String),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Quat([f32; 4]),
    /// Linear RGBA.
    Color([f32; 4]),
    Curve(SavedCurve),
    Gradient(SavedGradient),
    List(Vec<SavedValue>),
    /// Dictionary entries in iteration order of the source map.
    Map(Vec<(SavedValue, SavedValue)>),
    StateMachine(StateMachineSnapshot),
    Reference(SavedReference),
    Record(Box<EntityRecord>),
}

impl SavedValue {
    /// Short name of the variant, used in mismatch diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            SavedValue::Null => "Null",
            SavedValue::Bool(_) => "Bool",
            SavedValue::Int(_) => "Int",
            SavedValue::UInt(_) => "UInt",
            SavedValue::Float(_) => "Float",
            SavedValue::Str(_) => "Str",
            SavedValue::Enum(_) => "Enum",
            SavedValue::Vec2(_) => "Vec2",
            SavedValue::Vec3(_) => "Vec3",
            SavedValue::Vec4(_) => "Vec4",
            SavedValue::Quat(_) => "Quat",
            SavedValue::Color(_) => "Color",
            SavedValue::Curve(_) => "Curve",
            SavedValue::Gradient(_) => "Gradient",
            SavedValue::List(_) => "List",
            SavedValue::Map(_) => "Map",
            SavedValue::StateMachine(_) => "StateMachine",
            SavedValue::Reference(_) => "Reference",
            SavedValue::Record(_) => "Record",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SavedValue::Null)
    }
}

/// The savable type a converter produces. Returned alongside the converter
/// from a serializer lookup so callers know the shape before converting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SavableKind {
    Primitive,
    Enum,
    Vec2,
    Vec3,
    Vec4,
    Quat,
    Color,
    Curve,
    Gradient,
    List,
    Map,
    StateMachine,
    Reference,
    Record,
}

/// Keyframes as `[time, value, in_tangent, out_tangent]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SavedCurve {
    pub keys: Vec<[f32; 4]>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SavedGradient {
    /// `(time, linear rgba)`
    pub colors: Vec<(f32, [f32; 4])>,
    /// `(time, alpha)`
    pub alphas: Vec<(f32, f32)>,
}

/// Savable form of a `StateMachine<S>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateMachineSnapshot {
    pub current: Box<SavedValue>,
    pub previous: Option<Box<SavedValue>>,
    pub time_in_state: f32,
}

/// Savable form of any object reference.
///
/// The captured runtime and record type names let a load verify the
/// reference is being assigned to a compatible field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedReference {
    pub id: Option<SaveId>,
    pub runtime_type: String,
    pub record_type: String,
}

impl SavedReference {
    pub fn to(id: SaveId, runtime_type: &str, record_type: &str) -> Self {
        Self {
            id: Some(id),
            runtime_type: runtime_type.to_string(),
            record_type: record_type.to_string(),
        }
    }

    pub fn none(runtime_type: &str, record_type: &str) -> Self {
        Self {
            id: None,
            runtime_type: runtime_type.to_string(),
            record_type: record_type.to_string(),
        }
    }
}
