// ---------------------------------------------------------------------------
// type_registry – runtime type -> savable type converters
// ---------------------------------------------------------------------------
//
// Lookup order for a type:
//   1. The direct table (built-ins plus anything registered explicitly).
//   2. Structural match: if the type, or a type on its declared base chain,
//      is an instance of a known generic shape (list, dictionary, state
//      machine, object reference), build a converter for that shape, routed
//      through the base upcasts.
//   3. Memoize the structural result in the direct table so the next lookup
//      for the same type returns the identical `Arc` without walking again.
//
// Tables are append-only: entries are never replaced or evicted.

mod builtin_converters;
pub mod reference;

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use bevy::prelude::*;

use crate::saved_value::{SavableKind, SavedValue};
use crate::type_info::{BaseInfo, GenericDefinition, GenericShape, TypeInfo};
use reference::{ObjectResolver, ReferenceError};

/// Deepest base chain a structural walk follows before giving up.
const MAX_BASE_DEPTH: usize = 16;

pub type ToSavedFn =
    dyn Fn(&dyn Any, &ConvertCx<'_>) -> Result<SavedValue, ConvertError> + Send + Sync;
pub type FromSavedFn =
    dyn Fn(&SavedValue, &mut dyn Any, &ConvertCx<'_>) -> Result<(), ConvertError> + Send + Sync;

/// An explicit pair of conversion functions between one runtime type and
/// its savable form.
pub struct Converter {
    runtime_type: &'static str,
    savable: SavableKind,
    to_saved: Box<ToSavedFn>,
    from_saved: Box<FromSavedFn>,
}

impl Converter {
    pub fn new(
        runtime_type: &'static str,
        savable: SavableKind,
        to_saved: impl Fn(&dyn Any, &ConvertCx<'_>) -> Result<SavedValue, ConvertError>
            + Send
            + Sync
            + 'static,
        from_saved: impl Fn(&SavedValue, &mut dyn Any, &ConvertCx<'_>) -> Result<(), ConvertError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            runtime_type,
            savable,
            to_saved: Box::new(to_saved),
            from_saved: Box::new(from_saved),
        }
    }

    pub fn runtime_type(&self) -> &'static str {
        self.runtime_type
    }

    pub fn savable(&self) -> SavableKind {
        self.savable
    }

    pub fn to_saved(&self, value: &dyn Any, cx: &ConvertCx<'_>) -> Result<SavedValue, ConvertError> {
        (self.to_saved)(value, cx)
    }

    pub fn from_saved(
        &self,
        saved: &SavedValue,
        target: &mut dyn Any,
        cx: &ConvertCx<'_>,
    ) -> Result<(), ConvertError> {
        (self.from_saved)(saved, target, cx)
    }
}

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Converter")
            .field("runtime_type", &self.runtime_type)
            .field("savable", &self.savable)
            .finish()
    }
}

/// What a conversion can see: the registry (for nested values) and, on
/// restore, a resolver for object references.
#[derive(Clone, Copy)]
pub struct ConvertCx<'a> {
    pub registry: &'a TypeRegistry,
    pub resolver: Option<&'a dyn ObjectResolver>,
}

impl<'a> ConvertCx<'a> {
    pub fn new(registry: &'a TypeRegistry) -> Self {
        Self {
            registry,
            resolver: None,
        }
    }

    pub fn with_resolver(registry: &'a TypeRegistry, resolver: &'a dyn ObjectResolver) -> Self {
        Self {
            registry,
            resolver: Some(resolver),
        }
    }
}

/// Why a single value could not be converted.
#[derive(Debug, Clone, PartialEq)]
pub enum ConvertError {
    /// Nothing in the registry knows this type.
    NoConverter { type_name: &'static str },
    /// The saved value has the wrong shape for the target.
    Mismatch {
        target: &'static str,
        found: &'static str,
    },
    /// The value handed to a converter was not of the converter's type.
    NotInstance { type_name: &'static str },
    /// A referenced object has no identity, so the reference cannot be saved.
    Unidentified { type_name: String },
    Reference(ReferenceError),
}

impl fmt::Display for ConvertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConvertError::NoConverter { type_name } => {
                write!(f, "no converter registered for {type_name}")
            }
            ConvertError::Mismatch { target, found } => {
                write!(f, "cannot convert saved {found} into {target}")
            }
            ConvertError::NotInstance { type_name } => {
                write!(f, "value is not an instance of {type_name}")
            }
            ConvertError::Unidentified { type_name } => {
                write!(f, "referenced {type_name} has no identity assigned")
            }
            ConvertError::Reference(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ConvertError {}

impl From<ReferenceError> for ConvertError {
    fn from(e: ReferenceError) -> Self {
        ConvertError::Reference(e)
    }
}

/// Builds a converter for one instantiation of a generic shape.
type ShapeBuilder = fn(GenericShape, &'static str) -> Option<Converter>;

struct ShapeMatcher {
    definition: GenericDefinition,
    build: ShapeBuilder,
}

/// Process-wide table of converters. Owned by the save subsystem and shared
/// with background code through an `Arc`.
pub struct TypeRegistry {
    direct: RwLock<HashMap<TypeId, Arc<Converter>>>,
    matchers: Vec<ShapeMatcher>,
    structural_walks: AtomicUsize,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl TypeRegistry {
    /// A registry with no converters and no structural matchers.
    pub fn empty() -> Self {
        Self {
            direct: RwLock::new(HashMap::new()),
            matchers: Vec::new(),
            structural_walks: AtomicUsize::new(0),
        }
    }

    /// A registry seeded with the engine value types, references, records,
    /// and the list/dictionary/state-machine/reference shapes.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        builtin_converters::register_builtins(&mut registry);
        reference::register_reference_converters(&mut registry);
        registry
    }

    /// Register an explicit converter for `T`. A second registration for the
    /// same type is ignored.
    pub fn register<T: Any>(&mut self, converter: Converter) {
        let direct = self
            .direct
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        let type_id = TypeId::of::<T>();
        if direct.contains_key(&type_id) {
            warn!(
                "TypeRegistry: duplicate converter for '{}', ignoring second registration",
                std::any::type_name::<T>()
            );
            return;
        }
        direct.insert(type_id, Arc::new(converter));
    }

    fn add_matcher(&mut self, definition: GenericDefinition, build: ShapeBuilder) {
        self.matchers.push(ShapeMatcher { definition, build });
    }

    pub fn try_get_serializer(&self, info: &TypeInfo) -> Option<(SavableKind, Arc<Converter>)> {
        self.resolve(info).map(|c| (c.savable, c))
    }

    pub fn try_get_deserializer(&self, info: &TypeInfo) -> Option<Arc<Converter>> {
        self.resolve(info)
    }

    /// Number of structural walks performed so far. Direct-table hits do not
    /// count.
    pub fn structural_walks(&self) -> usize {
        self.structural_walks.load(Ordering::Relaxed)
    }

    pub fn contains(&self, type_id: TypeId) -> bool {
        self.lookup_direct(type_id).is_some()
    }

    fn lookup_direct(&self, type_id: TypeId) -> Option<Arc<Converter>> {
        self.direct
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&type_id)
            .cloned()
    }

    fn resolve(&self, info: &TypeInfo) -> Option<Arc<Converter>> {
        if let Some(converter) = self.lookup_direct(info.type_id) {
            return Some(converter);
        }

        self.structural_walks.fetch_add(1, Ordering::Relaxed);
        let converter = self.match_structurally(info)?;

        // First writer wins so every caller ends up holding the same Arc.
        let mut direct = self.direct.write().unwrap_or_else(PoisonError::into_inner);
        let entry = direct
            .entry(info.type_id)
            .or_insert_with(|| Arc::new(converter));
        debug!(
            "TypeRegistry: memoized structural converter for '{}'",
            info.type_name
        );
        Some(Arc::clone(entry))
    }

    fn match_structurally(&self, info: &TypeInfo) -> Option<Converter> {
        let mut chain: Vec<BaseInfo> = Vec::new();
        let mut current = *info;
        loop {
            if !chain.is_empty() {
                if let Some(base) = self.lookup_direct(current.type_id) {
                    return Some(through_bases(info.type_name, chain, base));
                }
            }
            if let Some(shape) = current.generic {
                let definition = shape.definition();
                if let Some(matcher) = self.matchers.iter().find(|m| m.definition == definition) {
                    let built = (matcher.build)(shape, current.type_name)?;
                    if chain.is_empty() {
                        return Some(built);
                    }
                    return Some(through_bases(info.type_name, chain, Arc::new(built)));
                }
            }
            let base = current.base?;
            chain.push(base);
            if chain.len() > MAX_BASE_DEPTH {
                warn!(
                    "TypeRegistry: base chain of '{}' deeper than {MAX_BASE_DEPTH}, giving up",
                    info.type_name
                );
                return None;
            }
            current = (base.info)();
        }
    }
}

/// Wrap `inner` so it is applied to the base reached by upcasting through
/// `chain`, first element first.
fn through_bases(
    runtime_type: &'static str,
    chain: Vec<BaseInfo>,
    inner: Arc<Converter>,
) -> Converter {
    let chain = Arc::new(chain);
    let chain_mut = Arc::clone(&chain);
    let inner_mut = Arc::clone(&inner);
    let savable = inner.savable;
    Converter::new(
        runtime_type,
        savable,
        move |value, cx| {
            let mut v = value;
            for base in chain.iter() {
                v = (base.upcast)(v).ok_or(ConvertError::NotInstance {
                    type_name: runtime_type,
                })?;
            }
            inner.to_saved(v, cx)
        },
        move |saved, target, cx| {
            let mut t = target;
            for base in chain_mut.iter() {
                t = (base.upcast_mut)(t).ok_or(ConvertError::NotInstance {
                    type_name: runtime_type,
                })?;
            }
            inner_mut.from_saved(saved, t, cx)
        },
    )
}
