// Derive output names items as `::save::...`; this lets it expand inside the
// crate too.
#[allow(unused_extern_crates)]
extern crate self as save;

mod atomic_write;
pub mod autosave;
pub mod bundle_io;
pub mod dynamic_objects;
pub mod field_engine;
pub mod file_header;
pub mod identity;
pub mod metadata_cache;
pub mod records;
pub mod save_config;
pub mod save_context;
pub mod save_error;
pub mod save_jobs;
pub mod save_metadata;
mod save_plugin;
pub mod save_store;
pub mod saveable;
pub mod saved_value;
pub mod scene_cache;
pub mod scene_host;
pub mod state_machine;
pub mod type_info;
pub mod type_registry;
pub mod value_types;
pub mod version;

#[cfg(test)]
mod test_support;

pub use atomic_write::{atomic_write, write_file};
pub use field_engine::{FieldAccess, FieldAttrs, FieldDescriptor, SaveFields};
pub use identity::{IdentityError, SaveId, UniqueId};
pub use records::{DynamicRecord, EntityRecord, PrefabRef, SceneName};
pub use save_context::SaveSubsystem;
pub use save_error::SaveError;
pub use save_plugin::{
    AfterSceneRestoreState, BeforeSceneRestoreState, BeforeSceneSerializeState, CurrentLevel,
    DeleteSaveRequest, LevelLoaded, LoadCompleted, LoadRequest, PlayerActivity, SaveCompleted,
    SavePlugin, SaveRequest, SceneHostResource,
};
pub use saveable::{GameObject, SaveableEntity, SaveableObject, SharedObject};
pub use type_info::{Describe, SaveEnum, TypeInfo};

/// `#[derive(SaveFields)]`
pub use save_derive::SaveFields;
