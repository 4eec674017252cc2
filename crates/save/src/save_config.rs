// ---------------------------------------------------------------------------
// save_config – where saves live and how they are written
// ---------------------------------------------------------------------------

use std::path::{Path, PathBuf};

use bevy::prelude::*;

/// Folder created under the platform data directory.
pub const DEFAULT_APP_DIR: &str = "SceneSave";

#[derive(Resource, Debug, Clone)]
pub struct SaveConfig {
    /// Root directory; `Saves/` and `SaveMetadata/` live below it.
    pub root: PathBuf,
    /// Build version written into metadata and bundle files.
    pub version: String,
    /// LZ4-compress bundle payloads.
    pub compress: bool,
    /// Write-temp-then-rename for every file. Off by default.
    pub atomic_writes: bool,
    pub manual_prefix: String,
    pub autosave_prefix: String,
}

impl Default for SaveConfig {
    fn default() -> Self {
        let base = dirs::data_local_dir().unwrap_or_else(std::env::temp_dir);
        Self {
            root: base.join(DEFAULT_APP_DIR),
            version: env!("CARGO_PKG_VERSION").to_string(),
            compress: true,
            atomic_writes: false,
            manual_prefix: "Save_".to_string(),
            autosave_prefix: "Autosave_".to_string(),
        }
    }
}

impl SaveConfig {
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    pub fn saves_dir(&self) -> PathBuf {
        self.root.join("Saves")
    }

    /// `Saves/{name}`
    pub fn bundle_dir(&self, name: &str) -> PathBuf {
        self.saves_dir().join(name)
    }

    pub fn metadata_dir(&self) -> PathBuf {
        self.root.join("SaveMetadata")
    }

    /// `SaveMetadata/{name}.metadata`
    pub fn metadata_path(&self, name: &str) -> PathBuf {
        self.metadata_dir().join(format!("{name}.metadata"))
    }

    pub fn is_autosave(&self, name: &str) -> bool {
        name.starts_with(&self.autosave_prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        let config = SaveConfig::with_root("/tmp/scene_save_config_test");
        assert_eq!(
            config.bundle_dir("Save_1"),
            PathBuf::from("/tmp/scene_save_config_test/Saves/Save_1")
        );
        assert_eq!(
            config.metadata_path("Save_1"),
            PathBuf::from("/tmp/scene_save_config_test/SaveMetadata/Save_1.metadata")
        );
        assert!(config.is_autosave("Autosave_20260101_000000"));
        assert!(!config.is_autosave("Save_20260101_000000"));
        assert!(!config.atomic_writes);
    }
}
