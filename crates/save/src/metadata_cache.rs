//! In-memory index of every save's metadata file, for the load screen.
//!
//! Filled by `refresh` (one pass over `SaveMetadata/`) and kept current by the
//! save plugin as saves are written, renamed, loaded and deleted. Listings are
//! partitioned by filename prefix: autosaves carry `SaveConfig::autosave_prefix`,
//! everything else counts as a player save.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use bevy::prelude::*;

use crate::save_config::SaveConfig;
use crate::save_error::SaveError;
use crate::save_metadata::{read_metadata_file, write_metadata_file, MetadataFile, SaveMetadata};

pub const METADATA_EXTENSION: &str = "metadata";

/// Read every `.metadata` file in `dir`. Corrupt or unreadable files are
/// logged and skipped; a missing directory yields an empty list.
pub fn read_all_metadata(dir: &Path) -> Vec<MetadataFile> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            error!("Failed to list save metadata in {}: {e}", dir.display());
            return Vec::new();
        }
    };

    let mut files = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().map_or(true, |e| e != METADATA_EXTENSION) {
            continue;
        }
        match read_metadata_file(&path) {
            Ok(file) => files.push(file),
            Err(e) => error!("Skipping save metadata {}: {e}", path.display()),
        }
    }
    files
}

#[derive(Resource, Debug, Clone, Default)]
pub struct MetadataCache {
    entries: BTreeMap<String, MetadataFile>,
}

impl MetadataCache {
    /// Rebuild from disk. Returns the number of saves found.
    pub fn refresh(&mut self, config: &SaveConfig) -> usize {
        self.entries = read_all_metadata(&config.metadata_dir())
            .into_iter()
            .map(|f| (f.metadata.save_filename.clone(), f))
            .collect();
        debug!("Metadata cache refreshed: {} saves", self.entries.len());
        self.entries.len()
    }

    pub fn insert(&mut self, file: MetadataFile) {
        self.entries.insert(file.metadata.save_filename.clone(), file);
    }

    pub fn get(&self, name: &str) -> Option<&MetadataFile> {
        self.entries.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<MetadataFile> {
        self.entries.remove(name)
    }

    /// Drop `name` only if its metadata file is gone from disk. Used after a
    /// failed delete so the cache keeps listing what is still there.
    pub fn forget_if_deleted(&mut self, config: &SaveConfig, name: &str) -> bool {
        if config.metadata_path(name).exists() {
            return false;
        }
        self.entries.remove(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn newest_first<'a>(iter: impl Iterator<Item = &'a MetadataFile>) -> Vec<&'a SaveMetadata> {
        let mut list: Vec<&SaveMetadata> = iter.map(|f| &f.metadata).collect();
        list.sort_by(|a, b| {
            b.save_timestamp
                .cmp(&a.save_timestamp)
                .then_with(|| a.save_filename.cmp(&b.save_filename))
        });
        list
    }

    /// Every save, newest first.
    pub fn all(&self) -> Vec<&SaveMetadata> {
        Self::newest_first(self.entries.values())
    }

    pub fn player_saves(&self, config: &SaveConfig) -> Vec<&SaveMetadata> {
        Self::newest_first(
            self.entries
                .values()
                .filter(|f| !config.is_autosave(&f.metadata.save_filename)),
        )
    }

    pub fn autosaves(&self, config: &SaveConfig) -> Vec<&SaveMetadata> {
        Self::newest_first(
            self.entries
                .values()
                .filter(|f| config.is_autosave(&f.metadata.save_filename)),
        )
    }

    fn update(
        &mut self,
        config: &SaveConfig,
        name: &str,
        edit: impl FnOnce(&mut SaveMetadata),
    ) -> Result<(), SaveError> {
        let file = self
            .entries
            .get_mut(name)
            .ok_or_else(|| SaveError::NotFound(name.to_string()))?;
        edit(&mut file.metadata);
        write_metadata_file(&config.metadata_path(name), file, config.atomic_writes)
    }

    /// Change the name shown on the load screen and rewrite the file.
    pub fn rename_display_name(
        &mut self,
        config: &SaveConfig,
        name: &str,
        display_name: &str,
    ) -> Result<(), SaveError> {
        self.update(config, name, |m| m.display_name = display_name.to_string())
    }

    /// Stamp the last-loaded time (Unix seconds) and rewrite the file.
    pub fn touch_last_loaded(
        &mut self,
        config: &SaveConfig,
        name: &str,
        timestamp: i64,
    ) -> Result<(), SaveError> {
        self.update(config, name, |m| m.last_loaded_timestamp = timestamp)
    }
}
