// ---------------------------------------------------------------------------
// save_store – naming, listing and deleting saves on disk
// ---------------------------------------------------------------------------

use std::fs;

use bevy::prelude::*;
use chrono::{DateTime, Local};

use crate::save_config::SaveConfig;
use crate::save_error::SaveError;

/// `{prefix}{YYYYMMDD_HHMMSS}`
pub fn generate_save_name(prefix: &str, now: DateTime<Local>) -> String {
    format!("{prefix}{}", now.format("%Y%m%d_%H%M%S"))
}

/// Like `generate_save_name`, with a `_2`, `_3`... suffix when a save with
/// that name already exists.
pub fn unique_save_name(config: &SaveConfig, prefix: &str, now: DateTime<Local>) -> String {
    let base = generate_save_name(prefix, now);
    let taken = |name: &str| config.bundle_dir(name).exists() || config.metadata_path(name).exists();
    if !taken(&base) {
        return base;
    }
    let mut n = 2;
    loop {
        let name = format!("{base}_{n}");
        if !taken(&name) {
            return name;
        }
        n += 1;
    }
}

/// Names of every bundle directory under `Saves/`, sorted.
pub fn list_save_names(config: &SaveConfig) -> Result<Vec<String>, SaveError> {
    let dir = config.saves_dir();
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    for entry in fs::read_dir(&dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}

/// Remove the metadata file and the bundle directory of a save.
///
/// The metadata goes first: it is what lists a save, so a failure part way
/// never leaves a listed save without its bundle.
pub fn delete_save(config: &SaveConfig, name: &str) -> Result<(), SaveError> {
    let bundle = config.bundle_dir(name);
    let metadata = config.metadata_path(name);
    let mut found = false;

    if metadata.exists() {
        fs::remove_file(&metadata)?;
        found = true;
    }
    if bundle.is_dir() {
        fs::remove_dir_all(&bundle)?;
        found = true;
    }

    if !found {
        return Err(SaveError::NotFound(name.to_string()));
    }
    info!("Deleted save '{name}'");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::path::PathBuf;

    fn test_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("scene_save_store_test_{name}"));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn noon() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 7, 4, 12, 30, 5).unwrap()
    }

    #[test]
    fn test_generate_save_name() {
        assert_eq!(generate_save_name("Save_", noon()), "Save_20260704_123005");
        assert_eq!(
            generate_save_name("Autosave_", noon()),
            "Autosave_20260704_123005"
        );
    }

    #[test]
    fn test_unique_save_name_suffixes() {
        let config = SaveConfig::with_root(test_dir("unique"));
        let first = unique_save_name(&config, "Save_", noon());
        fs::create_dir_all(config.bundle_dir(&first)).unwrap();
        let second = unique_save_name(&config, "Save_", noon());
        assert_eq!(second, format!("{first}_2"));
        let _ = fs::remove_dir_all(&config.root);
    }

    #[test]
    fn test_delete_removes_bundle_and_metadata() {
        let config = SaveConfig::with_root(test_dir("delete"));
        fs::create_dir_all(config.bundle_dir("Save_1")).unwrap();
        fs::write(config.bundle_dir("Save_1").join("Harbor.save"), b"x").unwrap();
        fs::create_dir_all(config.metadata_dir()).unwrap();
        fs::write(config.metadata_path("Save_1"), b"x").unwrap();

        assert_eq!(list_save_names(&config).unwrap(), ["Save_1"]);
        delete_save(&config, "Save_1").unwrap();
        assert!(!config.bundle_dir("Save_1").exists());
        assert!(!config.metadata_path("Save_1").exists());
        assert!(list_save_names(&config).unwrap().is_empty());

        let msg = format!("{}", delete_save(&config, "Save_1").unwrap_err());
        assert!(msg.contains("Save_1"), "got: {msg}");
        let _ = fs::remove_dir_all(&config.root);
    }

    #[test]
    fn test_failed_metadata_delete_keeps_bundle() {
        let config = SaveConfig::with_root(test_dir("delete_blocked"));
        fs::create_dir_all(config.bundle_dir("Save_1")).unwrap();
        fs::create_dir_all(config.metadata_path("Save_1").join("pinned")).unwrap();

        assert!(matches!(delete_save(&config, "Save_1"), Err(SaveError::Io(_))));
        assert!(config.bundle_dir("Save_1").is_dir());
        let _ = fs::remove_dir_all(&config.root);
    }
}
