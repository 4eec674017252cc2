// ---------------------------------------------------------------------------
// bundle_io – a save bundle on disk
// ---------------------------------------------------------------------------
//
// Layout under `Saves/{name}/`:
//   {Scene}.scene         one per scene, records of scene entities
//   DynamicObjects.save   records of runtime-created entities, all scenes
//
// Scene files and the dynamic file use different extensions so no scene
// name can collide with it. Scene names that are not a plain file name are
// refused.
//
// Every file is a bitcode blob wrapped by `file_header`. Encoding runs on
// the main thread; writing and reading only touch bytes and can run on the
// IoTaskPool.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::atomic_write::write_file;
use crate::dynamic_objects::DynamicScenes;
use crate::file_header::{unwrap_payload, wrap_payload};
use crate::identity::SaveId;
use crate::records::{DynamicRecord, EntityRecord, SceneName};
use crate::save_error::SaveError;
use crate::version::is_compatible_with;

pub const DYNAMIC_OBJECTS_FILE: &str = "DynamicObjects.save";
pub const SCENE_FILE_EXTENSION: &str = "scene";

/// Everything one save holds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SaveBundle {
    pub scenes: BTreeMap<SceneName, BTreeMap<SaveId, EntityRecord>>,
    pub dynamic: DynamicScenes,
}

impl SaveBundle {
    pub fn record_count(&self) -> usize {
        self.scenes.values().map(BTreeMap::len).sum::<usize>()
            + self.dynamic.values().map(BTreeMap::len).sum::<usize>()
    }
}

#[derive(Serialize, Deserialize)]
struct SceneSaveFile {
    version: String,
    scene: SceneName,
    records: Vec<EntityRecord>,
}

#[derive(Serialize, Deserialize)]
struct DynamicObjectsFile {
    version: String,
    scenes: BTreeMap<SceneName, Vec<DynamicRecord>>,
}

/// Bundle files ready to be written: `(file name, bytes)`.
#[derive(Debug, Clone, Default)]
pub struct EncodedBundle {
    pub files: Vec<(String, Vec<u8>)>,
}

impl EncodedBundle {
    pub fn total_bytes(&self) -> usize {
        self.files.iter().map(|(_, b)| b.len()).sum()
    }
}

fn is_plain_file_stem(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}

fn scene_file_name(scene: &SceneName) -> Result<String, SaveError> {
    if !is_plain_file_stem(scene.as_str()) {
        return Err(SaveError::Encode(format!(
            "scene name '{scene}' cannot be used as a file name"
        )));
    }
    Ok(format!("{scene}.{SCENE_FILE_EXTENSION}"))
}

fn encode<T: Serialize>(value: &T, compress: bool) -> Result<Vec<u8>, SaveError> {
    let bytes = bitcode::serialize(value).map_err(|e| SaveError::Encode(e.to_string()))?;
    wrap_payload(&bytes, compress)
}

fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, SaveError> {
    let payload = unwrap_payload(bytes)?;
    Ok(bitcode::deserialize(&payload)?)
}

fn check_version(found: &str, expected: &str) -> Result<(), SaveError> {
    if is_compatible_with(Some(found), Some(expected)) {
        Ok(())
    } else {
        Err(SaveError::VersionMismatch {
            expected: expected.to_string(),
            found: found.to_string(),
        })
    }
}

pub fn encode_bundle(
    bundle: &SaveBundle,
    version: &str,
    compress: bool,
) -> Result<EncodedBundle, SaveError> {
    let mut files = Vec::with_capacity(bundle.scenes.len() + 1);
    for (scene, records) in &bundle.scenes {
        let file = SceneSaveFile {
            version: version.to_string(),
            scene: scene.clone(),
            records: records.values().cloned().collect(),
        };
        files.push((scene_file_name(scene)?, encode(&file, compress)?));
    }
    let dynamic = DynamicObjectsFile {
        version: version.to_string(),
        scenes: bundle
            .dynamic
            .iter()
            .map(|(scene, records)| (scene.clone(), records.values().cloned().collect()))
            .collect(),
    };
    files.push((DYNAMIC_OBJECTS_FILE.to_string(), encode(&dynamic, compress)?));
    Ok(EncodedBundle { files })
}

/// Write every file into `dir`, removing `.save` files left over from an
/// earlier save under the same name.
pub fn write_bundle_files(dir: &Path, encoded: &EncodedBundle, atomic: bool) -> Result<(), SaveError> {
    fs::create_dir_all(dir)?;
    let keep: BTreeSet<&str> = encoded.files.iter().map(|(n, _)| n.as_str()).collect();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let stale = path.extension().is_some_and(|e| e == SCENE_FILE_EXTENSION)
            && path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| !keep.contains(n));
        if stale {
            fs::remove_file(&path)?;
        }
    }
    for (name, bytes) in &encoded.files {
        write_file(&dir.join(name), bytes, atomic)?;
    }
    Ok(())
}

fn scene_files_in(dir: &Path) -> Result<BTreeSet<SceneName>, SaveError> {
    let mut scenes = BTreeSet::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().map_or(true, |e| e != SCENE_FILE_EXTENSION) {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            scenes.insert(SceneName::from(stem));
        }
    }
    Ok(scenes)
}

/// Read a bundle back.
///
/// `Ok(None)` when the directory or the dynamic-objects file is missing.
/// Every scene in `tracked_scenes` (plus the manager scene) gets an entry;
/// scenes without a file get an empty one.
pub fn read_bundle(
    dir: &Path,
    tracked_scenes: &[SceneName],
    expected_version: &str,
) -> Result<Option<SaveBundle>, SaveError> {
    let dynamic_path = dir.join(DYNAMIC_OBJECTS_FILE);
    if !dir.is_dir() || !dynamic_path.is_file() {
        return Ok(None);
    }

    let dynamic_file: DynamicObjectsFile = decode(&fs::read(&dynamic_path)?)?;
    check_version(&dynamic_file.version, expected_version)?;
    let dynamic = dynamic_file
        .scenes
        .into_iter()
        .map(|(scene, records)| {
            let by_id = records
                .into_iter()
                .map(|r| (r.entity.header.id.clone(), r))
                .collect();
            (scene, by_id)
        })
        .collect();

    let mut wanted: BTreeSet<SceneName> = tracked_scenes.iter().cloned().collect();
    wanted.insert(SceneName::manager());
    wanted.extend(scene_files_in(dir)?);

    let mut scenes = BTreeMap::new();
    for scene in wanted {
        let path = match scene_file_name(&scene) {
            Ok(file_name) => dir.join(file_name),
            Err(e) => {
                warn!("Bundle {}: {e}, clearing it", dir.display());
                scenes.insert(scene, BTreeMap::new());
                continue;
            }
        };
        if !path.is_file() {
            debug!("Bundle {}: no file for scene '{scene}', clearing it", dir.display());
            scenes.insert(scene, BTreeMap::new());
            continue;
        }
        let file: SceneSaveFile = decode(&fs::read(&path)?)?;
        check_version(&file.version, expected_version)?;
        if file.scene != scene {
            warn!(
                "Bundle {}: file for '{scene}' claims scene '{}'",
                dir.display(),
                file.scene
            );
        }
        let records = file
            .records
            .into_iter()
            .map(|r| (r.header.id.clone(), r))
            .collect();
        scenes.insert(scene, records);
    }

    Ok(Some(SaveBundle { scenes, dynamic }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{PrefabRef, RecordHeader};
    use crate::saved_value::SavedValue;
    use std::path::PathBuf;

    fn test_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("scene_save_bundle_io_test_{name}"));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn record(id: &str, scene: &str) -> EntityRecord {
        let mut fields = BTreeMap::new();
        fields.insert("label".to_string(), SavedValue::Str(id.to_string()));
        EntityRecord {
            header: RecordHeader {
                id: SaveId::from_raw(id),
                association_id: id.to_string(),
                scene: scene.into(),
                type_name: "Door".into(),
                record_type: "EntityRecord".into(),
                game_object_active: true,
                script_enabled: true,
                position: [0.0; 3],
                rotation: [0.0, 0.0, 0.0, 1.0],
            },
            fields,
        }
    }

    fn bundle() -> SaveBundle {
        let mut bundle = SaveBundle::default();
        for (scene, id) in [("SaveManager", "Stats"), ("Harbor", "Door_a"), ("Harbor", "Door_b")] {
            bundle
                .scenes
                .entry(scene.into())
                .or_default()
                .insert(SaveId::from_raw(id), record(id, scene));
        }
        bundle.dynamic.entry("Harbor".into()).or_default().insert(
            SaveId::from_raw("Crate_c"),
            DynamicRecord {
                entity: record("Crate_c", "Harbor"),
                prefab: PrefabRef::from("props/crate"),
            },
        );
        bundle
    }

    #[test]
    fn test_bundle_roundtrip() {
        let dir = test_dir("roundtrip");
        let original = bundle();
        let encoded = encode_bundle(&original, "1.0", true).unwrap();
        assert_eq!(encoded.files.len(), 3);
        write_bundle_files(&dir, &encoded, false).unwrap();

        let back = read_bundle(&dir, &[], "1.0").unwrap().unwrap();
        assert_eq!(back, original);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_missing_dir_or_dynamic_file_is_none() {
        let dir = test_dir("missing");
        assert!(read_bundle(&dir.join("nope"), &[], "1.0").unwrap().is_none());
        assert!(read_bundle(&dir, &[], "1.0").unwrap().is_none());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_missing_scene_file_clears_scene() {
        let dir = test_dir("partial");
        let encoded = encode_bundle(&bundle(), "1.0", false).unwrap();
        write_bundle_files(&dir, &encoded, false).unwrap();
        fs::remove_file(dir.join("Harbor.scene")).unwrap();

        let tracked = [SceneName::from("Harbor"), SceneName::from("Cellar")];
        let back = read_bundle(&dir, &tracked, "1.0").unwrap().unwrap();
        assert!(back.scenes[&SceneName::from("Harbor")].is_empty());
        assert!(back.scenes[&SceneName::from("Cellar")].is_empty());
        assert_eq!(back.scenes[&SceneName::manager()].len(), 1);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let dir = test_dir("version");
        let encoded = encode_bundle(&bundle(), "1.0", false).unwrap();
        write_bundle_files(&dir, &encoded, true).unwrap();
        let err = read_bundle(&dir, &[], "2.0").unwrap_err();
        assert!(matches!(err, SaveError::VersionMismatch { .. }));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_stale_scene_files_removed_on_overwrite() {
        let dir = test_dir("stale");
        fs::write(dir.join("OldLevel.scene"), b"junk").unwrap();
        let encoded = encode_bundle(&bundle(), "1.0", false).unwrap();
        write_bundle_files(&dir, &encoded, false).unwrap();
        assert!(!dir.join("OldLevel.scene").exists());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_scene_named_like_dynamic_file_kept_apart() {
        let dir = test_dir("dynamic_name");
        let mut original = bundle();
        original
            .scenes
            .entry("DynamicObjects".into())
            .or_default()
            .insert(SaveId::from_raw("Door_d"), record("Door_d", "DynamicObjects"));
        let encoded = encode_bundle(&original, "1.0", false).unwrap();
        assert_eq!(encoded.files.len(), 4);
        write_bundle_files(&dir, &encoded, false).unwrap();
        assert!(dir.join("DynamicObjects.scene").is_file());
        assert!(dir.join(DYNAMIC_OBJECTS_FILE).is_file());

        let back = read_bundle(&dir, &[], "1.0").unwrap().unwrap();
        assert_eq!(back, original);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_path_like_scene_names_rejected() {
        for name in ["../escape", "a/b", "a\\b", "..", ""] {
            let mut bad = bundle();
            bad.scenes.entry(name.into()).or_default();
            let err = encode_bundle(&bad, "1.0", false).unwrap_err();
            let msg = format!("{err}");
            assert!(msg.contains("cannot be used as a file name"), "got: {msg}");
        }
    }
}
