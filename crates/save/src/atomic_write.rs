//! Crash-safe file write using the write-rename pattern.
//!
//! Bundle and metadata writes go through `write_file`, which is a plain
//! overwrite unless `SaveConfig::atomic_writes` is on. In that case the bytes
//! are written to `{path}.tmp`, flushed with `sync_all()`, then renamed over
//! the final path so an interrupted write never leaves a torn file behind.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

fn ensure_parent(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

/// Write `data` to `{path}.tmp`, sync, then rename onto `path`.
pub fn atomic_write(path: &Path, data: &[u8]) -> std::io::Result<()> {
    ensure_parent(path)?;
    let tmp = tmp_path(path);
    let mut file = File::create(&tmp)?;
    file.write_all(data)?;
    file.sync_all()?;
    fs::rename(&tmp, path)
}

/// Write `data` to `path`, atomically if `atomic` is set.
pub fn write_file(path: &Path, data: &[u8], atomic: bool) -> std::io::Result<()> {
    if atomic {
        return atomic_write(path, data);
    }
    ensure_parent(path)?;
    fs::write(path, data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("scene_save_atomic_write_test_{name}"));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_atomic_write_overwrites_and_cleans_up() {
        let dir = test_dir("overwrites");
        let path = dir.join("Harbor.save");

        atomic_write(&path, b"version 1").unwrap();
        atomic_write(&path, b"version 2").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"version 2");
        assert!(!tmp_path(&path).exists());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_leftover_tmp_is_replaced() {
        let dir = test_dir("leftover");
        let path = dir.join("Harbor.save");
        fs::write(&path, b"original").unwrap();
        fs::write(tmp_path(&path), b"partial garbage").unwrap();

        atomic_write(&path, b"new save").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"new save");
        assert!(!tmp_path(&path).exists());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_write_file_creates_parent_dirs_either_way() {
        let dir = test_dir("parents");
        for atomic in [false, true] {
            let path = dir.join(format!("nested_{atomic}/deep/file.bin"));
            write_file(&path, b"nested data", atomic).unwrap();
            assert_eq!(fs::read(&path).unwrap(), b"nested data");
        }
        let _ = fs::remove_dir_all(&dir);
    }
}
