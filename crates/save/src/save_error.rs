// ---------------------------------------------------------------------------
// SaveError: error types for save/load operations
// ---------------------------------------------------------------------------

use std::fmt;

use crate::identity::IdentityError;

/// Errors that can occur during save/load operations.
///
/// Per-entity and per-field problems are normally logged and skipped by the
/// batch operations; this enum is what the fallible building blocks return.
#[derive(Debug)]
pub enum SaveError {
    /// I/O error (file not found, permission denied, disk full, etc.)
    Io(std::io::Error),
    /// Bitcode or JSON encoding failed.
    Encode(String),
    /// Bitcode or JSON decoding failed (corrupt or invalid save data).
    Decode(String),
    /// A file was structurally readable but its contents make no sense.
    Corrupted(String),
    /// The save was written by an incompatible build.
    VersionMismatch { expected: String, found: String },
    /// An entity was asked for its identity before it had one.
    Identity(IdentityError),
    /// A single entity failed to produce a snapshot.
    Snapshot { id: String, reason: String },
    /// A single entity failed to restore from its snapshot.
    Restore { id: String, reason: String },
    /// Screenshot encoding or decoding failed.
    Screenshot(String),
    /// No save exists under the requested name.
    NotFound(String),
}

impl fmt::Display for SaveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SaveError::Io(e) => write!(f, "I/O error: {e}"),
            SaveError::Encode(msg) => write!(f, "Encoding error: {msg}"),
            SaveError::Decode(msg) => write!(f, "Decoding error: {msg}"),
            SaveError::Corrupted(msg) => {
                write!(f, "Save file may be corrupted: {msg}")
            }
            SaveError::VersionMismatch { expected, found } => write!(
                f,
                "Version mismatch: save is version '{found}', but this build expects '{expected}'"
            ),
            SaveError::Identity(e) => write!(f, "Identity error: {e}"),
            SaveError::Snapshot { id, reason } => {
                write!(f, "Snapshot of '{id}' failed: {reason}")
            }
            SaveError::Restore { id, reason } => {
                write!(f, "Restore of '{id}' failed: {reason}")
            }
            SaveError::Screenshot(msg) => write!(f, "Screenshot error: {msg}"),
            SaveError::NotFound(name) => write!(f, "No save named '{name}'"),
        }
    }
}

impl std::error::Error for SaveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SaveError::Io(e) => Some(e),
            SaveError::Identity(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SaveError {
    fn from(e: std::io::Error) -> Self {
        SaveError::Io(e)
    }
}

impl From<bitcode::Error> for SaveError {
    fn from(e: bitcode::Error) -> Self {
        SaveError::Decode(e.to_string())
    }
}

impl From<serde_json::Error> for SaveError {
    fn from(e: serde_json::Error) -> Self {
        if e.is_io() {
            SaveError::Io(e.into())
        } else {
            SaveError::Decode(format!("JSON: {e}"))
        }
    }
}

impl From<image::ImageError> for SaveError {
    fn from(e: image::ImageError) -> Self {
        SaveError::Screenshot(e.to_string())
    }
}

impl From<IdentityError> for SaveError {
    fn from(e: IdentityError) -> Self {
        SaveError::Identity(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_error_display_io() {
        let err = SaveError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "file not found",
        ));
        let msg = format!("{err}");
        assert!(msg.contains("I/O error"), "got: {msg}");
        assert!(msg.contains("file not found"), "got: {msg}");
    }

    #[test]
    fn test_save_error_display_corrupted() {
        let err = SaveError::Corrupted("null header".to_string());
        let msg = format!("{err}");
        assert!(msg.contains("may be corrupted"), "got: {msg}");
        assert!(msg.contains("null header"), "got: {msg}");
    }

    #[test]
    fn test_save_error_display_version_mismatch() {
        let err = SaveError::VersionMismatch {
            expected: "1.0.1".to_string(),
            found: "1.0.0".to_string(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("'1.0.0'"), "got: {msg}");
        assert!(msg.contains("'1.0.1'"), "got: {msg}");
    }

    #[test]
    fn test_save_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let save_err: SaveError = io_err.into();
        assert!(matches!(save_err, SaveError::Io(_)));
    }

    #[test]
    fn test_save_error_from_json() {
        let json_err = serde_json::from_str::<u32>("not json").unwrap_err();
        let save_err: SaveError = json_err.into();
        assert!(matches!(save_err, SaveError::Decode(_)));
    }

    #[test]
    fn test_save_error_source() {
        let err = SaveError::Io(std::io::Error::new(std::io::ErrorKind::Other, "test"));
        assert!(std::error::Error::source(&err).is_some());
        let err = SaveError::NotFound("slot".to_string());
        assert!(std::error::Error::source(&err).is_none());
    }
}
