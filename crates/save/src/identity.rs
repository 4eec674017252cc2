// ---------------------------------------------------------------------------
// identity – stable save identifiers and association grouping
// ---------------------------------------------------------------------------
//
// A saveable entity is identified by `"{TypeName}_{GUID}"`, or by its bare
// type name when the type is a singleton. The GUID lives on the entity's
// `UniqueId` and is generated once, on first access, then persisted with the
// entity so the ID survives scene unload/reload.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Separator between the type name and the GUID segment of a `SaveId`.
pub const ID_DELIMITER: char = '_';

/// Identifier of a saveable entity, unique within a save.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SaveId(String);

impl SaveId {
    /// ID for a non-singleton entity of `type_name` carrying `guid`.
    pub fn new(type_name: &str, guid: Uuid) -> Self {
        Self(format!("{type_name}{ID_DELIMITER}{}", guid.as_hyphenated()))
    }

    /// ID for the single instance of a singleton type.
    pub fn singleton(type_name: &str) -> Self {
        Self(type_name.to_string())
    }

    /// Wrap an ID read back from a save file.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The GUID segment of this ID, if the last segment parses as one.
    pub fn guid(&self) -> Option<Uuid> {
        let last = self.0.rsplit(ID_DELIMITER).next()?;
        Uuid::parse_str(last).ok()
    }

    /// Grouping key shared by every component of the same logical object.
    pub fn association_id(&self) -> String {
        association_id(&self.0)
    }
}

impl fmt::Display for SaveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SaveId {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

/// Returns the last `_`-separated segment of `id` if it parses as a GUID,
/// otherwise the whole ID.
pub fn association_id(id: &str) -> String {
    match id.rsplit(ID_DELIMITER).next() {
        Some(last) if last.len() < id.len() && Uuid::parse_str(last).is_ok() => last.to_string(),
        _ => id.to_string(),
    }
}

/// Persistent GUID holder attached to every saveable entity.
///
/// Components that live on the same logical game object share one GUID, which
/// is what makes their association IDs match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UniqueId {
    guid: Option<Uuid>,
}

impl UniqueId {
    /// A holder that has not been assigned a GUID yet.
    pub fn unassigned() -> Self {
        Self { guid: None }
    }

    /// A holder with a freshly generated GUID.
    pub fn generate() -> Self {
        Self {
            guid: Some(Uuid::new_v4()),
        }
    }

    pub fn from_guid(guid: Uuid) -> Self {
        Self { guid: Some(guid) }
    }

    pub fn guid(&self) -> Option<Uuid> {
        self.guid
    }

    pub fn is_assigned(&self) -> bool {
        self.guid.is_some()
    }

    /// Returns the GUID, generating and storing one first if none exists.
    pub fn get_or_create(&mut self) -> Uuid {
        *self.guid.get_or_insert_with(Uuid::new_v4)
    }

    /// Replace the GUID. Used when a recreated object takes over a saved ID.
    pub fn set(&mut self, guid: Uuid) {
        self.guid = Some(guid);
    }
}

/// Raised when an entity's identity is queried before it can be formed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    /// A non-singleton entity has no GUID yet (misconfigured entity).
    MissingGuid { type_name: &'static str },
    /// A saved ID does not carry a GUID segment the entity can adopt.
    MalformedId { id: String },
}

impl fmt::Display for IdentityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityError::MissingGuid { type_name } => write!(
                f,
                "{type_name} has no GUID assigned; its ID was queried before registration"
            ),
            IdentityError::MalformedId { id } => {
                write!(f, "'{id}' does not end in a GUID segment")
            }
        }
    }
}

impl std::error::Error for IdentityError {}

/// Compose the ID for a type given its GUID holder.
pub fn compose_id(
    type_name: &'static str,
    singleton: bool,
    unique_id: &UniqueId,
) -> Result<SaveId, IdentityError> {
    if singleton {
        return Ok(SaveId::singleton(type_name));
    }
    unique_id
        .guid()
        .map(|guid| SaveId::new(type_name, guid))
        .ok_or(IdentityError::MissingGuid { type_name })
}
