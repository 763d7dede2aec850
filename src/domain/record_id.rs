//! Type-safe record identifier.
//!
//! [`RecordId`] is a newtype wrapper around [`uuid::Uuid`] (v4) so that
//! reward, burn and snapshot identifiers cannot be confused with other
//! UUIDs flowing through the service.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Unique identifier for a persisted record.
///
/// Generated by the record store at creation time and immutable
/// thereafter. Burn records reference their reward through this id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(uuid::Uuid);

impl RecordId {
    /// Creates a new random `RecordId` (UUID v4).
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Creates a `RecordId` from an existing [`uuid::Uuid`].
    #[must_use]
    pub const fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner [`uuid::Uuid`].
    #[must_use]
    pub const fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::parse_str(s).map(Self)
    }
}

impl From<uuid::Uuid> for RecordId {
    fn from(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }
}

impl From<RecordId> for uuid::Uuid {
    fn from(id: RecordId) -> Self {
        id.0
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn new_generates_unique_ids() {
        assert_ne!(RecordId::new(), RecordId::new());
    }

    #[test]
    fn parses_display_output() {
        let id = RecordId::new();
        let Ok(parsed) = id.to_string().parse::<RecordId>() else {
            panic!("display output should parse");
        };
        assert_eq!(parsed, id);
    }

    #[test]
    fn serializes_as_bare_string() {
        let id = RecordId::new();
        let Ok(json) = serde_json::to_string(&id) else {
            panic!("serialization failed");
        };
        assert_eq!(json, format!("\"{id}\""));
    }

    #[test]
    fn rejects_garbage() {
        assert!("not-a-uuid".parse::<RecordId>().is_err());
    }
}
