//! Source ID - client-generated idempotency key
//!
//! A `SourceId` is minted on the client that originates an action and travels
//! with every copy of the resulting live event (the local optimistic copy, the
//! transport echo, the REST fallback). It is the identity used for
//! deduplication: two events with the same source ID are the same logical event.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Client-generated idempotency key, stable across optimistic and confirmed copies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(Uuid);

impl SourceId {
    /// Generate a fresh source ID
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SourceId {
    type Err = SourceIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| SourceIdParseError(s.to_string()))
    }
}

impl From<Uuid> for SourceId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Error returned when parsing an invalid source ID
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid source ID: {0}")]
pub struct SourceIdParseError(pub String);
