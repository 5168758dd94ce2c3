//! Stored identity records.
//!
//! A record is what the cache keeps per id, both in memory and in the durable
//! store. An absent identity is stored explicitly so that "known out of scope"
//! survives a restart and is never confused with "never looked up".
//!
//! Serialized form:
//!
//! ```json
//! {"id":"d1","entry":{"state":"present","identity":{...}},"timestamp":"2024-05-01T10:00:00.123456789Z"}
//! {"id":"d2","entry":{"state":"absent"},"timestamp":"2024-05-01T10:00:00Z"}
//! ```

use std::time::Duration;

use edge_identity::Identity;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::{ScopeError, ScopeResult};

/// Cached scope state for one id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "identity", rename_all = "lowercase")]
pub enum ScopeEntry {
    /// The directory reported this identity in scope.
    Present(Identity),
    /// The directory reported this id out of scope.
    Absent,
}

impl ScopeEntry {
    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Self::Present(identity) => Some(identity),
            Self::Absent => None,
        }
    }

    #[must_use]
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present(_))
    }

    /// Returns `true` if this entry holds an enabled identity.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.identity().is_some_and(Identity::is_enabled)
    }
}

/// The persisted unit: an identity-or-absence plus the time it was written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredIdentity {
    pub id: String,
    pub entry: ScopeEntry,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl StoredIdentity {
    /// Record for an identity in scope, stamped now.
    #[must_use]
    pub fn present(identity: Identity) -> Self {
        Self {
            id: identity.id(),
            entry: ScopeEntry::Present(identity),
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    /// Record for an id known to be out of scope, stamped now.
    #[must_use]
    pub fn absent(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entry: ScopeEntry::Absent,
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: OffsetDateTime) -> Self {
        self.timestamp = timestamp;
        self
    }

    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        self.entry.identity()
    }

    /// Age of the record at `now`. Records from the future have zero age.
    #[must_use]
    pub fn age_at(&self, now: OffsetDateTime) -> Duration {
        Duration::try_from(now - self.timestamp).unwrap_or(Duration::ZERO)
    }

    /// Returns `true` if the record is strictly older than `max_age` at `now`.
    #[must_use]
    pub fn is_stale_at(&self, max_age: Duration, now: OffsetDateTime) -> bool {
        self.age_at(now) > max_age
    }

    /// Serializes the record for the durable store.
    ///
    /// # Errors
    ///
    /// Returns `ScopeError::InvalidRecord` if serialization fails.
    pub fn encode(&self) -> ScopeResult<String> {
        serde_json::to_string(self).map_err(|e| ScopeError::invalid_record(&self.id, e.to_string()))
    }

    /// Parses a record read from the durable store under `key`.
    ///
    /// # Errors
    ///
    /// Returns `ScopeError::InvalidRecord` if the value is not a record or if
    /// its id does not match the key it was stored under.
    pub fn decode(key: &str, value: &str) -> ScopeResult<Self> {
        let record: Self =
            serde_json::from_str(value).map_err(|e| ScopeError::invalid_record(key, e.to_string()))?;

        if record.id != key {
            return Err(ScopeError::invalid_record(
                key,
                format!("record id '{}' does not match store key", record.id),
            ));
        }

        Ok(record)
    }
}
