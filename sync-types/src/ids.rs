//! Identity and ordering types for bucketsync.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

use crate::TypesError;

/// The identity of an entity within a bucket.
///
/// Opaque, non-empty text assigned once when the entity is created and
/// never reassigned. Generated keys are UUID v4 strings, but any non-empty
/// string supplied by the application or the remote service is accepted.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityKey(String);

impl EntityKey {
    /// Create a key from text, rejecting the empty string.
    pub fn new(key: impl Into<String>) -> Result<Self, TypesError> {
        let key = key.into();
        if key.is_empty() {
            return Err(TypesError::EmptyKey);
        }
        Ok(Self(key))
    }

    /// Create a new random key (hyphenated UUID v4).
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Get the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for EntityKey {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for EntityKey {
    type Error = TypesError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for EntityKey {
    type Error = TypesError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<EntityKey> for String {
    fn from(key: EntityKey) -> Self {
        key.0
    }
}

impl Borrow<str> for EntityKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for EntityKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityKey({})", self.0)
    }
}

/// The acknowledged version of an entity.
///
/// Assigned by the remote service. `Version(0)` means the entity has not
/// been acknowledged yet. Versions never decrease for a given key.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Version(u64);

impl Version {
    /// The version of an entity the remote service has not seen.
    pub const UNACKNOWLEDGED: Version = Version(0);

    /// Create a new Version with the given value.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the numeric value of this Version.
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Whether the remote service has acknowledged this version.
    pub fn is_acknowledged(&self) -> bool {
        self.0 > 0
    }

    /// Increment the version by one.
    pub fn next(&self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl From<u64> for Version {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Version({})", self.0)
    }
}

/// The change-version cursor of a bucket.
///
/// An opaque token issued by the remote service marking the last change a
/// bucket has fully applied. It is not a counter: cursors are compared for
/// equality only, never ordered.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeVersion(String);

impl ChangeVersion {
    /// Create a cursor from its opaque text.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Get the cursor as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ChangeVersion {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ChangeVersion {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for ChangeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ChangeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChangeVersion({})", self.0)
    }
}

/// A process-unique identifier for a bucket instance.
///
/// Two buckets with the same name in different sessions have different
/// ids; entities use it to tell which instance they are attached to.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BucketId(uuid::Uuid);

impl BucketId {
    /// Create a new random BucketId.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Get the inner UUID.
    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for BucketId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BucketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for BucketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BucketId({})", &self.0.to_string()[..8])
    }
}
