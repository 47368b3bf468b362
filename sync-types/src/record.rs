//! The raw, serializable form of an entity.

use serde::{Deserialize, Serialize};

use crate::{EntityKey, Version};

/// The diffable payload of an entity: field name to arbitrary JSON value.
///
/// Field order is irrelevant.
pub type Properties = serde_json::Map<String, serde_json::Value>;

/// An entity as storage providers and channels see it.
///
/// Records carry no bucket back-reference; the bucket that reads a record
/// attaches the hydrated entity to itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Identity of the entity.
    pub key: EntityKey,
    /// Last acknowledged version (`0` if never acknowledged).
    #[serde(default)]
    pub version: Version,
    /// Diffable payload.
    #[serde(default)]
    pub properties: Properties,
}

impl EntityRecord {
    /// Create a record.
    pub fn new(key: EntityKey, version: Version, properties: Properties) -> Self {
        Self {
            key,
            version,
            properties,
        }
    }

    /// Create an unacknowledged record with no properties.
    pub fn empty(key: EntityKey) -> Self {
        Self::new(key, Version::UNACKNOWLEDGED, Properties::new())
    }
}
