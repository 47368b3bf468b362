//! Change descriptors exchanged between buckets and channels.
//!
//! A [`LocalChange`] describes a mutation made on this device that a
//! channel should push upstream. A [`RemoteChange`] describes a delta that
//! arrived from the remote service and must be applied to the bucket.

use serde::{Deserialize, Serialize};

use crate::{ChangeVersion, EntityKey, EntityRecord, Properties, Version};

/// The kind of mutation a change describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOp {
    /// An entity was added to the bucket
    Add,
    /// An existing entity changed
    Update,
    /// An entity was removed
    Remove,
}

/// A locally originated mutation, queued for upstream delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalChange {
    /// What happened
    pub op: ChangeOp,
    /// Entity state at the time of the change
    pub record: EntityRecord,
}

impl LocalChange {
    /// Create a local change.
    pub fn new(op: ChangeOp, record: EntityRecord) -> Self {
        Self { op, record }
    }

    /// Key of the changed entity.
    pub fn key(&self) -> &EntityKey {
        &self.record.key
    }
}

/// A delta delivered by the remote service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteChange {
    /// What to apply
    pub op: ChangeOp,
    /// Target entity
    pub key: EntityKey,
    /// Version the remote service assigned to the entity
    #[serde(default)]
    pub version: Version,
    /// Full entity state after the change (ignored for removals)
    #[serde(default)]
    pub properties: Properties,
    /// Bucket cursor to record once the change is applied
    pub change_version: Option<ChangeVersion>,
}

impl RemoteChange {
    /// Build the record this change writes.
    pub fn to_record(&self) -> EntityRecord {
        EntityRecord::new(self.key.clone(), self.version, self.properties.clone())
    }
}
