//! The entity contract.
//!
//! Anything a bucket tracks implements [`Diffable`]: a stable key, a
//! version, a property map that can be diffed, and a back-reference to the
//! owning bucket. Buckets materialise entities through an
//! [`EntityFactory`]; [`BucketObject`] is the schemaless default.

use std::fmt;
use std::sync::Arc;

use bucketsync_types::{BucketId, EntityKey, EntityRecord, Properties, Version};
use serde_json::Value;

/// Non-owning back-reference from an entity to its bucket.
///
/// A lookup handle (id + name), not a pointer: holding one never keeps a
/// bucket alive.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct BucketRef {
    id: BucketId,
    name: Arc<str>,
}

impl BucketRef {
    /// A handle for a new bucket instance named `name`.
    pub fn new(name: &str) -> Self {
        Self {
            id: BucketId::new(),
            name: Arc::from(name),
        }
    }

    /// Instance id of the bucket.
    pub fn id(&self) -> BucketId {
        self.id
    }

    /// Namespace of the bucket.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for BucketRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl fmt::Debug for BucketRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BucketRef({}, {:?})", self.name, self.id)
    }
}

/// Capability set of a synchronisable entity.
///
/// No key setter: a key is fixed by the factory that
/// builds the entity.
pub trait Diffable: Send + Sync + 'static {
    /// Identity of the entity.
    fn key(&self) -> &EntityKey;

    /// Last acknowledged version.
    fn version(&self) -> Version;

    /// Record a newly acknowledged version.
    fn set_version(&mut self, version: Version);

    /// The diffable payload.
    fn diffable_value(&self) -> Properties;

    /// The bucket this entity is attached to, if any.
    fn bucket(&self) -> Option<&BucketRef>;

    /// Attach the entity. Buckets call this once.
    fn set_bucket(&mut self, bucket: BucketRef);

    /// True until the remote service has acknowledged a version.
    fn is_new(&self) -> bool {
        !self.version().is_acknowledged()
    }

    /// Name of the owning bucket.
    fn bucket_name(&self) -> Option<&str> {
        self.bucket().map(BucketRef::name)
    }

    /// Snapshot as a raw record.
    fn to_record(&self) -> EntityRecord {
        EntityRecord::new(self.key().clone(), self.version(), self.diffable_value())
    }
}

/// Builds entities of one concrete type. Both paths are pure.
pub trait EntityFactory<T>: Send + Sync {
    /// A fresh, unsynced entity with no version and default properties.
    fn create_entity(&self, key: EntityKey) -> T;

    /// An entity hydrated from persisted or remote state.
    fn build_entity(&self, key: EntityKey, version: Version, properties: Properties) -> T;
}

/// Schemaless entity: a key, a version and a JSON property map.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketObject {
    key: EntityKey,
    version: Version,
    properties: Properties,
    bucket: Option<BucketRef>,
}

impl BucketObject {
    /// Create an unattached object.
    pub fn new(key: EntityKey, version: Version, properties: Properties) -> Self {
        Self {
            key,
            version,
            properties,
            bucket: None,
        }
    }

    /// Read a property.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.properties.get(field)
    }

    /// Set a property, returning the previous value.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.properties.insert(field.into(), value.into())
    }

    /// Remove a property.
    pub fn unset(&mut self, field: &str) -> Option<Value> {
        self.properties.remove(field)
    }

    /// All properties.
    pub fn properties(&self) -> &Properties {
        &self.properties
    }
}

impl Diffable for BucketObject {
    fn key(&self) -> &EntityKey {
        &self.key
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn diffable_value(&self) -> Properties {
        self.properties.clone()
    }

    fn bucket(&self) -> Option<&BucketRef> {
        self.bucket.as_ref()
    }

    fn set_bucket(&mut self, bucket: BucketRef) {
        self.bucket = Some(bucket);
    }
}

/// Factory for [`BucketObject`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BucketObjectFactory;

impl EntityFactory<BucketObject> for BucketObjectFactory {
    fn create_entity(&self, key: EntityKey) -> BucketObject {
        BucketObject::new(key, Version::UNACKNOWLEDGED, Properties::new())
    }

    fn build_entity(&self, key: EntityKey, version: Version, properties: Properties) -> BucketObject {
        BucketObject::new(key, version, properties)
    }
}
