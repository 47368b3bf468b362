//! The storage provider contract.
//!
//! A bucket keeps no entity state of its own: every read and write goes
//! through a [`StorageProvider`]. Providers deal in [`EntityRecord`]s and
//! namespace them by bucket name, so one provider can back many buckets and
//! state written by one session is visible to the next.
//!
//! # Atomicity
//!
//! When a write method receives `Some(change_version)`, the entity write and
//! the change-version advance must be applied as one unit. A reader (or a
//! process restarted after a crash) must never observe the new change
//! version without the entity write it accompanies.

mod memory;

pub use memory::MemoryStorage;

use bucketsync_types::{ChangeVersion, EntityKey, EntityRecord, Version};

use crate::entity::BucketRef;
use crate::error::StorageResult;

/// Durable keyed storage for entities and bucket change versions.
///
/// All methods block the calling thread until the backend answers.
pub trait StorageProvider: Send + Sync {
    /// Check that this backend can hold a bucket named `name`.
    ///
    /// The default accepts any name.
    fn validate_bucket_name(&self, _name: &str) -> StorageResult<()> {
        Ok(())
    }

    /// Whether the bucket has a stored change version.
    fn has_change_version(&self, bucket: &BucketRef) -> StorageResult<bool> {
        Ok(self.change_version(bucket)?.is_some())
    }

    /// Whether the stored change version equals `version`.
    fn has_change_version_at(
        &self,
        bucket: &BucketRef,
        version: &ChangeVersion,
    ) -> StorageResult<bool> {
        Ok(self.change_version(bucket)?.as_ref() == Some(version))
    }

    /// The stored change version, if any.
    fn change_version(&self, bucket: &BucketRef) -> StorageResult<Option<ChangeVersion>>;

    /// Replace the stored change version.
    fn set_change_version(&self, bucket: &BucketRef, version: &ChangeVersion) -> StorageResult<()>;

    /// Persist a new entity, overwriting any record with the same key.
    fn add_entity(
        &self,
        bucket: &BucketRef,
        key: &EntityKey,
        record: &EntityRecord,
        change_version: Option<&ChangeVersion>,
    ) -> StorageResult<()>;

    /// Persist a changed entity.
    fn update_entity(
        &self,
        bucket: &BucketRef,
        key: &EntityKey,
        record: &EntityRecord,
        change_version: Option<&ChangeVersion>,
    ) -> StorageResult<()>;

    /// Delete an entity, returning its last stored record.
    fn remove_entity(
        &self,
        bucket: &BucketRef,
        key: &EntityKey,
        change_version: Option<&ChangeVersion>,
    ) -> StorageResult<Option<EntityRecord>>;

    /// Look up one entity.
    fn get_entity(&self, bucket: &BucketRef, key: &EntityKey) -> StorageResult<Option<EntityRecord>>;

    /// Every entity of the bucket, in backend-defined order.
    fn all_entities(&self, bucket: &BucketRef) -> StorageResult<Vec<EntityRecord>>;

    /// Whether an entity with this key is stored.
    fn contains_key(&self, bucket: &BucketRef, key: &EntityKey) -> StorageResult<bool> {
        Ok(self.get_entity(bucket, key)?.is_some())
    }

    /// Whether the stored entity is at `version` or newer.
    fn has_key_version(
        &self,
        bucket: &BucketRef,
        key: &EntityKey,
        version: Version,
    ) -> StorageResult<bool> {
        Ok(self
            .key_version(bucket, key)?
            .is_some_and(|stored| stored >= version))
    }

    /// Version of the stored entity.
    fn key_version(&self, bucket: &BucketRef, key: &EntityKey) -> StorageResult<Option<Version>> {
        Ok(self.get_entity(bucket, key)?.map(|record| record.version))
    }
}
