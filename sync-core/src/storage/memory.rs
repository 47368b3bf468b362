//! In-memory storage provider.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bucketsync_types::{ChangeVersion, EntityKey, EntityRecord, Version};

use super::StorageProvider;
use crate::entity::BucketRef;
use crate::error::{StorageError, StorageResult};

/// In-memory storage provider.
///
/// Keeps every bucket in a thread-safe map; nothing survives the process.
/// A single mutex guards all buckets, which makes each combined entity +
/// change-version write atomic.
///
/// Like a mock transport it can be told to fail the next read or write,
/// which tests use to simulate a backend going away mid-operation.
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    inner: Arc<Mutex<MemoryStorageInner>>,
}

#[derive(Debug, Default)]
struct MemoryStorageInner {
    buckets: HashMap<String, BucketState>,
    fail_next_write: Option<String>,
    fail_next_read: Option<String>,
}

#[derive(Debug, Default)]
struct BucketState {
    entities: HashMap<EntityKey, EntityRecord>,
    change_version: Option<ChangeVersion>,
}

impl MemoryStorage {
    /// Create an empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cause the next write to fail without changing anything.
    pub fn fail_next_write(&self, error: &str) {
        self.lock().fail_next_write = Some(error.to_string());
    }

    /// Cause the next read to fail.
    pub fn fail_next_read(&self, error: &str) {
        self.lock().fail_next_read = Some(error.to_string());
    }

    /// Number of entities stored for a bucket name.
    pub fn len(&self, bucket: &str) -> usize {
        self.lock()
            .buckets
            .get(bucket)
            .map_or(0, |state| state.entities.len())
    }

    /// Whether no bucket holds any entity.
    pub fn is_empty(&self) -> bool {
        self.lock()
            .buckets
            .values()
            .all(|state| state.entities.is_empty())
    }

    /// Drop every bucket.
    pub fn clear(&self) {
        self.lock().buckets.clear();
    }

    fn lock(&self) -> MutexGuard<'_, MemoryStorageInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read<R>(&self, bucket: &BucketRef, f: impl FnOnce(Option<&BucketState>) -> R) -> StorageResult<R> {
        let mut inner = self.lock();
        if let Some(error) = inner.fail_next_read.take() {
            return Err(StorageError::Unavailable(error));
        }
        Ok(f(inner.buckets.get(bucket.name())))
    }

    fn write<R>(&self, bucket: &BucketRef, f: impl FnOnce(&mut BucketState) -> R) -> StorageResult<R> {
        let mut inner = self.lock();
        if let Some(error) = inner.fail_next_write.take() {
            return Err(StorageError::Unavailable(error));
        }
        let state = inner.buckets.entry(bucket.name().to_string()).or_default();
        Ok(f(state))
    }

    fn put(
        &self,
        bucket: &BucketRef,
        key: &EntityKey,
        record: &EntityRecord,
        change_version: Option<&ChangeVersion>,
    ) -> StorageResult<()> {
        self.write(bucket, |state| {
            state.entities.insert(key.clone(), record.clone());
            if let Some(cv) = change_version {
                state.change_version = Some(cv.clone());
            }
        })
    }
}

impl StorageProvider for MemoryStorage {
    fn change_version(&self, bucket: &BucketRef) -> StorageResult<Option<ChangeVersion>> {
        self.read(bucket, |state| state.and_then(|s| s.change_version.clone()))
    }

    fn set_change_version(&self, bucket: &BucketRef, version: &ChangeVersion) -> StorageResult<()> {
        self.write(bucket, |state| state.change_version = Some(version.clone()))
    }

    fn add_entity(
        &self,
        bucket: &BucketRef,
        key: &EntityKey,
        record: &EntityRecord,
        change_version: Option<&ChangeVersion>,
    ) -> StorageResult<()> {
        self.put(bucket, key, record, change_version)
    }

    fn update_entity(
        &self,
        bucket: &BucketRef,
        key: &EntityKey,
        record: &EntityRecord,
        change_version: Option<&ChangeVersion>,
    ) -> StorageResult<()> {
        self.put(bucket, key, record, change_version)
    }

    fn remove_entity(
        &self,
        bucket: &BucketRef,
        key: &EntityKey,
        change_version: Option<&ChangeVersion>,
    ) -> StorageResult<Option<EntityRecord>> {
        self.write(bucket, |state| {
            let removed = state.entities.remove(key);
            if let Some(cv) = change_version {
                state.change_version = Some(cv.clone());
            }
            removed
        })
    }

    fn get_entity(&self, bucket: &BucketRef, key: &EntityKey) -> StorageResult<Option<EntityRecord>> {
        self.read(bucket, |state| state.and_then(|s| s.entities.get(key).cloned()))
    }

    fn all_entities(&self, bucket: &BucketRef) -> StorageResult<Vec<EntityRecord>> {
        self.read(bucket, |state| {
            state.map_or_else(Vec::new, |s| s.entities.values().cloned().collect())
        })
    }

    fn contains_key(&self, bucket: &BucketRef, key: &EntityKey) -> StorageResult<bool> {
        self.read(bucket, |state| state.is_some_and(|s| s.entities.contains_key(key)))
    }

    fn key_version(&self, bucket: &BucketRef, key: &EntityKey) -> StorageResult<Option<Version>> {
        self.read(bucket, |state| {
            state.and_then(|s| s.entities.get(key).map(|record| record.version))
        })
    }
}
