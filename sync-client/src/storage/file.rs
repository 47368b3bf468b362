//! File-backed storage provider.
//!
//! Each bucket is one JSON snapshot at `<dir>/<bucket>.json` holding the
//! change version and every entity record. A write serialises the whole
//! new snapshot to a temporary file in the same directory, syncs it and
//! renames it over the old one, so the entity and change version of a
//! combined write land on disk together or not at all.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use bucketsync_core::{BucketRef, LogSink, StorageError, StorageProvider, StorageResult};
use bucketsync_types::{ChangeVersion, EntityKey, EntityRecord};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

/// On-disk form of one bucket.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    change_version: Option<ChangeVersion>,
    #[serde(default)]
    entities: Vec<EntityRecord>,
}

#[derive(Debug, Default, Clone)]
struct BucketState {
    change_version: Option<ChangeVersion>,
    entities: BTreeMap<EntityKey, EntityRecord>,
}

impl From<Snapshot> for BucketState {
    fn from(snapshot: Snapshot) -> Self {
        Self {
            change_version: snapshot.change_version,
            entities: snapshot
                .entities
                .into_iter()
                .map(|record| (record.key.clone(), record))
                .collect(),
        }
    }
}

impl BucketState {
    fn snapshot(&self) -> Snapshot {
        Snapshot {
            change_version: self.change_version.clone(),
            entities: self.entities.values().cloned().collect(),
        }
    }

    fn put(&mut self, record: &EntityRecord, change_version: Option<&ChangeVersion>) {
        self.entities.insert(record.key.clone(), record.clone());
        self.advance(change_version);
    }

    fn advance(&mut self, change_version: Option<&ChangeVersion>) {
        if let Some(cv) = change_version {
            self.change_version = Some(cv.clone());
        }
    }
}

/// Storage provider keeping one snapshot file per bucket.
///
/// Snapshots are loaded on first use and cached; the cache only changes
/// after the new snapshot is safely on disk.
#[derive(Debug)]
pub struct FileStorage {
    dir: PathBuf,
    cache: Mutex<HashMap<String, BucketState>>,
    log: LogSink,
}

impl FileStorage {
    /// Open (creating if needed) a storage directory.
    pub fn open(dir: impl AsRef<Path>) -> StorageResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            cache: Mutex::new(HashMap::new()),
            log: LogSink::default(),
        })
    }

    /// Set the logging sink.
    pub fn with_log_sink(mut self, log: LogSink) -> Self {
        self.log = log;
        self
    }

    /// The storage directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Snapshot file of a bucket.
    pub fn snapshot_path(&self, bucket: &str) -> StorageResult<PathBuf> {
        validate_bucket_name(bucket)?;
        Ok(self.dir.join(format!("{bucket}.json")))
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, BucketState>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn load(&self, name: &str) -> StorageResult<BucketState> {
        let path = self.snapshot_path(name)?;
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(BucketState::default());
            }
            Err(e) => return Err(e.into()),
        };
        let snapshot: Snapshot =
            serde_json::from_slice(&bytes).map_err(|e| StorageError::Corrupt {
                bucket: name.to_string(),
                reason: e.to_string(),
            })?;
        self.log.scope(|| {
            tracing::debug!(
                "Loaded {} entities for {} from {}",
                snapshot.entities.len(),
                name,
                path.display()
            )
        });
        Ok(snapshot.into())
    }

    fn cached<'a>(
        &self,
        cache: &'a mut HashMap<String, BucketState>,
        name: &str,
    ) -> StorageResult<&'a mut BucketState> {
        match cache.entry(name.to_string()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => Ok(entry.insert(self.load(name)?)),
        }
    }

    fn read<R>(&self, bucket: &BucketRef, f: impl FnOnce(&BucketState) -> R) -> StorageResult<R> {
        let mut cache = self.lock();
        let state = self.cached(&mut cache, bucket.name())?;
        Ok(f(state))
    }

    fn write<R>(&self, bucket: &BucketRef, f: impl FnOnce(&mut BucketState) -> R) -> StorageResult<R> {
        let mut cache = self.lock();
        let state = self.cached(&mut cache, bucket.name())?;
        let mut next = state.clone();
        let result = f(&mut next);
        if let Err(e) = self.persist(bucket.name(), &next) {
            self.log.scope(|| {
                tracing::warn!("Failed to persist snapshot for {}: {}", bucket.name(), e)
            });
            return Err(e);
        }
        *state = next;
        Ok(result)
    }

    fn persist(&self, name: &str, state: &BucketState) -> StorageResult<()> {
        let path = self.snapshot_path(name)?;
        let mut file = NamedTempFile::new_in(&self.dir)?;
        {
            let mut writer = BufWriter::new(file.as_file_mut());
            serde_json::to_writer(&mut writer, &state.snapshot())?;
            writer.flush()?;
        }
        file.as_file().sync_all()?;
        file.persist(&path).map_err(|e| StorageError::Io(e.error))?;
        Ok(())
    }
}

fn validate_bucket_name(name: &str) -> StorageResult<()> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidBucketName(name.to_string()))
    }
}

impl StorageProvider for FileStorage {
    fn validate_bucket_name(&self, name: &str) -> StorageResult<()> {
        validate_bucket_name(name)
    }

    fn change_version(&self, bucket: &BucketRef) -> StorageResult<Option<ChangeVersion>> {
        self.read(bucket, |state| state.change_version.clone())
    }

    fn set_change_version(&self, bucket: &BucketRef, version: &ChangeVersion) -> StorageResult<()> {
        self.write(bucket, |state| state.advance(Some(version)))
    }

    fn add_entity(
        &self,
        bucket: &BucketRef,
        _key: &EntityKey,
        record: &EntityRecord,
        change_version: Option<&ChangeVersion>,
    ) -> StorageResult<()> {
        self.write(bucket, |state| state.put(record, change_version))
    }

    fn update_entity(
        &self,
        bucket: &BucketRef,
        _key: &EntityKey,
        record: &EntityRecord,
        change_version: Option<&ChangeVersion>,
    ) -> StorageResult<()> {
        self.write(bucket, |state| state.put(record, change_version))
    }

    fn remove_entity(
        &self,
        bucket: &BucketRef,
        key: &EntityKey,
        change_version: Option<&ChangeVersion>,
    ) -> StorageResult<Option<EntityRecord>> {
        self.write(bucket, |state| {
            let removed = state.entities.remove(key);
            state.advance(change_version);
            removed
        })
    }

    fn get_entity(&self, bucket: &BucketRef, key: &EntityKey) -> StorageResult<Option<EntityRecord>> {
        self.read(bucket, |state| state.entities.get(key).cloned())
    }

    fn all_entities(&self, bucket: &BucketRef) -> StorageResult<Vec<EntityRecord>> {
        self.read(bucket, |state| state.entities.values().cloned().collect())
    }
}
