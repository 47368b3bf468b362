//! Bucket - the versioned entity store.
//!
//! A [`Bucket`] is one sync namespace. It owns entity lifecycle operations
//! (create, add, update, remove, lookup), the bucket's change-version
//! cursor, and the listener registry notified on every mutation.
//!
//! # Mutation order
//!
//! Every mutation runs the same steps:
//!
//! 1. attach the entity to this bucket (no-op if already attached),
//! 2. check the incoming version against the stored one,
//! 3. write through the storage provider, together with the change version
//!    when one is supplied,
//! 4. notify listeners.
//!
//! Steps 2 and 3 run under the bucket's write lock. Step 4 runs after the
//! lock is released, so a listener may read or mutate the bucket from its
//! hook. If step 3 fails, the error is returned and step 4 never happens.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use bucketsync_core::{Bucket, BucketObject, BucketObjectFactory, MemoryStorage};
//!
//! let bucket: Bucket<BucketObject> =
//!     Bucket::builder("notes", BucketObjectFactory, Arc::new(MemoryStorage::new())).build();
//!
//! let mut note = bucket.new_entity()?;
//! note.set("title", "groceries");
//! bucket.add(&mut note, Some("cv1".into()))?;
//!
//! assert_eq!(bucket.all_entities()?.len(), 1);
//! assert_eq!(bucket.change_version()?, Some("cv1".into()));
//! # Ok::<(), bucketsync_core::BucketError>(())
//! ```

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use bucketsync_types::{ChangeVersion, EntityKey, EntityRecord, Properties, Version};

use crate::channel::Channel;
use crate::entity::{BucketRef, Diffable, EntityFactory};
use crate::error::{BucketError, Result};
use crate::identity::{self, KeySource, UuidKeySource};
use crate::listener::{DispatchReport, EntityEvent, Listener, ListenerId, ListenerRegistry};
use crate::log::LogSink;
use crate::options::{BucketOptions, VersionPolicy};
use crate::storage::StorageProvider;

#[derive(Debug, Clone, Copy)]
enum WriteOp {
    Add,
    Update,
}

/// Builder for [`Bucket`].
pub struct BucketBuilder<T: Diffable> {
    name: String,
    factory: Arc<dyn EntityFactory<T>>,
    storage: Arc<dyn StorageProvider>,
    options: BucketOptions,
    keys: Arc<dyn KeySource>,
    log: LogSink,
}

impl<T: Diffable> BucketBuilder<T> {
    /// Set bucket options.
    pub fn options(mut self, options: BucketOptions) -> Self {
        self.options = options;
        self
    }

    /// Set the source of generated keys.
    pub fn key_source(mut self, keys: Arc<dyn KeySource>) -> Self {
        self.keys = keys;
        self
    }

    /// Set the logging sink for the bucket and its listener registry.
    pub fn log_sink(mut self, log: LogSink) -> Self {
        self.log = log;
        self
    }

    /// Build the bucket.
    pub fn build(self) -> Bucket<T> {
        Bucket {
            handle: BucketRef::new(&self.name),
            storage: self.storage,
            factory: self.factory,
            listeners: ListenerRegistry::new(self.log.clone()),
            channel: RwLock::new(None),
            keys: self.keys,
            options: self.options,
            write_lock: Mutex::new(()),
            log: self.log,
        }
    }
}

/// A namespaced store of synchronised entities plus its change-version cursor.
pub struct Bucket<T: Diffable> {
    handle: BucketRef,
    storage: Arc<dyn StorageProvider>,
    factory: Arc<dyn EntityFactory<T>>,
    listeners: ListenerRegistry<T>,
    channel: RwLock<Option<Arc<dyn Channel>>>,
    keys: Arc<dyn KeySource>,
    options: BucketOptions,
    write_lock: Mutex<()>,
    log: LogSink,
}

impl<T: Diffable> Bucket<T> {
    /// Start building a bucket named `name`.
    pub fn builder<F>(name: &str, factory: F, storage: Arc<dyn StorageProvider>) -> BucketBuilder<T>
    where
        F: EntityFactory<T> + 'static,
    {
        BucketBuilder {
            name: name.to_string(),
            factory: Arc::new(factory),
            storage,
            options: BucketOptions::default(),
            keys: Arc::new(UuidKeySource),
            log: LogSink::default(),
        }
    }

    /// The bucket's namespace.
    pub fn name(&self) -> &str {
        self.handle.name()
    }

    /// The handle entities of this bucket point back to.
    pub fn handle(&self) -> &BucketRef {
        &self.handle
    }

    /// Options the bucket was built with.
    pub fn options(&self) -> &BucketOptions {
        &self.options
    }

    /// The sink this bucket and its listener registry log to.
    ///
    /// Collaborators wired to the bucket, such as its channel, log here too.
    pub fn log_sink(&self) -> &LogSink {
        &self.log
    }

    // ------------------------------------------------------------------
    // Listeners
    // ------------------------------------------------------------------

    /// Subscribe a listener to this bucket's mutations.
    pub fn add_listener(&self, listener: Arc<dyn Listener<T>>) -> ListenerId {
        self.listeners.subscribe(listener)
    }

    /// Unsubscribe a listener. Returns `false` if it was not subscribed.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.unsubscribe(id)
    }

    /// Number of subscribed listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    fn notify(&self, event: &EntityEvent<'_, T>) -> DispatchReport {
        let report = self.listeners.dispatch(event);
        self.log.scope(|| {
            tracing::debug!(
                "Bucket {} dispatched {} for {} ({} delivered, {} failed)",
                self.name(),
                event.hook(),
                event.key(),
                report.delivered,
                report.failed
            )
        });
        report
    }

    // ------------------------------------------------------------------
    // Change version
    // ------------------------------------------------------------------

    /// Whether a change version has been stored.
    pub fn has_change_version(&self) -> Result<bool> {
        Ok(self.storage.has_change_version(&self.handle)?)
    }

    /// Whether the stored change version equals `version`.
    pub fn has_change_version_at(&self, version: &ChangeVersion) -> Result<bool> {
        Ok(self.storage.has_change_version_at(&self.handle, version)?)
    }

    /// The last change this bucket has fully applied.
    pub fn change_version(&self) -> Result<Option<ChangeVersion>> {
        Ok(self.storage.change_version(&self.handle)?)
    }

    /// Record a new change version.
    pub fn set_change_version(&self, version: ChangeVersion) -> Result<()> {
        self.log
            .scope(|| tracing::info!("Saving change version {} for {}", version, self.name()));
        self.storage.set_change_version(&self.handle, &version)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Entity construction
    // ------------------------------------------------------------------

    /// A fresh key that no stored entity uses.
    pub fn generate_key(&self) -> Result<EntityKey> {
        self.log.scope(|| {
            identity::generate_key(self.keys.as_ref(), self.options.max_key_attempts, |key| {
                self.storage.contains_key(&self.handle, key)
            })
        })
    }

    /// Build an unsynced entity attached to this bucket, without notifying anyone.
    pub fn create_entity(&self, key: EntityKey) -> T {
        let mut entity = self.factory.create_entity(key);
        entity.set_bucket(self.handle.clone());
        entity
    }

    /// Hydrate an entity attached to this bucket from persisted or remote state.
    pub fn build_entity(&self, key: EntityKey, version: Version, properties: Properties) -> T {
        let mut entity = self.factory.build_entity(key, version, properties);
        entity.set_bucket(self.handle.clone());
        entity
    }

    fn hydrate(&self, record: EntityRecord) -> T {
        self.build_entity(record.key, record.version, record.properties)
    }

    /// Create a new in-memory entity and announce it to listeners.
    ///
    /// Generates a key when `key` is `None`. Nothing is persisted until the
    /// entity is passed to [`Bucket::add`].
    pub fn create_local(&self, key: Option<EntityKey>) -> Result<T> {
        let key = match key {
            Some(key) => key,
            None => self.generate_key()?,
        };
        let entity = self.create_entity(key);
        self.notify(&EntityEvent::Created {
            key: entity.key(),
            entity: &entity,
        });
        Ok(entity)
    }

    /// Create a new in-memory entity with a generated key.
    pub fn new_entity(&self) -> Result<T> {
        self.create_local(None)
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    fn attach(&self, entity: &mut T) -> Result<()> {
        if let Some(current) = entity.bucket() {
            if *current == self.handle {
                return Ok(());
            }
            return Err(BucketError::ForeignEntity {
                key: entity.key().clone(),
                bucket: current.name().to_string(),
            });
        }
        entity.set_bucket(self.handle.clone());
        Ok(())
    }

    fn check_version(&self, key: &EntityKey, incoming: Version) -> Result<()> {
        let Some(stored) = self.storage.key_version(&self.handle, key)? else {
            return Ok(());
        };
        if incoming >= stored {
            return Ok(());
        }
        match self.options.version_policy {
            VersionPolicy::Reject => Err(BucketError::StaleVersion {
                key: key.clone(),
                stored,
                incoming,
            }),
            VersionPolicy::LastWriterWins => {
                self.log.scope(|| {
                    tracing::warn!(
                        "Overwriting {} in {}: stored version {} is newer than incoming {}",
                        key,
                        self.name(),
                        stored,
                        incoming
                    )
                });
                Ok(())
            }
        }
    }

    fn write(&self, op: WriteOp, record: &EntityRecord, change_version: Option<&ChangeVersion>) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.check_version(&record.key, record.version)?;
        match op {
            WriteOp::Add => self
                .storage
                .add_entity(&self.handle, &record.key, record, change_version)?,
            WriteOp::Update => self
                .storage
                .update_entity(&self.handle, &record.key, record, change_version)?,
        }
        self.log.scope(|| {
            tracing::debug!("{:?} {} v{} in {}", op, record.key, record.version, self.name());
            if let Some(cv) = change_version {
                tracing::info!("Saving change version {} for {}", cv, self.name());
            }
        });
        Ok(())
    }

    /// Persist an entity and announce it as added.
    ///
    /// An entity already stored under the same key is overwritten. When
    /// `change_version` is given it is stored atomically with the entity.
    pub fn add(&self, entity: &mut T, change_version: Option<ChangeVersion>) -> Result<()> {
        self.attach(entity)?;
        self.write(WriteOp::Add, &entity.to_record(), change_version.as_ref())?;
        let entity: &T = entity;
        self.notify(&EntityEvent::Added {
            key: entity.key(),
            entity,
        });
        Ok(())
    }

    /// Persist a changed entity and announce it as updated.
    ///
    /// Listeners receive the entity's current version alongside it.
    pub fn update(&self, entity: &mut T, change_version: Option<ChangeVersion>) -> Result<()> {
        self.attach(entity)?;
        self.write(WriteOp::Update, &entity.to_record(), change_version.as_ref())?;
        let entity: &T = entity;
        self.notify(&EntityEvent::Updated {
            key: entity.key(),
            version: entity.version(),
            entity,
        });
        Ok(())
    }

    /// Delete an entity and announce its removal.
    ///
    /// Returns the last stored state, or `None` (and notifies no one) if the
    /// key was not stored. `change_version` is recorded either way.
    pub fn remove(&self, key: &EntityKey, change_version: Option<ChangeVersion>) -> Result<Option<T>> {
        let removed = {
            let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
            let removed = self
                .storage
                .remove_entity(&self.handle, key, change_version.as_ref())?;
            if let Some(cv) = &change_version {
                self.log
                    .scope(|| tracing::info!("Saving change version {} for {}", cv, self.name()));
            }
            removed
        };

        let Some(record) = removed else {
            return Ok(None);
        };
        let entity = self.hydrate(record);
        self.notify(&EntityEvent::Removed {
            key: entity.key(),
            entity: &entity,
        });
        Ok(Some(entity))
    }

    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    /// The stored entity with this key.
    pub fn get(&self, key: &EntityKey) -> Result<Option<T>> {
        let record = self.storage.get_entity(&self.handle, key)?;
        Ok(record.map(|record| self.hydrate(record)))
    }

    /// Every stored entity, in storage-defined order.
    pub fn all_entities(&self) -> Result<Vec<T>> {
        let records = self.storage.all_entities(&self.handle)?;
        Ok(records.into_iter().map(|record| self.hydrate(record)).collect())
    }

    /// Whether an entity with this key is stored.
    pub fn contains_key(&self, key: &EntityKey) -> Result<bool> {
        Ok(self.storage.contains_key(&self.handle, key)?)
    }

    /// Whether the stored entity is at `version` or newer.
    pub fn has_key_version(&self, key: &EntityKey, version: Version) -> Result<bool> {
        Ok(self.storage.has_key_version(&self.handle, key, version)?)
    }

    /// Version of the stored entity.
    pub fn key_version(&self, key: &EntityKey) -> Result<Option<Version>> {
        Ok(self.storage.key_version(&self.handle, key)?)
    }

    // ------------------------------------------------------------------
    // Channel
    // ------------------------------------------------------------------

    /// Attach the bucket's channel, replacing any previous one.
    pub fn set_channel(&self, channel: Arc<dyn Channel>) {
        let mut guard = self.channel.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Some(channel);
    }

    /// The attached channel.
    pub fn channel(&self) -> Option<Arc<dyn Channel>> {
        self.channel
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Start the channel's network lifecycle.
    pub fn start(&self) -> Result<()> {
        let channel = self.channel().ok_or(BucketError::NoChannel)?;
        channel.start()?;
        self.log
            .scope(|| tracing::info!("Bucket {} started channel {}", self.name(), channel.name()));
        Ok(())
    }
}

impl<T: Diffable> fmt::Debug for Bucket<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bucket")
            .field("handle", &self.handle)
            .field("listeners", &self.listeners)
            .field("options", &self.options)
            .finish()
    }
}
