//! Session - the application's entry point.
//!
//! A [`Session`] owns one storage provider and one channel factory and
//! hands out buckets by name. Each name maps to exactly one bucket for the
//! lifetime of the session.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bucketsync_core::{
    Bucket, BucketError, BucketObject, BucketObjectFactory, Diffable, EntityFactory, LogSink,
    StorageError, StorageProvider,
};

use crate::channel::ChannelFactory;
use crate::config::{ConfigError, SessionConfig};
use crate::storage::open_storage;

/// Session errors.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Storage could not be opened.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A bucket operation failed.
    #[error("bucket {name}: {source}")]
    Bucket {
        /// Bucket name.
        name: String,
        /// What went wrong.
        #[source]
        source: BucketError,
    },

    /// The name is empty or the storage backend cannot hold it.
    #[error("invalid bucket name: {0:?}")]
    InvalidBucketName(String),

    /// The name is already bound to a bucket of another entity type.
    #[error("bucket {name} holds {found}, not {expected}")]
    BucketTypeMismatch {
        /// Bucket name.
        name: String,
        /// Entity type requested.
        expected: &'static str,
        /// Entity type the bucket was created with.
        found: &'static str,
    },
}

trait Startable: Send + Sync {
    fn start(&self) -> bucketsync_core::Result<()>;
}

impl<T: Diffable> Startable for Bucket<T> {
    fn start(&self) -> bucketsync_core::Result<()> {
        Bucket::start(self)
    }
}

struct CachedBucket {
    bucket: Arc<dyn Any + Send + Sync>,
    starter: Arc<dyn Startable>,
    entity_type: &'static str,
}

/// A set of named buckets sharing storage and a channel factory.
pub struct Session<C: ChannelFactory> {
    config: SessionConfig,
    storage: Arc<dyn StorageProvider>,
    channels: C,
    buckets: Mutex<HashMap<String, CachedBucket>>,
    log: LogSink,
}

impl<C: ChannelFactory> Session<C> {
    /// Open a session with the storage backend `config` selects.
    pub fn open(config: SessionConfig, channels: C) -> Result<Self, SessionError> {
        Self::open_with_log_sink(config, channels, LogSink::default())
    }

    /// Like [`Session::open`], with the storage backend, the session and
    /// every bucket it creates logging to `log`.
    pub fn open_with_log_sink(
        config: SessionConfig,
        channels: C,
        log: LogSink,
    ) -> Result<Self, SessionError> {
        let storage = open_storage(&config.storage, &log)?;
        Ok(Self::with_storage(config, storage, channels).with_log_sink(log))
    }

    /// Open a session from a TOML configuration file.
    pub fn from_config_file(path: &Path, channels: C) -> Result<Self, SessionError> {
        let config = SessionConfig::from_file(path)?;
        Self::open(config, channels)
    }

    /// Create a session over an existing storage provider.
    pub fn with_storage(config: SessionConfig, storage: Arc<dyn StorageProvider>, channels: C) -> Self {
        Self {
            config,
            storage,
            channels,
            buckets: Mutex::new(HashMap::new()),
            log: LogSink::default(),
        }
    }

    /// Set the logging sink for the session and every bucket it creates.
    ///
    /// Channels log to their bucket's sink. A storage provider passed to
    /// [`Session::with_storage`] keeps its own sink.
    pub fn with_log_sink(mut self, log: LogSink) -> Self {
        self.log = log;
        self
    }

    /// The application id buckets sync under.
    pub fn app_id(&self) -> &str {
        &self.config.session.app_id
    }

    /// The session's configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The storage provider shared by all buckets.
    pub fn storage(&self) -> &Arc<dyn StorageProvider> {
        &self.storage
    }

    /// The channel factory.
    pub fn channels(&self) -> &C {
        &self.channels
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CachedBucket>> {
        self.buckets.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The bucket named `name`, created on first request.
    ///
    /// A new bucket gets the configured options, the session's storage and
    /// log sink, and a channel from the channel factory. Later calls return
    /// the same instance; `factory` is then unused.
    pub fn bucket<T, F>(&self, name: &str, factory: F) -> Result<Arc<Bucket<T>>, SessionError>
    where
        T: Diffable,
        F: EntityFactory<T> + 'static,
    {
        if name.is_empty() || self.storage.validate_bucket_name(name).is_err() {
            return Err(SessionError::InvalidBucketName(name.to_string()));
        }

        let mut buckets = self.lock();
        if let Some(cached) = buckets.get(name) {
            return cached
                .bucket
                .clone()
                .downcast::<Bucket<T>>()
                .map_err(|_| SessionError::BucketTypeMismatch {
                    name: name.to_string(),
                    expected: std::any::type_name::<T>(),
                    found: cached.entity_type,
                });
        }

        let bucket = Arc::new(
            Bucket::builder(name, factory, self.storage.clone())
                .options(self.config.buckets)
                .log_sink(self.log.clone())
                .build(),
        );
        let channel = self.channels.create_channel(&bucket);
        bucket.set_channel(channel);

        self.log.scope(|| {
            tracing::info!(
                "Created bucket {} for app {} ({})",
                name,
                self.app_id(),
                std::any::type_name::<T>()
            )
        });

        buckets.insert(
            name.to_string(),
            CachedBucket {
                bucket: bucket.clone(),
                starter: bucket.clone(),
                entity_type: std::any::type_name::<T>(),
            },
        );
        Ok(bucket)
    }

    /// The schemaless bucket named `name`.
    pub fn default_bucket(&self, name: &str) -> Result<Arc<Bucket<BucketObject>>, SessionError> {
        self.bucket(name, BucketObjectFactory)
    }

    /// Names of every bucket created so far, sorted.
    pub fn bucket_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Start every bucket's channel, in name order.
    ///
    /// Stops at the first failure; buckets started before it stay started.
    pub fn start_all(&self) -> Result<(), SessionError> {
        let mut starters: Vec<(String, Arc<dyn Startable>)> = self
            .lock()
            .iter()
            .map(|(name, cached)| (name.clone(), cached.starter.clone()))
            .collect();
        starters.sort_by(|a, b| a.0.cmp(&b.0));

        for (name, starter) in starters {
            starter
                .start()
                .map_err(|source| SessionError::Bucket { name, source })?;
        }
        Ok(())
    }
}

impl<C: ChannelFactory + fmt::Debug> fmt::Debug for Session<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("app_id", &self.app_id())
            .field("buckets", &self.bucket_names())
            .field("channels", &self.channels)
            .finish()
    }
}
