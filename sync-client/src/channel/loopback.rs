//! In-process channel.
//!
//! [`LoopbackChannel`] stands in for a network connection: local mutations
//! are queued as [`LocalChange`]s for the application (or a test) to drain,
//! and [`RemoteChange`]s are fed back into the bucket with
//! [`LoopbackChannel::apply_remote`].

use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use bucketsync_core::{
    Bucket, BucketError, Channel, ChannelError, Diffable, Listener, ListenerResult, LogSink,
};
use bucketsync_types::{
    ChangeOp, EntityKey, EntityRecord, LocalChange, Properties, RemoteChange, Version,
};

use super::ChannelFactory;

#[derive(Debug, Default)]
struct LoopbackInner {
    outbound: VecDeque<LocalChange>,
    /// Keys with remote changes in flight, counting nested applies.
    applying: HashMap<EntityKey, usize>,
    fail_next_start: Option<String>,
}

impl LoopbackInner {
    fn enter(&mut self, key: &EntityKey) {
        *self.applying.entry(key.clone()).or_insert(0) += 1;
    }

    fn leave(&mut self, key: &EntityKey) {
        if let Some(depth) = self.applying.get_mut(key) {
            *depth -= 1;
            if *depth == 0 {
                self.applying.remove(key);
            }
        }
    }
}

/// A channel that keeps its traffic in process.
///
/// Subscribed to its bucket as a listener. Once started, every add, update
/// and removal the bucket announces is queued outbound, except the ones the
/// channel itself is applying from a remote change. Holds only a weak
/// reference to the bucket, and logs to the bucket's sink.
///
/// Queued removals carry the key and last version with no properties.
pub struct LoopbackChannel<T: Diffable> {
    name: String,
    bucket: Weak<Bucket<T>>,
    log: LogSink,
    started: AtomicBool,
    inner: Mutex<LoopbackInner>,
}

impl<T: Diffable> LoopbackChannel<T> {
    /// Create a channel for `bucket` and subscribe it to the bucket.
    pub fn subscribe(bucket: &Arc<Bucket<T>>) -> Arc<Self> {
        let channel = Arc::new(Self {
            name: format!("loopback:{}", bucket.name()),
            bucket: Arc::downgrade(bucket),
            log: bucket.log_sink().clone(),
            started: AtomicBool::new(false),
            inner: Mutex::new(LoopbackInner::default()),
        });
        bucket.add_listener(channel.clone());
        channel
    }

    fn lock(&self) -> MutexGuard<'_, LoopbackInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether [`Channel::start`] has succeeded.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Cause the next `start()` to fail with the given error.
    pub fn fail_next_start(&self, error: &str) {
        self.lock().fail_next_start = Some(error.to_string());
    }

    /// Number of queued outbound changes.
    pub fn pending(&self) -> usize {
        self.lock().outbound.len()
    }

    /// Take every queued outbound change, oldest first.
    pub fn drain_outbound(&self) -> Vec<LocalChange> {
        self.lock().outbound.drain(..).collect()
    }

    /// Apply a delta from the remote service to the bucket.
    ///
    /// Adds and updates hydrate the entity through the bucket's factory;
    /// the change version, if any, is stored atomically with the write.
    /// The resulting notifications reach every other listener but are not
    /// queued outbound.
    pub fn apply_remote(&self, change: &RemoteChange) -> Result<(), ChannelError> {
        let bucket = self.bucket.upgrade().ok_or(ChannelError::Detached)?;

        self.lock().enter(&change.key);
        let result = Self::apply(&bucket, change);
        self.lock().leave(&change.key);

        match result {
            Ok(()) => {
                self.log.scope(|| {
                    tracing::debug!(
                        "{} applied remote {:?} for {} v{}",
                        self.name,
                        change.op,
                        change.key,
                        change.version
                    )
                });
                Ok(())
            }
            Err(e) => {
                self.log.scope(|| {
                    tracing::warn!("{} rejected remote change for {}: {}", self.name, change.key, e)
                });
                Err(ChannelError::Rejected {
                    key: change.key.clone(),
                    source: Box::new(e),
                })
            }
        }
    }

    fn apply(bucket: &Bucket<T>, change: &RemoteChange) -> Result<(), BucketError> {
        let change_version = change.change_version.clone();
        match change.op {
            ChangeOp::Add => {
                let mut entity =
                    bucket.build_entity(change.key.clone(), change.version, change.properties.clone());
                bucket.add(&mut entity, change_version)
            }
            ChangeOp::Update => {
                let mut entity =
                    bucket.build_entity(change.key.clone(), change.version, change.properties.clone());
                bucket.update(&mut entity, change_version)
            }
            ChangeOp::Remove => bucket.remove(&change.key, change_version).map(|_| ()),
        }
    }

    fn queue(&self, op: ChangeOp, entity: &T) {
        if !self.is_started() {
            return;
        }
        let mut inner = self.lock();
        if inner.applying.contains_key(entity.key()) {
            return;
        }
        let record = match op {
            ChangeOp::Remove => {
                EntityRecord::new(entity.key().clone(), entity.version(), Properties::new())
            }
            ChangeOp::Add | ChangeOp::Update => entity.to_record(),
        };
        inner.outbound.push_back(LocalChange::new(op, record));
    }
}

impl<T: Diffable> Listener<T> for LoopbackChannel<T> {
    fn on_entity_added(&self, _key: &EntityKey, entity: &T) -> ListenerResult {
        self.queue(ChangeOp::Add, entity);
        Ok(())
    }

    fn on_entity_updated(&self, _key: &EntityKey, _version: Version, entity: &T) -> ListenerResult {
        self.queue(ChangeOp::Update, entity);
        Ok(())
    }

    fn on_entity_removed(&self, _key: &EntityKey, entity: &T) -> ListenerResult {
        self.queue(ChangeOp::Remove, entity);
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl<T: Diffable> Channel for LoopbackChannel<T> {
    fn start(&self) -> Result<(), ChannelError> {
        if let Some(error) = self.lock().fail_next_start.take() {
            return Err(ChannelError::StartFailed(error));
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(ChannelError::AlreadyStarted);
        }
        self.log.scope(|| tracing::info!("{} started", self.name));
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl<T: Diffable> fmt::Debug for LoopbackChannel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopbackChannel")
            .field("name", &self.name)
            .field("started", &self.is_started())
            .field("pending", &self.pending())
            .finish()
    }
}

/// Factory creating a [`LoopbackChannel`] per bucket and remembering them
/// by bucket name.
#[derive(Default)]
pub struct LoopbackChannels {
    channels: Mutex<HashMap<String, Arc<dyn Any + Send + Sync>>>,
}

impl LoopbackChannels {
    /// Create an empty factory.
    pub fn new() -> Self {
        Self::default()
    }

    /// The channel created for bucket `name`, if its entity type is `T`.
    pub fn channel<T: Diffable>(&self, name: &str) -> Option<Arc<LoopbackChannel<T>>> {
        let channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        let channel = channels.get(name)?.clone();
        channel.downcast::<LoopbackChannel<T>>().ok()
    }
}

impl ChannelFactory for LoopbackChannels {
    fn create_channel<T: Diffable>(&self, bucket: &Arc<Bucket<T>>) -> Arc<dyn Channel> {
        let channel = LoopbackChannel::subscribe(bucket);
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(bucket.name().to_string(), channel.clone());
        channel
    }
}

impl fmt::Debug for LoopbackChannels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<_> = channels.keys().collect();
        names.sort();
        f.debug_struct("LoopbackChannels").field("buckets", &names).finish()
    }
}
