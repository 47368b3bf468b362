//! Listener registry and fan-out notification.
//!
//! A bucket notifies every subscribed [`Listener`] of each entity mutation.
//! Storage adapters, sync channels and UI code can all subscribe to the same
//! bucket without knowing about each other.
//!
//! # Dispatch rules
//!
//! - Each dispatch iterates an immutable snapshot of the subscriber list,
//!   taken when the dispatch starts. Subscribing or unsubscribing while a
//!   dispatch is in flight only affects later dispatches.
//! - Listeners are called in subscription order.
//! - Each call is isolated. An `Err` or a panic from one listener is logged
//!   and the remaining listeners still receive the event.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use bucketsync_types::{EntityKey, Version};

use crate::log::LogSink;

/// Result of a listener hook.
pub type ListenerResult = anyhow::Result<()>;

/// Observer of entity mutations on a bucket.
///
/// Every hook defaults to doing nothing, so implementors override only the
/// events they care about.
pub trait Listener<T>: Send + Sync {
    /// An entity was created in memory.
    fn on_entity_created(&self, _key: &EntityKey, _entity: &T) -> ListenerResult {
        Ok(())
    }

    /// An entity was added and persisted.
    fn on_entity_added(&self, _key: &EntityKey, _entity: &T) -> ListenerResult {
        Ok(())
    }

    /// An entity was updated and persisted.
    fn on_entity_updated(&self, _key: &EntityKey, _version: Version, _entity: &T) -> ListenerResult {
        Ok(())
    }

    /// An entity was removed from storage.
    fn on_entity_removed(&self, _key: &EntityKey, _entity: &T) -> ListenerResult {
        Ok(())
    }

    /// Name used when logging failures of this listener.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Handle returned by [`ListenerRegistry::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// A mutation to announce.
pub enum EntityEvent<'a, T> {
    /// See [`Listener::on_entity_created`].
    Created {
        /// Entity key.
        key: &'a EntityKey,
        /// The entity.
        entity: &'a T,
    },
    /// See [`Listener::on_entity_added`].
    Added {
        /// Entity key.
        key: &'a EntityKey,
        /// The entity.
        entity: &'a T,
    },
    /// See [`Listener::on_entity_updated`].
    Updated {
        /// Entity key.
        key: &'a EntityKey,
        /// Entity version after the update.
        version: Version,
        /// The entity.
        entity: &'a T,
    },
    /// See [`Listener::on_entity_removed`].
    Removed {
        /// Entity key.
        key: &'a EntityKey,
        /// Last stored state of the entity.
        entity: &'a T,
    },
}

impl<T> EntityEvent<'_, T> {
    /// Name of the hook this event maps to.
    pub fn hook(&self) -> &'static str {
        match self {
            EntityEvent::Created { .. } => "on_entity_created",
            EntityEvent::Added { .. } => "on_entity_added",
            EntityEvent::Updated { .. } => "on_entity_updated",
            EntityEvent::Removed { .. } => "on_entity_removed",
        }
    }

    /// Key of the affected entity.
    pub fn key(&self) -> &EntityKey {
        match self {
            EntityEvent::Created { key, .. }
            | EntityEvent::Added { key, .. }
            | EntityEvent::Updated { key, .. }
            | EntityEvent::Removed { key, .. } => key,
        }
    }

    fn deliver(&self, listener: &dyn Listener<T>) -> ListenerResult {
        match *self {
            EntityEvent::Created { key, entity } => listener.on_entity_created(key, entity),
            EntityEvent::Added { key, entity } => listener.on_entity_added(key, entity),
            EntityEvent::Updated {
                key,
                version,
                entity,
            } => listener.on_entity_updated(key, version, entity),
            EntityEvent::Removed { key, entity } => listener.on_entity_removed(key, entity),
        }
    }
}

/// Outcome of one dispatch pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Listeners whose hook returned `Ok`.
    pub delivered: usize,
    /// Listeners whose hook returned `Err` or panicked.
    pub failed: usize,
}

struct Subscription<T> {
    id: ListenerId,
    listener: Arc<dyn Listener<T>>,
}

impl<T> Clone for Subscription<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            listener: Arc::clone(&self.listener),
        }
    }
}

/// Copy-on-write set of listeners.
pub struct ListenerRegistry<T> {
    subscriptions: RwLock<Arc<[Subscription<T>]>>,
    next_id: AtomicU64,
    log: LogSink,
}

impl<T> ListenerRegistry<T> {
    /// Create an empty registry logging to `log`.
    pub fn new(log: LogSink) -> Self {
        Self {
            subscriptions: RwLock::new(Arc::from(Vec::new())),
            next_id: AtomicU64::new(1),
            log,
        }
    }

    /// Add a listener. It receives every event dispatched after this call.
    pub fn subscribe(&self, listener: Arc<dyn Listener<T>>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut guard = self
            .subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let mut next: Vec<Subscription<T>> = guard.to_vec();
        next.push(Subscription { id, listener });
        *guard = Arc::from(next);
        id
    }

    /// Remove a listener. Returns `false` if it was not subscribed.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut guard = self
            .subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if !guard.iter().any(|s| s.id == id) {
            return false;
        }
        let next: Vec<Subscription<T>> = guard.iter().filter(|s| s.id != id).cloned().collect();
        *guard = Arc::from(next);
        true
    }

    /// Number of subscribed listeners.
    pub fn len(&self) -> usize {
        self.current().len()
    }

    /// Whether no listener is subscribed.
    pub fn is_empty(&self) -> bool {
        self.current().is_empty()
    }

    /// Ids of the subscribed listeners, in subscription order.
    pub fn ids(&self) -> Vec<ListenerId> {
        self.current().iter().map(|s| s.id).collect()
    }

    fn current(&self) -> Arc<[Subscription<T>]> {
        let guard = self
            .subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Deliver `event` to every listener in the current snapshot.
    pub fn dispatch(&self, event: &EntityEvent<'_, T>) -> DispatchReport {
        let snapshot = self.current();
        let mut report = DispatchReport::default();

        for subscription in snapshot.iter() {
            let listener = subscription.listener.as_ref();
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| event.deliver(listener)));
            match outcome {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    report.failed += 1;
                    self.log.scope(|| {
                        tracing::warn!(
                            "Listener {} ({}) failed {} for {}: {:#}",
                            listener.name(),
                            subscription.id,
                            event.hook(),
                            event.key(),
                            e
                        )
                    });
                }
                Err(payload) => {
                    report.failed += 1;
                    self.log.scope(|| {
                        tracing::warn!(
                            "Listener {} ({}) panicked in {} for {}: {}",
                            listener.name(),
                            subscription.id,
                            event.hook(),
                            event.key(),
                            panic_message(payload.as_ref())
                        )
                    });
                }
            }
        }

        report
    }
}

impl<T> Default for ListenerRegistry<T> {
    fn default() -> Self {
        Self::new(LogSink::default())
    }
}

impl<T> fmt::Debug for ListenerRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.ids())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
