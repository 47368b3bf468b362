//! Injected logging sinks.
//!
//! Components never log to an implicit process-wide destination of their
//! own. Each one holds a [`LogSink`] handed to it at construction and emits
//! its `tracing` events inside the sink's scope. The default sink defers to
//! whatever subscriber is current on the calling thread.

use std::fmt;

use tracing::Dispatch;

/// Where a component's diagnostic events go.
#[derive(Clone, Default)]
pub struct LogSink {
    dispatch: Option<Dispatch>,
}

impl LogSink {
    /// A sink that uses the subscriber current on the calling thread.
    pub fn inherit() -> Self {
        Self::default()
    }

    /// A sink bound to a specific dispatcher.
    pub fn new(dispatch: Dispatch) -> Self {
        Self {
            dispatch: Some(dispatch),
        }
    }

    /// A sink bound to a subscriber.
    pub fn from_subscriber<S>(subscriber: S) -> Self
    where
        S: tracing::Subscriber + Send + Sync + 'static,
    {
        Self::new(Dispatch::new(subscriber))
    }

    /// Whether this sink overrides the caller's subscriber.
    pub fn is_bound(&self) -> bool {
        self.dispatch.is_some()
    }

    /// Run `f` with this sink as the default subscriber.
    pub fn scope<R>(&self, f: impl FnOnce() -> R) -> R {
        match &self.dispatch {
            Some(dispatch) => tracing::dispatcher::with_default(dispatch, f),
            None => f(),
        }
    }
}

impl fmt::Debug for LogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogSink")
            .field("bound", &self.is_bound())
            .finish()
    }
}
