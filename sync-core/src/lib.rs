//! # sync-core
//!
//! Versioned entity buckets for bucketsync.
//!
//! A [`Bucket`] is the seam between application code, a pluggable
//! [`StorageProvider`] and a pluggable network [`Channel`]. It owns the
//! lifecycle of [`Diffable`] entities, the bucket's change-version cursor,
//! and a [`ListenerRegistry`] that fans every mutation out to observers.
//!
//! ## Design Philosophy
//!
//! This crate performs no file or network I/O of its own:
//! - Persistence is delegated to a [`StorageProvider`] ([`MemoryStorage`]
//!   ships here; durable backends live in `sync-client`)
//! - Networking is delegated to a [`Channel`], which subscribes to the
//!   bucket like any other [`Listener`]
//! - Diagnostics go to an injected [`LogSink`]
//!
//! All operations are synchronous. `Bucket<T>` is `Send + Sync` and is
//! meant to be shared through an `Arc` by the application thread and the
//! channel applying remote deltas.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bucket;
pub mod channel;
pub mod entity;
pub mod error;
pub mod identity;
pub mod listener;
pub mod log;
pub mod options;
pub mod storage;

pub use bucket::{Bucket, BucketBuilder};
pub use channel::Channel;
pub use entity::{BucketObject, BucketObjectFactory, BucketRef, Diffable, EntityFactory};
pub use error::{BucketError, ChannelError, Result, StorageError, StorageResult};
pub use identity::{KeySource, UuidKeySource, DEFAULT_MAX_KEY_ATTEMPTS};
pub use listener::{
    DispatchReport, EntityEvent, Listener, ListenerId, ListenerRegistry, ListenerResult,
};
pub use log::LogSink;
pub use options::{BucketOptions, VersionPolicy};
pub use storage::{MemoryStorage, StorageProvider};

pub use bucketsync_types::{
    ChangeOp, ChangeVersion, EntityKey, EntityRecord, LocalChange, Properties, RemoteChange,
    Version,
};
