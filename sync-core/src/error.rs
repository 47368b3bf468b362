//! Error types for bucketsync-core.

use bucketsync_types::{EntityKey, Version};
use thiserror::Error;

/// Storage provider errors.
///
/// Any of these aborts the requested bucket operation: nothing is
/// considered committed and no listener is notified.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend cannot serve requests right now.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Record (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Persisted state is unreadable.
    #[error("corrupt state for bucket {bucket}: {reason}")]
    Corrupt {
        /// Bucket whose state is corrupt.
        bucket: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The backend cannot represent this bucket name.
    #[error("invalid bucket name: {0:?}")]
    InvalidBucketName(String),

    /// Any other backend failure.
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Channel errors.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The channel could not begin its network lifecycle.
    #[error("channel failed to start: {0}")]
    StartFailed(String),

    /// The channel was already started.
    #[error("channel already started")]
    AlreadyStarted,

    /// The bucket this channel serves has been dropped.
    #[error("channel is detached from its bucket")]
    Detached,

    /// The bucket refused to apply a remote change.
    #[error("remote change for {key} rejected: {source}")]
    Rejected {
        /// Key of the rejected change.
        key: EntityKey,
        /// Why the bucket refused it.
        #[source]
        source: Box<BucketError>,
    },
}

/// Bucket operation errors.
#[derive(Debug, Error)]
pub enum BucketError {
    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Identity generation hit its retry cap.
    #[error("identity space exhausted after {attempts} attempts")]
    IdentityExhausted {
        /// Number of keys drawn before giving up.
        attempts: u32,
    },

    /// A write carried a lower version than the stored one.
    #[error("stale version for {key}: stored {stored}, incoming {incoming}")]
    StaleVersion {
        /// Key of the entity.
        key: EntityKey,
        /// Version currently in storage.
        stored: Version,
        /// Version the write carried.
        incoming: Version,
    },

    /// The entity belongs to a different bucket instance.
    #[error("entity {key} is attached to bucket {bucket}")]
    ForeignEntity {
        /// Key of the entity.
        key: EntityKey,
        /// Name of the bucket the entity is attached to.
        bucket: String,
    },

    /// Channel error.
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    /// `start` was called before a channel was set.
    #[error("no channel attached to bucket")]
    NoChannel,
}

/// Result type alias for bucket operations.
pub type Result<T> = std::result::Result<T, BucketError>;

/// Result type alias for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
