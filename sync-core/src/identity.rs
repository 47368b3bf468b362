//! Entity key generation.
//!
//! Keys come from a [`KeySource`] and are checked against the bucket's
//! existing key space. Collisions are retried, up to a fixed number of
//! attempts; running out is reported as
//! [`BucketError::IdentityExhausted`](crate::BucketError::IdentityExhausted).

use bucketsync_types::EntityKey;

use crate::error::{BucketError, Result, StorageResult};

/// Default cap on key draws per generation.
pub const DEFAULT_MAX_KEY_ATTEMPTS: u32 = 8;

/// Supplies candidate entity keys.
pub trait KeySource: Send + Sync {
    /// Draw a candidate key.
    fn next_key(&self) -> EntityKey;
}

/// Random UUID v4 keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidKeySource;

impl KeySource for UuidKeySource {
    fn next_key(&self) -> EntityKey {
        EntityKey::random()
    }
}

/// Draw keys from `source` until `taken` reports one as free.
///
/// Storage errors from `taken` abort generation immediately.
pub fn generate_key<F>(source: &dyn KeySource, max_attempts: u32, mut taken: F) -> Result<EntityKey>
where
    F: FnMut(&EntityKey) -> StorageResult<bool>,
{
    for attempt in 1..=max_attempts {
        let key = source.next_key();
        if !taken(&key)? {
            return Ok(key);
        }
        tracing::debug!("Key collision on {} (attempt {}/{})", key, attempt, max_attempts);
    }
    Err(BucketError::IdentityExhausted {
        attempts: max_attempts,
    })
}
