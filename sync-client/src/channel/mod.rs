//! Channel construction.
//!
//! A session asks its [`ChannelFactory`] for one channel per bucket, right
//! after the bucket is created and before anyone else can subscribe to it.

mod loopback;

pub use loopback::{LoopbackChannel, LoopbackChannels};

use std::sync::Arc;

use bucketsync_core::{Bucket, Channel, Diffable};

/// Builds the channel serving a newly created bucket.
pub trait ChannelFactory: Send + Sync {
    /// Create the channel for `bucket`.
    ///
    /// Implementations that need to hear about local mutations subscribe
    /// to the bucket here. The returned channel is attached with
    /// [`Bucket::set_channel`] by the caller.
    fn create_channel<T: Diffable>(&self, bucket: &Arc<Bucket<T>>) -> Arc<dyn Channel>;
}
