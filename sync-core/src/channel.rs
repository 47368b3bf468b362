//! The network-facing collaborator of a bucket.

use crate::error::ChannelError;

/// Pushes local changes upstream and feeds remote deltas back into a bucket.
///
/// A bucket holds at most one channel and only ever asks it to start; the
/// channel learns about local mutations by subscribing to the bucket as a
/// listener, and applies remote deltas through the bucket's own mutation
/// operations.
pub trait Channel: Send + Sync {
    /// Begin the channel's network lifecycle for its bucket.
    fn start(&self) -> Result<(), ChannelError>;

    /// Human-readable name, used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}
