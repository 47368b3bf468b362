//! # sync-types
//!
//! Identity, version and record types for bucketsync.
//!
//! This crate provides the foundational types used across all bucketsync crates:
//! - [`EntityKey`], [`Version`], [`ChangeVersion`], [`BucketId`] - Identity and ordering types
//! - [`EntityRecord`] - The raw, serializable form of an entity
//! - [`LocalChange`], [`RemoteChange`] - Change descriptors exchanged with channels
//! - [`TypesError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod change;
mod error;
mod ids;
mod record;

pub use change::{ChangeOp, LocalChange, RemoteChange};
pub use error::TypesError;
pub use ids::{BucketId, ChangeVersion, EntityKey, Version};
pub use record::{EntityRecord, Properties};
