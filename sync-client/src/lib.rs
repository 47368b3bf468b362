//! # sync-client
//!
//! Application-facing layer of bucketsync.
//!
//! `sync-core` defines buckets and the seams around them; this crate plugs
//! real things into those seams:
//!
//! - [`Session`]: hands out one bucket per name, wired to shared storage and
//!   a channel from a [`ChannelFactory`]
//! - [`SessionConfig`]: TOML configuration with defaults for every field
//! - [`FileStorage`]: crash-safe JSON snapshots, one file per bucket
//! - [`LoopbackChannel`]: an in-process channel for tests and offline use
//! - [`init_logging`]: process-wide `tracing` subscriber setup
//!
//! ## Example
//!
//! ```
//! use bucketsync_client::{LoopbackChannels, Session, SessionConfig};
//!
//! let session = Session::open(SessionConfig::default(), LoopbackChannels::new())?;
//! let notes = session.default_bucket("notes")?;
//!
//! let mut note = notes.new_entity()?;
//! note.set("title", "groceries");
//! notes.add(&mut note, None)?;
//!
//! session.start_all()?;
//! assert_eq!(notes.all_entities()?.len(), 1);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod channel;
pub mod config;
pub mod logging;
pub mod session;
pub mod storage;

pub use channel::{ChannelFactory, LoopbackChannel, LoopbackChannels};
pub use config::{ConfigError, LoggingConfig, SessionConfig, SessionSection, StorageConfig};
pub use logging::{init_logging, stderr_sink};
pub use session::{Session, SessionError};
pub use storage::{open_storage, FileStorage};
