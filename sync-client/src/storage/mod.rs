//! Storage backends and backend selection.

mod file;

pub use file::FileStorage;

use std::sync::Arc;

use bucketsync_core::{LogSink, MemoryStorage, StorageProvider, StorageResult};

use crate::config::StorageConfig;

/// The provider described by `config`: [`FileStorage`] rooted at
/// `storage.path` when set, [`MemoryStorage`] otherwise.
///
/// File storage logs to `log`.
pub fn open_storage(
    config: &StorageConfig,
    log: &LogSink,
) -> StorageResult<Arc<dyn StorageProvider>> {
    match &config.path {
        Some(path) => {
            log.scope(|| tracing::info!("Opening file storage at {}", path.display()));
            let storage = FileStorage::open(path)?.with_log_sink(log.clone());
            Ok(Arc::new(storage))
        }
        None => {
            log.scope(|| tracing::debug!("No storage path configured, using memory storage"));
            Ok(Arc::new(MemoryStorage::new()))
        }
    }
}
