//! Storage crate: durable polling offsets.
//!
//! ## Modules
//!
//! - [`error`] – Storage error types
//! - [`offset_store`] – OffsetStore trait and MemoryOffsetStore
//! - [`file_store`] – FileOffsetStore (temp file + fsync + rename)
//! - [`sqlite_store`] – SqliteOffsetStore (single-row upsert)
//! - [`sqlite_pool`] – SqlitePoolManager

mod error;
mod file_store;
mod offset_store;
mod sqlite_pool;
mod sqlite_store;

use std::sync::Arc;

pub use error::StorageError;
pub use file_store::{default_offset_path, FileOffsetStore};
pub use offset_store::{MemoryOffsetStore, OffsetStore};
pub use sqlite_pool::SqlitePoolManager;
pub use sqlite_store::SqliteOffsetStore;

/// Opens the store described by `location`: a `sqlite:` URL selects [`SqliteOffsetStore`],
/// anything else is treated as a path for [`FileOffsetStore`].
pub async fn open_offset_store(location: &str) -> Result<Arc<dyn OffsetStore>, StorageError> {
    if location.starts_with("sqlite:") {
        Ok(Arc::new(SqliteOffsetStore::new(location).await?))
    } else {
        Ok(Arc::new(FileOffsetStore::new(location)))
    }
}
