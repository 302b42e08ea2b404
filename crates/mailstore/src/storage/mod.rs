//! Storage traits and implementations
//!
//! This module defines the storage abstraction layer for captured messages.
//! The trait-based design allows swapping between the in-memory ring and
//! persistent backends without touching callers.

mod file;
mod memory;
mod sqlite;
mod traits;

use std::sync::Arc;

use anyhow::Result;
use log::{info, warn};

use crate::config::{BackendKind, StorageConfig};

pub use file::FileMessageStore;
pub use memory::InMemoryMessageStore;
pub use sqlite::SqliteMessageStore;
pub use traits::MessageStore;

/// Construct the backend selected by `config`
pub fn open_store(config: &StorageConfig) -> Result<Arc<dyn MessageStore>> {
    if config.backend != BackendKind::Memory && config.message_limit > 0 {
        warn!(
            "[STORE] message_limit only applies to the memory backend; ignoring limit {}",
            config.message_limit
        );
    }

    let store: Arc<dyn MessageStore> = match config.backend {
        BackendKind::Memory => {
            match config.message_limit {
                0 => info!("[STORE] Using in-memory storage (unbounded)"),
                limit => info!("[STORE] Using in-memory storage (limit {} messages)", limit),
            }
            Arc::new(InMemoryMessageStore::with_capacity(config.message_limit))
        }
        BackendKind::File => {
            let path = config.require_path()?;
            info!("[STORE] Using file storage at {}", path.display());
            Arc::new(FileMessageStore::new(path)?)
        }
        BackendKind::Sqlite => {
            let path = config.require_path()?;
            info!("[STORE] Using SQLite storage at {}", path.display());
            Arc::new(SqliteMessageStore::open(path)?)
        }
    };

    Ok(store)
}
