//! Mailstore crate - storage for captured mail
//!
//! This crate provides the message storage layer of a mail-capturing tool:
//! - Domain model for captured messages (Message, Path, Content)
//! - The `MessageStore` contract shared by every backend
//! - A bounded in-memory ring store that overwrites the oldest message when full
//! - File-per-message and SQLite backends with the same semantics
//! - Field-scoped, case-insensitive substring search
//!
//! All operations are synchronous; stores are `Send + Sync` and meant to be
//! shared as `Arc<dyn MessageStore>`.

pub mod config;
pub mod error;
pub mod models;
pub mod search;
pub mod storage;

pub use crate::config::{BackendKind, StorageConfig};
pub use crate::error::{Result, StoreError};
pub use crate::models::{Content, Message, MessageBuilder, MessageId, Path, RawMessage};
pub use crate::search::{SearchKind, SearchPage};
pub use crate::storage::{
    FileMessageStore, InMemoryMessageStore, MessageStore, SqliteMessageStore, open_store,
};
