//! Storage trait definitions

use crate::error::Result;
use crate::models::{Message, MessageId};
use crate::search::{SearchKind, SearchPage};

/// Trait for message storage operations
///
/// Every backend (in-memory ring, file-per-message, SQLite) implements the
/// same observable behaviour:
/// - `list` and `search` return the most recently stored messages first
/// - an `offset` past the end yields an empty page, never an error
/// - `limit` is clamped to what remains
/// - `delete_one` of an unknown identifier is a no-op
pub trait MessageStore: Send + Sync {
    /// Store a message and return its identifier
    ///
    /// Storing an identifier that is already present replaces the old
    /// message. Insertion-ordered backends treat the replacement as the
    /// most recent message.
    fn store(&self, message: Message) -> Result<MessageId>;

    /// Number of messages currently stored
    fn count(&self) -> Result<usize>;

    /// Load a message by identifier
    ///
    /// Returns [`StoreError::NotFound`](crate::StoreError::NotFound) when absent.
    fn load(&self, id: &MessageId) -> Result<Message>;

    /// List up to `limit` messages, skipping the `offset` most recent
    fn list(&self, offset: usize, limit: usize) -> Result<Vec<Message>>;

    /// Case-insensitive substring search, windowed like [`list`](Self::list)
    ///
    /// `SearchPage::total` is the number of matches before windowing.
    fn search(
        &self,
        kind: SearchKind,
        query: &str,
        offset: usize,
        limit: usize,
    ) -> Result<SearchPage>;

    /// Delete a single message
    fn delete_one(&self, id: &MessageId) -> Result<()>;

    /// Delete every message
    fn delete_all(&self) -> Result<()>;
}
