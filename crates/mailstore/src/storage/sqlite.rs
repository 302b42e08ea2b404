//! SQLite-based message storage
//!
//! The engine owns indexing, ordering and matching. Each message row
//! carries its JSON payload plus one pre-lowercased text column per
//! [`SearchKind`], so a search is a single `instr` predicate on the
//! column for that kind.

use std::path::Path;
use std::sync::Mutex;

use anyhow::Context;
use log::debug;
use rusqlite::{Connection, OptionalExtension, params};
use rusqlite_migration::{M, Migrations};

use super::MessageStore;
use crate::error::{Result, StoreError};
use crate::models::{Message, MessageId};
use crate::search::{SearchKind, SearchPage, normalize_query, search_text};

/// Database migrations
///
/// Each migration is applied in order. The user_version pragma tracks which
/// migrations have been applied.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        // Migration 1: Initial schema
        M::up(
            r#"
            -- seq preserves insertion order; re-storing an id gets a new seq
            CREATE TABLE messages (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                created TEXT NOT NULL,
                recipients TEXT NOT NULL,
                sender TEXT NOT NULL,
                full_text TEXT NOT NULL,
                payload TEXT NOT NULL
            );

            CREATE INDEX idx_messages_created ON messages(created);
            "#,
        ),
    ])
}

/// Column holding the searchable text for a kind
fn target_column(kind: SearchKind) -> &'static str {
    match kind {
        SearchKind::To => "recipients",
        SearchKind::From => "sender",
        SearchKind::Containing => "full_text",
    }
}

/// SQLite LIMIT/OFFSET take i64
fn sql_int(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// SQLite-based message storage
pub struct SqliteMessageStore {
    conn: Mutex<Connection>,
}

impl SqliteMessageStore {
    /// Open (or create) a database file
    pub fn open(db_path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let conn = Connection::open(db_path.as_ref())
            .with_context(|| format!("Failed to open database at {:?}", db_path.as_ref()))?;

        // WAL lets readers proceed during writes; NORMAL sync is safe with WAL
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            "#,
        )?;

        Self::with_connection(conn)
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::with_connection(conn)
    }

    fn with_connection(mut conn: Connection) -> anyhow::Result<Self> {
        migrations()
            .to_latest(&mut conn)
            .context("Failed to run database migrations")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn decode_payloads(payloads: Vec<String>) -> Result<Vec<Message>> {
        payloads
            .iter()
            .map(|payload| serde_json::from_str(payload).map_err(StoreError::from))
            .collect()
    }
}

impl MessageStore for SqliteMessageStore {
    fn store(&self, message: Message) -> Result<MessageId> {
        let payload = serde_json::to_string(&message)?;
        let recipients = search_text(&message, SearchKind::To);
        let sender = search_text(&message, SearchKind::From);
        let full_text = search_text(&message, SearchKind::Containing);

        let mut conn = self.conn.lock()?;
        let tx = conn.transaction()?;
        let replaced = tx.execute("DELETE FROM messages WHERE id = ?", [message.id.as_str()])?;
        tx.execute(
            "INSERT INTO messages (id, created, recipients, sender, full_text, payload)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                message.id.as_str(),
                message.created.to_rfc3339(),
                recipients,
                sender,
                full_text,
                payload
            ],
        )?;
        tx.commit()?;

        if replaced > 0 {
            debug!("[SQLITE] Replaced message {}", message.id);
        }
        Ok(message.id)
    }

    fn count(&self) -> Result<usize> {
        let conn = self.conn.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn load(&self, id: &MessageId) -> Result<Message> {
        let conn = self.conn.lock()?;
        let payload: Option<String> = conn
            .query_row(
                "SELECT payload FROM messages WHERE id = ?",
                [id.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        match payload {
            Some(payload) => Ok(serde_json::from_str(&payload)?),
            None => Err(StoreError::not_found(id)),
        }
    }

    fn list(&self, offset: usize, limit: usize) -> Result<Vec<Message>> {
        let conn = self.conn.lock()?;
        let mut stmt =
            conn.prepare("SELECT payload FROM messages ORDER BY seq DESC LIMIT ? OFFSET ?")?;

        let payloads = stmt
            .query_map(params![sql_int(limit), sql_int(offset)], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;

        Self::decode_payloads(payloads)
    }

    fn search(
        &self,
        kind: SearchKind,
        query: &str,
        offset: usize,
        limit: usize,
    ) -> Result<SearchPage> {
        let query = normalize_query(query);
        let column = target_column(kind);
        let conn = self.conn.lock()?;

        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM messages WHERE instr({}, ?) > 0", column),
            [query.as_str()],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(&format!(
            "SELECT payload FROM messages WHERE instr({}, ?) > 0
             ORDER BY seq DESC LIMIT ? OFFSET ?",
            column
        ))?;
        let payloads = stmt
            .query_map(
                params![query.as_str(), sql_int(limit), sql_int(offset)],
                |row| row.get(0),
            )?
            .collect::<std::result::Result<Vec<String>, _>>()?;

        Ok(SearchPage {
            messages: Self::decode_payloads(payloads)?,
            total: total as usize,
        })
    }

    fn delete_one(&self, id: &MessageId) -> Result<()> {
        let conn = self.conn.lock()?;
        let deleted = conn.execute("DELETE FROM messages WHERE id = ?", [id.as_str()])?;
        if deleted > 0 {
            debug!("[SQLITE] Deleted message {}", id);
        }
        Ok(())
    }

    fn delete_all(&self) -> Result<()> {
        let conn = self.conn.lock()?;
        conn.execute("DELETE FROM messages", [])?;
        Ok(())
    }
}
