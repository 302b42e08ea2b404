//! Field-scoped substring search over captured messages
//!
//! Every backend supports the same three search kinds. The in-memory and
//! file backends evaluate them with [`matches`]; the SQLite backend stores
//! the same text pre-joined in one column per kind (see [`search_text`]).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::models::Message;

/// Which part of a message a search query is matched against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchKind {
    /// Envelope recipients and `To` header values
    To,
    /// Envelope sender and `From` header values
    From,
    /// Body and every header value
    Containing,
}

impl SearchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchKind::To => "to",
            SearchKind::From => "from",
            SearchKind::Containing => "containing",
        }
    }
}

impl fmt::Display for SearchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "to" => Ok(SearchKind::To),
            "from" => Ok(SearchKind::From),
            "containing" => Ok(SearchKind::Containing),
            other => Err(StoreError::invalid_argument(format!(
                "unknown search kind '{}' (expected to, from or containing)",
                other
            ))),
        }
    }
}

/// A window of search results plus the number of matches before windowing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchPage {
    pub messages: Vec<Message>,
    pub total: usize,
}

/// Separator between candidate fields in [`search_text`]
///
/// [`normalize_query`] strips it, so no query can match across two fields.
pub const FIELD_SEPARATOR: &str = "\u{1f}";

/// Lowercase a query once so it can be reused across candidates
pub fn normalize_query(query: &str) -> String {
    query.replace(FIELD_SEPARATOR, "").to_lowercase()
}

/// Candidate strings a search kind inspects, in evaluation order
fn candidates(message: &Message, kind: SearchKind) -> Vec<String> {
    let content = &message.content;
    match kind {
        SearchKind::To => message
            .to
            .iter()
            .map(|path| path.address())
            .chain(content.header("To").map(str::to_string))
            .collect(),
        SearchKind::From => message
            .from
            .iter()
            .map(|path| path.address())
            .chain(content.header("From").map(str::to_string))
            .collect(),
        SearchKind::Containing => std::iter::once(content.body.clone())
            .chain(content.headers.values().flatten().cloned())
            .collect(),
    }
}

/// Whether `message` matches an already-normalized query for `kind`
///
/// A message matches when any inspected field contains the query,
/// compared case-insensitively. The empty query matches every message.
pub fn matches(message: &Message, kind: SearchKind, normalized_query: &str) -> bool {
    if normalized_query.is_empty() {
        return true;
    }
    candidates(message, kind)
        .iter()
        .any(|text| text.to_lowercase().contains(normalized_query))
}

/// Lowercased text a search kind inspects, one field per [`FIELD_SEPARATOR`]
///
/// A normalized query hits the joined text only if it hits one candidate.
pub fn search_text(message: &Message, kind: SearchKind) -> String {
    candidates(message, kind).join(FIELD_SEPARATOR).to_lowercase()
}
