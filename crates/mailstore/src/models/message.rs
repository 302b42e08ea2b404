//! Message model representing a captured SMTP message

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Unique identifier for a stored message
///
/// Supplied by the capture pipeline; stores never generate or rewrite it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// An SMTP envelope path (`MAIL FROM` / `RCPT TO` argument)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Path {
    /// Local part (e.g., "john")
    pub mailbox: String,
    /// Domain part (e.g., "example.com")
    pub domain: String,
}

impl Path {
    pub fn new(mailbox: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            mailbox: mailbox.into(),
            domain: domain.into(),
        }
    }

    /// Parse a path from "mailbox@domain", tolerating surrounding angle brackets
    pub fn parse(s: &str) -> Self {
        let s = s.trim().trim_start_matches('<').trim_end_matches('>');

        match s.rsplit_once('@') {
            Some((mailbox, domain)) => Self::new(mailbox, domain),
            None => Self::new(s, ""),
        }
    }

    /// Full address in "mailbox@domain" form
    pub fn address(&self) -> String {
        format!("{}@{}", self.mailbox, self.domain)
    }
}

/// Parsed message content
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Content {
    /// Header name -> values in the order they appeared
    pub headers: BTreeMap<String, Vec<String>>,
    /// Message body
    pub body: String,
    /// Size of the body in bytes
    pub size: usize,
}

impl Content {
    /// Values of a header, matched case-insensitively on the name
    pub fn header(&self, name: &str) -> impl Iterator<Item = &str> {
        self.headers
            .iter()
            .filter(move |(key, _)| key.eq_ignore_ascii_case(name))
            .flat_map(|(_, values)| values.iter().map(String::as_str))
    }
}

/// The SMTP conversation a message arrived in, before parsing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMessage {
    pub from: String,
    pub to: Vec<String>,
    pub data: String,
    pub helo: String,
}

/// A captured message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    /// Envelope sender
    pub from: Option<Path>,
    /// Envelope recipients
    pub to: Vec<Path>,
    pub content: Content,
    /// When the message was captured (informational, not used for ordering in memory)
    pub created: DateTime<Utc>,
    pub raw: Option<RawMessage>,
}

impl Message {
    /// Create a new message builder
    pub fn builder(id: impl Into<MessageId>) -> MessageBuilder {
        MessageBuilder::new(id.into())
    }
}

/// Builder for creating Message instances
pub struct MessageBuilder {
    id: MessageId,
    from: Option<Path>,
    to: Vec<Path>,
    headers: BTreeMap<String, Vec<String>>,
    body: String,
    created: Option<DateTime<Utc>>,
    raw: Option<RawMessage>,
}

impl MessageBuilder {
    fn new(id: MessageId) -> Self {
        Self {
            id,
            from: None,
            to: Vec::new(),
            headers: BTreeMap::new(),
            body: String::new(),
            created: None,
            raw: None,
        }
    }

    pub fn from(mut self, from: Path) -> Self {
        self.from = Some(from);
        self
    }

    pub fn to(mut self, to: Vec<Path>) -> Self {
        self.to = to;
        self
    }

    /// Append a header value, keeping earlier values for the same name
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.entry(name.into()).or_default().push(value.into());
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn created(mut self, created: DateTime<Utc>) -> Self {
        self.created = Some(created);
        self
    }

    pub fn raw(mut self, raw: RawMessage) -> Self {
        self.raw = Some(raw);
        self
    }

    pub fn build(self) -> Message {
        let size = self.body.len();
        Message {
            id: self.id,
            from: self.from,
            to: self.to,
            content: Content {
                headers: self.headers,
                body: self.body,
                size,
            },
            created: self.created.unwrap_or_else(Utc::now),
            raw: self.raw,
        }
    }
}
