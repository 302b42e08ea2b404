//! Domain models for captured messages

mod message;

pub use message::{Content, Message, MessageBuilder, MessageId, Path, RawMessage};
