//! File-based message storage with zstd compression
//!
//! One file per message:
//! ```text
//! messages/
//!   1a2b3c@mailhost.json.zst     # JSON-encoded Message, zstd compressed
//!   4d5e6f@mailhost.json.zst
//! ```
//!
//! Listing and search read every file and order by `created` (newest
//! first), breaking ties on the identifier so pages are stable.

use std::fs;
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use log::{debug, warn};
use tempfile::NamedTempFile;

use super::MessageStore;
use crate::error::{Result, StoreError};
use crate::models::{Message, MessageId};
use crate::search::{SearchKind, SearchPage, matches, normalize_query};

/// Suffix of every message file this store owns
const MESSAGE_SUFFIX: &str = ".json.zst";

/// File-per-message storage
pub struct FileMessageStore {
    root: PathBuf,
    compression_level: i32,
}

impl FileMessageStore {
    /// Create a new file store rooted at the given directory
    pub fn new(root: impl AsRef<Path>) -> anyhow::Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).with_context(|| {
            format!("Failed to create message directory: {}", root.display())
        })?;
        Ok(Self {
            root,
            compression_level: 3,
        })
    }

    /// Directory holding the message files
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Identifiers become file names, so reject anything that would escape
    /// the directory or cannot be a file name.
    fn validate_id(id: &MessageId) -> Result<()> {
        let id = id.as_str();
        if id.is_empty()
            || id == "."
            || id == ".."
            || id.contains(['/', '\\', '\0'])
        {
            return Err(StoreError::invalid_argument(format!(
                "message id '{}' cannot be used as a file name",
                id
            )));
        }
        Ok(())
    }

    fn message_path(&self, id: &MessageId) -> Result<PathBuf> {
        Self::validate_id(id)?;
        Ok(self.root.join(format!("{}{}", id.as_str(), MESSAGE_SUFFIX)))
    }

    /// All message files currently in the directory
    fn message_files(&self) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();

        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let file_name = entry.file_name();
            if let Some(name) = file_name.to_str()
                && name.len() > MESSAGE_SUFFIX.len()
                && name.ends_with(MESSAGE_SUFFIX)
            {
                paths.push(entry.path());
            }
        }

        Ok(paths)
    }

    fn encode(&self, message: &Message) -> Result<Vec<u8>> {
        let json = serde_json::to_vec(message)?;
        Ok(zstd::encode_all(json.as_slice(), self.compression_level)?)
    }

    fn read_message(path: &Path) -> Result<Message> {
        let compressed = fs::read(path)?;
        let mut decoder = zstd::Decoder::new(compressed.as_slice())?;
        let mut json = Vec::new();
        decoder.read_to_end(&mut json)?;
        Ok(serde_json::from_slice(&json)?)
    }

    /// Every readable message, newest first
    ///
    /// Files that cannot be read or decoded are skipped with a warning.
    fn read_all_newest_first(&self) -> Result<Vec<Message>> {
        let mut messages = Vec::new();

        for path in self.message_files()? {
            match Self::read_message(&path) {
                Ok(message) => messages.push(message),
                // Deleted between read_dir and read
                Err(StoreError::Io(e)) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!("[FILE] Skipping unreadable message {}: {}", path.display(), e),
            }
        }

        messages.sort_by(|a, b| b.created.cmp(&a.created).then_with(|| b.id.cmp(&a.id)));
        Ok(messages)
    }
}

impl MessageStore for FileMessageStore {
    fn store(&self, message: Message) -> Result<MessageId> {
        let path = self.message_path(&message.id)?;
        let data = self.encode(&message)?;

        // Write atomically (write to a private temp file, then rename)
        let mut temp = NamedTempFile::new_in(&self.root)?;
        temp.write_all(&data)?;
        temp.persist(&path).map_err(|e| e.error)?;

        debug!("[FILE] Stored message {}", message.id);
        Ok(message.id)
    }

    /// Counts decodable messages only, matching what `list` can return
    fn count(&self) -> Result<usize> {
        Ok(self.read_all_newest_first()?.len())
    }

    fn load(&self, id: &MessageId) -> Result<Message> {
        let path = self.message_path(id)?;
        match Self::read_message(&path) {
            Err(StoreError::Io(e)) if e.kind() == ErrorKind::NotFound => {
                Err(StoreError::not_found(id))
            }
            result => result,
        }
    }

    fn list(&self, offset: usize, limit: usize) -> Result<Vec<Message>> {
        Ok(self
            .read_all_newest_first()?
            .into_iter()
            .skip(offset)
            .take(limit)
            .collect())
    }

    fn search(
        &self,
        kind: SearchKind,
        query: &str,
        offset: usize,
        limit: usize,
    ) -> Result<SearchPage> {
        let query = normalize_query(query);
        let matched: Vec<Message> = self
            .read_all_newest_first()?
            .into_iter()
            .filter(|message| matches(message, kind, &query))
            .collect();
        let total = matched.len();

        Ok(SearchPage {
            messages: matched.into_iter().skip(offset).take(limit).collect(),
            total,
        })
    }

    fn delete_one(&self, id: &MessageId) -> Result<()> {
        let path = self.message_path(id)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("[FILE] Deleted message {}", id);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn delete_all(&self) -> Result<()> {
        for path in self.message_files()? {
            match fs::remove_file(&path) {
                Err(e) if e.kind() != ErrorKind::NotFound => return Err(e.into()),
                _ => {}
            }
        }
        Ok(())
    }
}
