//! Storage configuration
//!
//! Supports loading settings from (in order of priority):
//! 1. Environment variables (override individual fields)
//! 2. JSON file in the catchall config directory (`storage.json`)
//! 3. Built-in defaults (unbounded in-memory store)

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Config filename in the catchall config directory
const STORAGE_FILE: &str = "storage.json";

const ENV_BACKEND: &str = "CATCHALL_STORAGE";
const ENV_MESSAGE_LIMIT: &str = "CATCHALL_MESSAGE_LIMIT";
const ENV_PATH: &str = "CATCHALL_STORAGE_PATH";

/// Which storage backend to construct
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Bounded in-memory ring
    #[default]
    Memory,
    /// One file per message in a directory
    File,
    /// SQLite database file
    Sqlite,
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(BackendKind::Memory),
            "file" | "maildir" => Ok(BackendKind::File),
            "sqlite" => Ok(BackendKind::Sqlite),
            other => bail!("Unknown storage backend '{}' (expected memory, file or sqlite)", other),
        }
    }
}

/// Settings consumed when the store is constructed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: BackendKind,
    /// Maximum number of messages kept in memory; 0 means unbounded
    pub message_limit: usize,
    /// Directory (file backend) or database file (sqlite backend)
    pub path: Option<PathBuf>,
}

impl StorageConfig {
    /// In-memory store, optionally bounded
    pub fn memory(message_limit: usize) -> Self {
        Self {
            backend: BackendKind::Memory,
            message_limit,
            path: None,
        }
    }

    /// Load settings from the config file (if present), then apply
    /// environment overrides
    pub fn load() -> Result<Self> {
        let base = if config::config_exists(STORAGE_FILE) {
            config::load_json(STORAGE_FILE)?
        } else {
            Self::default()
        };

        base.with_overrides(|key| std::env::var(key).ok())
    }

    /// Load settings from a specific JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        config::load_json_file(path)
    }

    /// Parse settings from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse storage config JSON")
    }

    /// Apply overrides looked up by environment variable name
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(backend) = lookup(ENV_BACKEND) {
            self.backend = backend
                .parse()
                .with_context(|| format!("Invalid {}", ENV_BACKEND))?;
        }

        if let Some(limit) = lookup(ENV_MESSAGE_LIMIT) {
            self.message_limit = limit.trim().parse().with_context(|| {
                format!("{} must be a non-negative integer, got '{}'", ENV_MESSAGE_LIMIT, limit)
            })?;
        }

        if let Some(path) = lookup(ENV_PATH).filter(|p| !p.is_empty()) {
            self.path = Some(PathBuf::from(path));
        }

        Ok(self)
    }

    /// Backend location, required by the file and sqlite backends
    pub fn require_path(&self) -> Result<&Path> {
        self.path.as_deref().with_context(|| {
            format!(
                "The {:?} storage backend requires a path (set \"path\" or {})",
                self.backend, ENV_PATH
            )
        })
    }

    /// Save settings to the catchall config directory
    pub fn save(&self) -> Result<()> {
        config::save_json(STORAGE_FILE, self)
    }
}
