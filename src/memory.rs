//! Durable key-value memory shared by every step of a run.
//!
//! Values are arbitrary JSON. The whole map is written back to its document
//! on every `store`, and read wholesale when the store is opened or reloaded.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

/// Result type for memory operations
pub type MemoryResult<T> = Result<T, MemoryError>;

/// Errors raised while persisting memory
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("failed to write memory document {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize memory: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Key-value memory with optional file backing
#[derive(Debug, Default)]
pub struct MemoryStore {
    path: Option<PathBuf>,
    entries: BTreeMap<String, Value>,
}

impl MemoryStore {
    /// Open a file-backed store, loading every persisted entry.
    ///
    /// A missing document yields an empty store. An unreadable or corrupt one
    /// is logged and treated as empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = load_entries(&path);
        debug!(path = %path.display(), entries = entries.len(), "memory loaded");
        Self {
            path: Some(path),
            entries,
        }
    }

    /// A store that never touches the filesystem
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Insert or overwrite a value and persist immediately
    pub fn store(&mut self, key: impl Into<String>, value: Value) -> MemoryResult<()> {
        let key = key.into();
        debug!(key = %key, "memory store");
        self.entries.insert(key, value);
        self.persist()
    }

    pub fn read(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Read a value rendered as plain text (strings unquoted)
    pub fn read_text(&self, key: &str) -> Option<String> {
        self.read(key).map(value_text)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn entries(&self) -> &BTreeMap<String, Value> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Re-read the backing document, dropping in-process state.
    ///
    /// This is how a reset performed by another owner of the document is
    /// picked up.
    pub fn reload(&mut self) {
        if let Some(path) = &self.path {
            self.entries = load_entries(path);
        }
    }

    /// Clear every entry and persist the empty document
    pub fn reset(&mut self) -> MemoryResult<()> {
        self.entries.clear();
        self.persist()
    }

    fn persist(&self) -> MemoryResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let body = serde_json::to_string_pretty(&self.entries)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| MemoryError::Io {
                path: path.clone(),
                source,
            })?;
        }
        fs::write(path, body).map_err(|source| MemoryError::Io {
            path: path.clone(),
            source,
        })
    }
}

/// Render a memory value the way it appears on a page
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn load_entries(path: &Path) -> BTreeMap<String, Value> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "could not read memory document");
            return BTreeMap::new();
        }
    };
    if raw.trim().is_empty() {
        return BTreeMap::new();
    }
    match serde_json::from_str(&raw) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "memory document is not a JSON object, starting empty");
            BTreeMap::new()
        }
    }
}
