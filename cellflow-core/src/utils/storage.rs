//! Storage backends for persistent cells.
//!
//! Backends store opaque strings under string keys. Serialization is the
//! caller's concern (see [`super::persist`]).

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use dashmap::DashMap;
use tracing::debug;

use crate::error::{CellError, Result};

/// Key/value string store.
pub trait Storage: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>>;

    fn set_item(&self, key: &str, value: &str) -> Result<()>;

    /// Removing a missing key is not an error.
    fn remove_item(&self, key: &str) -> Result<()>;
}

/// In-process storage. Contents are lost with the process.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: DashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Storage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.items.get(key).map(|entry| entry.value().clone()))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.items.remove(key);
        Ok(())
    }
}

/// Where a [`FileStorage`] keeps its files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
    /// Scratch storage under the system temp directory (`<tmp>/cellflow`).
    Session,
    /// Durable storage under `<base>/.cellflow`, `base` defaulting to the
    /// working directory.
    Local,
}

/// One JSON file per key.
#[derive(Debug, Clone)]
pub struct FileStorage {
    storage_type: StorageType,
    dir: PathBuf,
}

impl FileStorage {
    /// Open (creating if needed) the storage directory.
    pub fn new(storage_type: StorageType, base_path: Option<&Path>) -> Result<Self> {
        let dir = match storage_type {
            StorageType::Session => std::env::temp_dir().join("cellflow"),
            StorageType::Local => {
                let base = match base_path {
                    Some(base) => base.to_path_buf(),
                    None => std::env::current_dir().map_err(|e| {
                        CellError::Storage(format!("cannot resolve working directory: {e}"))
                    })?,
                };
                base.join(".cellflow")
            }
        };

        fs::create_dir_all(&dir).map_err(|e| {
            CellError::Storage(format!("cannot create {}: {e}", dir.display()))
        })?;
        debug!(?storage_type, path = %dir.display(), "file storage ready");
        Ok(Self { storage_type, dir })
    }

    pub fn storage_type(&self) -> StorageType {
        self.storage_type
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file backing `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_key(key)))
    }
}

/// Replace every character outside `[A-Za-z0-9_-]` with `_`.
pub fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

impl Storage for FileStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CellError::Storage(format!("cannot read {}: {e}", path.display()))),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key);
        fs::write(&path, value)
            .map_err(|e| CellError::Storage(format!("cannot write {}: {e}", path.display())))
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(key, "nothing to remove");
                Ok(())
            }
            Err(e) => Err(CellError::Storage(format!("cannot remove {}: {e}", path.display()))),
        }
    }
}
