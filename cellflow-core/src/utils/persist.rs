//! Persistent cells.
//!
//! A [`PersistentCell`] is a source cell whose writes are mirrored to a
//! [`Storage`] backend as JSON. Mirroring is best effort: a storage failure
//! is logged and the in-memory write still happens.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error};

use crate::error::{CellError, Result};
use crate::reactive::Cell;

use super::storage::Storage;

/// A source cell backed by a storage key.
pub struct PersistentCell<T>
where
    T: Clone + Send + Sync + Serialize + DeserializeOwned + 'static,
{
    key: String,
    cell: Cell<T>,
    storage: Arc<dyn Storage>,
}

/// Create a persistent cell for `key`.
///
/// A stored value is loaded if present and decodable; otherwise `initial`
/// is used and written out.
pub fn with_storage<T>(key: impl Into<String>, initial: T, storage: Arc<dyn Storage>) -> PersistentCell<T>
where
    T: Clone + Send + Sync + Serialize + DeserializeOwned + 'static,
{
    let key = key.into();
    let value = match load(&key, storage.as_ref()) {
        Ok(Some(value)) => {
            debug!(key = %key, "loaded persisted value");
            value
        }
        Ok(None) => {
            mirror(&key, &initial, storage.as_ref());
            debug!(key = %key, "initialised persisted value");
            initial
        }
        Err(err) => {
            error!(key = %key, error = %err, "failed to load persisted value, using initial");
            initial
        }
    };

    PersistentCell {
        key,
        cell: Cell::source(value),
        storage,
    }
}

fn load<T: DeserializeOwned>(key: &str, storage: &dyn Storage) -> Result<Option<T>> {
    match storage.get_item(key)? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

fn mirror<T: Serialize>(key: &str, value: &T, storage: &dyn Storage) {
    let outcome = serde_json::to_string(value)
        .map_err(CellError::from)
        .and_then(|raw| storage.set_item(key, &raw));
    match outcome {
        Ok(()) => debug!(key, "persisted value"),
        Err(err) => error!(key, error = %err, "failed to persist value"),
    }
}

impl<T> PersistentCell<T>
where
    T: Clone + Send + Sync + Serialize + DeserializeOwned + 'static,
{
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The underlying source cell, for subscriptions and derivations.
    ///
    /// Writes made directly on it are not persisted.
    pub fn cell(&self) -> &Cell<T> {
        &self.cell
    }

    pub fn read(&self) -> Result<T> {
        self.cell.read()
    }

    /// Persist then write.
    pub fn write(&self, value: T) -> Result<()> {
        mirror(&self.key, &value, self.storage.as_ref());
        self.cell.write(value)
    }

    pub async fn write_async(&self, value: T) -> Result<()> {
        mirror(&self.key, &value, self.storage.as_ref());
        self.cell.write_async(value).await
    }

    /// Read-modify-write, persisting the result.
    pub fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&T) -> T,
    {
        let mut next = None;
        self.cell.update(|current| {
            let value = f(current);
            next = Some(value.clone());
            value
        })?;
        if let Some(value) = next {
            mirror(&self.key, &value, self.storage.as_ref());
        }
        Ok(())
    }

    /// Remove the stored value. The in-memory value is unchanged.
    pub fn clear(&self) -> Result<()> {
        self.storage.remove_item(&self.key)
    }
}
