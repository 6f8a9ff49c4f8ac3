//! Loadable cells.
//!
//! A [`LoadableCell`] mirrors a source cell as [`Loadable::HasData`] and can
//! be switched to [`Loadable::Loading`] or [`Loadable::HasError`] while a
//! new value is being fetched.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{BoxError, Result};
use crate::reactive::Cell;

use super::select::follow;

/// State of a value that may still be loading.
#[derive(Debug, Clone)]
pub enum Loadable<T> {
    Loading,
    HasData(T),
    HasError(Arc<dyn std::error::Error + Send + Sync>),
}

impl<T> Loadable<T> {
    pub fn is_loading(&self) -> bool {
        matches!(self, Loadable::Loading)
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            Loadable::HasData(data) => Some(data),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&(dyn std::error::Error + Send + Sync)> {
        match self {
            Loadable::HasError(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

/// A [`Loadable`] view over a source cell.
///
/// Every change of the source replaces the state with `HasData`; a source
/// read failure becomes `HasError`.
pub struct LoadableCell<T>
where
    T: Clone + Send + Sync + 'static,
{
    cell: Cell<Loadable<T>>,
}

/// Create a [`LoadableCell`] following `source`.
pub fn loadable<T>(source: &Cell<T>) -> Result<LoadableCell<T>>
where
    T: Clone + Send + Sync + 'static,
{
    let cell = Cell::source(Loadable::HasData(source.read()?));
    follow(source, &cell, |source, cell| {
        let state = match source.read() {
            Ok(value) => Loadable::HasData(value),
            Err(err) => Loadable::HasError(Arc::new(err)),
        };
        if let Err(err) = cell.write(state) {
            warn!(cell = %cell.id(), error = %err, "loadable state not updated");
        }
    });
    Ok(LoadableCell { cell })
}

impl<T> LoadableCell<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// The state cell, for subscriptions and derivations.
    pub fn cell(&self) -> &Cell<Loadable<T>> {
        &self.cell
    }

    pub fn read(&self) -> Result<Loadable<T>> {
        self.cell.read()
    }

    pub fn set_loading(&self) -> Result<()> {
        debug!(cell = %self.cell.id(), "loading");
        self.cell.write(Loadable::Loading)
    }

    pub fn set_error(&self, err: impl Into<BoxError>) -> Result<()> {
        let err: BoxError = err.into();
        debug!(cell = %self.cell.id(), error = %err, "load failed");
        self.cell.write(Loadable::HasError(Arc::from(err)))
    }

    pub fn set_data(&self, value: T) -> Result<()> {
        self.cell.write(Loadable::HasData(value))
    }
}
