//! Validated cells.
//!
//! A [`ValidatedCell`] checks every write against a predicate. Rejected
//! values are either passed through a corrector or refused with
//! [`CellError::Validation`], leaving the stored value untouched and
//! subscribers un-notified.

use std::fmt::Debug;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{CellError, Result};
use crate::reactive::Cell;

pub type Validator<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;
pub type Corrector<T> = Arc<dyn Fn(T) -> T + Send + Sync>;

pub struct ValidatedCell<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    cell: Cell<T>,
    validator: Validator<T>,
    corrector: Option<Corrector<T>>,
}

impl<T> ValidatedCell<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    /// Fails with [`CellError::Validation`] if `initial` is rejected.
    pub fn new<V>(initial: T, validator: V) -> Result<Self>
    where
        V: Fn(&T) -> bool + Send + Sync + 'static,
    {
        validate(initial, Arc::new(validator), None)
    }

    /// Like [`ValidatedCell::new`], storing `corrector(value)` instead of
    /// refusing an invalid write. The initial value is never corrected.
    pub fn with_corrector<V, C>(initial: T, validator: V, corrector: C) -> Result<Self>
    where
        V: Fn(&T) -> bool + Send + Sync + 'static,
        C: Fn(T) -> T + Send + Sync + 'static,
    {
        validate(initial, Arc::new(validator), Some(Arc::new(corrector)))
    }

    pub fn cell(&self) -> &Cell<T> {
        &self.cell
    }

    pub fn read(&self) -> Result<T> {
        self.cell.read()
    }

    fn admit(&self, value: T) -> Result<T> {
        if (self.validator)(&value) {
            return Ok(value);
        }
        match &self.corrector {
            Some(correct) => {
                let corrected = correct(value);
                debug!(cell = %self.cell.id(), value = ?corrected, "corrected invalid value");
                Ok(corrected)
            }
            None => {
                warn!(cell = %self.cell.id(), value = ?value, "rejected invalid value");
                Err(CellError::Validation(format!("value failed validation: {value:?}")))
            }
        }
    }

    pub fn write(&self, value: T) -> Result<()> {
        let value = self.admit(value)?;
        self.cell.write(value)
    }

    pub async fn write_async(&self, value: T) -> Result<()> {
        let value = self.admit(value)?;
        self.cell.write_async(value).await
    }
}

impl<T> Clone for ValidatedCell<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
            validator: Arc::clone(&self.validator),
            corrector: self.corrector.clone(),
        }
    }
}

/// Create a [`ValidatedCell`] from shared validator and corrector functions.
pub fn validate<T>(initial: T, validator: Validator<T>, corrector: Option<Corrector<T>>) -> Result<ValidatedCell<T>>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    if !validator(&initial) {
        return Err(CellError::Validation(format!(
            "initial value failed validation: {initial:?}"
        )));
    }
    Ok(ValidatedCell {
        cell: Cell::source(initial),
        validator,
        corrector,
    })
}

/// Validator accepting `min <= value <= max`.
pub fn in_range<T>(min: T, max: T) -> impl Fn(&T) -> bool + Send + Sync + 'static
where
    T: PartialOrd + Send + Sync + 'static,
{
    move |value: &T| *value >= min && *value <= max
}

/// Corrector clamping into `[min, max]`.
pub fn clamp<T>(min: T, max: T) -> impl Fn(T) -> T + Send + Sync + 'static
where
    T: PartialOrd + Clone + Send + Sync + 'static,
{
    move |value: T| {
        if value < min {
            min.clone()
        } else if value > max {
            max.clone()
        } else {
            value
        }
    }
}
