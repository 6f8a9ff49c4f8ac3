//! Derived cells with a fallback value.

use tracing::warn;

use crate::error::{BoxError, Result};
use crate::reactive::{Cell, Dependency, Getter};

/// Create a derived cell whose reads never fail.
///
/// When `derive` returns an error the failure is logged at `warn` and
/// `fallback` is produced instead. Useful for readings that may be missing.
///
/// ```rust
/// use cellflow_core::reactive::Cell;
/// use cellflow_core::utils::with_fallback;
///
/// let raw: Cell<Option<f64>> = Cell::source(None);
/// let reading = with_fallback(&[&raw], {
///     let raw = raw.clone();
///     move |get| get.get(&raw)?.ok_or_else(|| "sensor disconnected".into())
/// }, 0.0)
/// .unwrap();
///
/// assert_eq!(reading.read().unwrap(), 0.0);
/// raw.write(Some(21.5)).unwrap();
/// assert_eq!(reading.read().unwrap(), 21.5);
/// ```
pub fn with_fallback<T, F>(deps: &[&dyn Dependency], derive: F, fallback: T) -> Result<Cell<T>>
where
    T: Clone + Send + Sync + 'static,
    F: Fn(&Getter) -> std::result::Result<T, BoxError> + Send + Sync + 'static,
{
    Cell::derived(deps, move |get| match derive(get) {
        Ok(value) => Ok(value),
        Err(err) => {
            warn!(error = %err, "derivation failed, using fallback");
            Ok(fallback.clone())
        }
    })
}
