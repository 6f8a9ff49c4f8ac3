//! Selections.
//!
//! [`select`] projects part of a cell's value into a read-only cell that
//! notifies only when the projected value actually changes.

use std::sync::{Arc, OnceLock};

use tracing::{debug, warn};

use crate::error::Result;
use crate::reactive::{Cell, SubscriberId};

/// Subscribe to `source` on behalf of `target`, holding `target` weakly.
///
/// Once `target` is gone the subscription removes itself on the next
/// notification.
pub(crate) fn follow<S, U, F>(source: &Cell<S>, target: &Cell<U>, on_change: F) -> SubscriberId
where
    S: Clone + Send + Sync + 'static,
    U: Clone + Send + Sync + 'static,
    F: Fn(&Cell<S>, &Cell<U>) + Send + Sync + 'static,
{
    let target = target.downgrade();
    let registration: Arc<OnceLock<SubscriberId>> = Arc::new(OnceLock::new());
    let id = source.subscribe({
        let registration = Arc::clone(&registration);
        move |source: &Cell<S>| match Cell::upgrade(&target) {
            Some(target) => on_change(source, &target),
            None => {
                if let Some(id) = registration.get() {
                    source.unsubscribe(*id);
                    debug!(cell = %source.id(), subscriber = %id, "follower dropped");
                }
            }
        }
    });
    let _ = registration.set(id);
    id
}

/// Create a read-only cell holding `project(source)`.
///
/// Subscribers of the returned cell are notified only when a change of
/// `source` alters the projected value. Writing it fails with
/// [`crate::CellError::InvalidOperation`].
///
/// ```rust
/// use cellflow_core::reactive::Cell;
/// use cellflow_core::utils::select;
///
/// let reading = Cell::source((21.5_f64, 40_u8));
/// let temperature = select(&reading, |(t, _)| *t).unwrap();
/// assert_eq!(temperature.read().unwrap(), 21.5);
/// ```
pub fn select<S, U, F>(source: &Cell<S>, project: F) -> Result<Cell<U>>
where
    S: Clone + Send + Sync + 'static,
    U: Clone + PartialEq + Send + Sync + 'static,
    F: Fn(&S) -> U + Send + Sync + 'static,
{
    let latest = Cell::source(project(&source.read()?));

    follow(source, &latest, move |source, latest| {
        let value = match source.read() {
            Ok(value) => project(&value),
            Err(err) => {
                warn!(cell = %source.id(), error = %err, "selection source failed to read");
                return;
            }
        };
        if latest.peek() == value {
            return;
        }
        if let Err(err) = latest.write(value) {
            warn!(cell = %latest.id(), error = %err, "selection not updated");
        }
    });

    latest.map(U::clone)
}
