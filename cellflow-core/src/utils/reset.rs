//! Resettable cells.

use tracing::{debug, warn};

use crate::reactive::Cell;

/// Create a value cell together with a reset trigger.
///
/// Writing anything to the trigger writes `initial` back into the value
/// cell, notifying its subscribers. The trigger only holds a weak reference
/// to the value cell.
///
/// ```rust
/// use cellflow_core::utils::with_reset;
///
/// let (setpoint, reset) = with_reset(20.0_f64);
/// setpoint.write(25.5).unwrap();
/// reset.write(()).unwrap();
/// assert_eq!(setpoint.read().unwrap(), 20.0);
/// ```
pub fn with_reset<T>(initial: T) -> (Cell<T>, Cell<()>)
where
    T: Clone + Send + Sync + 'static,
{
    let value = Cell::source(initial.clone());
    let trigger = Cell::source(());

    let target = value.downgrade();
    trigger.subscribe(move |_| {
        let Some(value) = Cell::upgrade(&target) else {
            return;
        };
        match value.write(initial.clone()) {
            Ok(()) => debug!(cell = %value.id(), "reset to initial value"),
            Err(err) => warn!(cell = %value.id(), error = %err, "reset failed"),
        }
    });

    (value, trigger)
}
