//! Reducer cells.
//!
//! State changes are described by actions and applied by a pure reducer
//! function, so every transition of the cell goes through one place.

use std::marker::PhantomData;
use std::sync::Arc;

use tracing::debug;

use crate::error::Result;
use crate::reactive::Cell;

type Reducer<T, A> = Arc<dyn Fn(&T, A) -> T + Send + Sync>;

/// A source cell updated by dispatching actions through a reducer.
pub struct ReducerCell<T, A>
where
    T: Clone + Send + Sync + 'static,
{
    cell: Cell<T>,
    reducer: Reducer<T, A>,
    _action: PhantomData<fn(A)>,
}

impl<T, A> ReducerCell<T, A>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new<R>(initial: T, reducer: R) -> Self
    where
        R: Fn(&T, A) -> T + Send + Sync + 'static,
    {
        Self {
            cell: Cell::source(initial),
            reducer: Arc::new(reducer),
            _action: PhantomData,
        }
    }

    /// The underlying cell. Writing it directly bypasses the reducer.
    pub fn cell(&self) -> &Cell<T> {
        &self.cell
    }

    pub fn read(&self) -> Result<T> {
        self.cell.read()
    }

    /// Apply `action` atomically and notify subscribers.
    pub fn dispatch(&self, action: A) -> Result<()> {
        debug!(cell = %self.cell.id(), "dispatching action");
        self.cell.update(|state| (self.reducer)(state, action))
    }

    /// Apply `action` atomically and notify subscribers on the worker pool.
    pub async fn dispatch_async(&self, action: A) -> Result<()> {
        debug!(cell = %self.cell.id(), "dispatching action (async)");
        let reducer = Arc::clone(&self.reducer);
        self.cell.update_async(move |state| reducer(state, action)).await
    }
}

impl<T, A> Clone for ReducerCell<T, A>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
            reducer: Arc::clone(&self.reducer),
            _action: PhantomData,
        }
    }
}

/// Create a [`ReducerCell`].
pub fn with_reducer<T, A, R>(initial: T, reducer: R) -> ReducerCell<T, A>
where
    T: Clone + Send + Sync + 'static,
    R: Fn(&T, A) -> T + Send + Sync + 'static,
{
    ReducerCell::new(initial, reducer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[derive(Debug, Clone, Copy)]
    enum Mode {
        Increment(i64),
        Reset,
    }

    fn counter() -> ReducerCell<i64, Mode> {
        with_reducer(0, |state: &i64, action: Mode| match action {
            Mode::Increment(by) => state + by,
            Mode::Reset => 0,
        })
    }

    #[test]
    fn dispatch_applies_reducer() {
        let cell = counter();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = hits.clone();
        cell.cell().subscribe(move |_| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        });

        cell.dispatch(Mode::Increment(5)).unwrap();
        cell.dispatch(Mode::Increment(-2)).unwrap();
        assert_eq!(cell.read().unwrap(), 3);

        cell.dispatch(Mode::Reset).unwrap();
        assert_eq!(cell.read().unwrap(), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn concurrent_dispatch_loses_nothing() {
        let cell = counter();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cell = cell.clone();
                thread::spawn(move || {
                    for _ in 0..250 {
                        cell.dispatch(Mode::Increment(1)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cell.read().unwrap(), 2000);
    }
}
