//! Subscriber types for the reactive system.
//!
//! A subscriber is a callback registered on a cell. Every registration gets a
//! [`SubscriberId`] token, which is what [`Cell::unsubscribe`] takes; closures
//! themselves are never compared.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{BoxError, CallbackError};

use super::Cell;

static NEXT_SUBSCRIBER: AtomicU64 = AtomicU64::new(1);

/// Token for one registration on one cell, returned by `subscribe` and
/// taken by `unsubscribe`. Tokens are never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    pub(crate) fn issue() -> Self {
        Self(NEXT_SUBSCRIBER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

/// Shared change callback. Registering the same `Arc` twice through
/// [`Cell::subscribe_shared`] yields a single subscription.
pub type Callback<T> = Arc<dyn Fn(&Cell<T>) + Send + Sync>;

/// Per-cell handler for callback failures: `(error, failing subscriber, cell)`.
pub type ErrorHandler<T> = Arc<dyn Fn(&CallbackError, SubscriberId, &Cell<T>) + Send + Sync>;

type FallibleCallback<T> = Arc<dyn Fn(&Cell<T>) -> Result<(), BoxError> + Send + Sync>;

#[derive(Clone)]
enum Handler<T>
where
    T: Clone + Send + Sync + 'static,
{
    Plain(Callback<T>),
    Fallible(FallibleCallback<T>),
}

/// A registered callback together with its token.
pub(crate) struct Subscriber<T>
where
    T: Clone + Send + Sync + 'static,
{
    id: SubscriberId,
    handler: Handler<T>,
}

impl<T> Subscriber<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn plain(callback: Callback<T>) -> Self {
        Self {
            id: SubscriberId::issue(),
            handler: Handler::Plain(callback),
        }
    }

    pub(crate) fn fallible<F, E>(callback: F) -> Self
    where
        F: Fn(&Cell<T>) -> Result<(), E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        let callback: FallibleCallback<T> = Arc::new(move |cell: &Cell<T>| callback(cell).map_err(Into::into));
        Self {
            id: SubscriberId::issue(),
            handler: Handler::Fallible(callback),
        }
    }

    pub(crate) fn id(&self) -> SubscriberId {
        self.id
    }

    /// Whether this subscription wraps exactly the given shared callback.
    pub(crate) fn wraps(&self, callback: &Callback<T>) -> bool {
        match &self.handler {
            Handler::Plain(existing) => {
                Arc::as_ptr(existing) as *const () == Arc::as_ptr(callback) as *const ()
            }
            Handler::Fallible(_) => false,
        }
    }

    /// Run the callback, converting an `Err` or a panic into a [`CallbackError`].
    pub(crate) fn invoke(&self, cell: &Cell<T>) -> Result<(), CallbackError> {
        let outcome = catch_unwind(AssertUnwindSafe(|| match &self.handler {
            Handler::Plain(callback) => {
                callback(cell);
                Ok(())
            }
            Handler::Fallible(callback) => callback(cell),
        }));

        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(CallbackError::Failed(err.to_string())),
            Err(payload) => Err(CallbackError::from_panic(payload)),
        }
    }
}

impl<T> Clone for Subscriber<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            handler: self.handler.clone(),
        }
    }
}
