//! Notifier
//!
//! Delivers a change event to every subscriber of a cell.
//!
//! Both paths work on a snapshot of the subscriber list taken under the
//! cell's lock; the lock is released before any callback runs. A failing
//! callback is logged, handed to the cell's error handler if one is set, and
//! never stops delivery to the remaining subscribers.
//!
//! - [`deliver_sync`] runs callbacks on the calling thread in subscription
//!   order.
//! - [`deliver_async`] fans callbacks out to the shared worker pool and
//!   resolves once all of them have finished.

use std::panic::{catch_unwind, AssertUnwindSafe};

use futures_util::future::join_all;
use tracing::{debug, error, warn};

use crate::error::{CallbackError, Result};

use super::batch;
use super::executor;
use super::subscriber::{ErrorHandler, Subscriber};
use super::Cell;

/// Notify now, or defer into the calling thread's batch scope if one is open.
pub(crate) fn dispatch<T>(cell: &Cell<T>)
where
    T: Clone + Send + Sync + 'static,
{
    if batch::is_active() {
        batch::defer(cell);
    } else {
        deliver_sync(cell);
    }
}

/// Invoke every subscriber on the calling thread.
pub(crate) fn deliver_sync<T>(cell: &Cell<T>)
where
    T: Clone + Send + Sync + 'static,
{
    let (subscribers, handler) = cell.snapshot();
    if subscribers.is_empty() {
        return;
    }

    debug!(cell = %cell.id(), subscribers = subscribers.len(), "notifying (sync)");
    for subscriber in &subscribers {
        invoke(cell, subscriber, handler.as_ref());
    }
}

/// Invoke every subscriber on the shared worker pool and wait for all of them.
///
/// Fails with [`crate::CellError::ExecutorUnavailable`] if the pool has been
/// shut down, whether or not there are subscribers. Callbacks already handed to the pool still run to completion.
pub(crate) async fn deliver_async<T>(cell: Cell<T>) -> Result<()>
where
    T: Clone + Send + Sync + 'static,
{
    let pool = executor::shared()?;
    let (subscribers, handler) = cell.snapshot();
    if subscribers.is_empty() {
        return Ok(());
    }

    debug!(cell = %cell.id(), subscribers = subscribers.len(), "notifying (async)");

    let mut pending = Vec::with_capacity(subscribers.len());
    let mut outcome = Ok(());
    for subscriber in subscribers {
        let cell = cell.clone();
        let handler = handler.clone();
        match pool.spawn(move || invoke(&cell, &subscriber, handler.as_ref())) {
            Ok(handle) => pending.push(handle),
            Err(err) => {
                outcome = Err(err);
                break;
            }
        }
    }

    for joined in join_all(pending).await {
        if let Err(err) = joined {
            error!(cell = %cell.id(), error = %err, "callback task did not complete");
        }
    }
    outcome
}

/// Run one callback with failure isolation.
fn invoke<T>(cell: &Cell<T>, subscriber: &Subscriber<T>, handler: Option<&ErrorHandler<T>>)
where
    T: Clone + Send + Sync + 'static,
{
    let Err(err) = subscriber.invoke(cell) else {
        return;
    };

    error!(
        cell = %cell.id(),
        subscriber = %subscriber.id(),
        error = %err,
        "subscriber callback failed"
    );

    match handler {
        Some(handler) => report(cell, subscriber, handler, &err),
        None => warn!(cell = %cell.id(), "no error handler set, callback failure ignored"),
    }
}

fn report<T>(cell: &Cell<T>, subscriber: &Subscriber<T>, handler: &ErrorHandler<T>, err: &CallbackError)
where
    T: Clone + Send + Sync + 'static,
{
    let outcome = catch_unwind(AssertUnwindSafe(|| handler(err, subscriber.id(), cell)));
    if let Err(payload) = outcome {
        let handler_err = CallbackError::from_panic(payload);
        error!(
            cell = %cell.id(),
            error = %handler_err,
            original = %err,
            "error handler failed"
        );
    }
}
