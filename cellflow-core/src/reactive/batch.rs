//! Batch Coordinator
//!
//! A batch scope groups writes so that every affected cell notifies its
//! subscribers at most once, after the scope closes.
//!
//! # Implementation
//!
//! Whether a scope is open is tracked per thread, so unrelated threads
//! batching at the same time do not see each other's scopes. Cells written
//! inside a scope are recorded in a pending set owned by that thread, keyed
//! by cell id and kept in first-write order. The pending sets of all threads
//! live behind one coordinator-wide lock.
//!
//! Nested scopes extend the outermost one; only the outermost exit drains.
//! Draining notifies each pending cell once, in first-write order. While the
//! drain runs the thread still counts as batching, so a derived cell reached
//! from two drained dependencies is queued once and notified once.
//!
//! The scope guard drains on every exit path, including unwinding.

use std::cell::Cell as StdCell;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, OnceLock};
use std::thread::{self, ThreadId};

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::debug;

use super::CellId;

/// A cell waiting for its trailing notification.
pub(crate) trait Pending: Send + Sync {
    fn cell_id(&self) -> CellId;

    /// Deliver the notification synchronously.
    fn notify_now(&self);
}

type PendingSet = IndexMap<CellId, Arc<dyn Pending>>;

thread_local! {
    /// Open scopes on this thread.
    static DEPTH: StdCell<usize> = const { StdCell::new(0) };
    /// Whether this thread is currently draining its pending set.
    static DRAINING: StdCell<bool> = const { StdCell::new(false) };
}

static PENDING: OnceLock<Mutex<HashMap<ThreadId, PendingSet>>> = OnceLock::new();

fn pending() -> &'static Mutex<HashMap<ThreadId, PendingSet>> {
    PENDING.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Whether writes on this thread are currently deferred.
pub fn is_active() -> bool {
    DEPTH.with(StdCell::get) > 0 || DRAINING.with(StdCell::get)
}

/// Record `cell` for a trailing notification. A cell already pending keeps
/// its original position.
pub(crate) fn defer<P>(cell: &P)
where
    P: Pending + Clone + 'static,
{
    let id = cell.cell_id();
    let mut sets = pending().lock();
    let set = sets.entry(thread::current().id()).or_default();
    if !set.contains_key(&id) {
        set.insert(id, Arc::new(cell.clone()));
        debug!(cell = %id, pending = set.len(), "notification deferred");
    }
}

/// Number of cells waiting on this thread.
pub fn pending_count() -> usize {
    pending()
        .lock()
        .get(&thread::current().id())
        .map_or(0, IndexMap::len)
}

/// RAII guard for a batch scope.
///
/// The guard is tied to the thread that opened it.
///
/// # Example
///
/// ```rust
/// use cellflow_core::reactive::{BatchScope, Cell};
///
/// let x = Cell::source(0);
/// {
///     let _scope = BatchScope::enter();
///     x.write(1).unwrap();
///     x.write(2).unwrap();
/// } // subscribers of `x` are notified once here
/// assert_eq!(x.read().unwrap(), 2);
/// ```
pub struct BatchScope {
    _not_send: PhantomData<*const ()>,
}

impl BatchScope {
    /// Open a scope, or extend the one already open on this thread.
    pub fn enter() -> Self {
        let depth = DEPTH.with(|d| {
            d.set(d.get() + 1);
            d.get()
        });
        debug!(depth, "entered batch scope");
        Self {
            _not_send: PhantomData,
        }
    }
}

impl Drop for BatchScope {
    fn drop(&mut self) {
        let depth = DEPTH.with(|d| {
            let depth = d.get().saturating_sub(1);
            d.set(depth);
            depth
        });
        if depth == 0 && !DRAINING.with(StdCell::get) {
            drain();
        }
    }
}

/// Clears the draining flag even if a notification unwinds.
struct DrainGuard;

impl Drop for DrainGuard {
    fn drop(&mut self) {
        DRAINING.with(|d| d.set(false));
        pending().lock().remove(&thread::current().id());
    }
}

fn drain() {
    DRAINING.with(|d| d.set(true));
    let _guard = DrainGuard;
    let thread = thread::current().id();

    let mut delivered = 0usize;
    loop {
        let next = {
            let mut sets = pending().lock();
            sets.get_mut(&thread).and_then(|set| set.shift_remove_index(0))
        };
        let Some((_, cell)) = next else {
            break;
        };
        cell.notify_now();
        delivered += 1;
    }
    debug!(delivered, "batch scope drained");
}

/// Run `f` inside a batch scope and return its result.
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    let _scope = BatchScope::enter();
    f()
}
