//! Cell Implementation
//!
//! A Cell is the fundamental reactive container. It is either a *source*,
//! holding a directly writable value, or *derived*, holding a pure function
//! over other cells.
//!
//! # How Cells Work
//!
//! 1. A write to a source stores the new value under the cell's lock, releases
//!    the lock, then notifies subscribers (or defers the notification into an
//!    active batch scope).
//!
//! 2. A derived cell subscribes to each of its dependencies when it is built.
//!    A dependency change makes it notify its own subscribers; its value is
//!    recomputed only when somebody reads it.
//!
//! 3. Every write notifies, even when the new value equals the old one.
//!
//! # Thread Safety
//!
//! Each cell owns one re-entrant lock guarding its value, subscriber list and
//! dependency links. No lock spans several cells, so a derived read that
//! touches two dependencies is not a snapshot across them. Callbacks always
//! run with the lock released, which lets them read or write any cell,
//! including the one that is notifying.

use std::cell::RefCell;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::ReentrantMutex;
use tracing::{debug, error};

use crate::error::{BoxError, CallbackError, CellError, Result};

use super::batch;
use super::notifier;
use super::subscriber::{Callback, ErrorHandler, Subscriber, SubscriberId};
use super::tracker::{self, Dependency, DependencyLinks};

/// Counter for generating unique cell IDs.
static CELL_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Process-unique, monotonically increasing cell identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId(u64);

impl CellId {
    fn next() -> Self {
        Self(CELL_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    #[cfg(test)]
    pub(crate) fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for CellId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Read access handed to derivation functions.
///
/// `get` reads any cell's current value; reading a derived cell recomputes it.
pub struct Getter {
    _private: (),
}

impl Getter {
    fn new() -> Self {
        Self { _private: () }
    }

    pub fn get<U>(&self, cell: &Cell<U>) -> Result<U>
    where
        U: Clone + Send + Sync + 'static,
    {
        cell.read()
    }
}

type Derivation<T> = Box<dyn Fn(&Getter) -> std::result::Result<T, BoxError> + Send + Sync>;

/// Mutable part of a cell, guarded by the cell's lock.
struct CellState<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Current value for a source, last computed value for a derived cell.
    value: T,
    subscribers: Vec<Subscriber<T>>,
    error_handler: Option<ErrorHandler<T>>,
    dependencies: DependencyLinks,
}

pub(crate) struct CellInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    id: CellId,
    /// `None` for a source cell.
    derivation: Option<Derivation<T>>,
    state: ReentrantMutex<RefCell<CellState<T>>>,
}

impl<T> Drop for CellInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        let links = std::mem::take(&mut self.state.get_mut().get_mut().dependencies);
        if !links.is_empty() {
            tracker::detach(self.id, links);
        }
    }
}

/// A reactive cell holding a value of type `T`.
///
/// Cloning a cell yields another handle to the same cell.
///
/// # Example
///
/// ```rust
/// use cellflow_core::reactive::Cell;
///
/// let celsius = Cell::source(25.0_f64);
/// let fahrenheit = Cell::derived(&[&celsius], {
///     let celsius = celsius.clone();
///     move |get| Ok(get.get(&celsius)? * 9.0 / 5.0 + 32.0)
/// })
/// .unwrap();
///
/// assert_eq!(fahrenheit.read().unwrap(), 77.0);
/// celsius.write(100.0).unwrap();
/// assert_eq!(fahrenheit.read().unwrap(), 212.0);
/// ```
pub struct Cell<T>
where
    T: Clone + Send + Sync + 'static,
{
    inner: Arc<CellInner<T>>,
}

impl<T> Cell<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a source cell with the given initial value.
    pub fn source(value: T) -> Self {
        let id = CellId::next();
        debug!(cell = %id, "created source cell");
        Self::from_parts(id, value, None)
    }

    /// Create a derived cell over `deps`.
    ///
    /// The value is computed once immediately; construction fails with
    /// [`CellError::Compute`] if that first computation fails and with
    /// [`CellError::Configuration`] if `deps` is empty.
    pub fn derived<F>(deps: &[&dyn Dependency], derive: F) -> Result<Self>
    where
        F: Fn(&Getter) -> std::result::Result<T, BoxError> + Send + Sync + 'static,
    {
        if deps.is_empty() {
            return Err(CellError::Configuration(
                "derived cells need at least one dependency".to_string(),
            ));
        }

        let id = CellId::next();
        let initial = derive(&Getter::new()).map_err(|source| {
            error!(cell = %id, error = %source, "initial computation failed");
            CellError::Compute { cell: id, source }
        })?;

        let cell = Self::from_parts(id, initial, Some(Box::new(derive)));
        let links = tracker::attach(&cell, deps);
        cell.with_state(|state| state.dependencies = links);

        debug!(cell = %id, dependencies = deps.len(), "created derived cell");
        Ok(cell)
    }

    fn from_parts(id: CellId, value: T, derivation: Option<Derivation<T>>) -> Self {
        Self {
            inner: Arc::new(CellInner {
                id,
                derivation,
                state: ReentrantMutex::new(RefCell::new(CellState {
                    value,
                    subscribers: Vec::new(),
                    error_handler: None,
                    dependencies: DependencyLinks::new(),
                })),
            }),
        }
    }

    /// Build a single-dependency derived cell applying `f` to this cell's value.
    pub fn map<U, F>(&self, f: F) -> Result<Cell<U>>
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(&T) -> U + Send + Sync + 'static,
    {
        let source = self.clone();
        Cell::derived(&[self], move |get| Ok(f(&get.get(&source)?)))
    }

    /// Get the cell's unique ID.
    pub fn id(&self) -> CellId {
        self.inner.id
    }

    pub fn is_derived(&self) -> bool {
        self.inner.derivation.is_some()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut CellState<T>) -> R) -> R {
        let guard = self.inner.state.lock();
        let mut state = guard.borrow_mut();
        f(&mut state)
    }

    /// Get the current value.
    ///
    /// A derived cell re-runs its derivation against the current values of
    /// its dependencies; a failure is returned as [`CellError::Compute`].
    pub fn read(&self) -> Result<T> {
        let Some(derive) = &self.inner.derivation else {
            return Ok(self.with_state(|state| state.value.clone()));
        };

        let guard = self.inner.state.lock();
        let value = derive(&Getter::new()).map_err(|source| {
            error!(cell = %self.id(), error = %source, "computation failed");
            CellError::Compute {
                cell: self.id(),
                source,
            }
        })?;
        let previous = std::mem::replace(&mut guard.borrow_mut().value, value.clone());
        drop(guard);
        drop(previous);
        Ok(value)
    }

    /// The stored value without recomputation: the current value of a
    /// source, the last computed value of a derived cell.
    pub fn peek(&self) -> T {
        self.with_state(|state| state.value.clone())
    }

    fn ensure_source(&self) -> Result<()> {
        if self.is_derived() {
            return Err(CellError::InvalidOperation {
                cell: self.id(),
                reason: "cannot write to a derived cell",
            });
        }
        Ok(())
    }

    /// Store a new value and notify subscribers on this thread.
    ///
    /// Inside a batch scope the notification is deferred until the scope
    /// closes. Fails with [`CellError::InvalidOperation`] on a derived cell.
    pub fn write(&self, value: T) -> Result<()> {
        self.store(value)?;
        notifier::dispatch(self);
        Ok(())
    }

    /// Replace the value with `f(current)` while holding the cell's lock,
    /// then notify. Concurrent updates never lose increments.
    ///
    /// `f` runs under the lock and must not block on other cells' writers.
    /// It may read this cell, directly or through a derived view.
    pub fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&T) -> T,
    {
        self.apply(f)?;
        notifier::dispatch(self);
        Ok(())
    }

    /// Store a new value and notify subscribers on the shared worker pool,
    /// completing once every callback has run or failed.
    ///
    /// The value is stored even if the pool has been shut down, in which case
    /// [`CellError::ExecutorUnavailable`] is returned. Inside a batch scope the
    /// notification is deferred like [`Cell::write`].
    pub async fn write_async(&self, value: T) -> Result<()> {
        self.store(value)?;
        if batch::is_active() {
            batch::defer(self);
            return Ok(());
        }
        notifier::deliver_async(self.clone()).await
    }

    /// [`Cell::update`] with the notification delivered like
    /// [`Cell::write_async`].
    pub async fn update_async<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&T) -> T,
    {
        self.apply(f)?;
        if batch::is_active() {
            batch::defer(self);
            return Ok(());
        }
        notifier::deliver_async(self.clone()).await
    }

    /// Read-modify-write under the cell's lock. `f` runs on a clone of the
    /// current value with no borrow of the state held, so it can re-enter.
    fn apply<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&T) -> T,
    {
        self.ensure_source()?;
        let guard = self.inner.state.lock();
        let current = guard.borrow().value.clone();
        let next = f(&current);
        let previous = std::mem::replace(&mut guard.borrow_mut().value, next);
        drop(guard);
        debug!(cell = %self.id(), "value updated");
        drop(previous);
        drop(current);
        Ok(())
    }

    fn store(&self, value: T) -> Result<()> {
        self.ensure_source()?;
        let old = self.with_state(|state| std::mem::replace(&mut state.value, value));
        debug!(cell = %self.id(), "value written");
        // Dropped outside the lock.
        drop(old);
        Ok(())
    }

    /// Register a change callback.
    ///
    /// Subscribing does not invoke the callback. Returns the token needed to
    /// unsubscribe.
    pub fn subscribe<F>(&self, callback: F) -> SubscriberId
    where
        F: Fn(&Cell<T>) + Send + Sync + 'static,
    {
        self.insert(Subscriber::plain(Arc::new(callback)))
    }

    /// Register a shared callback. Registering the same `Arc` again returns
    /// the existing token without adding a second subscription.
    pub fn subscribe_shared(&self, callback: Callback<T>) -> SubscriberId {
        let existing = self.with_state(|state| {
            state
                .subscribers
                .iter()
                .find(|s| s.wraps(&callback))
                .map(Subscriber::id)
        });
        match existing {
            Some(id) => {
                debug!(cell = %self.id(), subscriber = %id, "callback already subscribed");
                id
            }
            None => self.insert(Subscriber::plain(callback)),
        }
    }

    /// Register a callback whose `Err` is reported like a panic would be.
    pub fn try_subscribe<F, E>(&self, callback: F) -> SubscriberId
    where
        F: Fn(&Cell<T>) -> std::result::Result<(), E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        self.insert(Subscriber::fallible(callback))
    }

    fn insert(&self, subscriber: Subscriber<T>) -> SubscriberId {
        let id = subscriber.id();
        let total = self.with_state(|state| {
            state.subscribers.push(subscriber);
            state.subscribers.len()
        });
        debug!(cell = %self.id(), subscriber = %id, total, "subscribed");
        id
    }

    /// Remove a subscription. Unknown or already removed tokens are ignored.
    ///
    /// Returns whether a subscription was removed.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self.with_state(|state| {
            let index = state.subscribers.iter().position(|s| s.id() == id)?;
            Some(state.subscribers.remove(index))
        });
        match removed {
            Some(subscriber) => {
                debug!(cell = %self.id(), subscriber = %id, "unsubscribed");
                // Dropped outside the lock: the callback may own the last
                // handle to another cell.
                drop(subscriber);
                true
            }
            None => false,
        }
    }

    /// Install or clear the handler invoked when a subscriber fails.
    ///
    /// Without a handler, failures are logged and otherwise ignored.
    pub fn set_error_handler(&self, handler: Option<ErrorHandler<T>>) {
        let previous = self.with_state(|state| std::mem::replace(&mut state.error_handler, handler));
        debug!(cell = %self.id(), "error handler updated");
        drop(previous);
    }

    /// Install an error handler from a closure.
    pub fn on_error<F>(&self, handler: F)
    where
        F: Fn(&CallbackError, SubscriberId, &Cell<T>) + Send + Sync + 'static,
    {
        self.set_error_handler(Some(Arc::new(handler)));
    }

    /// Detach from all dependencies and drop all subscribers.
    ///
    /// Safe to call more than once. A released derived cell can still be
    /// read but no longer forwards dependency notifications.
    pub fn release(&self) {
        let (links, subscribers) = self.with_state(|state| {
            (
                std::mem::take(&mut state.dependencies),
                std::mem::take(&mut state.subscribers),
            )
        });
        debug!(
            cell = %self.id(),
            dependencies = links.len(),
            subscribers = subscribers.len(),
            "releasing cell"
        );
        tracker::detach(self.id(), links);
        drop(subscribers);
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.with_state(|state| state.subscribers.len())
    }

    /// Number of dependencies this cell is attached to.
    pub fn dependency_count(&self) -> usize {
        self.with_state(|state| state.dependencies.len())
    }

    /// Snapshot of subscribers and error handler, taken under the lock.
    pub(crate) fn snapshot(&self) -> (Vec<Subscriber<T>>, Option<ErrorHandler<T>>) {
        self.with_state(|state| (state.subscribers.clone(), state.error_handler.clone()))
    }

    /// Called by the tracker when one of this cell's dependencies changed.
    pub(crate) fn on_dependency_changed(&self) {
        debug!(cell = %self.id(), "dependency changed");
        notifier::dispatch(self);
    }

    pub(crate) fn downgrade(&self) -> Weak<CellInner<T>> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn upgrade(weak: &Weak<CellInner<T>>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }
}

impl<T> Clone for Cell<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Cell<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cell")
            .field("id", &self.id())
            .field("derived", &self.is_derived())
            .field("value", &self.peek())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

impl<T> Dependency for Cell<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn cell_id(&self) -> CellId {
        self.id()
    }

    fn watch(&self, on_change: Arc<dyn Fn() + Send + Sync>) -> SubscriberId {
        self.subscribe(move |_| on_change())
    }

    fn unwatch(&self, subscription: SubscriberId) -> bool {
        self.unsubscribe(subscription)
    }

    fn share(&self) -> Arc<dyn Dependency> {
        Arc::new(self.clone())
    }
}

impl<T> batch::Pending for Cell<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn cell_id(&self) -> CellId {
        self.id()
    }

    fn notify_now(&self) {
        notifier::deliver_sync(self);
    }
}

/// Create a source cell.
pub fn create_source<T>(value: T) -> Cell<T>
where
    T: Clone + Send + Sync + 'static,
{
    Cell::source(value)
}

/// Create a derived cell. Fails with [`CellError::Configuration`] when
/// `deps` is empty.
pub fn create_derived<T, F>(deps: &[&dyn Dependency], derive: F) -> Result<Cell<T>>
where
    T: Clone + Send + Sync + 'static,
    F: Fn(&Getter) -> std::result::Result<T, BoxError> + Send + Sync + 'static,
{
    Cell::derived(deps, derive)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
