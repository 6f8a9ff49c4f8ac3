//! Dependency Tracker
//!
//! Wires a derived cell to the cells it declares as dependencies. For every
//! dependency the derived cell registers one change handler on it. The
//! handler does not recompute anything; it only forwards "my input changed"
//! to the derived cell, which notifies its own subscribers. Recomputation
//! happens lazily on the next `read()`.
//!
//! Edges are weak from the dependency's side: the handler stored on the
//! dependency holds a `Weak` to the derived cell, so a dependency never keeps
//! its dependents alive.

use std::sync::{Arc, Weak};

use smallvec::SmallVec;
use tracing::debug;

use super::cell::CellInner;
use super::{Cell, CellId, SubscriberId};

/// Anything a derived cell can depend on.
///
/// Implemented by every [`Cell<U>`], which lets one derived cell depend on
/// cells holding different value types.
pub trait Dependency: Send + Sync {
    /// Identity of the underlying cell.
    fn cell_id(&self) -> CellId;

    /// Register a type-erased change handler.
    fn watch(&self, on_change: Arc<dyn Fn() + Send + Sync>) -> SubscriberId;

    /// Remove a handler registered with [`Dependency::watch`].
    fn unwatch(&self, subscription: SubscriberId) -> bool;

    /// An owned handle to the same cell.
    fn share(&self) -> Arc<dyn Dependency>;
}

/// One edge from a derived cell to a dependency.
pub(crate) struct DependencyLink {
    dependency: Arc<dyn Dependency>,
    subscription: SubscriberId,
}

impl DependencyLink {
    pub(crate) fn dependency_id(&self) -> CellId {
        self.dependency.cell_id()
    }
}

/// Edges of one derived cell, in declaration order.
pub(crate) type DependencyLinks = SmallVec<[DependencyLink; 4]>;

/// Subscribe `dependent` to every cell in `deps`.
pub(crate) fn attach<T>(dependent: &Cell<T>, deps: &[&dyn Dependency]) -> DependencyLinks
where
    T: Clone + Send + Sync + 'static,
{
    let dependent_id = dependent.id();
    deps.iter()
        .map(|dep| {
            let weak: Weak<CellInner<T>> = dependent.downgrade();
            let subscription = dep.watch(Arc::new(move || {
                if let Some(cell) = Cell::upgrade(&weak) {
                    cell.on_dependency_changed();
                }
            }));
            debug!(
                cell = %dependent_id,
                dependency = %dep.cell_id(),
                subscriber = %subscription,
                "attached to dependency"
            );
            DependencyLink {
                dependency: dep.share(),
                subscription,
            }
        })
        .collect()
}

/// Remove every handler installed by [`attach`].
pub(crate) fn detach(dependent: CellId, links: DependencyLinks) {
    for link in links {
        if !link.dependency.unwatch(link.subscription) {
            debug!(
                cell = %dependent,
                dependency = %link.dependency.cell_id(),
                "dependency handler was already gone"
            );
        }
    }
}
