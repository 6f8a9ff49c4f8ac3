//! Reactive Core
//!
//! This module implements cells, the dependency tracker, the notifier and
//! the batch coordinator.
//!
//! # Concepts
//!
//! ## Cells
//!
//! A [`Cell`] is either a *source* holding a writable value or *derived*,
//! computing its value from other cells. Derived cells declare their
//! dependencies explicitly when they are built.
//!
//! ## Notification
//!
//! Writing a source notifies its subscribers. A derived cell is itself a
//! subscriber of each dependency and forwards the change to its own
//! subscribers. Values are pushed as "changed" signals only; derived values
//! are pulled, recomputed on `read()`.
//!
//! ## Batching
//!
//! Inside a [`BatchScope`] writes take effect immediately but notifications
//! are coalesced: every touched cell notifies once when the outermost scope
//! closes.
//!
//! ## Async delivery
//!
//! [`Cell::write_async`] runs callbacks on a shared bounded pool (see
//! [`executor`]) and resolves when all of them have finished.

mod cell;
mod subscriber;
mod tracker;
mod notifier;
pub mod batch;
pub mod executor;

pub use cell::{create_derived, create_source, Cell, CellId, Getter};
pub use subscriber::{Callback, ErrorHandler, SubscriberId};
pub use tracker::Dependency;
pub use batch::{batch, BatchScope};
pub use executor::{ExecutorGuard, WorkerPool};
