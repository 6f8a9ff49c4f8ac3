//! Cellflow Core
//!
//! Reactive state cells for long-running device and service processes.
//! It implements:
//!
//! - Source and derived cells with explicit dependency tracking
//! - Change notification, synchronous or on a bounded worker pool
//! - Batch scopes that coalesce notifications
//! - Wrappers for persistence, reset, fallback, reducers and validation
//!
//! # Architecture
//!
//! - `reactive`: cells, dependency tracking, notification, batching, executor
//! - `utils`: wrappers built on the public cell contract
//! - `config`: validated configuration and the process-wide config slot
//! - `logging`: optional `tracing-subscriber` setup
//! - `error`: error taxonomy
//!
//! # Example
//!
//! ```rust
//! use cellflow_core::reactive::{batch, Cell};
//!
//! let count = Cell::source(2);
//! let doubled = count.map(|v| v * 2).unwrap();
//!
//! doubled.subscribe(|cell| {
//!     println!("doubled is now {}", cell.read().unwrap());
//! });
//!
//! count.write(5).unwrap(); // prints "doubled is now 10"
//!
//! batch(|| {
//!     count.write(6).unwrap();
//!     count.write(7).unwrap();
//! }); // prints "doubled is now 14" once
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod reactive;
pub mod utils;

pub use config::CellConfig;
pub use error::{BoxError, CallbackError, CellError, Result};
pub use reactive::{batch, create_derived, create_source, BatchScope, Cell, CellId, SubscriberId};
