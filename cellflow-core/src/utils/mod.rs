//! Utilities
//!
//! Wrappers built on the public cell API:
//!
//! - [`storage`] / [`persist`]: cells mirrored to a key/value store
//! - [`reset`]: a value cell plus a reset trigger
//! - [`fallback`]: derived cells that never fail to read
//! - [`reducer`]: action-driven state transitions
//! - [`validate`]: write-time validation and correction
//! - [`select`]: projections that notify only on change
//! - [`loadable`]: loading / data / error states over a source

pub mod fallback;
pub mod loadable;
pub mod persist;
pub mod reducer;
pub mod reset;
pub mod select;
pub mod storage;
pub mod validate;

pub use fallback::with_fallback;
pub use loadable::{loadable, Loadable, LoadableCell};
pub use persist::{with_storage, PersistentCell};
pub use reducer::{with_reducer, ReducerCell};
pub use reset::with_reset;
pub use select::select;
pub use storage::{FileStorage, MemoryStorage, Storage, StorageType};
pub use validate::{clamp, in_range, ValidatedCell};
