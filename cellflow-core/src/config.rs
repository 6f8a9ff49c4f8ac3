//! Configuration
//!
//! [`CellConfig`] carries the knobs consumed by the notifier's shared worker
//! pool and by [`crate::logging::init`]. Values are validated when the config
//! is built or installed, never when it is used.
//!
//! A process-wide slot holds the config the shared pool is created from.
//! The slot is read once, when the pool is lazily started; installing a new
//! config afterwards only takes effect after [`crate::reactive::executor::reset`].
//! The `debug` flag is different: [`set`], [`enable_debug`] and
//! [`disable_debug`] apply it to the logger installed by
//! [`crate::logging::init`] immediately.

use std::sync::OnceLock;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{CellError, Result};
use crate::logging;

/// Smallest accepted worker count.
pub const MIN_WORKERS: usize = 1;

/// Largest accepted worker count.
pub const MAX_WORKERS: usize = 32;

/// Library configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CellConfig {
    /// Emit debug-level diagnostics when logging is installed through
    /// [`crate::logging::init`].
    pub debug: bool,

    /// Number of threads in the shared callback pool.
    pub worker_count: usize,

    /// Name prefix for callback pool threads.
    pub thread_name_prefix: String,

    /// Whether an [`crate::reactive::executor::ExecutorGuard`] shuts the
    /// shared pool down when dropped.
    pub auto_cleanup: bool,
}

impl Default for CellConfig {
    fn default() -> Self {
        Self {
            debug: false,
            worker_count: 4,
            thread_name_prefix: "cell-callback".to_string(),
            auto_cleanup: true,
        }
    }
}

impl CellConfig {
    /// Check every field against its accepted range.
    pub fn validate(&self) -> Result<()> {
        if !(MIN_WORKERS..=MAX_WORKERS).contains(&self.worker_count) {
            return Err(CellError::Configuration(format!(
                "worker_count must be within {MIN_WORKERS}..={MAX_WORKERS}, got {}",
                self.worker_count
            )));
        }
        if self.thread_name_prefix.is_empty() {
            return Err(CellError::Configuration(
                "thread_name_prefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse a JSON document and validate it. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_worker_count(mut self, worker_count: usize) -> Result<Self> {
        self.worker_count = worker_count;
        self.validate()?;
        Ok(self)
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_auto_cleanup(mut self, auto_cleanup: bool) -> Self {
        self.auto_cleanup = auto_cleanup;
        self
    }

    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Result<Self> {
        self.thread_name_prefix = prefix.into();
        self.validate()?;
        Ok(self)
    }
}

static CURRENT: OnceLock<RwLock<CellConfig>> = OnceLock::new();

fn slot() -> &'static RwLock<CellConfig> {
    CURRENT.get_or_init(|| RwLock::new(CellConfig::default()))
}

/// Snapshot of the process-wide configuration.
pub fn current() -> CellConfig {
    slot().read().clone()
}

/// Validate and install a process-wide configuration.
pub fn set(config: CellConfig) -> Result<()> {
    config.validate()?;
    debug!(
        worker_count = config.worker_count,
        auto_cleanup = config.auto_cleanup,
        "installing cell configuration"
    );
    logging::apply(&config)?;
    *slot().write() = config;
    Ok(())
}

/// Restore the default configuration.
pub fn reset() {
    let config = CellConfig::default();
    if let Err(err) = logging::apply(&config) {
        warn!(error = %err, "log filter not restored");
    }
    *slot().write() = config;
}

/// Turn debug logging on for the running process.
pub fn enable_debug() -> Result<()> {
    set(current().with_debug(true))
}

pub fn disable_debug() -> Result<()> {
    set(current().with_debug(false))
}
