//! Logging setup.
//!
//! The library only emits `tracing` events. Applications that do not install
//! their own subscriber can call [`init`] to get a formatted stderr logger
//! whose verbosity follows [`CellConfig::debug`]. `RUST_LOG` wins at startup
//! when it is set.
//!
//! The filter installed by [`init`] sits behind a reload handle, so
//! [`crate::config::set`] and [`crate::config::enable_debug`] change the
//! verbosity of a running process. Without [`init`] those calls only update
//! the config.

use std::sync::OnceLock;

use tracing::debug;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

use crate::config::CellConfig;
use crate::error::{CellError, Result};

static FILTER: OnceLock<reload::Handle<EnvFilter, Registry>> = OnceLock::new();

/// Filter directive used when `RUST_LOG` is not set.
pub fn default_directive(config: &CellConfig) -> &'static str {
    if config.debug {
        "cellflow_core=debug"
    } else {
        "cellflow_core=warn"
    }
}

/// Install a global `tracing` subscriber.
///
/// Fails with [`CellError::Configuration`] if a global subscriber is already
/// installed.
pub fn init(config: &CellConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(config)));
    let (filter, handle) = reload::Layer::new(filter);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init()
        .map_err(|e| CellError::Configuration(format!("logging already initialised: {e}")))?;

    let _ = FILTER.set(handle);
    Ok(())
}

/// Re-apply the verbosity of `config` to the subscriber installed by
/// [`init`]. Does nothing if [`init`] has not succeeded.
pub fn apply(config: &CellConfig) -> Result<()> {
    let Some(handle) = FILTER.get() else {
        return Ok(());
    };
    let directive = default_directive(config);
    handle
        .reload(EnvFilter::new(directive))
        .map_err(|e| CellError::Configuration(format!("cannot change log filter: {e}")))?;
    debug!(directive, "log filter changed");
    Ok(())
}

/// The active filter, if [`init`] installed one.
pub fn current_filter() -> Option<String> {
    FILTER
        .get()
        .and_then(|handle| handle.with_current(|filter| filter.to_string()).ok())
}
