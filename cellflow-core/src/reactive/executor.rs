//! Callback Executor
//!
//! The bounded worker pool behind [`Cell::write_async`](super::Cell::write_async).
//!
//! # How It Works
//!
//! A [`WorkerPool`] owns a dedicated tokio runtime whose blocking pool is
//! capped at the configured worker count. Callbacks are plain synchronous
//! closures, so each one is dispatched with `spawn_blocking`. The returned
//! join handles are ordinary futures and can be awaited from any executor.
//!
//! The pool counts jobs it has accepted but not yet finished. Shutting it
//! down stops new submissions first, then waits for that count to reach
//! zero, and only then tears the runtime down. In-flight callbacks are never
//! cancelled.
//!
//! # Process-wide pool
//!
//! One shared pool is created lazily from [`crate::config::current`] on first
//! use. Its lifecycle is explicit:
//!
//! - [`shared`] returns the running pool, starting it if needed.
//! - [`shutdown`] drains and stops a started pool; afterwards [`shared`]
//!   fails with [`CellError::ExecutorUnavailable`]. Shutting down a pool that
//!   was never started changes nothing.
//! - [`reset`] shuts down and allows a fresh pool to be started.
//! - [`guard`] returns an [`ExecutorGuard`] that shuts the pool down when
//!   dropped if `auto_cleanup` is enabled. Hold it in `main`.

use std::sync::{Arc, OnceLock};

use parking_lot::{Condvar, Mutex};
use tokio::runtime::{Builder, Runtime};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::{self, CellConfig};
use crate::error::{CellError, Result};

/// Jobs accepted but not yet finished.
#[derive(Default)]
struct InFlight {
    count: Mutex<usize>,
    idle: Condvar,
}

impl InFlight {
    fn wait_idle(&self) {
        let mut count = self.count.lock();
        while *count > 0 {
            self.idle.wait(&mut count);
        }
    }
}

/// Decrements the in-flight count when the job finishes or is dropped unrun.
struct Ticket(Arc<InFlight>);

impl Ticket {
    fn issue(in_flight: &Arc<InFlight>) -> Self {
        *in_flight.count.lock() += 1;
        Self(Arc::clone(in_flight))
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        let mut count = self.0.count.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.0.idle.notify_all();
        }
    }
}

/// A bounded pool running subscriber callbacks.
pub struct WorkerPool {
    worker_count: usize,
    runtime: Mutex<Option<Runtime>>,
    in_flight: Arc<InFlight>,
}

impl WorkerPool {
    /// Start a pool from an explicit configuration.
    pub fn new(config: &CellConfig) -> Result<Self> {
        config.validate()?;

        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(config.worker_count)
            .thread_name(config.thread_name_prefix.clone())
            .build()
            .map_err(|e| CellError::Configuration(format!("failed to start worker pool: {e}")))?;

        debug!(workers = config.worker_count, "worker pool started");
        Ok(Self {
            worker_count: config.worker_count,
            runtime: Mutex::new(Some(runtime)),
            in_flight: Arc::new(InFlight::default()),
        })
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Submit a job. Fails with [`CellError::ExecutorUnavailable`] once the
    /// pool has been shut down.
    pub fn spawn<F>(&self, job: F) -> Result<JoinHandle<()>>
    where
        F: FnOnce() + Send + 'static,
    {
        let runtime = self.runtime.lock();
        let Some(runtime) = runtime.as_ref() else {
            return Err(CellError::ExecutorUnavailable);
        };
        let ticket = Ticket::issue(&self.in_flight);
        Ok(runtime.spawn_blocking(move || {
            let _ticket = ticket;
            job();
        }))
    }

    /// Jobs accepted but not yet finished.
    pub fn in_flight(&self) -> usize {
        *self.in_flight.count.lock()
    }

    pub fn is_shut_down(&self) -> bool {
        self.runtime.lock().is_none()
    }

    /// Stop accepting jobs, wait for accepted ones to finish, release the
    /// threads. Calling it again is a no-op.
    ///
    /// Must not be called from one of the pool's own callbacks.
    pub fn shutdown(&self) {
        let Some(runtime) = self.runtime.lock().take() else {
            return;
        };
        debug!(in_flight = self.in_flight(), "worker pool shutting down");
        self.in_flight.wait_idle();
        runtime.shutdown_background();
        debug!("worker pool stopped");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.get_mut().take() {
            runtime.shutdown_background();
        }
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("worker_count", &self.worker_count)
            .field("in_flight", &self.in_flight())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Process-wide pool
// ----------------------------------------------------------------------------

enum PoolState {
    /// Not started yet, or reset.
    Idle,
    Running(Arc<WorkerPool>),
    ShutDown,
}

static SHARED: OnceLock<Mutex<PoolState>> = OnceLock::new();

fn state() -> &'static Mutex<PoolState> {
    SHARED.get_or_init(|| Mutex::new(PoolState::Idle))
}

/// The shared pool, started from the current configuration on first use.
pub fn shared() -> Result<Arc<WorkerPool>> {
    let mut state = state().lock();
    match &*state {
        PoolState::Running(pool) => Ok(Arc::clone(pool)),
        PoolState::ShutDown => Err(CellError::ExecutorUnavailable),
        PoolState::Idle => {
            let pool = Arc::new(WorkerPool::new(&config::current())?);
            *state = PoolState::Running(Arc::clone(&pool));
            Ok(pool)
        }
    }
}

/// Whether the shared pool is currently started.
pub fn is_running() -> bool {
    matches!(&*state().lock(), PoolState::Running(_))
}

/// Shut the shared pool down, waiting for in-flight callbacks.
///
/// Later async dispatch fails with [`CellError::ExecutorUnavailable`] until
/// [`reset`] is called. If no pool was ever started this is a no-op and a
/// later dispatch still starts one.
pub fn shutdown() {
    let mut state = state().lock();
    let pool = match std::mem::replace(&mut *state, PoolState::Idle) {
        PoolState::Running(pool) => pool,
        PoolState::ShutDown => {
            *state = PoolState::ShutDown;
            return;
        }
        PoolState::Idle => {
            debug!("no shared worker pool to shut down");
            return;
        }
    };
    *state = PoolState::ShutDown;
    drop(state);
    pool.shutdown();
}

/// Shut down the shared pool and allow a new one to be started.
pub fn reset() {
    shutdown();
    *state().lock() = PoolState::Idle;
    debug!("shared worker pool reset");
}

/// Shuts the shared pool down on drop when `auto_cleanup` was enabled at
/// the time the guard was created.
#[must_use = "the pool is shut down when the guard is dropped"]
pub struct ExecutorGuard {
    auto_cleanup: bool,
}

/// Create an [`ExecutorGuard`] from the current configuration.
pub fn guard() -> ExecutorGuard {
    let auto_cleanup = config::current().auto_cleanup;
    if !auto_cleanup {
        warn!("auto_cleanup disabled; call executor::shutdown() before exit");
    }
    ExecutorGuard { auto_cleanup }
}

impl Drop for ExecutorGuard {
    fn drop(&mut self) {
        if self.auto_cleanup {
            shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn small_pool() -> WorkerPool {
        let config = CellConfig::default().with_worker_count(2).unwrap();
        WorkerPool::new(&config).unwrap()
    }

    #[test]
    fn rejects_invalid_config() {
        let config = CellConfig {
            worker_count: 0,
            ..CellConfig::default()
        };
        assert!(matches!(WorkerPool::new(&config), Err(CellError::Configuration(_))));
    }

    #[test]
    fn shutdown_waits_for_in_flight_jobs() {
        let pool = small_pool();
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..4 {
            let done = done.clone();
            pool.spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                done.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }

        pool.shutdown();
        assert_eq!(done.load(Ordering::SeqCst), 4);
        assert_eq!(pool.in_flight(), 0);
        assert!(pool.is_shut_down());
    }

    #[tokio::test]
    async fn concurrency_is_capped_at_worker_count() {
        let pool = small_pool();
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let (active, peak) = (active.clone(), peak.clone());
                pool.spawn(move || {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(30));
                    active.fetch_sub(1, Ordering::SeqCst);
                })
                .unwrap()
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert!(peak.load(Ordering::SeqCst) >= 1);
        pool.shutdown();
    }

    #[test]
    fn spawn_after_shutdown_fails() {
        let pool = small_pool();
        pool.shutdown();
        pool.shutdown();
        assert!(matches!(pool.spawn(|| {}), Err(CellError::ExecutorUnavailable)));
    }

    #[tokio::test]
    async fn join_handles_resolve() {
        let pool = small_pool();
        let hits = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let hits = hits.clone();
                pool.spawn(move || {
                    hits.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap()
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(hits.load(Ordering::SeqCst), 8);
        pool.shutdown();
    }
}
