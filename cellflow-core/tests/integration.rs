//! Integration Tests for Cells
//!
//! These tests drive sources, derived cells, batching and async delivery
//! through the public API only.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use cellflow_core::reactive::{batch, executor, BatchScope, Cell};
use cellflow_core::utils::{in_range, with_fallback, with_reducer, with_reset, with_storage, MemoryStorage, ValidatedCell};
use cellflow_core::{CallbackError, CellConfig, CellError};

/// Serializes tests that touch the shared worker pool.
static POOL_LOCK: Mutex<()> = Mutex::new(());

fn record<T>(cell: &Cell<T>) -> Arc<Mutex<Vec<T>>>
where
    T: Clone + Send + Sync + 'static,
{
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    cell.subscribe(move |c: &Cell<T>| {
        if let Ok(value) = c.read() {
            sink.lock().push(value);
        }
    });
    seen
}

fn counter(cell: &Cell<impl Clone + Send + Sync + 'static>) -> Arc<AtomicUsize> {
    let hits = Arc::new(AtomicUsize::new(0));
    let sink = hits.clone();
    cell.subscribe(move |_| {
        sink.fetch_add(1, Ordering::SeqCst);
    });
    hits
}

// ----------------------------------------------------------------------------
// Sources and derived cells
// ----------------------------------------------------------------------------

#[test]
fn derived_follows_source() {
    let a = Cell::source(2);
    let d = Cell::derived(&[&a], {
        let a = a.clone();
        move |get| Ok(get.get(&a)? * 10)
    })
    .unwrap();

    assert_eq!(d.read().unwrap(), 20);
    a.write(7).unwrap();
    assert_eq!(d.read().unwrap(), 70);
}

#[test]
fn chained_derivations() {
    let a = Cell::source(1);
    let b = a.map(|v| v * 2).unwrap();
    let c = b.map(|v| v * 2).unwrap();
    let seen = record(&c);

    a.write(3).unwrap();
    assert_eq!(b.read().unwrap(), 6);
    assert_eq!(c.read().unwrap(), 12);

    a.write(5).unwrap();
    assert_eq!(c.read().unwrap(), 20);
    assert_eq!(*seen.lock(), vec![12, 20]);
}

#[test]
fn derived_over_two_sources_sees_latest_values() {
    let width = Cell::source(3);
    let height = Cell::source(4);
    let area = Cell::derived(&[&width, &height], {
        let (w, h) = (width.clone(), height.clone());
        move |get| Ok(get.get(&w)? * get.get(&h)?)
    })
    .unwrap();
    let seen = record(&area);

    width.write(5).unwrap();
    height.write(6).unwrap();
    assert_eq!(*seen.lock(), vec![24, 30]);
}

#[test]
fn misuse_is_reported() {
    let err = Cell::<u8>::derived(&[], |_| Ok(0)).unwrap_err();
    assert!(matches!(err, CellError::Configuration(_)));

    let a = Cell::source(1);
    let d = a.map(|v| v * 2).unwrap();
    assert!(matches!(d.write(1), Err(CellError::InvalidOperation { .. })));
    assert_eq!(d.read().unwrap(), 2);
}

// ----------------------------------------------------------------------------
// Subscriptions
// ----------------------------------------------------------------------------

#[test]
fn subscription_lifecycle() {
    let cell = Cell::source(0);
    let hits = Arc::new(AtomicUsize::new(0));
    let sink = hits.clone();
    let id = cell.subscribe(move |_| {
        sink.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    cell.write(1).unwrap();
    cell.write(1).unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 2);

    assert!(cell.unsubscribe(id));
    assert!(!cell.unsubscribe(id));
    cell.write(2).unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[test]
fn failing_subscriber_is_isolated() {
    let cell = Cell::source(0);
    let failures = Arc::new(Mutex::new(Vec::new()));
    let sink = failures.clone();
    cell.on_error(move |err, _, _| sink.lock().push(err.clone()));

    let before = record(&cell);
    cell.subscribe(|_| panic!("sensor offline"));
    let after = record(&cell);

    assert!(cell.write(3).is_ok());
    assert_eq!(*before.lock(), vec![3]);
    assert_eq!(*after.lock(), vec![3]);
    assert_eq!(
        *failures.lock(),
        vec![CallbackError::Panicked("sensor offline".to_string())]
    );
}

// ----------------------------------------------------------------------------
// Batching
// ----------------------------------------------------------------------------

#[test]
fn batch_coalesces_to_final_value() {
    let x = Cell::source(0);
    let seen = record(&x);

    batch(|| {
        x.write(1).unwrap();
        x.write(2).unwrap();
        x.write(3).unwrap();
        assert!(seen.lock().is_empty());
    });

    assert_eq!(*seen.lock(), vec![3]);
}

#[test]
fn batch_notifies_derived_once() {
    let a = Cell::source(1);
    let b = Cell::source(1);
    let sum = Cell::derived(&[&a, &b], {
        let (a, b) = (a.clone(), b.clone());
        move |get| Ok(get.get(&a)? + get.get(&b)?)
    })
    .unwrap();
    let seen = record(&sum);

    {
        let _outer = BatchScope::enter();
        a.write(10).unwrap();
        {
            let _inner = BatchScope::enter();
            b.write(20).unwrap();
        }
        assert!(seen.lock().is_empty());
    }

    assert_eq!(*seen.lock(), vec![30]);
}

#[test]
fn batches_on_other_threads_are_independent() {
    let shared = Cell::source(0);
    let hits = counter(&shared);

    let _scope = BatchScope::enter();
    let writer = shared.clone();
    thread::spawn(move || writer.write(1).unwrap()).join().unwrap();

    // The other thread was not batching.
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

// ----------------------------------------------------------------------------
// Concurrency
// ----------------------------------------------------------------------------

#[test]
fn concurrent_updates_are_exact() {
    const THREADS: usize = 8;
    const INCREMENTS: usize = 500;

    let cell = Cell::source(0_usize);
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let cell = cell.clone();
            thread::spawn(move || {
                for _ in 0..INCREMENTS {
                    cell.update(|v| v + 1).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(cell.read().unwrap(), THREADS * INCREMENTS);
}

#[test]
fn concurrent_read_modify_write_with_external_lock() {
    let cell = Cell::source(0_usize);
    let lock = Arc::new(Mutex::new(()));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let (cell, lock) = (cell.clone(), lock.clone());
            thread::spawn(move || {
                for _ in 0..250 {
                    let _guard = lock.lock();
                    let current = cell.read().unwrap();
                    cell.write(current + 1).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(cell.read().unwrap(), 1000);
}

#[test]
fn concurrent_writers_all_notify() {
    let cell = Cell::source(0);
    let hits = counter(&cell);
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let cell = cell.clone();
            thread::spawn(move || {
                for j in 0..100 {
                    cell.write(i * 100 + j).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(hits.load(Ordering::SeqCst), 400);
}

// ----------------------------------------------------------------------------
// Async delivery
// ----------------------------------------------------------------------------

#[tokio::test]
async fn write_async_waits_for_callbacks() {
    let _pool = POOL_LOCK.lock();
    executor::reset();

    let cell = Cell::source(0);
    let done = Arc::new(AtomicUsize::new(0));
    for _ in 0..3 {
        let done = done.clone();
        cell.subscribe(move |_| {
            thread::sleep(Duration::from_millis(10));
            done.fetch_add(1, Ordering::SeqCst);
        });
    }

    cell.write_async(5).await.unwrap();
    assert_eq!(done.load(Ordering::SeqCst), 3);
    assert_eq!(cell.read().unwrap(), 5);
}

#[tokio::test]
async fn write_async_reaches_derived_subscribers() {
    let _pool = POOL_LOCK.lock();
    executor::reset();

    let a = Cell::source(1);
    let d = a.map(|v| v * 3).unwrap();
    let seen = record(&d);

    a.write_async(4).await.unwrap();
    assert_eq!(*seen.lock(), vec![12]);
}

#[tokio::test]
async fn async_failures_are_contained() {
    let _pool = POOL_LOCK.lock();
    executor::reset();

    let cell = Cell::source(0);
    let failures = Arc::new(AtomicUsize::new(0));
    let sink = failures.clone();
    cell.on_error(move |_, _, _| {
        sink.fetch_add(1, Ordering::SeqCst);
    });
    cell.subscribe(|_| panic!("boom"));
    let good = counter(&cell);

    cell.write_async(1).await.unwrap();
    assert_eq!(good.load(Ordering::SeqCst), 1);
    assert_eq!(failures.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn executor_shutdown_and_reset() {
    let _pool = POOL_LOCK.lock();
    executor::reset();

    let cell = Cell::source(0);
    let hits = counter(&cell);

    cell.write_async(1).await.unwrap();
    assert!(executor::is_running());

    executor::shutdown();
    assert!(!executor::is_running());
    let err = cell.write_async(2).await.unwrap_err();
    assert!(matches!(err, CellError::ExecutorUnavailable));
    assert_eq!(cell.read().unwrap(), 2);
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    // Sync writes are unaffected.
    cell.write(3).unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 2);

    executor::reset();
    cell.write_async(4).await.unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[test]
fn pool_follows_installed_config() {
    let _pool = POOL_LOCK.lock();
    executor::reset();

    let config = CellConfig::default().with_worker_count(2).unwrap();
    cellflow_core::config::set(config).unwrap();
    assert_eq!(executor::shared().unwrap().worker_count(), 2);

    cellflow_core::config::reset();
    executor::reset();
    assert_eq!(executor::shared().unwrap().worker_count(), 4);
    executor::reset();
}

#[test]
fn guard_shuts_pool_down_on_drop() {
    let _pool = POOL_LOCK.lock();
    executor::reset();

    {
        let _guard = executor::guard();
        executor::shared().unwrap();
        assert!(executor::is_running());
    }
    assert!(!executor::is_running());
    assert!(matches!(executor::shared(), Err(CellError::ExecutorUnavailable)));

    executor::reset();
}

#[test]
fn shutdown_before_first_use_leaves_pool_available() {
    let _pool = POOL_LOCK.lock();
    executor::reset();

    drop(executor::guard());
    executor::shutdown();
    assert!(!executor::is_running());
    assert!(executor::shared().is_ok());
    assert!(executor::is_running());

    executor::reset();
}

#[tokio::test]
async fn async_delivery_respects_worker_count() {
    let _pool = POOL_LOCK.lock();
    executor::reset();
    cellflow_core::config::set(CellConfig::default().with_worker_count(2).unwrap()).unwrap();

    let cell = Cell::source(0);
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let done = Arc::new(AtomicUsize::new(0));
    for _ in 0..8 {
        let (active, peak, done) = (active.clone(), peak.clone(), done.clone());
        cell.subscribe(move |_| {
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(30));
            active.fetch_sub(1, Ordering::SeqCst);
            done.fetch_add(1, Ordering::SeqCst);
        });
    }

    let outcome = cell.write_async(1).await;
    cellflow_core::config::reset();
    executor::reset();

    outcome.unwrap();
    assert_eq!(done.load(Ordering::SeqCst), 8);
    assert!(peak.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn reducer_dispatch_async() {
    let _pool = POOL_LOCK.lock();
    executor::reset();

    let total = with_reducer(0_i64, |state: &i64, delta: i64| state + delta);
    let seen = record(total.cell());
    total.dispatch_async(5).await.unwrap();
    total.dispatch_async(-2).await.unwrap();
    assert_eq!(*seen.lock(), vec![5, 3]);
}

// ----------------------------------------------------------------------------
// Wrappers
// ----------------------------------------------------------------------------

#[test]
fn thermostat_scenario() {
    let storage = Arc::new(MemoryStorage::new());
    let target = with_storage("target", 20.0_f64, storage.clone());
    let (current, reset_current) = with_reset(18.0_f64);

    let heating = Cell::derived(&[target.cell(), &current], {
        let (target, current) = (target.cell().clone(), current.clone());
        move |get| Ok(get.get(&current)? < get.get(&target)?)
    })
    .unwrap();
    let seen = record(&heating);

    target.write(17.0).unwrap();
    current.write(21.0).unwrap();
    reset_current.write(()).unwrap();
    assert_eq!(*seen.lock(), vec![false, false, false]);

    target.write(22.0).unwrap();
    assert!(heating.read().unwrap());

    let reloaded = with_storage("target", 0.0_f64, storage);
    assert_eq!(reloaded.read().unwrap(), 22.0);
}

#[test]
fn fallback_and_validation() {
    let raw = Cell::source(Some(40.0_f64));
    let reading = with_fallback(
        &[&raw],
        {
            let raw = raw.clone();
            move |get| get.get(&raw)?.ok_or_else(|| "disconnected".into())
        },
        f64::NAN,
    )
    .unwrap();
    assert_eq!(reading.read().unwrap(), 40.0);
    raw.write(None).unwrap();
    assert!(reading.read().unwrap().is_nan());

    let humidity = ValidatedCell::new(40.0, in_range(0.0, 100.0)).unwrap();
    let hits = counter(humidity.cell());
    assert!(matches!(humidity.write(101.0), Err(CellError::Validation(_))));
    assert_eq!(humidity.read().unwrap(), 40.0);
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}
