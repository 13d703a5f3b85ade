//! Orchestration entry points for bounded parallel execution.
//!
//! Three façades wire a work source into a [`WorkPool`] and dispatch one
//! contained invocation of a user function per admitted item: generate then
//! consume, consume a given stream, and indexed loop. All three take a
//! cancellation context and a concurrency limit and return the first error
//! from any side.

use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::Arc;
use std::thread;

use crate::context::CancelContext;
use crate::error::Result;
use crate::pool::WorkPool;
use crate::spawn::{contain, spawn};
use crate::wait::wait_all;

/// Run a generator and a bounded consumer concurrently.
///
/// `generate` pushes items through the borrowed sender and returns when the
/// stream is complete; the channel is closed for it once it returns, success
/// or error. Consumption admits items under `limit` concurrent invocations
/// of `work`. The first error from either side wins.
///
/// If consumption stops early (an error or cancellation), sends from the
/// generator start failing; the generator should treat a send error as a
/// signal to return.
///
/// # Panics
///
/// `limit` must be at least 1.
pub fn parallel_work<T, G, W>(
    ctx: &CancelContext,
    limit: usize,
    generate: G,
    work: W,
) -> Result<()>
where
    T: Send + 'static,
    G: FnOnce(&Sender<T>) -> Result<()> + Send + 'static,
    W: Fn(T) -> Result<()> + Send + Sync + 'static,
{
    assert!(
        limit >= 1,
        "parallel_work requires a concurrency limit of at least 1"
    );

    // Rendezvous channel: generation proceeds only as consumption admits.
    let (sender, receiver) = bounded(0);

    let generation = spawn(move || {
        let result = generate(&sender);
        // Dropping the only sender closes the stream exactly when
        // generation returns; the generator itself never can.
        drop(sender);
        result
    });

    let consume_ctx = ctx.clone();
    let consumption = spawn(move || parallel_read(&consume_ctx, receiver, limit, work));

    wait_all(ctx, [generation, consumption])
}

/// Consume an already-open stream with at most `limit` concurrent
/// invocations of `work`, until the stream closes.
///
/// Returns `Ok(())` once the stream is exhausted and every item has been
/// worked, the first work error, or the cancellation error.
///
/// # Panics
///
/// `limit` must be at least 1.
pub fn parallel_read<T, W>(
    ctx: &CancelContext,
    source: Receiver<T>,
    limit: usize,
    work: W,
) -> Result<()>
where
    T: Send + 'static,
    W: Fn(T) -> Result<()> + Send + Sync + 'static,
{
    assert!(
        limit >= 1,
        "parallel_read requires a concurrency limit of at least 1"
    );

    let pool = WorkPool::new(ctx, source, limit);
    let work = Arc::new(work);

    let dispatcher = pool.clone();
    thread::Builder::new()
        .name("parwork-dispatch".to_string())
        .spawn(move || {
            while let Some(item) = dispatcher.get_work() {
                let reporter = dispatcher.clone();
                let work = Arc::clone(&work);
                thread::Builder::new()
                    .name("parwork-work".to_string())
                    .spawn(move || {
                        // Containment guarantees every admitted item
                        // reports exactly once, panics included.
                        let result = contain(|| (*work)(item));
                        reporter.report_work(result);
                    })
                    .expect("Failed to spawn work thread");
            }
        })
        .expect("Failed to spawn dispatch thread");

    pool.wait()
}

/// Invoke `body` once per index in `0..count`, at most `limit` at a time.
///
/// # Panics
///
/// `limit` must be at least 1.
///
/// # Examples
///
/// ```
/// use parwork::{parallel_loop, CancelContext};
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// let ctx = CancelContext::new();
/// let calls = Arc::new(AtomicUsize::new(0));
/// let seen = Arc::clone(&calls);
/// parallel_loop(&ctx, 10, 3, move |_index| {
///     seen.fetch_add(1, Ordering::SeqCst);
///     Ok(())
/// })
/// .unwrap();
/// assert_eq!(calls.load(Ordering::SeqCst), 10);
/// ```
pub fn parallel_loop<F>(ctx: &CancelContext, count: usize, limit: usize, body: F) -> Result<()>
where
    F: Fn(usize) -> Result<()> + Send + Sync + 'static,
{
    assert!(
        limit >= 1,
        "parallel_loop requires a concurrency limit of at least 1"
    );

    let (sender, receiver) = bounded(0);
    thread::Builder::new()
        .name("parwork-loop-feed".to_string())
        .spawn(move || {
            for index in 0..count {
                // A send error means the pool has stopped admitting.
                if sender.send(index).is_err() {
                    break;
                }
            }
        })
        .expect("Failed to spawn loop feed thread");

    parallel_read(ctx, receiver, limit, body)
}
