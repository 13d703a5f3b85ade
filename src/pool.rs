//! Token-gated work pool with a background feeder.
//!
//! A [`WorkPool`] admits items from a streamed source under a fixed budget
//! of admission tokens: at most `limit` items are in flight at once.
//! Dispatchers pull admitted items with [`WorkPool::get_work`] and report
//! each item's outcome with [`WorkPool::report_work`]. The pool's embedded
//! promise resolves when the source is exhausted and every admitted item
//! has been reported, and rejects on the first reported error or on
//! cancellation.

use crossbeam_channel::{bounded, select, unbounded, Receiver, RecvError, Sender};
use log::{debug, trace};
use std::thread;

use crate::context::CancelContext;
use crate::error::{Error, Result};
use crate::promise::Promise;

/// Bounded-concurrency pool over a streamed source of work items.
///
/// Handles are cheap to clone; every clone operates on the same pool.
pub struct WorkPool<T: Send + 'static> {
    /// Admission tokens; holding one grants the right to dispatch an item.
    tokens: Receiver<()>,

    /// Return side of the token channel.
    token_return: Sender<()>,

    /// Admitted items staged by the feeder.
    staging: Receiver<T>,

    /// Outcome relay to the feeder.
    completions: Sender<Result<()>>,

    /// Fulfilled once the pool is done (resolved or rejected).
    promise: Promise<()>,

    /// Done gate of the promise; permanently ready once fulfilled.
    halt: Receiver<()>,

    /// Concurrency limit.
    limit: usize,
}

impl<T: Send + 'static> Clone for WorkPool<T> {
    fn clone(&self) -> Self {
        WorkPool {
            tokens: self.tokens.clone(),
            token_return: self.token_return.clone(),
            staging: self.staging.clone(),
            completions: self.completions.clone(),
            promise: self.promise.clone(),
            halt: self.halt.clone(),
            limit: self.limit,
        }
    }
}

impl<T: Send + 'static> WorkPool<T> {
    /// Create a pool over `source` admitting at most `limit` items at once.
    ///
    /// A feeder thread starts draining `source` immediately.
    ///
    /// # Panics
    ///
    /// `limit` must be at least 1.
    pub fn new(ctx: &CancelContext, source: Receiver<T>, limit: usize) -> Self {
        assert!(
            limit >= 1,
            "WorkPool requires a concurrency limit of at least 1"
        );

        let (token_return, tokens) = bounded(limit);
        for _ in 0..limit {
            token_return
                .send(())
                .expect("Failed to seed admission tokens");
        }

        let (staging_sender, staging) = bounded(limit);
        let (completions, completion_receiver) = unbounded();
        let promise = Promise::new();
        let halt = promise.done();

        debug!("Starting work pool (limit {})", limit);

        let feeder = Feeder {
            ctx: ctx.clone(),
            source,
            staging: Some(staging_sender),
            completions: completion_receiver,
            promise: promise.clone(),
        };
        thread::Builder::new()
            .name("parwork-feeder".to_string())
            .spawn(move || feeder.run())
            .expect("Failed to spawn feeder thread");

        WorkPool {
            tokens,
            token_return,
            staging,
            completions,
            promise,
            halt,
            limit,
        }
    }

    /// Pull the next admitted item, blocking while the pool is saturated.
    ///
    /// Returns `None` once the pool is done: the source is exhausted and
    /// drained, an error was reported, or the context was canceled. After
    /// `Some(item)` the caller must eventually call
    /// [`report_work`](Self::report_work) exactly once for that item.
    pub fn get_work(&self) -> Option<T> {
        // Acquire an admission token first; fulfillment of the pool promise
        // unblocks dispatchers parked on a saturated pool.
        select! {
            recv(self.tokens) -> token => {
                if token.is_err() {
                    return None;
                }
            }
            recv(self.halt) -> _ => return None,
        }
        select! {
            recv(self.staging) -> item => item.ok(),
            recv(self.halt) -> _ => None,
        }
    }

    /// Report the outcome of an admitted item.
    ///
    /// A success returns the admission token; the first error rejects the
    /// pool promise and halts new admission. Outcomes reported after the
    /// pool is done are discarded.
    pub fn report_work(&self, result: Result<()>) {
        if result.is_ok() {
            // Capacity equals the tokens in circulation; this never blocks.
            // An errored item deliberately withholds its token.
            let _ = self.token_return.send(());
        }
        // The feeder owns rejection and accounting; once it has exited,
        // late outcomes are dropped here.
        let _ = self.completions.send(result);
    }

    /// Block until the pool is done: `Ok(())` after clean exhaustion, the
    /// first reported error or the cancellation error otherwise.
    pub fn wait(&self) -> Result<()> {
        self.promise.wait()
    }

    /// A fresh one-shot completion signal for the pool, suitable for
    /// [`wait_all`](crate::wait_all).
    pub fn subscribe(&self) -> Receiver<Result<()>> {
        self.promise.subscribe()
    }

    /// The pool's concurrency limit.
    pub fn capacity(&self) -> usize {
        self.limit
    }
}

/// Background feeder: drains the source into staging, tracks outstanding
/// items, and is the only writer of the pool promise.
struct Feeder<T> {
    ctx: CancelContext,
    source: Receiver<T>,
    staging: Option<Sender<T>>,
    completions: Receiver<Result<()>>,
    promise: Promise<()>,
}

impl<T: Send + 'static> Feeder<T> {
    fn run(mut self) {
        let done = self.ctx.done();
        // Only this thread touches the outstanding count; everything else
        // reaches it through the completions channel.
        let mut outstanding: usize = 0;
        // An item admitted from the source but not yet staged.
        let mut pending: Option<T> = None;

        loop {
            if self.staging.is_none() && outstanding == 0 {
                trace!("Source exhausted and drained; resolving pool promise");
                self.promise.resolve(());
                return;
            }

            if pending.is_some() {
                // Admitted items only exist while the source, and therefore
                // staging, is still open.
                let staging = self
                    .staging
                    .as_ref()
                    .expect("Admitted item implies open staging");
                select! {
                    send(staging, pending.take().expect("Admitted item present")) -> sent => {
                        if sent.is_err() {
                            debug!("Work pool handles dropped; feeder stopping");
                            return;
                        }
                    }
                    recv(self.completions) -> outcome => {
                        if !self.absorb(outcome, &mut outstanding) {
                            return;
                        }
                    }
                    recv(done) -> _ => {
                        self.reject_canceled();
                        return;
                    }
                }
            } else if self.staging.is_some() {
                select! {
                    recv(self.source) -> item => match item {
                        Ok(item) => {
                            outstanding += 1;
                            pending = Some(item);
                        }
                        Err(_) => {
                            trace!(
                                "Source closed; awaiting {} outstanding item(s)",
                                outstanding
                            );
                            // Closing staging tells dispatchers that no
                            // more work is coming.
                            self.staging = None;
                        }
                    },
                    recv(self.completions) -> outcome => {
                        if !self.absorb(outcome, &mut outstanding) {
                            return;
                        }
                    }
                    recv(done) -> _ => {
                        self.reject_canceled();
                        return;
                    }
                }
            } else {
                // Source exhausted; only completions (or cancellation) left.
                select! {
                    recv(self.completions) -> outcome => {
                        if !self.absorb(outcome, &mut outstanding) {
                            return;
                        }
                    }
                    recv(done) -> _ => {
                        self.reject_canceled();
                        return;
                    }
                }
            }
        }
    }

    /// Fold one reported outcome into the outstanding count. Returns `false`
    /// when the feeder should stop.
    fn absorb(
        &self,
        outcome: std::result::Result<Result<()>, RecvError>,
        outstanding: &mut usize,
    ) -> bool {
        match outcome {
            Ok(Ok(())) => {
                *outstanding = outstanding
                    .checked_sub(1)
                    .expect("More outcomes reported than items admitted");
                true
            }
            Ok(Err(err)) => {
                debug!("Work item failed; rejecting pool promise: {}", err);
                self.promise.reject(err);
                false
            }
            Err(RecvError) => {
                // Every pool handle is gone; nobody can report or wait.
                debug!("Work pool handles dropped; feeder stopping");
                false
            }
        }
    }

    fn reject_canceled(&self) {
        let err = self
            .ctx
            .err()
            .unwrap_or_else(|| Error::Canceled("context canceled".to_string()));
        debug!("Cancellation observed; rejecting pool promise: {}", err);
        self.promise.reject(err);
    }
}
