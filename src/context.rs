//! Cooperative cancellation shared across coordinated operations.
//!
//! A [`CancelContext`] is a cheap-to-clone handle threaded through every
//! layer of an operation. Cancellation is signaled by closing an otherwise
//! silent channel, so any number of observers can select on
//! [`CancelContext::done`] and all of them become ready the moment the
//! context is canceled. Cancellation is cooperative: work that is already
//! running is never interrupted.

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use log::debug;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::error::Error;

/// Reason recorded when [`CancelContext::cancel`] is called.
const DEFAULT_REASON: &str = "context canceled";

/// Shared state behind a cancellation context.
struct ContextInner {
    // Held until cancellation; dropping it disconnects every done receiver.
    guard: Mutex<Option<Sender<()>>>,

    // Cloned out by done(). Never carries a message.
    done: Receiver<()>,

    // First recorded cancellation reason.
    reason: Mutex<Option<String>>,
}

/// A cancellation signal observed by every layer of a coordinated operation.
#[derive(Clone)]
pub struct CancelContext {
    inner: Arc<ContextInner>,
}

impl CancelContext {
    /// Create a context that is not yet canceled.
    pub fn new() -> Self {
        let (guard, done) = bounded(0);
        CancelContext {
            inner: Arc::new(ContextInner {
                guard: Mutex::new(Some(guard)),
                done,
                reason: Mutex::new(None),
            }),
        }
    }

    /// Cancel the context.
    ///
    /// The first cancellation wins; later calls are no-ops.
    pub fn cancel(&self) {
        self.cancel_with(DEFAULT_REASON);
    }

    /// Cancel the context, recording `reason` as the cancellation error.
    pub fn cancel_with(&self, reason: impl Into<String>) {
        let mut guard = self.inner.guard.lock();
        if guard.is_none() {
            return;
        }
        let reason = reason.into();
        debug!("Canceling context: {}", reason);
        *self.inner.reason.lock() = Some(reason);
        // The reason is recorded before the sender drops, so observers woken
        // by the disconnect always see it.
        *guard = None;
    }

    /// A receiver that becomes permanently ready once the context is
    /// canceled (or every handle to it has been dropped). It never yields a
    /// message; readiness is disconnection.
    pub fn done(&self) -> Receiver<()> {
        self.inner.done.clone()
    }

    /// Whether the context has been canceled.
    pub fn is_canceled(&self) -> bool {
        matches!(self.inner.done.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// The cancellation error once canceled, `None` while live.
    pub fn err(&self) -> Option<Error> {
        if !self.is_canceled() {
            return None;
        }
        let reason = self.inner.reason.lock();
        Some(Error::Canceled(
            reason.clone().unwrap_or_else(|| DEFAULT_REASON.to_string()),
        ))
    }
}
