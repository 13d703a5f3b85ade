//! Single-assignment promise with broadcast completion.
//!
//! A [`Promise`] is fulfilled at most once: resolved with a value or
//! rejected with an error. Fulfillment is broadcast: every waiter, whether
//! it started waiting before or after the transition, observes the same
//! outcome, and repeated reads keep returning it. The outcome is stored and
//! re-read rather than re-sent, so waiters never race over a single channel
//! delivery.

use crossbeam_channel::{bounded, Receiver, Sender};
use log::trace;
use parking_lot::{Condvar, Mutex};
use std::mem;
use std::sync::Arc;

use crate::error::{Error, Result};

/// Fulfillment state guarded by the promise mutex.
enum State<T> {
    /// Not yet fulfilled. Holds the pending one-shot subscriptions and the
    /// guard end of the done gate.
    Pending {
        subscribers: Vec<Sender<Result<()>>>,
        done_guard: Sender<()>,
    },

    /// Resolved with a value.
    Resolved(T),

    /// Rejected with the first recorded error.
    Rejected(Error),
}

/// Shared state behind a promise and all of its clones.
struct PromiseInner<T> {
    state: Mutex<State<T>>,
    fulfilled: Condvar,
    // Disconnects when the pending state (and its guard sender) is replaced.
    done: Receiver<()>,
}

/// A single-assignment future: resolved or rejected exactly once, observed
/// by any number of independent waiters.
pub struct Promise<T> {
    inner: Arc<PromiseInner<T>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Promise {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Promise<T> {
    /// Create a pending promise.
    pub fn new() -> Self {
        let (done_guard, done) = bounded(0);
        Promise {
            inner: Arc::new(PromiseInner {
                state: Mutex::new(State::Pending {
                    subscribers: Vec::new(),
                    done_guard,
                }),
                fulfilled: Condvar::new(),
                done,
            }),
        }
    }

    /// Resolve the promise with `value`.
    ///
    /// # Panics
    ///
    /// Resolving twice, or resolving after a rejection, is a contract
    /// violation.
    pub fn resolve(&self, value: T) {
        self.fulfill(Ok(value));
    }

    /// Reject the promise with `err`.
    ///
    /// The first rejection is recorded; repeats are silently ignored.
    ///
    /// # Panics
    ///
    /// Rejecting after a resolution is a contract violation.
    pub fn reject(&self, err: Error) {
        self.fulfill(Err(err));
    }

    /// Block until fulfillment: `Ok(())` if resolved, the recorded error if
    /// rejected. Callable any number of times, from any thread.
    pub fn wait(&self) -> Result<()> {
        let mut state = self.inner.state.lock();
        loop {
            match &*state {
                State::Pending { .. } => self.inner.fulfilled.wait(&mut state),
                State::Resolved(_) => return Ok(()),
                State::Rejected(err) => return Err(err.clone()),
            }
        }
    }

    /// Non-blocking check: `None` while pending, the outcome once fulfilled.
    pub fn try_wait(&self) -> Option<Result<()>> {
        match &*self.inner.state.lock() {
            State::Pending { .. } => None,
            State::Resolved(_) => Some(Ok(())),
            State::Rejected(err) => Some(Err(err.clone())),
        }
    }

    /// A fresh one-shot completion signal: it yields the outcome at
    /// fulfillment, or immediately if the promise is already fulfilled.
    /// Suitable for [`wait_all`](crate::wait_all).
    pub fn subscribe(&self) -> Receiver<Result<()>> {
        let (sender, receiver) = bounded(1);
        let mut state = self.inner.state.lock();
        match &mut *state {
            State::Pending { subscribers, .. } => subscribers.push(sender),
            State::Resolved(_) => {
                let _ = sender.send(Ok(()));
            }
            State::Rejected(err) => {
                let _ = sender.send(Err(err.clone()));
            }
        }
        receiver
    }

    /// Gate receiver that disconnects at fulfillment, making "already
    /// fulfilled" a permanently selectable condition. Carries no messages.
    pub(crate) fn done(&self) -> Receiver<()> {
        self.inner.done.clone()
    }

    /// Perform the single pending -> fulfilled transition.
    fn fulfill(&self, result: std::result::Result<T, Error>) {
        let mut state = self.inner.state.lock();
        match (&*state, &result) {
            (State::Pending { .. }, _) => {}
            // Repeat rejections are inert; the first error stands.
            (State::Rejected(_), Err(_)) => return,
            (State::Resolved(_), Ok(_)) => panic!("Promise::resolve called twice"),
            (State::Resolved(_), Err(_)) => {
                panic!("Promise::reject called after Promise::resolve")
            }
            (State::Rejected(first), Ok(_)) => panic!(
                "Promise::resolve called after Promise::reject (first error: {})",
                first
            ),
        }

        let outcome = match &result {
            Ok(_) => Ok(()),
            Err(err) => Err(err.clone()),
        };
        match &outcome {
            Ok(()) => trace!("Promise resolved"),
            Err(err) => trace!("Promise rejected: {}", err),
        }

        let next = match result {
            Ok(value) => State::Resolved(value),
            Err(err) => State::Rejected(err),
        };
        if let State::Pending {
            subscribers,
            done_guard,
        } = mem::replace(&mut *state, next)
        {
            for subscriber in subscribers {
                // Capacity-1 channels; a dropped receiver is not an error.
                let _ = subscriber.send(outcome.clone());
            }
            // Dropping the guard makes every done() receiver permanently
            // ready.
            drop(done_guard);
        }
        self.inner.fulfilled.notify_all();
    }
}

impl<T: Clone> Promise<T> {
    /// Block until fulfillment and return the resolved value.
    ///
    /// # Panics
    ///
    /// Calling this on a rejected promise is a contract violation.
    pub fn value(&self) -> T {
        let mut state = self.inner.state.lock();
        loop {
            match &*state {
                State::Pending { .. } => self.inner.fulfilled.wait(&mut state),
                State::Resolved(value) => return value.clone(),
                State::Rejected(err) => {
                    panic!("Promise::value called on a rejected promise: {}", err)
                }
            }
        }
    }
}

impl<T> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_resolve_then_wait() {
        let promise = Promise::new();
        promise.resolve(7);
        assert_eq!(promise.wait(), Ok(()));
        assert_eq!(promise.value(), 7);
        // Repeated reads keep returning the outcome.
        assert_eq!(promise.wait(), Ok(()));
        assert_eq!(promise.try_wait(), Some(Ok(())));
    }

    #[test]
    fn test_reject_then_wait() {
        let promise: Promise<()> = Promise::new();
        promise.reject(Error::work("first"));
        assert_eq!(promise.wait(), Err(Error::work("first")));
        assert_eq!(promise.try_wait(), Some(Err(Error::work("first"))));
    }

    #[test]
    fn test_repeat_rejections_are_inert() {
        let promise: Promise<()> = Promise::new();
        promise.reject(Error::work("first"));
        promise.reject(Error::work("second"));
        assert_eq!(promise.wait(), Err(Error::work("first")));
    }

    #[test]
    #[should_panic(expected = "resolve called twice")]
    fn test_double_resolve_panics() {
        let promise = Promise::new();
        promise.resolve(1);
        promise.resolve(2);
    }

    #[test]
    #[should_panic(expected = "reject called after")]
    fn test_reject_after_resolve_panics() {
        let promise = Promise::new();
        promise.resolve(1);
        promise.reject(Error::work("too late"));
    }

    #[test]
    #[should_panic(expected = "resolve called after")]
    fn test_resolve_after_reject_panics() {
        let promise = Promise::new();
        promise.reject(Error::work("first"));
        promise.resolve(1);
    }

    #[test]
    #[should_panic(expected = "rejected promise")]
    fn test_value_on_rejected_panics() {
        let promise: Promise<i32> = Promise::new();
        promise.reject(Error::work("no value"));
        promise.value();
    }

    #[test]
    fn test_try_wait_while_pending() {
        let promise: Promise<()> = Promise::new();
        assert_eq!(promise.try_wait(), None);
    }

    #[test]
    fn test_waiters_before_and_after_fulfillment() {
        let promise: Promise<u32> = Promise::new();
        let mut early = Vec::new();
        for _ in 0..4 {
            let waiter = promise.clone();
            early.push(thread::spawn(move || waiter.wait()));
        }

        // Let the early waiters block on the condvar first.
        thread::sleep(Duration::from_millis(20));
        promise.resolve(9);

        for handle in early {
            assert_eq!(handle.join().unwrap(), Ok(()));
        }
        // A late waiter sees the stored outcome immediately.
        assert_eq!(promise.wait(), Ok(()));
    }

    #[test]
    fn test_subscribe_before_fulfillment() {
        let promise: Promise<()> = Promise::new();
        let signal = promise.subscribe();
        assert!(signal.try_recv().is_err());
        promise.resolve(());
        assert_eq!(signal.recv().unwrap(), Ok(()));
    }

    #[test]
    fn test_subscribe_after_fulfillment() {
        let promise: Promise<()> = Promise::new();
        promise.reject(Error::work("already done"));
        let signal = promise.subscribe();
        assert_eq!(signal.recv().unwrap(), Err(Error::work("already done")));
    }

    #[test]
    fn test_done_gate_opens_on_fulfillment() {
        let promise: Promise<()> = Promise::new();
        let gate = promise.done();
        assert!(matches!(
            gate.try_recv(),
            Err(crossbeam_channel::TryRecvError::Empty)
        ));
        promise.resolve(());
        assert!(matches!(
            gate.try_recv(),
            Err(crossbeam_channel::TryRecvError::Disconnected)
        ));
    }
}
