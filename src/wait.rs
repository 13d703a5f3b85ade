//! First-failure-wins join over a dynamic set of completion signals.
//!
//! [`wait_all`] blocks over any number of one-shot completion signals plus
//! one cancellation context, returning the first failure (or the
//! cancellation error) immediately, and `Ok(())` only once every signal has
//! reported success. The signal set is determined at call time, so the wait
//! is built on a dynamic selection registry rather than a fixed case list.

use crossbeam_channel::{Receiver, Select};
use log::trace;

use crate::context::CancelContext;
use crate::error::{Error, Result};

/// Wait on every completion signal, failing fast.
///
/// Returns the first error yielded by any signal, or the cancellation error
/// as soon as `ctx` is canceled, abandoning the remaining signals in either
/// case. Returns `Ok(())` once all signals have yielded success. A signal
/// that has already been fulfilled is consumed without blocking.
///
/// # Panics
///
/// A signal whose channel closes without ever yielding an outcome is a
/// contract violation; the panic names the offending signal's position.
pub fn wait_all(
    ctx: &CancelContext,
    signals: impl IntoIterator<Item = Receiver<Result<()>>>,
) -> Result<()> {
    let signals: Vec<Receiver<Result<()>>> = signals.into_iter().collect();
    let done = ctx.done();

    let mut select = Select::new();
    for signal in &signals {
        select.recv(signal);
    }
    let cancel_index = select.recv(&done);

    let mut remaining = signals.len();
    trace!("Waiting on {} completion signal(s)", remaining);

    while remaining > 0 {
        let oper = select.select();
        let index = oper.index();

        if index == cancel_index {
            // The done gate never carries a message; completing the
            // operation observes its disconnect.
            let _ = oper.recv(&done);
            let err = ctx
                .err()
                .unwrap_or_else(|| Error::Canceled("context canceled".to_string()));
            trace!("Cancellation won the join: {}", err);
            return Err(err);
        }

        match oper.recv(&signals[index]) {
            Ok(Ok(())) => {
                // This signal is spent; stop selecting on it.
                select.remove(index);
                remaining -= 1;
            }
            Ok(Err(err)) => {
                trace!("Signal {} failed the join: {}", index, err);
                return Err(err);
            }
            Err(_) => panic!(
                "wait_all: signal {} closed without yielding an outcome",
                index
            ),
        }
    }

    Ok(())
}
