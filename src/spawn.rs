//! Asynchronous execution of fallible work on dedicated threads.
//!
//! [`Spawner::spawn`] runs a function on its own named thread and hands back
//! a one-shot completion signal. Every spawned body runs under panic
//! containment, so a panicking function delivers a fault error on the signal
//! instead of tearing down the process.

use crossbeam_channel::{bounded, Receiver};
use std::thread;

use crate::error::Result;
use crate::fault;

/// Configuration for a [`Spawner`].
#[derive(Debug, Clone)]
pub struct SpawnConfig {
    /// Log contained panics (message and trimmed stack) at error level.
    pub log_faults: bool,

    /// Name given to spawned threads.
    pub thread_name: String,
}

impl Default for SpawnConfig {
    fn default() -> Self {
        Self {
            log_faults: true,
            thread_name: "parwork-async".to_string(),
        }
    }
}

/// Runs functions on dedicated threads with panic containment.
#[derive(Debug, Clone, Default)]
pub struct Spawner {
    config: SpawnConfig,
}

impl Spawner {
    /// Create a spawner with the default configuration.
    pub fn new() -> Self {
        Self::with_config(SpawnConfig::default())
    }

    /// Create a spawner with the given configuration.
    pub fn with_config(config: SpawnConfig) -> Self {
        Spawner { config }
    }

    /// Run `f` on a new thread, returning a one-shot completion signal.
    ///
    /// The signal yields `f`'s result, or [`Error::Fault`](crate::Error::Fault)
    /// if `f` panicked. Exactly one value is ever delivered; dropping the
    /// receiver discards the outcome without blocking the thread.
    pub fn spawn<F>(&self, f: F) -> Receiver<Result<()>>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        let (sender, receiver) = bounded(1);
        let log_faults = self.config.log_faults;

        thread::Builder::new()
            .name(self.config.thread_name.clone())
            .spawn(move || {
                let result = fault::contain_with(f, log_faults);
                // Capacity 1, so the send never blocks; a dropped receiver
                // means nobody wants the outcome.
                let _ = sender.send(result);
            })
            .expect("Failed to spawn task thread");

        receiver
    }

    /// Run `f` in place under the same containment `spawn` applies.
    pub fn contain<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce() -> Result<()>,
    {
        fault::contain_with(f, self.config.log_faults)
    }
}

/// Run `f` on a new thread with the default [`SpawnConfig`], returning a
/// one-shot completion signal.
pub fn spawn<F>(f: F) -> Receiver<Result<()>>
where
    F: FnOnce() -> Result<()> + Send + 'static,
{
    Spawner::new().spawn(f)
}

/// Run `f` in place, converting an unwinding panic into
/// [`Error::Fault`](crate::Error::Fault) with the default [`SpawnConfig`].
pub fn contain<F>(f: F) -> Result<()>
where
    F: FnOnce() -> Result<()>,
{
    Spawner::new().contain(f)
}
