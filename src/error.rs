//! Error types for coordinated parallel execution.
//!
//! One enum covers the three runtime failure sources: work functions
//! reporting failures, cancellation, and contained panics. Contract
//! violations (double resolve, a zero concurrency limit, reading a drained
//! signal) are not represented here; they panic at the offending call site.

use thiserror::Error;

/// Convenience result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Error produced by a coordinated operation.
///
/// Errors are plain values: cloneable and comparable, so a single recorded
/// failure can be handed to any number of waiters and matched by equality
/// in tests.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Failure reported by a work function.
    #[error("{0}")]
    Work(String),

    /// The governing [`CancelContext`](crate::CancelContext) was canceled
    /// before the operation completed.
    #[error("{0}")]
    Canceled(String),

    /// A panic contained at a spawn boundary.
    #[error("recovered panic: {message}")]
    Fault {
        /// The panic payload rendered as text.
        message: String,

        /// Captured stack trace, trimmed of containment frames.
        stack: String,
    },
}

impl Error {
    /// Wrap an arbitrary failure message as a work error.
    pub fn work(message: impl Into<String>) -> Self {
        Error::Work(message.into())
    }
}
