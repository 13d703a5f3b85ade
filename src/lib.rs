//! # Parwork
//!
//! Structured concurrency primitives for bounded parallel execution:
//! promises, token-gated work pools, orchestration façades, and a
//! first-failure-wins join over dynamic signal sets.
//!
//! ## Features
//!
//! - **Promises**: single-assignment futures with blocking, non-blocking,
//!   and broadcast reads
//! - **Work Pools**: admission-token bounded concurrency over streamed
//!   sources
//! - **Orchestration**: generate-then-consume, stream-consume, and
//!   indexed-loop entry points
//! - **Containment**: panics in spawned work become errors instead of
//!   crashing the process
//!
//! ## Design Principles
//!
//! - **Fail fast**: the first observed failure wins; later results are
//!   discarded
//! - **Cooperative cancellation**: one context threads through every layer;
//!   running work is never interrupted
//! - **Loud contract violations**: invariant breaches panic at the call
//!   site rather than surfacing as ordinary errors
//!
//! ## Example
//!
//! ```
//! use parwork::{parallel_loop, CancelContext};
//!
//! let ctx = CancelContext::new();
//! parallel_loop(&ctx, 100, 8, |index| {
//!     // At most 8 of these run at once.
//!     let _ = index * 2;
//!     Ok(())
//! })
//! .unwrap();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

// Module structure
pub mod context;
pub mod error;
mod fault;
pub mod parallel;
pub mod pool;
pub mod promise;
pub mod spawn;
pub mod wait;

// Public exports
pub use context::CancelContext;
pub use error::{Error, Result};
pub use parallel::{parallel_loop, parallel_read, parallel_work};
pub use pool::WorkPool;
pub use promise::Promise;
pub use spawn::{contain, spawn, SpawnConfig, Spawner};
pub use wait::wait_all;
