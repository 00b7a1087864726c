//! Callback Core
//!
//! This crate provides a single-assignment asynchronous result cell,
//! [`Callback`], and the combinators built on it. It implements:
//!
//! - Exactly-once completion (resolve, fail, cancel)
//! - Observer registration that works before or after completion
//! - Blocking, interruptible waits
//! - Fan-in reduction, buffered and streaming
//! - Value transforms with cancellation flowing back upstream
//! - Executor dispatch with a bounded thread pool
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `callback`: The cell itself, its outcomes, observers and waits
//! - `combinator`: Reduce, streaming reduce and transforms
//! - `executor`: The executor seam, an inline executor and a thread pool
//!
//! # Example
//!
//! ```rust
//! use callback_core::{Callback, Immediate, ThreadPool, PoolConfig};
//!
//! let pool = ThreadPool::new(PoolConfig::default()).unwrap();
//!
//! // Two lookups running on the pool
//! let users = Callback::spawn(&pool, || Ok(vec!["ada", "grace"]));
//! let admins = Callback::spawn(&pool, || Ok(vec!["linus"]));
//!
//! // Count every name once both lookups are in
//! let counts = vec![
//!     users.transform(|u| Ok(u.len())),
//!     admins.transform(|a| Ok(a.len())),
//! ];
//! let total = Callback::reduce(counts, |sizes, _errors, _cancelled| {
//!     Ok(sizes.iter().sum::<usize>())
//! });
//!
//! assert_eq!(total.get().unwrap(), 3);
//!
//! // Inline execution for tests
//! let now = Callback::spawn(&Immediate, || Ok("done"));
//! assert_eq!(now.get().unwrap(), "done");
//! ```

pub mod callback;
pub mod combinator;
pub mod executor;

pub use callback::{
    BoxError, Callback, CallbackId, CallbackState, CancelReason, Failure, GetError, Handle,
    HookResult, Interrupter, Outcome, Panicked, Waiter, WeakCallback,
};
pub use combinator::StreamReducer;
pub use executor::{Executor, ExecutorError, Immediate, PoolConfig, ThreadPool};
