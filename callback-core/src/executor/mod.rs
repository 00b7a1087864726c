//! Executor Dispatch
//!
//! An [`Executor`] is anything that can accept a unit of work. The crate
//! never reaches for a global executor: callers pass one in, which lets
//! tests supply [`Immediate`] and services supply a [`ThreadPool`] or a
//! Tokio runtime handle.
//!
//! [`Callback::resolve_on`] is the safe way to compute a callback's value
//! on an executor:
//!
//! 1. The work may run long after it was submitted, by which point the
//!    callback may already be cancelled. The work checks
//!    [`Callback::is_ready`] first and does nothing if it is not.
//!
//! 2. The resolver may fail or panic. Either way the callback is failed
//!    rather than left pending.
//!
//! 3. The executor may refuse the work outright. The callback is failed
//!    with the rejection.
//!
//! 4. The executor may accept the work and later drop it without running
//!    it (a runtime shutting down, say). The callback is failed with
//!    [`ExecutorError::Shutdown`] when the dropped work is released.

mod pool;

pub use pool::{PoolConfig, ThreadPool};

use std::io;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::callback::{guard, BoxError, Callback, Failure};

/// A unit of work submitted to an executor.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Why an executor refused work or could not be built.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The queue is full.
    #[error("executor queue is full ({capacity} tasks)")]
    Rejected { capacity: usize },

    /// The executor has been shut down.
    #[error("executor has been shut down")]
    Shutdown,

    #[error("invalid executor configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] io::Error),
}

/// Something that runs tasks.
pub trait Executor: Send + Sync {
    /// Submit a task. An `Err` means the task was not accepted and will
    /// never run.
    fn execute(&self, task: Task) -> Result<(), ExecutorError>;
}

impl<E> Executor for Arc<E>
where
    E: Executor + ?Sized,
{
    fn execute(&self, task: Task) -> Result<(), ExecutorError> {
        (**self).execute(task)
    }
}

impl<E> Executor for &E
where
    E: Executor + ?Sized,
{
    fn execute(&self, task: Task) -> Result<(), ExecutorError> {
        (**self).execute(task)
    }
}

/// Runs every task inline on the submitting thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct Immediate;

impl Executor for Immediate {
    fn execute(&self, task: Task) -> Result<(), ExecutorError> {
        task();
        Ok(())
    }
}

/// Runs tasks on the runtime's blocking pool; resolvers are ordinary
/// blocking code.
impl Executor for tokio::runtime::Handle {
    fn execute(&self, task: Task) -> Result<(), ExecutorError> {
        drop(self.spawn_blocking(task));
        Ok(())
    }
}

// Submission status shared between `resolve_on` and its task.
const SUBMITTING: u8 = 0;
const ACCEPTED: u8 = 1;
const DROPPED: u8 = 2;

/// A resolver on its way through an executor.
///
/// Dropped without having run, it fails the callback, unless the drop
/// happened inside a rejected `execute` call, where the rejection is
/// reported instead.
struct Dispatch<T, F>
where
    T: Send + Sync + 'static,
{
    callback: Callback<T>,
    resolver: Option<F>,
    status: Arc<AtomicU8>,
}

impl<T, F> Dispatch<T, F>
where
    T: Send + Sync + 'static,
    F: FnOnce() -> Result<T, BoxError>,
{
    fn run(mut self) {
        let Some(resolver) = self.resolver.take() else {
            return;
        };

        if !self.callback.is_ready() {
            debug!(callback = %self.callback.id(), "callback no longer ready, skipping resolver");
            return;
        }

        match guard(resolver) {
            Ok(value) => self.callback.resolve(value),
            Err(error) => self.callback.fail(error),
        };
    }
}

impl<T, F> Drop for Dispatch<T, F>
where
    T: Send + Sync + 'static,
{
    fn drop(&mut self) {
        if self.resolver.is_none() {
            return;
        }
        if self.status.swap(DROPPED, Ordering::AcqRel) == ACCEPTED {
            abandoned(&self.callback);
        }
    }
}

fn abandoned<T>(callback: &Callback<T>)
where
    T: Send + Sync + 'static,
{
    if callback.fail(Failure::new(ExecutorError::Shutdown)) {
        warn!(callback = %callback.id(), "executor dropped resolver without running it");
    }
}

impl<T> Callback<T>
where
    T: Send + Sync + 'static,
{
    /// Compute this callback's value on `executor`.
    ///
    /// See [`crate::executor`] for the guarantees.
    pub fn resolve_on<E, F>(&self, executor: &E, resolver: F) -> &Self
    where
        E: Executor + ?Sized,
        F: FnOnce() -> Result<T, BoxError> + Send + 'static,
    {
        let status = Arc::new(AtomicU8::new(SUBMITTING));
        let dispatch = Dispatch {
            callback: self.clone(),
            resolver: Some(resolver),
            status: Arc::clone(&status),
        };
        let task: Task = Box::new(move || dispatch.run());

        match executor.execute(task) {
            Ok(()) => {
                let accepted =
                    status.compare_exchange(SUBMITTING, ACCEPTED, Ordering::AcqRel, Ordering::Acquire);
                if accepted.is_err() {
                    // Dropped unrun before `execute` returned.
                    abandoned(self);
                }
            }
            Err(error) => {
                warn!(callback = %self.id(), %error, "executor rejected resolver");
                self.fail(Failure::new(error));
            }
        }

        self
    }

    /// Create a callback and compute its value on `executor`.
    pub fn spawn<E, F>(executor: &E, resolver: F) -> Callback<T>
    where
        E: Executor + ?Sized,
        F: FnOnce() -> Result<T, BoxError> + Send + 'static,
    {
        let callback = Callback::new();
        callback.resolve_on(executor, resolver);
        callback
    }
}
