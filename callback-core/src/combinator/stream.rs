//! Streaming reduction.
//!
//! Unlike [`Callback::reduce`], nothing is buffered: each child outcome is
//! handed to the [`StreamReducer`] as it arrives, and only three counters
//! are kept. This suits rolling aggregates (sums, counts, merges into a
//! shared accumulator) where holding every intermediate result would waste
//! memory.
//!
//! # Ordering
//!
//! A child bumps its outcome counter after its hook returns, then bumps the
//! shared completion counter. The thread that takes the completion counter
//! to N has therefore seen every hook return and every outcome counted, and
//! it is the only thread that calls [`StreamReducer::done`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::callback::{guard, BoxError, Callback, CancelReason, Failure, HookResult, Outcome};

use super::reduce::cancel_children_with;

/// Consumes child outcomes one at a time.
///
/// Hooks may be called concurrently from the threads finishing the
/// children, so implementations keep their state in atomics or behind a
/// lock. Only [`StreamReducer::done`] is required; the per-outcome hooks
/// default to doing nothing.
pub trait StreamReducer<C, R>: Send + Sync {
    /// Child `index` resolved.
    fn resolved(&self, index: usize, value: &C) -> HookResult {
        let _ = (index, value);
        Ok(())
    }

    /// Child `index` failed.
    fn failed(&self, index: usize, error: &Failure) -> HookResult {
        let _ = (index, error);
        Ok(())
    }

    /// Child `index` was cancelled.
    fn cancelled(&self, index: usize, reason: &CancelReason) -> HookResult {
        let _ = (index, reason);
        Ok(())
    }

    /// Every child has finished; produce the reduced value.
    fn done(&self, successful: usize, failed: usize, cancelled: usize) -> Result<R, BoxError>;
}

impl<C, R, S> StreamReducer<C, R> for Arc<S>
where
    S: StreamReducer<C, R> + ?Sized,
{
    fn resolved(&self, index: usize, value: &C) -> HookResult {
        (**self).resolved(index, value)
    }

    fn failed(&self, index: usize, error: &Failure) -> HookResult {
        (**self).failed(index, error)
    }

    fn cancelled(&self, index: usize, reason: &CancelReason) -> HookResult {
        (**self).cancelled(index, reason)
    }

    fn done(&self, successful: usize, failed: usize, cancelled: usize) -> Result<R, BoxError> {
        (**self).done(successful, failed, cancelled)
    }
}

struct Tally {
    total: usize,
    successful: AtomicUsize,
    failed: AtomicUsize,
    cancelled: AtomicUsize,
    finished: AtomicUsize,
}

struct StreamReduction<R, S> {
    target: Callback<R>,
    reducer: S,
    tally: Tally,
}

impl<R, S> StreamReduction<R, S>
where
    R: Send + Sync + 'static,
{
    fn child_finished<C>(&self, index: usize, outcome: &Outcome<C>)
    where
        S: StreamReducer<C, R>,
    {
        let (hook, counter) = match outcome {
            Outcome::Resolved(value) => (
                guard(|| self.reducer.resolved(index, value)),
                &self.tally.successful,
            ),
            Outcome::Failed(error) => (
                guard(|| self.reducer.failed(index, error)),
                &self.tally.failed,
            ),
            Outcome::Cancelled(reason) => (
                guard(|| self.reducer.cancelled(index, reason)),
                &self.tally.cancelled,
            ),
        };
        counter.fetch_add(1, Ordering::AcqRel);

        if let Err(error) = hook {
            self.target.fail(error);
        }

        if self.tally.finished.fetch_add(1, Ordering::AcqRel) + 1 == self.tally.total {
            self.finish::<C>();
        }
    }

    fn finish<C>(&self)
    where
        S: StreamReducer<C, R>,
    {
        let successful = self.tally.successful.load(Ordering::Acquire);
        let failed = self.tally.failed.load(Ordering::Acquire);
        let cancelled = self.tally.cancelled.load(Ordering::Acquire);

        if !self.target.is_ready() {
            debug!(callback = %self.target.id(), "stream reduction target already finished");
            return;
        }

        debug!(
            callback = %self.target.id(),
            successful, failed, cancelled,
            "stream reduction done"
        );

        match guard(|| self.reducer.done(successful, failed, cancelled)) {
            Ok(value) => self.target.resolve(value),
            Err(error) => self.target.fail(error),
        };
    }
}

impl<R> Callback<R>
where
    R: Send + Sync + 'static,
{
    /// Reduce a collection of callbacks into one, streaming each outcome
    /// into `reducer` as it arrives.
    ///
    /// Any error from a per-outcome hook fails the result. Once every child
    /// has finished, [`StreamReducer::done`] is called with the final counts
    /// and its value resolves the result. Cancelling the result cancels every
    /// child that is still pending.
    pub fn reduce_stream<C, S>(children: Vec<Callback<C>>, reducer: S) -> Callback<R>
    where
        C: Send + Sync + 'static,
        S: StreamReducer<C, R> + 'static,
    {
        let reduction = Arc::new(StreamReduction {
            target: Callback::new(),
            reducer,
            tally: Tally {
                total: children.len(),
                successful: AtomicUsize::new(0),
                failed: AtomicUsize::new(0),
                cancelled: AtomicUsize::new(0),
                finished: AtomicUsize::new(0),
            },
        });
        let target = reduction.target.clone();

        if children.is_empty() {
            reduction.finish::<C>();
            return target;
        }

        cancel_children_with(&target, &children);

        for (index, child) in children.iter().enumerate() {
            let reduction = Arc::clone(&reduction);
            child.observe(Box::new(move |outcome: &Outcome<C>| {
                reduction.child_finished(index, outcome);
                Ok(())
            }));
        }

        target
    }
}
