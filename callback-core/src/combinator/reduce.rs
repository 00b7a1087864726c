//! Whole-collection reduction.
//!
//! ```text
//! Vec<Callback<C>> - *reducer* -> Callback<R>
//! ```
//!
//! Every child outcome is buffered. The child that brings the count of
//! finished children to N takes the buffers and runs the reducer; the
//! counter lives under the same mutex as the buffers, so that happens on
//! exactly one thread.

use std::mem;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::callback::{guard, BoxError, Callback, CancelReason, Failure, Outcome};

/// Buffered child outcomes, in arrival order.
struct Collected<C, F> {
    results: Vec<C>,
    errors: Vec<Failure>,
    cancelled: Vec<CancelReason>,
    remaining: usize,
    reducer: Option<F>,
}

struct Reduction<C, R, F> {
    target: Callback<R>,
    collected: Mutex<Collected<C, F>>,
}

impl<C, R, F> Reduction<C, R, F>
where
    C: Clone + Send + Sync + 'static,
    R: Send + Sync + 'static,
    F: FnOnce(Vec<C>, Vec<Failure>, Vec<CancelReason>) -> Result<R, BoxError> + Send + 'static,
{
    fn child_finished(&self, outcome: &Outcome<C>) {
        let finished = {
            let mut collected = self.collected.lock();
            match outcome {
                Outcome::Resolved(value) => collected.results.push(value.clone()),
                Outcome::Failed(error) => collected.errors.push(error.clone()),
                Outcome::Cancelled(reason) => collected.cancelled.push(reason.clone()),
            }
            collected.remaining -= 1;
            if collected.remaining > 0 {
                return;
            }
            (
                mem::take(&mut collected.results),
                mem::take(&mut collected.errors),
                mem::take(&mut collected.cancelled),
                collected.reducer.take(),
            )
        };

        if let (results, errors, cancelled, Some(reducer)) = finished {
            self.finish(reducer, results, errors, cancelled);
        }
    }

    fn finish(&self, reducer: F, results: Vec<C>, errors: Vec<Failure>, cancelled: Vec<CancelReason>) {
        if !self.target.is_ready() {
            debug!(callback = %self.target.id(), "reduction target already finished, skipping reducer");
            return;
        }

        debug!(
            callback = %self.target.id(),
            resolved = results.len(),
            failed = errors.len(),
            cancelled = cancelled.len(),
            "reducing children"
        );

        match guard(|| reducer(results, errors, cancelled)) {
            Ok(value) => self.target.resolve(value),
            Err(error) => self.target.fail(error),
        };
    }
}

impl<R> Callback<R>
where
    R: Send + Sync + 'static,
{
    /// Reduce a collection of callbacks into one.
    ///
    /// Once every child has finished, `reducer` receives the resolved values,
    /// the failures and the cancellation reasons, each in the order the
    /// children finished (not the order they were passed in). Its return
    /// value resolves the result; an error from it fails the result. An empty
    /// collection is reduced immediately.
    ///
    /// Cancelling the result cancels every child that is still pending.
    ///
    /// ```rust
    /// use callback_core::Callback;
    ///
    /// let children: Vec<Callback<u64>> = (0..3).map(|_| Callback::new()).collect();
    /// let total = Callback::reduce(children.clone(), |results, _errors, _cancelled| {
    ///     Ok(results.iter().sum::<u64>())
    /// });
    ///
    /// for (i, child) in children.iter().enumerate() {
    ///     child.resolve(i as u64 + 1);
    /// }
    /// assert_eq!(total.get().unwrap(), 6);
    /// ```
    pub fn reduce<C, F>(children: Vec<Callback<C>>, reducer: F) -> Callback<R>
    where
        C: Clone + Send + Sync + 'static,
        F: FnOnce(Vec<C>, Vec<Failure>, Vec<CancelReason>) -> Result<R, BoxError> + Send + 'static,
    {
        let reduction = Arc::new(Reduction {
            target: Callback::new(),
            collected: Mutex::new(Collected {
                results: Vec::with_capacity(children.len()),
                errors: Vec::new(),
                cancelled: Vec::new(),
                remaining: children.len(),
                reducer: Some(reducer),
            }),
        });
        let target = reduction.target.clone();

        if children.is_empty() {
            let reducer = reduction.collected.lock().reducer.take();
            if let Some(reducer) = reducer {
                reduction.finish(reducer, Vec::new(), Vec::new(), Vec::new());
            }
            return target;
        }

        cancel_children_with(&target, &children);

        for child in &children {
            let reduction = Arc::clone(&reduction);
            child.observe(Box::new(move |outcome: &Outcome<C>| {
                reduction.child_finished(outcome);
                Ok(())
            }));
        }

        target
    }
}

/// Cancel every still-pending child when `target` is cancelled.
///
/// Children are held weakly; one that has already been dropped has nobody
/// left to produce it.
pub(crate) fn cancel_children_with<C, R>(target: &Callback<R>, children: &[Callback<C>])
where
    C: Send + Sync + 'static,
    R: Send + Sync + 'static,
{
    let children: Vec<_> = children.iter().map(Callback::downgrade).collect();
    target.register_cancel(move |reason| {
        for child in children.iter().filter_map(|c| c.upgrade()) {
            child.cancel(reason.clone());
        }
        Ok(())
    });
}
