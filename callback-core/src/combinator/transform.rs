//! Transformation combinators.
//!
//! Both combinators build a new callback downstream of `self`:
//!
//! ```text
//! Callback<T> (self) - *transformer* -> Callback<R>
//! ```
//!
//! The source holds the new callback strongly through its observer; the new
//! callback points back at the source weakly, so cancelling or failing it
//! reaches the source without creating a reference cycle.

use crate::callback::{guard, BoxError, Callback, Outcome};

impl<T> Callback<T>
where
    T: Send + Sync + 'static,
{
    /// Map this callback's value through a function.
    ///
    /// If the source fails or is cancelled, the result does the same and the
    /// transformer is never called. If the transformer returns an error (or
    /// panics) the result fails with it. Cancelling or failing the result
    /// cancels or fails the source.
    pub fn transform<R, F>(&self, transformer: F) -> Callback<R>
    where
        R: Send + Sync + 'static,
        F: FnOnce(&T) -> Result<R, BoxError> + Send + 'static,
    {
        let target = Callback::new();

        let downstream = target.clone();
        self.observe(Box::new(move |outcome: &Outcome<T>| {
            match outcome {
                Outcome::Resolved(value) => match guard(|| transformer(value)) {
                    Ok(result) => downstream.resolve(result),
                    Err(error) => downstream.fail(error),
                },
                other => downstream.complete_unresolved(other),
            };
            Ok(())
        }));

        self.propagate_back_from(&target);
        target
    }

    /// Map this callback's value through a function that itself produces a
    /// callback.
    ///
    /// Once the source resolves, the transformer is called and the callback
    /// it returns is linked to the result: its outcome finishes the result,
    /// and cancelling the result cancels it, which in turn unwinds whatever
    /// it was built from. Before that point, cancelling the result cancels
    /// the source.
    pub fn transform_deferred<R, F>(&self, transformer: F) -> Callback<R>
    where
        R: Clone + Send + Sync + 'static,
        F: FnOnce(&T) -> Result<Callback<R>, BoxError> + Send + 'static,
    {
        let target = Callback::new();

        let downstream = target.clone();
        self.observe(Box::new(move |outcome: &Outcome<T>| {
            match outcome {
                Outcome::Resolved(value) => match guard(|| transformer(value)) {
                    Ok(intermediate) => {
                        intermediate.propagate_back_from(&downstream);
                        let forward = downstream.clone();
                        intermediate.observe(Box::new(move |outcome: &Outcome<R>| {
                            forward.complete_from(outcome);
                            Ok(())
                        }));
                    }
                    Err(error) => {
                        downstream.fail(error);
                    }
                },
                other => {
                    downstream.complete_unresolved(other);
                }
            }
            Ok(())
        }));

        self.propagate_back_from(&target);
        target
    }

    /// Fail or cancel `self` when `downstream` fails or is cancelled.
    fn propagate_back_from<R>(&self, downstream: &Callback<R>)
    where
        R: Send + Sync + 'static,
    {
        let upstream = self.downgrade();
        downstream.observe(Box::new(move |outcome: &Outcome<R>| {
            if let Some(upstream) = upstream.upgrade() {
                upstream.complete_unresolved(outcome);
            }
            Ok(())
        }));
    }
}
