//! Observer types.
//!
//! An observer is a one-shot function over the terminal [`Outcome`] of a
//! callback. The public [`Handle`] trait gives callers a hook per outcome;
//! internally every registration, including the finish-only and
//! cancel-only forms, is boxed into the same [`Observer`] shape so the cell
//! keeps a single ordered list.

use std::panic::{self, AssertUnwindSafe};

use tracing::warn;

use super::error::{Failure, HookResult};
use super::outcome::{CallbackId, CancelReason, Outcome};

/// Receives the terminal event of a callback.
///
/// Exactly one of the three hooks is invoked, exactly once. A hook returning
/// an error does not affect the callback or its other observers; the error
/// is logged and dropped. Handles that own another callback should turn
/// their own errors into a `fail` on it instead of returning them.
pub trait Handle<T>: Send {
    fn resolved(self, value: &T) -> HookResult;

    fn failed(self, error: &Failure) -> HookResult;

    fn cancelled(self, reason: &CancelReason) -> HookResult;
}

/// The stored form of every registration.
pub(crate) type Observer<T> = Box<dyn FnOnce(&Outcome<T>) -> HookResult + Send>;

/// Box a [`Handle`] into an [`Observer`].
pub(crate) fn observer_from_handle<T, H>(handle: H) -> Observer<T>
where
    T: 'static,
    H: Handle<T> + 'static,
{
    Box::new(move |outcome: &Outcome<T>| match outcome {
        Outcome::Resolved(value) => handle.resolved(value),
        Outcome::Failed(error) => handle.failed(error),
        Outcome::Cancelled(reason) => handle.cancelled(reason),
    })
}

/// Run one observer, containing whatever it does wrong.
///
/// Neither an `Err` nor a panic escapes: the caller may be halfway through
/// notifying the rest of the observer list.
pub(crate) fn fire<T>(id: CallbackId, observer: Observer<T>, outcome: &Outcome<T>) {
    match panic::catch_unwind(AssertUnwindSafe(|| observer(outcome))) {
        Ok(Ok(())) => {}
        Ok(Err(error)) => {
            warn!(callback = %id, state = ?outcome.state(), %error, "observer hook failed");
        }
        Err(payload) => {
            let error = Failure::from_panic(payload);
            warn!(callback = %id, state = ?outcome.state(), %error, "observer hook panicked");
        }
    }
}

/// Run a collaborator closure, turning both its error and any panic into a
/// [`Failure`].
pub(crate) fn guard<R, E, F>(f: F) -> Result<R, Failure>
where
    F: FnOnce() -> Result<R, E>,
    E: Into<Failure>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result.map_err(Into::into),
        Err(payload) => Err(Failure::from_panic(payload)),
    }
}
