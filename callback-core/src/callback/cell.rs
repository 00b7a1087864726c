//! The callback cell.
//!
//! A [`Callback`] is a single-assignment slot guarded by a mutex. While
//! pending, the slot holds the ordered list of observers; the first of
//! `resolve`, `fail` or `cancel` swaps that list out for the shared outcome
//! and then notifies each observer with the lock released. Anything that
//! registers afterwards finds the outcome in place and is notified on its
//! own thread before `register` returns.
//!
//! # Thread Safety
//!
//! The swap from pending to terminal happens under the cell's lock, so
//! exactly one caller wins it. No lock is held while observer code runs,
//! which lets observers freely resolve, cancel or register on other cells
//! (including this one) without deadlocking.
//!
//! # Ownership
//!
//! Cloning a `Callback` shares the cell. Links created by [`Callback::link`]
//! and by the combinators point back up the chain through [`WeakCallback`],
//! so a cancelled, dropped chain does not keep itself alive.
//!
//! # Chain Depth
//!
//! An outcome travels down (and a cancellation back up) a chain by
//! recursion, one nested observer call per link. Chains a few thousand
//! links deep fit the default 2 MiB thread stack; deeper chains need a
//! thread with a larger stack.

use std::fmt::{self, Debug};
use std::mem;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::trace;

use super::error::{Failure, HookResult};
use super::handle::{fire, observer_from_handle, Handle, Observer};
use super::outcome::{CallbackId, CallbackState, CancelReason, Outcome};
use super::wait::Gate;

/// Cell contents: either waiting observers or the final outcome.
enum State<T> {
    Pending(SmallVec<[Observer<T>; 2]>),
    Done(Arc<Outcome<T>>),
}

struct Inner<T> {
    id: CallbackId,
    state: Mutex<State<T>>,
    gate: Arc<Gate>,
}

/// A single-assignment asynchronous result.
///
/// # Example
///
/// ```rust
/// use callback_core::Callback;
///
/// let callback = Callback::new();
/// let doubled = callback.transform(|v: &i32| Ok(v * 2));
///
/// callback.resolve(21);
/// assert_eq!(doubled.get().unwrap(), 42);
/// ```
pub struct Callback<T> {
    inner: Arc<Inner<T>>,
}

/// A non-owning reference to a [`Callback`].
pub struct WeakCallback<T> {
    inner: Weak<Inner<T>>,
}

impl<T> Callback<T>
where
    T: Send + Sync + 'static,
{
    /// Create a new pending callback.
    pub fn new() -> Self {
        Self::with_state(State::Pending(SmallVec::new()))
    }

    /// Create a callback that is already resolved with `value`.
    pub fn resolved(value: T) -> Self {
        Self::with_state(State::Done(Arc::new(Outcome::Resolved(value))))
    }

    /// Create a callback that has already failed with `error`.
    pub fn failed(error: impl Into<Failure>) -> Self {
        Self::with_state(State::Done(Arc::new(Outcome::Failed(error.into()))))
    }

    /// Create a callback that has already been cancelled.
    pub fn cancelled(reason: impl Into<CancelReason>) -> Self {
        Self::with_state(State::Done(Arc::new(Outcome::Cancelled(reason.into()))))
    }

    fn with_state(state: State<T>) -> Self {
        let gate = Arc::new(Gate::new(matches!(state, State::Done(_))));
        Self {
            inner: Arc::new(Inner {
                id: CallbackId::new(),
                state: Mutex::new(state),
                gate,
            }),
        }
    }

    /// Get the callback's unique ID.
    pub fn id(&self) -> CallbackId {
        self.inner.id
    }

    /// Resolve with `value`.
    ///
    /// Returns `true` if this call moved the callback out of the ready
    /// state. Later calls to any terminal verb are ignored.
    pub fn resolve(&self, value: T) -> bool {
        self.complete(Outcome::Resolved(value))
    }

    /// Fail with `error`. Same one-shot rules as [`Callback::resolve`].
    pub fn fail(&self, error: impl Into<Failure>) -> bool {
        self.complete(Outcome::Failed(error.into()))
    }

    /// Cancel with `reason`. Same one-shot rules as [`Callback::resolve`].
    pub fn cancel(&self, reason: impl Into<CancelReason>) -> bool {
        self.complete(Outcome::Cancelled(reason.into()))
    }

    /// Attempt the terminal transition and notify observers if it wins.
    pub(crate) fn complete(&self, outcome: Outcome<T>) -> bool {
        let outcome = Arc::new(outcome);
        let observers = {
            let mut state = self.inner.state.lock();
            match mem::replace(&mut *state, State::Done(Arc::clone(&outcome))) {
                State::Pending(observers) => observers,
                done @ State::Done(_) => {
                    *state = done;
                    return false;
                }
            }
        };

        trace!(
            callback = %self.inner.id,
            state = ?outcome.state(),
            observers = observers.len(),
            "callback finished"
        );

        self.inner.gate.open();

        for observer in observers {
            fire(self.inner.id, observer, &outcome);
        }
        true
    }

    /// Forward a terminal outcome, cloning the value.
    pub(crate) fn complete_from(&self, outcome: &Outcome<T>) -> bool
    where
        T: Clone,
    {
        self.complete(outcome.clone())
    }

    /// Propagate a failure or cancellation; a resolution is ignored.
    pub(crate) fn complete_unresolved<U>(&self, outcome: &Outcome<U>) -> bool {
        match outcome {
            Outcome::Resolved(_) => false,
            Outcome::Failed(error) => self.fail(error.clone()),
            Outcome::Cancelled(reason) => self.cancel(reason.clone()),
        }
    }

    /// True while the callback has not been resolved, failed or cancelled.
    ///
    /// Work scheduled to produce this callback's value should check this
    /// first; a `false` means the result would be discarded.
    pub fn is_ready(&self) -> bool {
        matches!(*self.inner.state.lock(), State::Pending(_))
    }

    /// Current state.
    pub fn state(&self) -> CallbackState {
        match &*self.inner.state.lock() {
            State::Pending(_) => CallbackState::Ready,
            State::Done(outcome) => outcome.state(),
        }
    }

    /// The terminal outcome, if the callback has finished.
    pub fn outcome(&self) -> Option<Arc<Outcome<T>>> {
        match &*self.inner.state.lock() {
            State::Pending(_) => None,
            State::Done(outcome) => Some(Arc::clone(outcome)),
        }
    }

    /// The gate blocking waits park on.
    pub(super) fn gate(&self) -> Arc<Gate> {
        Arc::clone(&self.inner.gate)
    }

    /// Attach an observer.
    ///
    /// If the callback has already finished, the observer runs right here
    /// on the calling thread. Otherwise it runs on whichever thread finishes
    /// the callback, after every observer registered before it.
    pub(crate) fn observe(&self, observer: Observer<T>) {
        let outcome = {
            let mut state = self.inner.state.lock();
            match &mut *state {
                State::Pending(observers) => {
                    observers.push(observer);
                    trace!(callback = %self.inner.id, observers = observers.len(), "observer registered");
                    return;
                }
                State::Done(outcome) => Arc::clone(outcome),
            }
        };
        fire(self.inner.id, observer, &outcome);
    }

    /// Register a handle with one hook per terminal outcome.
    pub fn register<H>(&self, handle: H) -> &Self
    where
        H: Handle<T> + 'static,
    {
        self.observe(observer_from_handle(handle));
        self
    }

    /// Register a function fired once the callback finishes, whatever the
    /// outcome.
    pub fn register_finish<F>(&self, finish: F) -> &Self
    where
        F: FnOnce() -> HookResult + Send + 'static,
    {
        self.observe(Box::new(move |_: &Outcome<T>| finish()));
        self
    }

    /// Register a function fired only if the callback is cancelled.
    pub fn register_cancel<F>(&self, cancelled: F) -> &Self
    where
        F: FnOnce(&CancelReason) -> HookResult + Send + 'static,
    {
        self.observe(Box::new(move |outcome: &Outcome<T>| match outcome {
            Outcome::Cancelled(reason) => cancelled(reason),
            _ => Ok(()),
        }));
        self
    }

    /// Make this callback and `other` depend on each other.
    ///
    /// Whichever finishes first finishes the other with the same outcome, so
    /// cancelling a consumer-facing callback tears down the one it was
    /// linked to, and vice versa.
    ///
    /// `self` holds `other` until `self` finishes, so whatever hangs off
    /// `other` is still notified after the caller drops it. `other` only
    /// points back weakly.
    pub fn link(&self, other: &Callback<T>) -> &Self
    where
        T: Clone,
    {
        let downstream = other.clone();
        self.observe(Box::new(move |outcome: &Outcome<T>| {
            downstream.complete_from(outcome);
            Ok(())
        }));

        let upstream = self.downgrade();
        other.observe(Box::new(move |outcome: &Outcome<T>| {
            if let Some(this) = upstream.upgrade() {
                this.complete_from(outcome);
            }
            Ok(())
        }));

        self
    }

    /// Create a weak reference to this callback.
    pub fn downgrade(&self) -> WeakCallback<T> {
        WeakCallback {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Number of observers still waiting. Zero once finished.
    pub fn pending_observers(&self) -> usize {
        match &*self.inner.state.lock() {
            State::Pending(observers) => observers.len(),
            State::Done(_) => 0,
        }
    }
}

impl<T> WeakCallback<T> {
    /// Upgrade to a strong reference if the callback is still alive.
    pub fn upgrade(&self) -> Option<Callback<T>> {
        self.inner.upgrade().map(|inner| Callback { inner })
    }

    /// True if the callback has been dropped.
    pub fn is_dropped(&self) -> bool {
        self.inner.strong_count() == 0
    }
}

impl<T> Clone for Callback<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Clone for WeakCallback<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<T> Default for Callback<T>
where
    T: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PartialEq for Callback<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Eq for Callback<T> {}

impl<T> Debug for Callback<T>
where
    T: Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("pending_observers", &self.pending_observers())
            .finish()
    }
}

impl<T> Debug for WeakCallback<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakCallback")
            .field("dropped", &self.is_dropped())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;

    /// Records every hook invocation as a string.
    #[derive(Clone, Default)]
    struct Log(Arc<PlMutex<Vec<String>>>);

    impl Log {
        fn push(&self, entry: impl Into<String>) {
            self.0.lock().push(entry.into());
        }

        fn entries(&self) -> Vec<String> {
            self.0.lock().clone()
        }
    }

    struct Tagged(Log, &'static str);

    impl Handle<i32> for Tagged {
        fn resolved(self, value: &i32) -> HookResult {
            self.0.push(format!("{}:resolved:{}", self.1, value));
            Ok(())
        }

        fn failed(self, error: &Failure) -> HookResult {
            self.0.push(format!("{}:failed:{}", self.1, error));
            Ok(())
        }

        fn cancelled(self, reason: &CancelReason) -> HookResult {
            self.0.push(format!("{}:cancelled:{}", self.1, reason));
            Ok(())
        }
    }

    #[test]
    fn new_callback_is_ready() {
        let callback = Callback::<i32>::new();
        assert!(callback.is_ready());
        assert_eq!(callback.state(), CallbackState::Ready);
        assert!(callback.outcome().is_none());
    }

    #[test]
    fn only_first_transition_wins() {
        let callback = Callback::new();
        assert!(callback.resolve(1));
        assert!(!callback.resolve(2));
        assert!(!callback.fail(Failure::msg("late")));
        assert!(!callback.cancel("late"));

        assert_eq!(callback.state(), CallbackState::Resolved);
        assert_eq!(callback.outcome().unwrap().value(), Some(&1));
    }

    #[test]
    fn resolve_after_fail_is_ignored() {
        let log = Log::default();
        let callback = Callback::new();
        callback.register(Tagged(log.clone(), "a"));

        callback.fail(Failure::msg("boom"));
        callback.resolve(5);

        assert_eq!(log.entries(), vec!["a:failed:boom"]);
        assert_eq!(callback.state(), CallbackState::Failed);
    }

    #[test]
    fn observers_fire_in_registration_order() {
        let log = Log::default();
        let callback = Callback::new();
        callback
            .register(Tagged(log.clone(), "a"))
            .register(Tagged(log.clone(), "b"))
            .register(Tagged(log.clone(), "c"));
        assert_eq!(callback.pending_observers(), 3);
        assert!(log.entries().is_empty());

        callback.resolve(9);
        assert_eq!(
            log.entries(),
            vec!["a:resolved:9", "b:resolved:9", "c:resolved:9"]
        );
        assert_eq!(callback.pending_observers(), 0);
    }

    #[test]
    fn late_registration_fires_synchronously() {
        let log = Log::default();
        let callback = Callback::cancelled("shutdown");

        callback.register(Tagged(log.clone(), "a"));
        assert_eq!(log.entries(), vec!["a:cancelled:shutdown"]);

        callback.register(Tagged(log.clone(), "b"));
        assert_eq!(
            log.entries(),
            vec!["a:cancelled:shutdown", "b:cancelled:shutdown"]
        );
    }

    #[test]
    fn finish_and_cancel_only_registrations() {
        let finished = Arc::new(AtomicUsize::new(0));
        let cancelled = Arc::new(AtomicUsize::new(0));

        let resolved = Callback::new();
        let f = finished.clone();
        let c = cancelled.clone();
        resolved
            .register_finish(move || {
                f.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .register_cancel(move |_| {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        resolved.resolve(1);
        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert_eq!(cancelled.load(Ordering::SeqCst), 0);

        let aborted = Callback::<i32>::new();
        let c = cancelled.clone();
        aborted.register_cancel(move |reason| {
            assert_eq!(reason.message(), "user abort");
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        aborted.cancel("user abort");
        assert_eq!(cancelled.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failing_hook_does_not_stop_others() {
        let log = Log::default();
        let callback = Callback::new();
        callback.register_finish(|| Err("first hook broke".into()));
        callback.register_finish(|| panic!("second hook panicked"));
        callback.register(Tagged(log.clone(), "c"));

        assert!(callback.resolve(3));
        assert_eq!(log.entries(), vec!["c:resolved:3"]);
    }

    #[test]
    fn observer_may_touch_its_own_callback() {
        let callback = Callback::new();
        let inner = callback.clone();
        let log = Log::default();
        let nested = log.clone();
        callback.register_finish(move || {
            // Re-entrant calls from inside a hook must not deadlock.
            assert!(!inner.resolve(2));
            inner.register(Tagged(nested, "nested"));
            Ok(())
        });

        callback.resolve(1);
        assert_eq!(log.entries(), vec!["nested:resolved:1"]);
    }

    #[test]
    fn link_propagates_both_ways() {
        let upstream = Callback::new();
        let downstream = Callback::new();
        upstream.link(&downstream);
        upstream.resolve(4);
        assert_eq!(downstream.outcome().unwrap().value(), Some(&4));

        let upstream = Callback::<i32>::new();
        let downstream = Callback::new();
        upstream.link(&downstream);
        downstream.cancel("consumer gone");
        assert_eq!(upstream.state(), CallbackState::Cancelled);

        let upstream = Callback::<i32>::new();
        let downstream = Callback::new();
        upstream.link(&downstream);
        downstream.fail(Failure::msg("bad"));
        assert_eq!(upstream.state(), CallbackState::Failed);
    }

    #[test]
    fn link_to_finished_callback_completes_immediately() {
        let finished = Callback::resolved(8);
        let pending = Callback::new();
        pending.link(&finished);
        assert_eq!(pending.outcome().unwrap().value(), Some(&8));
        assert_eq!(finished.outcome().unwrap().value(), Some(&8));
    }

    #[test]
    fn link_resolves_through_dropped_handle() {
        let upstream = Callback::<i32>::new();
        let (weak, mapped) = {
            let downstream = Callback::new();
            upstream.link(&downstream);
            (downstream.downgrade(), downstream.transform(|v| Ok(*v + 1)))
        };

        // Held by the link until upstream finishes.
        assert!(!weak.is_dropped());

        assert!(upstream.resolve(1));
        assert_eq!(mapped.state(), CallbackState::Resolved);
        assert_eq!(mapped.get().unwrap(), 2);
        assert!(weak.is_dropped());
    }

    #[test]
    fn link_does_not_keep_upstream_alive() {
        let downstream = Callback::<i32>::new();
        let weak = {
            let upstream = Callback::new();
            upstream.link(&downstream);
            upstream.downgrade()
        };
        assert!(weak.is_dropped());
        assert!(downstream.cancel("nobody upstream"));
    }

    #[test]
    fn concurrent_transitions_have_one_winner() {
        const THREADS: usize = 16;

        for _ in 0..50 {
            let callback = Callback::new();
            let notified = Arc::new(AtomicUsize::new(0));
            let n = notified.clone();
            callback.register_finish(move || {
                n.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });

            let barrier = Arc::new(Barrier::new(THREADS));
            let handles: Vec<_> = (0..THREADS)
                .map(|i| {
                    let callback = callback.clone();
                    let barrier = barrier.clone();
                    thread::spawn(move || {
                        barrier.wait();
                        match i % 3 {
                            0 => callback.resolve(i as i32),
                            1 => callback.fail(Failure::msg("racer")),
                            _ => callback.cancel("racer"),
                        }
                    })
                })
                .collect();

            let winners = handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|won| *won)
                .count();

            assert_eq!(winners, 1);
            assert_eq!(notified.load(Ordering::SeqCst), 1);
            assert!(callback.state().is_terminal());
        }
    }

    #[test]
    fn concurrent_registration_never_loses_an_observer() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 100;

        let callback = Callback::new();
        let notified = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(THREADS + 1));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let callback = callback.clone();
                let notified = notified.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    for _ in 0..PER_THREAD {
                        let n = notified.clone();
                        callback.register_finish(move || {
                            n.fetch_add(1, Ordering::SeqCst);
                            Ok(())
                        });
                    }
                })
            })
            .collect();

        barrier.wait();
        callback.resolve(1);
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(notified.load(Ordering::SeqCst), THREADS * PER_THREAD);
    }
}
