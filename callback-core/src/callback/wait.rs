//! Blocking waits.
//!
//! Every callback carries a [`Gate`]: a flag and a condition variable that
//! the terminal transition opens exactly once. A [`Waiter`] parks on the
//! gate until it opens or an [`Interrupter`] handed out by the waiter
//! fires. Waiting registers nothing on the callback, so a timed-out or
//! interrupted wait leaves no trace behind, and a parked thread never holds
//! the callback's own lock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::cell::Callback;
use super::error::GetError;
use super::outcome::Outcome;

/// Opened once, when the owning callback finishes.
pub(crate) struct Gate {
    open: Mutex<bool>,
    wakeup: Condvar,
}

impl Gate {
    pub(super) fn new(open: bool) -> Self {
        Self {
            open: Mutex::new(open),
            wakeup: Condvar::new(),
        }
    }

    pub(super) fn open(&self) {
        *self.open.lock() = true;
        self.wakeup.notify_all();
    }

    /// Wake every parked waiter so it re-checks its interrupt flag.
    fn nudge(&self) {
        let _open = self.open.lock();
        self.wakeup.notify_all();
    }
}

/// A pending blocking wait on a callback.
pub struct Waiter<T> {
    callback: Callback<T>,
    gate: Arc<Gate>,
    interrupted: Arc<AtomicBool>,
}

/// Wakes a [`Waiter`] early, making it return [`GetError::Interrupted`].
#[derive(Clone)]
pub struct Interrupter {
    gate: Arc<Gate>,
    interrupted: Arc<AtomicBool>,
}

impl Interrupter {
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::Release);
        self.gate.nudge();
    }
}

impl<T> Callback<T>
where
    T: Send + Sync + 'static,
{
    /// Prepare a blocking wait.
    pub fn waiter(&self) -> Waiter<T> {
        Waiter {
            callback: self.clone(),
            gate: self.gate(),
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Block until the callback finishes and return its value.
    pub fn get(&self) -> Result<T, GetError>
    where
        T: Clone,
    {
        self.waiter().wait()
    }

    /// Like [`Callback::get`], giving up after `timeout`.
    ///
    /// A timeout leaves the callback itself untouched. A timeout too large
    /// to represent as a deadline waits without one.
    pub fn get_timeout(&self, timeout: Duration) -> Result<T, GetError>
    where
        T: Clone,
    {
        self.waiter().wait_timeout(timeout)
    }
}

impl<T> Waiter<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// A handle that can interrupt this wait from another thread.
    pub fn interrupter(&self) -> Interrupter {
        Interrupter {
            gate: Arc::clone(&self.gate),
            interrupted: Arc::clone(&self.interrupted),
        }
    }

    fn interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Acquire)
    }

    /// Block until the callback finishes or the wait is interrupted.
    pub fn wait(self) -> Result<T, GetError> {
        {
            let mut open = self.gate.open.lock();
            while !*open && !self.interrupted() {
                self.gate.wakeup.wait(&mut open);
            }
        }
        self.take()
    }

    /// Block until the callback finishes, the wait is interrupted, or
    /// `timeout` elapses.
    pub fn wait_timeout(self, timeout: Duration) -> Result<T, GetError> {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return self.wait();
        };
        {
            let mut open = self.gate.open.lock();
            while !*open && !self.interrupted() {
                if self.gate.wakeup.wait_until(&mut open, deadline).timed_out() {
                    break;
                }
            }
        }
        match self.take() {
            Err(GetError::Interrupted) if !self.interrupted() => Err(GetError::TimedOut),
            other => other,
        }
    }

    /// Read the outcome; a finished callback wins over an interruption.
    fn take(&self) -> Result<T, GetError> {
        match self.callback.outcome().as_deref() {
            Some(Outcome::Resolved(value)) => Ok(value.clone()),
            Some(Outcome::Failed(error)) => Err(GetError::Failed(error.clone())),
            Some(Outcome::Cancelled(reason)) => Err(GetError::Cancelled(reason.clone())),
            None => Err(GetError::Interrupted),
        }
    }
}
