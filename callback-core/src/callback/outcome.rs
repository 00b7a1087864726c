//! Terminal outcomes and the reasons that accompany them.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::error::Failure;

/// Unique identifier for a callback.
///
/// Only used for diagnostics; it shows up as a field in trace output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallbackId(u64);

impl CallbackId {
    /// Generate a new unique callback ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for CallbackId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CallbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cb#{}", self.0)
    }
}

/// Why a callback was cancelled.
///
/// The core never inspects the reason; combinators pass it along untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CancelReason(Arc<str>);

impl CancelReason {
    pub fn new(message: impl Into<String>) -> Self {
        Self(Arc::from(message.into()))
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CancelReason {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for CancelReason {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

/// The terminal outcome of a callback.
#[derive(Debug, Clone)]
pub enum Outcome<T> {
    Resolved(T),
    Failed(Failure),
    Cancelled(CancelReason),
}

impl<T> Outcome<T> {
    /// The state tag matching this outcome.
    pub fn state(&self) -> CallbackState {
        match self {
            Outcome::Resolved(_) => CallbackState::Resolved,
            Outcome::Failed(_) => CallbackState::Failed,
            Outcome::Cancelled(_) => CallbackState::Cancelled,
        }
    }

    /// The resolved value, if any.
    pub fn value(&self) -> Option<&T> {
        match self {
            Outcome::Resolved(value) => Some(value),
            _ => None,
        }
    }
}

/// Observable state of a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackState {
    /// Not yet resolved, failed or cancelled.
    Ready,
    Resolved,
    Failed,
    Cancelled,
}

impl CallbackState {
    /// True for every state except [`CallbackState::Ready`].
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CallbackState::Ready)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_ids_are_unique() {
        let id1 = CallbackId::new();
        let id2 = CallbackId::new();
        assert_ne!(id1, id2);
        assert!(id1 < id2);
    }

    #[test]
    fn cancel_reason_carries_message() {
        let reason = CancelReason::from("query aborted");
        assert_eq!(reason.message(), "query aborted");
        assert_eq!(reason.to_string(), "query aborted");
        assert_eq!(reason, CancelReason::new(String::from("query aborted")));
    }

    #[test]
    fn outcome_state_tags() {
        assert_eq!(Outcome::Resolved(1).state(), CallbackState::Resolved);
        assert_eq!(
            Outcome::<i32>::Failed(Failure::msg("x")).state(),
            CallbackState::Failed
        );
        assert_eq!(
            Outcome::<i32>::Cancelled("y".into()).state(),
            CallbackState::Cancelled
        );
        assert!(!CallbackState::Ready.is_terminal());
        assert!(CallbackState::Cancelled.is_terminal());
    }
}
