//! Error types surfaced by the callback core.

use std::any::Any;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use super::outcome::CancelReason;

/// Boxed error returned by collaborator closures (resolvers, transformers,
/// reducers and observer hooks).
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Result type of an observer hook.
pub type HookResult = Result<(), BoxError>;

/// The error stored in a failed callback.
///
/// Cloning is cheap; every observer of the callback sees the same
/// underlying error.
#[derive(Clone)]
pub struct Failure(Arc<dyn StdError + Send + Sync + 'static>);

impl Failure {
    /// Wrap any error.
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self(Arc::new(error))
    }

    /// A failure carrying only a message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new(Message(message.into()))
    }

    /// Build a failure from a caught panic payload.
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::new(Panicked(message))
    }

    /// Access the underlying error.
    pub fn inner(&self) -> &(dyn StdError + Send + Sync + 'static) {
        &*self.0
    }

    /// Attempt to downcast the underlying error to a concrete type.
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.0.downcast_ref::<E>()
    }

    /// True if both handles point at the same stored error.
    pub fn ptr_eq(&self, other: &Failure) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl From<BoxError> for Failure {
    fn from(error: BoxError) -> Self {
        Self(Arc::from(error))
    }
}

impl fmt::Debug for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Failure").field(&self.0).finish()
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl StdError for Failure {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.0.source()
    }
}

/// Plain message error behind [`Failure::msg`].
#[derive(Debug, Error)]
#[error("{0}")]
struct Message(String);

/// A collaborator closure panicked; the panic was caught and turned into a
/// failure of the callback it was computing.
#[derive(Debug, Clone, Error)]
#[error("panicked: {0}")]
pub struct Panicked(pub String);

/// Why a blocking wait on a callback did not produce a value.
#[derive(Debug, Clone, Error)]
pub enum GetError {
    /// The callback failed.
    #[error("callback failed: {0}")]
    Failed(Failure),

    /// The callback was cancelled.
    #[error("callback cancelled: {0}")]
    Cancelled(CancelReason),

    /// The waiting thread was interrupted before the callback finished.
    #[error("interrupted while waiting for callback")]
    Interrupted,

    /// The deadline passed before the callback finished.
    #[error("timed out while waiting for callback")]
    TimedOut,
}
