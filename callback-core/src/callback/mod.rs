//! Result Cells
//!
//! This module implements [`Callback`], the single-assignment asynchronous
//! result the rest of the crate is built from, together with its observer
//! protocol and blocking wait.
//!
//! # Concepts
//!
//! ## States
//!
//! A callback starts out ready (pending) and moves exactly once to one of
//! three terminal states: resolved with a value, failed with a [`Failure`],
//! or cancelled with a [`CancelReason`]. Whichever of `resolve`, `fail` or
//! `cancel` gets there first wins; the others are silently ignored.
//!
//! ## Observers
//!
//! Observers are one-shot hooks attached with `register`,
//! `register_finish` or `register_cancel`. Observers attached while the
//! callback is pending run in registration order on the thread that
//! finishes it. Observers attached afterwards run immediately on the
//! registering thread.
//!
//! ## Links
//!
//! [`Callback::link`] ties two callbacks together so that whichever
//! finishes first finishes the other. This is how cancelling the callback a
//! consumer holds unwinds the work it was built from.

mod cell;
mod error;
mod handle;
mod outcome;
mod wait;

pub use cell::{Callback, WeakCallback};
pub use error::{BoxError, Failure, GetError, HookResult, Panicked};
pub use handle::Handle;
pub use outcome::{CallbackId, CallbackState, CancelReason, Outcome};
pub use wait::{Interrupter, Waiter};

pub(crate) use handle::guard;
