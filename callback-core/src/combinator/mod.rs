//! Combinators
//!
//! Combinators build a new [`Callback`](crate::Callback) whose outcome is
//! derived from existing ones. All of them are methods or associated
//! functions on `Callback` itself:
//!
//! - [`Callback::reduce`](crate::Callback::reduce): fan in N children,
//!   buffering every outcome and reducing once at the end.
//! - [`Callback::reduce_stream`](crate::Callback::reduce_stream): fan in N
//!   children through a [`StreamReducer`], one outcome at a time.
//! - [`Callback::transform`](crate::Callback::transform): map a value with
//!   a plain function.
//! - [`Callback::transform_deferred`](crate::Callback::transform_deferred):
//!   map a value with a function that returns another callback.
//!
//! # Cancellation
//!
//! Every combinator wires cancellation back up the chain: cancelling the
//! callback it returns cancels the callbacks it was built from that are
//! still pending, and those cancel whatever they were built from in turn.
//! Back-references are weak, so the chain never keeps itself alive.
//!
//! # Collaborator errors
//!
//! Errors and panics raised by reducers and transformers are caught where
//! they are invoked and fail the combinator's own callback. They never
//! unwind into the thread that finished the source.

mod reduce;
mod stream;
mod transform;

pub use stream::StreamReducer;
