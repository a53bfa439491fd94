//! # Undertow
//!
//! > *"What pulls you under never shows on the surface"*
//!
//! Panic-safe function wrappers that give every fallible call the same
//! shape: `(ctx, input) -> result`, no matter how it failed.
//!
//! ## Wrappers
//!
//! - [`catch`] - a panic inside the wrapped function comes back as an error
//!   whose text contains `"panic caught"` and which keeps the original
//!   error as its cause.
//! - [`with`] - the wrapped function registers resources with a
//!   [`Capture`]; they are released when it finishes, on every path, and
//!   every failure (execution, release, panic) is reported together.
//! - [`guard`] - the wrapped function reports guard-worthy errors through a
//!   [`Check`], which runs a caller-supplied catcher against the session
//!   (for example to roll back a transaction) before the error propagates.
//!
//! Each wrapper runs the wrapped call synchronously on the caller's thread
//! and keeps no state between calls, so wrapped functions can be shared
//! across threads when the wrapped closure can.
//!
//! ## Quick Example
//!
//! ```rust
//! use undertow::{with, BoxError, CauseExt};
//! use undertow::testing::{MockReleaseError, MockResource};
//!
//! let file = MockResource::failing("close failed");
//!
//! let read = with(|_: &(), capture, len: usize| {
//!     capture.capture(&file);
//!     Ok::<_, BoxError>(vec![0u8; len])
//! });
//!
//! let outcome = read(&(), 4);
//!
//! // The output is usable even though releasing the file failed.
//! assert_eq!(outcome.output.len(), 4);
//! assert!(outcome
//!     .error
//!     .unwrap()
//!     .has_cause(&MockReleaseError::new("close failed")));
//! ```
//!
//! ## Features
//!
//! - `tracing` - emit `tracing` events when a panic is converted, when a
//!   release fails and when a guard invokes its catcher.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod catch;
pub mod error;
pub mod guard;
pub mod scope;
pub mod testing;

// Re-exports
pub use catch::{catch, catch_future, raise};
pub use error::{join, BoxError, CauseExt, Causes, JoinedError, PanicError, PANIC_CAUGHT};
pub use guard::{guard, Check};
pub use scope::{release_fn, with, Capture, Outcome, Release, ReleaseFn};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::catch::{catch, catch_future, raise};
    pub use crate::error::{BoxError, CauseExt, JoinedError, PanicError};
    pub use crate::guard::{guard, Check};
    pub use crate::scope::{release_fn, with, Capture, Outcome, Release};
}
