//! Session guards.
//!
//! [`guard`] wraps a function that runs against an externally owned session
//! (a transaction handle, a unit of work, a lease). The function receives a
//! [`Check`]; reporting an error through it invokes the caller's *catcher*
//! with the session and the error, before the error propagates. A typical
//! catcher rolls the transaction back.
//!
//! Only the business logic decides what is guard-worthy: the catcher fires
//! for errors reported through [`Check`] and for nothing else. In
//! particular a panic inside the wrapped function is converted into an error
//! (as with [`catch`](crate::catch)) but does **not** reach the catcher.
//!
//! # Example
//!
//! ```
//! use std::cell::Cell;
//! use undertow::{guard, BoxError};
//!
//! struct Tx {
//!     rolled_back: Cell<bool>,
//! }
//!
//! let transfer = guard(
//!     |_: &(), check, amount: i64, _tx: &Tx| -> Result<i64, BoxError> {
//!         let balance = check.result(if amount > 100 {
//!             Err("insufficient funds".into())
//!         } else {
//!             Ok(100 - amount)
//!         })?;
//!         Ok(balance)
//!     },
//!     |tx: &Tx, _err: &BoxError| tx.rolled_back.set(true),
//! );
//!
//! let tx = Tx { rolled_back: Cell::new(false) };
//! assert_eq!(transfer(&(), 40, &tx).unwrap(), 60);
//! assert!(!tx.rolled_back.get());
//!
//! assert!(transfer(&(), 500, &tx).is_err());
//! assert!(tx.rolled_back.get());
//! ```

use std::fmt;

use crate::catch::{guarded, Unwound};
use crate::error::PanicError;

/// Handle the wrapped function uses to report guard-worthy errors.
///
/// Each report invokes the catcher once with the session and the error.
pub struct Check<'a, S: ?Sized, E> {
    session: &'a S,
    catcher: &'a dyn Fn(&S, &E),
}

impl<S: ?Sized, E> fmt::Debug for Check<'_, S, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Check")
            .field("session", &"<session>")
            .field("catcher", &"<function>")
            .finish()
    }
}

impl<S: ?Sized, E> Check<'_, S, E> {
    /// Report `result` if it is an error.
    ///
    /// For `Err(e)` the catcher runs once with the session and `e`, and
    /// `true` is returned to tell the caller to stop and propagate. For
    /// `Ok` nothing happens and `false` is returned.
    pub fn check<T>(&self, result: &Result<T, E>) -> bool {
        match result {
            Ok(_) => false,
            Err(err) => {
                self.fire(err);
                true
            }
        }
    }

    /// Report `result` if it is an error and hand it back unchanged.
    ///
    /// Composes with `?`: `let row = check.result(query())?;`
    pub fn result<T>(&self, result: Result<T, E>) -> Result<T, E> {
        if let Err(err) = &result {
            self.fire(err);
        }
        result
    }

    /// Report `err` and hand it back: `return Err(check.trip(err));`
    pub fn trip(&self, err: E) -> E {
        self.fire(&err);
        err
    }

    fn fire(&self, err: &E) {
        #[cfg(feature = "tracing")]
        tracing::debug!("guard tripped, invoking catcher");
        (self.catcher)(self.session, err);
    }
}

/// Wrap `f` so that errors it reports through [`Check`] reach `catcher`.
///
/// The returned function takes the session by reference and passes the same
/// reference to `f` and to `catcher`, so changes the catcher makes through
/// interior mutability are visible to the caller afterwards.
///
/// - Returns of `f` pass through unchanged, whether or not `check` was used.
/// - A panic in `f` is converted into an error with the same payload policy
///   as [`catch`](crate::catch); the catcher is not invoked for it.
///
/// # Examples
///
/// ```
/// use std::cell::RefCell;
/// use undertow::{guard, BoxError};
///
/// let seen = RefCell::new(Vec::new());
///
/// let save = guard(
///     |_: &(), check, name: &'static str, _session: &str| -> Result<(), BoxError> {
///         if name.is_empty() {
///             return Err(check.trip("empty name".into()));
///         }
///         Ok(())
///     },
///     |session: &str, err: &BoxError| seen.borrow_mut().push(format!("{session}: {err}")),
/// );
///
/// assert!(save(&(), "alice", "tx-1").is_ok());
/// assert!(save(&(), "", "tx-2").is_err());
/// assert_eq!(*seen.borrow(), ["tx-2: empty name"]);
/// ```
pub fn guard<Ctx, I, O, E, S, F, C>(f: F, catcher: C) -> impl Fn(&Ctx, I, &S) -> Result<O, E>
where
    Ctx: ?Sized,
    S: ?Sized,
    F: Fn(&Ctx, &Check<'_, S, E>, I, &S) -> Result<O, E>,
    C: Fn(&S, &E),
    E: From<PanicError>,
    O: 'static,
{
    move |ctx: &Ctx, input: I, session: &S| {
        let check = Check {
            session,
            catcher: &catcher,
        };
        match guarded::<_, _, O>(|| f(ctx, &check, input, session)) {
            Ok(result) => result,
            Err(Unwound::Recovered(output)) => Ok(output),
            Err(Unwound::Panicked(err)) => Err(E::from(err)),
        }
    }
}
