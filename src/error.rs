//! Error types produced by the wrappers.
//!
//! Every wrapper in this crate reports failure through one of three shapes:
//!
//! - [`PanicError`] - a panic intercepted at the wrapper boundary. Its text
//!   always contains `"panic caught"`, and it keeps the original error when
//!   the panic payload was one (see [`raise`](crate::raise)).
//! - [`JoinedError`] - several independent failures (execution error,
//!   release errors, panic) reported together.
//! - Any caller error, passed through untouched.
//!
//! [`CauseExt`] walks all of them, so a caller can ask whether a specific
//! error is somewhere among the causes without knowing how it was wrapped.
//!
//! # Example
//!
//! ```
//! use std::fmt;
//! use undertow::{join, BoxError, CauseExt};
//!
//! #[derive(Debug, PartialEq)]
//! struct Closed(&'static str);
//!
//! impl fmt::Display for Closed {
//!     fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
//!         write!(f, "{} closed", self.0)
//!     }
//! }
//!
//! impl std::error::Error for Closed {}
//!
//! let joined = join(vec![
//!     Box::new(Closed("socket")) as BoxError,
//!     Box::new(Closed("file")) as BoxError,
//! ])
//! .unwrap();
//!
//! assert!(joined.has_cause(&Closed("socket")));
//! assert!(joined.has_cause(&Closed("file")));
//! assert!(!joined.has_cause(&Closed("pipe")));
//! ```

use std::any::Any;
use std::error::Error as StdError;
use std::fmt;

/// Type-erased error used wherever failures from different sources meet.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Marker placed at the start of every panic-derived error message.
pub const PANIC_CAUGHT: &str = "panic caught";

/// A panic converted into an error value.
///
/// Created by the wrappers when the wrapped function panics instead of
/// returning. The panic payload decides the shape:
///
/// - an error payload (see [`raise`](crate::raise)) is kept as the
///   [`source`](StdError::source) of this error, so
///   [`CauseExt::has_cause`] still finds it;
/// - a `&str` or `String` payload becomes the message;
/// - anything else is reported as `Box<dyn Any>`.
///
/// # Examples
///
/// ```
/// use undertow::PanicError;
///
/// let err = PanicError::from_message("boom");
/// assert_eq!(err.to_string(), "panic caught: boom");
/// assert_eq!(err.message(), Some("boom"));
/// assert!(err.cause().is_none());
/// ```
#[derive(Debug)]
pub struct PanicError {
    payload: Payload,
}

#[derive(Debug)]
enum Payload {
    Message(String),
    Cause(BoxError),
}

impl PanicError {
    /// Create a panic error from a free-form panic message.
    pub fn from_message(message: impl Into<String>) -> Self {
        PanicError {
            payload: Payload::Message(message.into()),
        }
    }

    /// Create a panic error that wraps the error the code panicked with.
    pub fn from_cause(cause: impl Into<BoxError>) -> Self {
        PanicError {
            payload: Payload::Cause(cause.into()),
        }
    }

    /// Convert a raw panic payload, as returned by
    /// [`std::panic::catch_unwind`], into a panic error.
    pub fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        let payload = match payload.downcast::<PanicError>() {
            Ok(err) => return *err,
            Err(payload) => payload,
        };
        let payload = match payload.downcast::<BoxError>() {
            Ok(cause) => return PanicError::from_cause(*cause),
            Err(payload) => payload,
        };
        let payload = match payload.downcast::<&'static str>() {
            Ok(message) => return PanicError::from_message(*message),
            Err(payload) => payload,
        };
        match payload.downcast::<String>() {
            Ok(message) => PanicError::from_message(*message),
            Err(_) => PanicError::from_message("Box<dyn Any>"),
        }
    }

    /// The panic message, if the panic carried text rather than an error.
    pub fn message(&self) -> Option<&str> {
        match &self.payload {
            Payload::Message(message) => Some(message),
            Payload::Cause(_) => None,
        }
    }

    /// The error the code panicked with, if any.
    pub fn cause(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        match &self.payload {
            Payload::Cause(cause) => Some(&**cause),
            Payload::Message(_) => None,
        }
    }

    /// Consume the panic error and return the wrapped cause, if any.
    pub fn into_cause(self) -> Option<BoxError> {
        match self.payload {
            Payload::Cause(cause) => Some(cause),
            Payload::Message(_) => None,
        }
    }
}

impl fmt::Display for PanicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.payload {
            Payload::Message(message) => write!(f, "{}: {}", PANIC_CAUGHT, message),
            Payload::Cause(cause) => write!(f, "{}: {}", PANIC_CAUGHT, cause),
        }
    }
}

impl StdError for PanicError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match &self.payload {
            Payload::Cause(cause) => Some(&**cause),
            Payload::Message(_) => None,
        }
    }
}

/// Several errors reported as one.
///
/// Constituents keep the order they were collected in. Use
/// [`CauseExt`] to look for a particular error among them, or
/// [`errors`](JoinedError::errors) to inspect them directly.
///
/// Built by [`join`] only when there are at least two errors; a single
/// error is never wrapped.
#[derive(Debug)]
pub struct JoinedError {
    errors: Vec<BoxError>,
}

impl JoinedError {
    /// The joined errors, in collection order.
    pub fn errors(&self) -> &[BoxError] {
        &self.errors
    }

    /// Consume the joined error and return its constituents.
    pub fn into_errors(self) -> Vec<BoxError> {
        self.errors
    }
}

impl fmt::Display for JoinedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, err) in self.errors.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}

// Constituents are reached through `CauseExt`, not through `source()`:
// there is no single "underlying" error to point at.
impl StdError for JoinedError {}

/// Combine errors into at most one.
///
/// - no errors: `None`
/// - one error: that error, unchanged
/// - several: a [`JoinedError`] holding all of them in order
///
/// # Examples
///
/// ```
/// use undertow::{join, BoxError};
///
/// assert!(join(Vec::<BoxError>::new()).is_none());
///
/// let single = join(vec![BoxError::from("only")]).unwrap();
/// assert_eq!(single.to_string(), "only");
///
/// let joined = join(vec![BoxError::from("first"), BoxError::from("second")]).unwrap();
/// assert_eq!(joined.to_string(), "first\nsecond");
/// ```
pub fn join<I>(errors: I) -> Option<BoxError>
where
    I: IntoIterator<Item = BoxError>,
{
    let mut errors: Vec<BoxError> = errors.into_iter().collect();
    match errors.len() {
        0 => None,
        1 => errors.pop(),
        _ => Some(Box::new(JoinedError { errors })),
    }
}

/// Iterator over an error and everything it wraps.
///
/// Yields the error itself, then walks [`JoinedError`] constituents in order
/// and follows every [`source`](StdError::source) chain depth-first.
#[derive(Debug)]
pub struct Causes<'a> {
    stack: Vec<&'a (dyn StdError + 'static)>,
}

impl<'a> Causes<'a> {
    fn new(err: &'a (dyn StdError + 'static)) -> Self {
        Causes { stack: vec![err] }
    }
}

impl<'a> Iterator for Causes<'a> {
    type Item = &'a (dyn StdError + 'static);

    fn next(&mut self) -> Option<Self::Item> {
        let err = self.stack.pop()?;
        if let Some(joined) = err.downcast_ref::<JoinedError>() {
            for inner in joined.errors.iter().rev() {
                let inner: &'a (dyn StdError + 'static) = &**inner;
                self.stack.push(inner);
            }
        } else if let Some(source) = err.source() {
            self.stack.push(source);
        }
        Some(err)
    }
}

/// Cause inspection for errors, including [`BoxError`] and joined errors.
///
/// Implemented for every concrete error type and for the `dyn Error` trait
/// objects, so it works on whatever a wrapper returns.
pub trait CauseExt {
    /// Iterate over this error and every error it wraps.
    fn causes(&self) -> Causes<'_>;

    /// Find the first cause of type `T`.
    fn find_cause<T: StdError + 'static>(&self) -> Option<&T> {
        self.causes().find_map(|err| err.downcast_ref::<T>())
    }

    /// Returns true if an error equal to `target` is among the causes.
    fn has_cause<T: StdError + PartialEq + 'static>(&self, target: &T) -> bool {
        self.causes()
            .any(|err| err.downcast_ref::<T>().is_some_and(|found| found == target))
    }
}

impl CauseExt for dyn StdError + 'static {
    fn causes(&self) -> Causes<'_> {
        Causes::new(self)
    }
}

impl CauseExt for dyn StdError + Send + Sync + 'static {
    fn causes(&self) -> Causes<'_> {
        Causes::new(self)
    }
}

impl<E: StdError + 'static> CauseExt for E {
    fn causes(&self) -> Causes<'_> {
        Causes::new(self)
    }
}
