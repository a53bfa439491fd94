//! Resource scopes with guaranteed release.
//!
//! [`with`] wraps a function that acquires resources while it runs. The
//! function registers each resource with the [`Capture`] it is handed; once
//! the function has finished, whether it returned `Ok`, returned `Err` or
//! panicked, every registered resource is released exactly once, in
//! registration order.
//!
//! All failures of one invocation are reported together in an [`Outcome`]:
//!
//! - the execution error, or the [`PanicError`] if the function panicked,
//! - then every release error, in registration order.
//!
//! A single failure is returned as is; several are combined into a
//! [`JoinedError`](crate::JoinedError). Nothing is dropped.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use undertow::{release_fn, with, BoxError};
//!
//! struct Connection;
//!
//! impl Connection {
//!     fn query(&self, id: u32) -> u32 {
//!         id * 10
//!     }
//! }
//!
//! let fetch = with(|_: &(), capture, id: u32| {
//!     let conn = Arc::new(Connection);
//!     capture.capture(release_fn(|| Err::<(), BoxError>("close failed".into())));
//!     Ok::<_, BoxError>(conn.query(id))
//! });
//!
//! let outcome = fetch(&(), 10);
//! // The output survives the failed release.
//! assert_eq!(outcome.output, 100);
//! assert_eq!(outcome.error.unwrap().to_string(), "close failed");
//! ```

use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::Arc;

use crate::catch::{guarded, Unwound};
use crate::error::{join, BoxError, PanicError};

/// A resource that must be released at the end of a scope.
///
/// The only required capability is a release operation that may fail.
/// Release takes `&self` so shared handles (`Arc`, `Rc`, references) can be
/// registered while the business logic keeps using the resource.
///
/// # Example
///
/// ```
/// use std::cell::Cell;
/// use undertow::Release;
///
/// struct Lock {
///     held: Cell<bool>,
/// }
///
/// impl Release for Lock {
///     type Error = std::io::Error;
///
///     fn release(&self) -> Result<(), Self::Error> {
///         self.held.set(false);
///         Ok(())
///     }
/// }
/// ```
pub trait Release {
    /// Error returned when release fails.
    type Error: Into<BoxError>;

    /// Release the resource.
    fn release(&self) -> Result<(), Self::Error>;
}

impl<R: Release + ?Sized> Release for &R {
    type Error = R::Error;

    fn release(&self) -> Result<(), Self::Error> {
        (**self).release()
    }
}

impl<R: Release + ?Sized> Release for Box<R> {
    type Error = R::Error;

    fn release(&self) -> Result<(), Self::Error> {
        (**self).release()
    }
}

impl<R: Release + ?Sized> Release for Rc<R> {
    type Error = R::Error;

    fn release(&self) -> Result<(), Self::Error> {
        (**self).release()
    }
}

impl<R: Release + ?Sized> Release for Arc<R> {
    type Error = R::Error;

    fn release(&self) -> Result<(), Self::Error> {
        (**self).release()
    }
}

/// A [`Release`] implementation backed by a closure.
///
/// Created by [`release_fn`]. The closure runs at most once; releasing again
/// is a no-op.
pub struct ReleaseFn<F> {
    release: Cell<Option<F>>,
}

impl<F> fmt::Debug for ReleaseFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReleaseFn")
            .field("release", &"<function>")
            .finish()
    }
}

impl<F, E> Release for ReleaseFn<F>
where
    F: FnOnce() -> Result<(), E>,
    E: Into<BoxError>,
{
    type Error = E;

    fn release(&self) -> Result<(), E> {
        match self.release.take() {
            Some(release) => release(),
            None => Ok(()),
        }
    }
}

/// Turn a closure into a releasable resource.
///
/// # Example
///
/// ```
/// use undertow::{release_fn, Release};
///
/// let resource = release_fn(|| Err::<(), _>(std::io::Error::other("socket reset")));
/// assert!(resource.release().is_err());
/// assert!(resource.release().is_ok());
/// ```
pub fn release_fn<F, E>(release: F) -> ReleaseFn<F>
where
    F: FnOnce() -> Result<(), E>,
    E: Into<BoxError>,
{
    ReleaseFn {
        release: Cell::new(Some(release)),
    }
}

trait ErasedRelease {
    fn release_erased(&self) -> Result<(), BoxError>;
}

impl<R: Release> ErasedRelease for R {
    fn release_erased(&self) -> Result<(), BoxError> {
        self.release().map_err(Into::into)
    }
}

/// Registrar handed to a function wrapped by [`with`].
///
/// Every resource passed to [`capture`](Capture::capture) is released when
/// the scope ends. Resources may borrow anything that outlives the wrapper
/// (`'s`).
pub struct Capture<'s> {
    resources: RefCell<Vec<Box<dyn ErasedRelease + 's>>>,
}

impl fmt::Debug for Capture<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capture")
            .field("resources", &self.len())
            .finish()
    }
}

impl<'s> Capture<'s> {
    fn new() -> Self {
        Capture {
            resources: RefCell::new(Vec::with_capacity(4)),
        }
    }

    /// Register `resource` for release at the end of the scope.
    ///
    /// Never fails; a release error is reported in the scope's [`Outcome`].
    pub fn capture<R>(&self, resource: R)
    where
        R: Release + 's,
    {
        self.resources.borrow_mut().push(Box::new(resource));
    }

    /// Number of resources registered so far.
    pub fn len(&self) -> usize {
        self.resources.borrow().len()
    }

    /// Returns true if no resource has been registered.
    pub fn is_empty(&self) -> bool {
        self.resources.borrow().is_empty()
    }

    /// Release everything in registration order, collecting failures.
    fn release_all(self, errors: &mut Vec<BoxError>) {
        for resource in self.resources.into_inner() {
            match panic::catch_unwind(AssertUnwindSafe(|| resource.release_erased())) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(error = %err, "resource release failed");
                    errors.push(err);
                }
                Err(payload) => {
                    let err = PanicError::from_payload(payload);
                    #[cfg(feature = "tracing")]
                    tracing::warn!(error = %err, "resource release panicked");
                    errors.push(Box::new(err));
                }
            }
        }
    }
}

/// Result of an invocation wrapped by [`with`].
///
/// Carries the output next to the combined error because the output stays
/// meaningful when only a release failed.
///
/// - `output` is the function's return value when it returned `Ok` (or a
///   recovered panic payload), and `O::default()` otherwise.
/// - `error` is `None` when nothing failed, the single error when one thing
///   failed, and a [`JoinedError`](crate::JoinedError) otherwise.
#[derive(Debug)]
pub struct Outcome<O> {
    /// The output value.
    pub output: O,
    /// The combined error, if anything failed.
    pub error: Option<BoxError>,
}

impl<O> Outcome<O> {
    /// Returns true if nothing failed.
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// The output value.
    pub fn output(&self) -> &O {
        &self.output
    }

    /// The combined error, if anything failed.
    pub fn error(&self) -> Option<&BoxError> {
        self.error.as_ref()
    }

    /// Split into output and combined error.
    pub fn into_parts(self) -> (O, Option<BoxError>) {
        (self.output, self.error)
    }

    /// Convert into a `Result`, discarding the output if anything failed.
    pub fn into_result(self) -> Result<O, BoxError> {
        match self.error {
            None => Ok(self.output),
            Some(err) => Err(err),
        }
    }
}

/// Wrap `f` so that the resources it captures are always released.
///
/// The returned function runs `f` with a fresh [`Capture`], intercepts a
/// panic the same way [`catch`](crate::catch) does, then releases every
/// captured resource in registration order and combines all failures into
/// the [`Outcome`].
///
/// Each invocation has its own error collection; nothing is shared between
/// calls.
///
/// # Examples
///
/// ```
/// use std::cell::RefCell;
/// use undertow::{release_fn, with, BoxError};
///
/// let released = RefCell::new(Vec::new());
///
/// let copy = with(|_: &(), capture, n: usize| -> Result<usize, BoxError> {
///     capture.capture(release_fn(|| {
///         released.borrow_mut().push("source");
///         Ok::<_, BoxError>(())
///     }));
///     capture.capture(release_fn(|| {
///         released.borrow_mut().push("target");
///         Ok::<_, BoxError>(())
///     }));
///     if n == 0 {
///         panic!("nothing to copy");
///     }
///     Ok(n)
/// });
///
/// let outcome = copy(&(), 0);
/// assert_eq!(outcome.output, 0);
/// assert!(outcome.error.unwrap().to_string().contains("nothing to copy"));
/// assert_eq!(*released.borrow(), ["source", "target"]);
/// ```
pub fn with<'s, Ctx, I, O, E, F>(f: F) -> impl Fn(&Ctx, I) -> Outcome<O> + use<'s, Ctx, I, O, E, F>
where
    Ctx: ?Sized,
    F: Fn(&Ctx, &Capture<'s>, I) -> Result<O, E>,
    E: Into<BoxError>,
    O: Default + 'static,
{
    move |ctx: &Ctx, input: I| {
        let capture = Capture::new();
        let mut errors: Vec<BoxError> = Vec::with_capacity(4);

        let output = match guarded::<_, _, O>(|| f(ctx, &capture, input)) {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => {
                errors.push(err.into());
                O::default()
            }
            Err(Unwound::Recovered(output)) => output,
            Err(Unwound::Panicked(err)) => {
                errors.push(Box::new(err));
                O::default()
            }
        };

        capture.release_all(&mut errors);

        Outcome {
            output,
            error: join(errors),
        }
    }
}
