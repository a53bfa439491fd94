//! Testing utilities for code built on undertow.
//!
//! This module provides a mock releasable resource and assertion macros for
//! checking the errors the wrappers return.
//!
//! # Examples
//!
//! ## MockResource
//!
//! ```rust
//! use undertow::testing::MockResource;
//! use undertow::{with, BoxError};
//!
//! let conn = MockResource::failing("close failed");
//!
//! let query = with(|_: &(), capture, _: ()| {
//!     capture.capture(&conn);
//!     Ok::<_, BoxError>(100)
//! });
//!
//! let outcome = query(&(), ());
//! assert_eq!(outcome.output, 100);
//! assert_eq!(conn.release_count(), 1);
//! ```
//!
//! ## Assertion Macros
//!
//! ```rust
//! use undertow::testing::MockReleaseError;
//! use undertow::{assert_has_cause, assert_panic_caught, BoxError, PanicError};
//!
//! let err: BoxError = Box::new(MockReleaseError::new("disk full"));
//! assert_has_cause!(err, MockReleaseError::new("disk full"));
//!
//! assert_panic_caught!(PanicError::from_message("boom"));
//! ```

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::scope::Release;

/// Error returned by a failing [`MockResource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockReleaseError {
    message: String,
}

impl MockReleaseError {
    /// Create a release error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        MockReleaseError {
            message: message.into(),
        }
    }

    /// The message this error was created with.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for MockReleaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "release failed: {}", self.message)
    }
}

impl std::error::Error for MockReleaseError {}

/// A releasable resource that counts how often it was released.
///
/// Release is thread-safe, so one `MockResource` can be shared by
/// invocations running on several threads.
///
/// # Example
///
/// ```rust
/// use undertow::testing::MockResource;
/// use undertow::Release;
///
/// let resource = MockResource::new();
/// assert_eq!(resource.release_count(), 0);
///
/// resource.release().unwrap();
/// assert_eq!(resource.release_count(), 1);
/// ```
#[derive(Debug, Default)]
pub struct MockResource {
    failure: Option<MockReleaseError>,
    releases: AtomicUsize,
}

impl MockResource {
    /// A resource whose release succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// A resource whose release fails with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        MockResource {
            failure: Some(MockReleaseError::new(message)),
            releases: AtomicUsize::new(0),
        }
    }

    /// How many times [`release`](Release::release) has been called.
    pub fn release_count(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

impl Release for MockResource {
    type Error = MockReleaseError;

    fn release(&self) -> Result<(), MockReleaseError> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        match &self.failure {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

/// Assert that an error has a specific cause.
///
/// The cause is compared with `PartialEq` after a downcast, anywhere in the
/// error's source chain or among joined errors.
///
/// # Example
///
/// ```rust
/// use undertow::assert_has_cause;
/// use undertow::testing::MockReleaseError;
/// use undertow::PanicError;
///
/// let err = PanicError::from_cause(MockReleaseError::new("eof"));
/// assert_has_cause!(err, MockReleaseError::new("eof"));
/// ```
#[macro_export]
macro_rules! assert_has_cause {
    ($err:expr, $cause:expr) => {{
        use $crate::CauseExt as _;
        let err = &$err;
        let cause = &$cause;
        if !err.has_cause(cause) {
            panic!(
                "Expected error to have cause {:?}, got: {}",
                cause, err
            );
        }
    }};
}

/// Assert that an error came from an intercepted panic.
///
/// # Example
///
/// ```rust
/// use undertow::{assert_panic_caught, catch, BoxError};
///
/// let f = catch(|_: &(), _: ()| -> Result<(), BoxError> { panic!("boom") });
/// assert_panic_caught!(f(&(), ()).unwrap_err());
/// ```
#[macro_export]
macro_rules! assert_panic_caught {
    ($err:expr) => {{
        let message = $err.to_string();
        if !message.contains($crate::PANIC_CAUGHT) {
            panic!("Expected a caught panic, got: {}", message);
        }
    }};
}
