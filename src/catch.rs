//! Converting panics into errors.
//!
//! [`catch`] wraps a fallible function so that a panic inside it comes back
//! as an ordinary `Err` instead of unwinding through the caller.
//! [`catch_future`] does the same for a single future.
//!
//! # Payload policy
//!
//! When the wrapped function panics, the payload decides the result:
//!
//! 1. An error payload (thrown with [`raise`]) becomes a [`PanicError`] that
//!    wraps it, so the original error is still reachable through
//!    [`CauseExt`](crate::CauseExt).
//! 2. A payload whose type is exactly the output type `O` is a *recovered
//!    output* and is returned as `Ok`.
//! 3. Anything else becomes a [`PanicError`] carrying the panic message.
//!
//! Rule 2 means that with `O = String`, a formatted `panic!("{}", x)` is
//! recovered as output, since its payload is a `String`.
//!
//! # Example
//!
//! ```
//! use undertow::{catch, BoxError};
//!
//! let halve = catch(|_: &(), n: i32| -> Result<i32, BoxError> {
//!     if n % 2 != 0 {
//!         panic!("odd input");
//!     }
//!     Ok(n / 2)
//! });
//!
//! assert_eq!(halve(&(), 8).unwrap(), 4);
//!
//! let err = halve(&(), 3).unwrap_err();
//! assert_eq!(err.to_string(), "panic caught: odd input");
//! ```

use std::any::Any;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};

use futures::FutureExt;

use crate::error::{BoxError, PanicError};

/// Outcome of a guarded call that unwound.
pub(crate) enum Unwound<O> {
    /// The panic payload was an `O` and stands in for the output.
    Recovered(O),
    /// The panic was converted into an error.
    Panicked(PanicError),
}

/// Run `f`, turning a panic into an [`Unwound`] according to the payload
/// policy of this module.
pub(crate) fn guarded<F, R, O>(f: F) -> Result<R, Unwound<O>>
where
    F: FnOnce() -> R,
    O: 'static,
{
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(classify::<O>)
}

pub(crate) fn classify<O: 'static>(payload: Box<dyn Any + Send>) -> Unwound<O> {
    if payload.is::<PanicError>() || payload.is::<BoxError>() {
        return panicked(PanicError::from_payload(payload));
    }
    match payload.downcast::<O>() {
        Ok(output) => Unwound::Recovered(*output),
        Err(payload) => panicked(PanicError::from_payload(payload)),
    }
}

fn panicked<O>(err: PanicError) -> Unwound<O> {
    #[cfg(feature = "tracing")]
    tracing::warn!(error = %err, "wrapped call panicked");
    Unwound::Panicked(err)
}

/// Wrap `f` so that a panic inside it is returned as an error.
///
/// The returned function has the same `(ctx, input)` surface as `f`.
/// Normal returns pass through unchanged. A panic is intercepted and
/// converted according to the [payload policy](self#payload-policy): the
/// error side must be constructible from a [`PanicError`], which holds for
/// [`BoxError`] and for any caller error type with a matching `From` impl.
///
/// The context is passed through untouched.
///
/// # Examples
///
/// ```
/// use undertow::{catch, raise, BoxError, CauseExt};
///
/// #[derive(Debug, PartialEq)]
/// struct Corrupt;
///
/// impl std::fmt::Display for Corrupt {
///     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
///         write!(f, "corrupt record")
///     }
/// }
///
/// impl std::error::Error for Corrupt {}
///
/// let decode = catch(|_: &(), raw: &'static str| -> Result<u32, BoxError> {
///     match raw.parse() {
///         Ok(n) => Ok(n),
///         Err(_) => raise(Corrupt),
///     }
/// });
///
/// assert_eq!(decode(&(), "17").unwrap(), 17);
///
/// let err = decode(&(), "x").unwrap_err();
/// assert!(err.to_string().contains("panic caught"));
/// assert!(err.has_cause(&Corrupt));
/// ```
pub fn catch<Ctx, I, O, E, F>(f: F) -> impl Fn(&Ctx, I) -> Result<O, E>
where
    Ctx: ?Sized,
    F: Fn(&Ctx, I) -> Result<O, E>,
    E: From<PanicError>,
    O: 'static,
{
    move |ctx: &Ctx, input: I| match guarded::<_, _, O>(|| f(ctx, input)) {
        Ok(result) => result,
        Err(Unwound::Recovered(output)) => Ok(output),
        Err(Unwound::Panicked(err)) => Err(E::from(err)),
    }
}

/// Await `future`, returning a panic raised while polling it as an error.
///
/// Same payload policy as [`catch`]. The future is polled on the caller's
/// task; nothing is spawned.
///
/// # Examples
///
/// ```
/// use undertow::{catch_future, BoxError};
///
/// async fn fetch(connected: bool) -> Result<i32, BoxError> {
///     if !connected {
///         panic!("lost connection");
///     }
///     Ok(7)
/// }
///
/// # tokio_test::block_on(async {
/// assert_eq!(catch_future(fetch(true)).await.unwrap(), 7);
///
/// let err = catch_future(fetch(false)).await.unwrap_err();
/// assert!(err.to_string().contains("lost connection"));
/// # });
/// ```
pub async fn catch_future<Fut, O, E>(future: Fut) -> Result<O, E>
where
    Fut: Future<Output = Result<O, E>>,
    E: From<PanicError>,
    O: 'static,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => match classify::<O>(payload) {
            Unwound::Recovered(output) => Ok(output),
            Unwound::Panicked(err) => Err(E::from(err)),
        },
    }
}

/// Panic with an error payload.
///
/// A wrapper that intercepts the panic keeps `err` as the cause of the
/// resulting [`PanicError`], instead of flattening it into a message.
pub fn raise<E>(err: E) -> !
where
    E: Into<BoxError>,
{
    panic::panic_any(err.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CauseExt, PANIC_CAUGHT};
    use std::fmt;

    #[derive(Debug, Clone, PartialEq)]
    struct OriginalError;

    impl fmt::Display for OriginalError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "original error")
        }
    }

    impl std::error::Error for OriginalError {}

    #[derive(Debug)]
    enum AppError {
        NotFound,
        Panicked(PanicError),
    }

    impl From<PanicError> for AppError {
        fn from(err: PanicError) -> Self {
            AppError::Panicked(err)
        }
    }

    #[test]
    fn test_catch_normal() {
        let caught = catch(|_: &(), i: i32| Ok::<_, BoxError>(i * 2));
        assert_eq!(caught(&(), 5).unwrap(), 10);
    }

    #[test]
    fn test_catch_passes_errors_through() {
        let caught = catch(|_: &(), _: i32| -> Result<i32, AppError> { Err(AppError::NotFound) });
        assert!(matches!(caught(&(), 1), Err(AppError::NotFound)));
    }

    #[test]
    fn test_catch_panic_error_keeps_cause() {
        let caught = catch(|_: &(), _: i32| -> Result<i32, BoxError> { raise(OriginalError) });

        let err = caught(&(), 5).unwrap_err();
        assert!(err.has_cause(&OriginalError));
        assert!(err.to_string().contains(PANIC_CAUGHT));
    }

    #[test]
    fn test_catch_panic_string() {
        let caught = catch(|_: &(), _: i32| -> Result<i32, BoxError> {
            panic!("something went wrong")
        });

        let err = caught(&(), 5).unwrap_err();
        assert!(err.to_string().contains("something went wrong"));
        assert!(err.to_string().contains(PANIC_CAUGHT));
    }

    #[test]
    fn test_catch_panic_formatted_message() {
        let caught = catch(|_: &(), code: i32| -> Result<i32, BoxError> {
            panic!("exit code {}", code)
        });

        let err = caught(&(), 3).unwrap_err();
        assert_eq!(err.to_string(), "panic caught: exit code 3");
    }

    #[test]
    fn test_catch_into_caller_error_type() {
        let caught = catch(|_: &(), _: ()| -> Result<(), AppError> { panic!("boom") });

        match caught(&(), ()) {
            Err(AppError::Panicked(err)) => assert_eq!(err.message(), Some("boom")),
            other => panic!("Expected Panicked, got {:?}", other),
        }
    }

    #[test]
    fn test_catch_recovers_output_typed_payload() {
        let caught = catch(|_: &(), _: ()| -> Result<u64, BoxError> {
            std::panic::panic_any(99_u64)
        });

        assert_eq!(caught(&(), ()).unwrap(), 99);
    }

    #[test]
    fn test_catch_does_not_recover_error_payload_as_output() {
        // Even when the output type is BoxError, an error payload is an error.
        let caught = catch(|_: &(), _: ()| -> Result<BoxError, BoxError> { raise(OriginalError) });

        let err = caught(&(), ()).unwrap_err();
        assert!(err.has_cause(&OriginalError));
    }

    #[test]
    fn test_catch_opaque_payload() {
        let caught = catch(|_: &(), _: ()| -> Result<String, BoxError> {
            std::panic::panic_any(vec![1, 2, 3])
        });

        let err = caught(&(), ()).unwrap_err();
        assert_eq!(err.to_string(), "panic caught: Box<dyn Any>");
    }

    #[test]
    fn test_catch_uses_context() {
        struct Config {
            factor: i32,
        }

        let caught = catch(|cfg: &Config, i: i32| Ok::<_, BoxError>(i * cfg.factor));
        assert_eq!(caught(&Config { factor: 3 }, 4).unwrap(), 12);
    }

    #[test]
    fn test_catch_is_reusable() {
        let caught = catch(|_: &(), i: i32| -> Result<i32, BoxError> {
            if i < 0 {
                panic!("negative");
            }
            Ok(i)
        });

        assert!(caught(&(), -1).is_err());
        assert_eq!(caught(&(), 1).unwrap(), 1);
        assert!(caught(&(), -2).is_err());
    }

    async fn flaky(fail: bool) -> Result<&'static str, BoxError> {
        tokio::task::yield_now().await;
        if fail {
            raise(OriginalError);
        }
        Ok("done")
    }

    async fn lookup(fail: bool) -> Result<(), AppError> {
        if fail {
            panic!("boom");
        }
        Err(AppError::NotFound)
    }

    #[tokio::test]
    async fn test_catch_future_ok() {
        let result = catch_future(flaky(false)).await;
        assert_eq!(result.unwrap(), "done");
    }

    #[tokio::test]
    async fn test_catch_future_panic_with_cause() {
        let err = catch_future(flaky(true)).await.unwrap_err();
        assert!(err.has_cause(&OriginalError));
        assert!(err.to_string().contains(PANIC_CAUGHT));
    }

    #[tokio::test]
    async fn test_catch_future_panic_into_caller_error() {
        assert!(matches!(
            catch_future(lookup(true)).await,
            Err(AppError::Panicked(_))
        ));
        assert!(matches!(
            catch_future(lookup(false)).await,
            Err(AppError::NotFound)
        ));
    }

    #[cfg(feature = "tracing")]
    mod tracing_tests {
        use super::*;
        use tracing_test::traced_test;

        #[traced_test]
        #[test]
        fn test_panic_is_logged() {
            let caught = catch(|_: &(), _: ()| -> Result<(), BoxError> { panic!("logged boom") });
            let _ = caught(&(), ());

            assert!(logs_contain("wrapped call panicked"));
            assert!(logs_contain("logged boom"));
        }
    }
}
