//! Opt-in best-effort error handling.
//!
//! By default every executor in this crate is fail-fast. Wrapping a task (or
//! its future) with the default error handler turns a failure into `None`
//! after handing the error to an [`ErrorReporter`], so a single bad task can't
//! abort the whole run.

use std::convert::Infallible;
use std::fmt::Display;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use futures::Future;
use pin_project::pin_project;

use crate::common::DeferredTask;

/// Sink that receives the failures swallowed by the default error handler.
///
/// Implemented for any `Fn(&E)`, so a closure is enough to collect or
/// forward errors elsewhere.
pub trait ErrorReporter<E> {
    /// Record a failure. Called at most once per wrapped future.
    fn report(&self, error: &E);
}

impl<E, F> ErrorReporter<E> for F
where
    F: Fn(&E),
{
    fn report(&self, error: &E) {
        self(error)
    }
}

/// Reporter that logs failures with `tracing::error!`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl<E> ErrorReporter<E> for TracingReporter
where
    E: Display,
{
    fn report(&self, error: &E) {
        tracing::error!(error = %error, "deferred task failed, resolving to an empty value");
    }
}

/// Future returned by [`default_error_handler`] and [`default_error_handler_with`].
#[pin_project]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct DefaultErrorHandler<Fut, R> {
    #[pin]
    future: Fut,
    reporter: R,
}

impl<Fut, R, T, E> Future for DefaultErrorHandler<Fut, R>
where
    Fut: Future<Output = Result<T, E>>,
    R: ErrorReporter<E>,
{
    type Output = Result<Option<T>, Infallible>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        match ready!(this.future.poll(cx)) {
            Ok(value) => Poll::Ready(Ok(Some(value))),
            Err(error) => {
                this.reporter.report(&error);
                Poll::Ready(Ok(None))
            }
        }
    }
}

/// Wrap `future` so that a failure is logged through `tracing` and
/// resolves to `Ok(None)` instead. Successful values become `Ok(Some(value))`.
///
/// ```rust
/// use futures_batched::handler::default_error_handler;
///
/// async fn broken() -> Result<u64, String> {
///     Err("boom".to_string())
/// }
///
/// tokio_test::block_on(async move {
///     assert_eq!(default_error_handler(broken()).await, Ok(None));
///     assert_eq!(default_error_handler(async { Ok::<_, String>(1) }).await, Ok(Some(1)));
/// });
/// ```
pub fn default_error_handler<Fut, T, E>(
    future: Fut,
) -> DefaultErrorHandler<Fut, TracingReporter>
where
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    default_error_handler_with(future, TracingReporter)
}

/// Same as [`default_error_handler`], but failures go to `reporter`.
pub fn default_error_handler_with<Fut, R, T, E>(
    future: Fut,
    reporter: R,
) -> DefaultErrorHandler<Fut, R>
where
    Fut: Future<Output = Result<T, E>>,
    R: ErrorReporter<E>,
{
    DefaultErrorHandler { future, reporter }
}

/// Deferred task whose failures are converted into `None`.
///
/// Created with [`crate::common::DeferredTaskExt::handle_errors`] or
/// [`crate::common::DeferredTaskExt::handle_errors_with`]. Its error type is
/// [`Infallible`], so it can never make a batch fail.
#[derive(Debug, Clone)]
pub struct HandleErrors<D, R> {
    task: D,
    reporter: R,
}

impl<D, R> HandleErrors<D, R> {
    pub(crate) fn new(task: D, reporter: R) -> Self {
        Self { task, reporter }
    }
}

impl<D, R> DeferredTask for HandleErrors<D, R>
where
    D: DeferredTask,
    R: ErrorReporter<D::Error>,
{
    type Ok = Option<D::Ok>;
    type Error = Infallible;
    type Future = DefaultErrorHandler<D::Future, R>;

    fn invoke(self) -> Self::Future {
        default_error_handler_with(self.task.invoke(), self.reporter)
    }
}
