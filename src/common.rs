//! Module containing the types shared by every executor.

use std::fmt;
use std::num::NonZeroUsize;

use futures::Future;

use crate::error::Error;
use crate::handler::{ErrorReporter, HandleErrors, TracingReporter};

/// Chunk size used when the caller doesn't pick one.
pub const DEFAULT_CHUNK_SIZE: usize = 5;

/// A unit of asynchronous work that only starts once it's invoked.
///
/// Any `FnOnce() -> impl Future<Output = Result<T, E>>` is a deferred task,
/// so in practice you'll just hand closures to the executors:
///
/// ```rust
/// use futures_batched::common::DeferredTask;
///
/// async fn dummy(val: u64) -> Result<u64, ()> {
///     Ok(val)
/// }
///
/// let task = || dummy(42);
/// // Nothing has run yet, the future is only created here.
/// let future = task.invoke();
/// assert_eq!(tokio_test::block_on(future), Ok(42));
/// ```
pub trait DeferredTask {
    /// Value the task resolves to on success.
    type Ok;

    /// Value the task resolves to on failure.
    type Error;

    /// The future returned by [`DeferredTask::invoke`].
    type Future: Future<Output = Result<Self::Ok, Self::Error>>;

    /// Start the work. Consumes the task, so it can only ever run once.
    fn invoke(self) -> Self::Future;
}

impl<F, Fut, T, E> DeferredTask for F
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    type Ok = T;
    type Error = E;
    type Future = Fut;

    fn invoke(self) -> Self::Future {
        self()
    }
}

/// Adapters available on every [`DeferredTask`].
pub trait DeferredTaskExt: DeferredTask + Sized {
    /// Convert failures of this task into `None`, reporting them through `tracing`.
    ///
    /// See [`crate::handler::default_error_handler`].
    fn handle_errors(self) -> HandleErrors<Self, TracingReporter> {
        HandleErrors::new(self, TracingReporter)
    }

    /// Same as [`DeferredTaskExt::handle_errors`], but failures are handed to `reporter`.
    fn handle_errors_with<R>(self, reporter: R) -> HandleErrors<Self, R>
    where
        R: ErrorReporter<Self::Error>,
    {
        HandleErrors::new(self, reporter)
    }
}

impl<D> DeferredTaskExt for D where D: DeferredTask {}

/// Maximum number of tasks running at once inside a batch.
///
/// Always greater than zero, so a zero chunk size is rejected before
/// anything gets scheduled.
///
/// ```rust
/// use futures_batched::common::ChunkSize;
/// use futures_batched::error::Error;
///
/// assert_eq!(ChunkSize::default().get(), 5);
/// assert_eq!(ChunkSize::new(3).map(|size| size.get()), Ok(3));
/// assert_eq!(ChunkSize::new(0), Err(Error::InvalidChunkSize(0)));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChunkSize(NonZeroUsize);

impl ChunkSize {
    /// Create a new chunk size. Fails if `size` is 0.
    pub fn new(size: usize) -> Result<Self, Error> {
        NonZeroUsize::new(size)
            .map(Self)
            .ok_or(Error::InvalidChunkSize(size))
    }

    /// Return the chunk size as a plain `usize`.
    pub fn get(self) -> usize {
        self.0.get()
    }
}

impl Default for ChunkSize {
    fn default() -> Self {
        const DEFAULT: NonZeroUsize = match NonZeroUsize::new(DEFAULT_CHUNK_SIZE) {
            Some(size) => size,
            None => panic!("DEFAULT_CHUNK_SIZE must be greater than 0"),
        };
        Self(DEFAULT)
    }
}

impl From<NonZeroUsize> for ChunkSize {
    fn from(size: NonZeroUsize) -> Self {
        Self(size)
    }
}

impl TryFrom<usize> for ChunkSize {
    type Error = Error;

    fn try_from(size: usize) -> Result<Self, Self::Error> {
        Self::new(size)
    }
}

impl fmt::Display for ChunkSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
