//! Run deferred tasks strictly one after another.

use std::mem;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use futures::future::FusedFuture;
use futures::Future;
use pin_project::pin_project;
use tracing::trace;

use crate::common::DeferredTask;

/// Future returned by [`execute_sequential`].
///
/// Holds at most one running future at a time. The next task is only invoked
/// once the current one has resolved, so no extra state or queues are needed
/// besides the results collected so far.
#[pin_project]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct ExecuteSequential<I>
where
    I: Iterator,
    I::Item: DeferredTask,
{
    tasks: I,
    #[pin]
    running: Option<<I::Item as DeferredTask>::Future>,
    results: Vec<<I::Item as DeferredTask>::Ok>,
    terminated: bool,
}

impl<I> Future for ExecuteSequential<I>
where
    I: Iterator,
    I::Item: DeferredTask,
{
    type Output = Result<Vec<<I::Item as DeferredTask>::Ok>, <I::Item as DeferredTask>::Error>;

    /// Drive the running task to completion, then invoke the next one.
    /// The first failure resolves the whole future; remaining tasks are
    /// dropped without ever being invoked.
    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut this = self.project();
        assert!(!*this.terminated, "ExecuteSequential polled after completion");
        loop {
            if let Some(running) = this.running.as_mut().as_pin_mut() {
                let output = ready!(running.poll(cx));
                this.running.set(None);
                match output {
                    Ok(value) => this.results.push(value),
                    Err(error) => {
                        trace!(index = this.results.len(), "deferred task failed");
                        *this.terminated = true;
                        return Poll::Ready(Err(error));
                    }
                }
            }
            match this.tasks.next() {
                Some(task) => {
                    trace!(index = this.results.len(), "invoking deferred task");
                    this.running.set(Some(task.invoke()));
                }
                None => {
                    *this.terminated = true;
                    return Poll::Ready(Ok(mem::take(this.results)));
                }
            }
        }
    }
}

impl<I> FusedFuture for ExecuteSequential<I>
where
    I: Iterator,
    I::Item: DeferredTask,
{
    fn is_terminated(&self) -> bool {
        self.terminated
    }
}

/// Run `tasks` one at a time, in order.
///
/// Task `n + 1` is not invoked until task `n` has resolved. The returned future
/// resolves with every result in input order, or with the first error. After a
/// failure no further task is invoked. An empty input resolves to an empty `Vec`.
///
/// ```rust
/// use futures_batched::sequential::execute_sequential;
///
/// async fn dummy(val: u64) -> Result<u64, String> {
///     match val {
///         3 => Err("three".to_string()),
///         _ => Ok(val),
///     }
/// }
///
/// tokio_test::block_on(async move {
///     let ok = execute_sequential((0..3).map(|i| move || dummy(i))).await;
///     assert_eq!(ok, Ok(vec![0, 1, 2]));
///
///     let failed = execute_sequential((0..10).map(|i| move || dummy(i))).await;
///     assert_eq!(failed, Err("three".to_string()));
/// });
/// ```
pub fn execute_sequential<T>(tasks: T) -> ExecuteSequential<T::IntoIter>
where
    T: IntoIterator,
    T::Item: DeferredTask,
{
    let tasks = tasks.into_iter();
    ExecuteSequential {
        results: Vec::with_capacity(tasks.size_hint().0),
        tasks,
        running: None,
        terminated: false,
    }
}
