//! Run deferred tasks in fixed-size concurrent batches.
//!
//! Tasks are split into chunks of `chunk_size`, each chunk is turned into a
//! single task that runs all of its members concurrently, and the chunks are
//! then executed one after another. At most `chunk_size` tasks are ever in
//! flight, and results come back in input order.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::vec;

use futures::future::{try_join_all, FusedFuture, MapOk, TryJoinAll};
use futures::{Future, TryFutureExt};
use pin_project::pin_project;
use tracing::debug;

use crate::common::{ChunkSize, DeferredTask};
use crate::results::flatten;
use crate::sequential::{execute_sequential, ExecuteSequential};

/// Split `items` into consecutive chunks of `chunk_size` items.
///
/// Every chunk has exactly `chunk_size` items, except the last one which holds
/// whatever is left (between 1 and `chunk_size` items). An empty input yields
/// no chunks. The input is consumed, so no item is ever cloned or duplicated.
///
/// ```rust
/// use futures_batched::batched::chunk;
/// use futures_batched::common::ChunkSize;
///
/// let chunks = chunk(1..=7, ChunkSize::new(3).unwrap());
/// assert_eq!(chunks, vec![vec![1, 2, 3], vec![4, 5, 6], vec![7]]);
/// ```
pub fn chunk<I>(items: I, chunk_size: ChunkSize) -> Vec<Vec<I::Item>>
where
    I: IntoIterator,
{
    let chunk_size = chunk_size.get();
    let mut items = items.into_iter();
    let mut chunks = Vec::with_capacity(items.size_hint().0.div_ceil(chunk_size));
    loop {
        let chunk = items.by_ref().take(chunk_size).collect::<Vec<_>>();
        if chunk.is_empty() {
            break;
        }
        chunks.push(chunk);
    }
    chunks
}

/// A group of deferred tasks that run concurrently once invoked.
///
/// Created by [`combine_deferred_tasks`].
#[derive(Debug, Clone)]
pub struct CombinedTasks<D> {
    tasks: Vec<D>,
}

impl<D> CombinedTasks<D> {
    /// Number of wrapped tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether there are no wrapped tasks at all.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl<D> DeferredTask for CombinedTasks<D>
where
    D: DeferredTask,
{
    type Ok = Vec<D::Ok>;
    type Error = D::Error;
    type Future = TryJoinAll<D::Future>;

    /// Invoke every wrapped task at once and wait for all of them.
    ///
    /// Results are ordered by position, not by completion. On the first
    /// failure the returned future resolves with that error and the tasks
    /// still in flight are dropped.
    fn invoke(self) -> Self::Future {
        debug!(tasks = self.tasks.len(), "starting combined batch");
        try_join_all(self.tasks.into_iter().map(DeferredTask::invoke))
    }
}

/// Wrap `tasks` into a single deferred task that runs them all concurrently.
///
/// Nothing is executed until the returned task is invoked.
///
/// ```rust
/// use futures_batched::batched::combine_deferred_tasks;
/// use futures_batched::common::DeferredTask;
///
/// async fn dummy(val: u64) -> Result<u64, String> {
///     Ok(val)
/// }
///
/// let combined = combine_deferred_tasks((0..4).map(|i| move || dummy(i)));
/// assert_eq!(combined.len(), 4);
///
/// let results = tokio_test::block_on(combined.invoke());
/// assert_eq!(results, Ok(vec![0, 1, 2, 3]));
/// ```
pub fn combine_deferred_tasks<I>(tasks: I) -> CombinedTasks<I::Item>
where
    I: IntoIterator,
    I::Item: DeferredTask,
{
    CombinedTasks {
        tasks: tasks.into_iter().collect(),
    }
}

type FlattenFn<T> = fn(Vec<Vec<T>>) -> Vec<T>;

/// Future returned by [`execute_in_batches`].
#[pin_project]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct ExecuteInBatches<D>
where
    D: DeferredTask,
{
    #[pin]
    inner: MapOk<ExecuteSequential<vec::IntoIter<CombinedTasks<D>>>, FlattenFn<D::Ok>>,
}

impl<D> Future for ExecuteInBatches<D>
where
    D: DeferredTask,
{
    type Output = Result<Vec<D::Ok>, D::Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.project().inner.poll(cx)
    }
}

impl<D> FusedFuture for ExecuteInBatches<D>
where
    D: DeferredTask,
{
    fn is_terminated(&self) -> bool {
        self.inner.is_terminated()
    }
}

/// Run `tasks` in batches of `chunk_size`.
///
/// All tasks of a batch are invoked at once; the next batch only starts once
/// every task of the current one has resolved. The output has exactly one entry
/// per task, in input order.
///
/// The first failure aborts the whole run: the future resolves with that error
/// and later batches are never started. Wrap tasks with
/// [`crate::common::DeferredTaskExt::handle_errors`] to keep going instead.
///
/// ```rust
/// use futures_batched::batched::execute_in_batches;
/// use futures_batched::common::{ChunkSize, DeferredTaskExt};
/// use futures_batched::results::filter_empty;
///
/// async fn dummy(val: u64) -> Result<u64, String> {
///     match val % 3 {
///         0 => Err(format!("{val} is a multiple of 3")),
///         _ => Ok(val),
///     }
/// }
///
/// tokio_test::block_on(async move {
///     // Fail-fast: 3 is the first multiple of 3.
///     let tasks = (1..=10).map(|i| move || dummy(i));
///     let failed = execute_in_batches(tasks, ChunkSize::default()).await;
///     assert_eq!(failed, Err("3 is a multiple of 3".to_string()));
///
///     // Best-effort: failures become `None`.
///     let tasks = (1..=10).map(|i| (move || dummy(i)).handle_errors());
///     let results = execute_in_batches(tasks, ChunkSize::default()).await.unwrap();
///     assert_eq!(filter_empty(results), vec![1, 2, 4, 5, 7, 8, 10]);
/// });
/// ```
pub fn execute_in_batches<I>(tasks: I, chunk_size: ChunkSize) -> ExecuteInBatches<I::Item>
where
    I: IntoIterator,
    I::Item: DeferredTask,
{
    let batches = chunk(tasks, chunk_size)
        .into_iter()
        .map(combine_deferred_tasks)
        .collect::<Vec<_>>();
    debug!(
        batches = batches.len(),
        chunk_size = chunk_size.get(),
        "scheduling deferred tasks in batches"
    );
    ExecuteInBatches {
        inner: execute_sequential(batches).map_ok(flatten as FlattenFn<_>),
    }
}

#[cfg(test)]
mod tests {
    use std::cmp;
    use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use crate::common::DeferredTaskExt;
    use crate::results::filter_empty;

    use super::*;

    #[derive(Debug, Clone, PartialEq, thiserror::Error)]
    #[error("task {0} failed")]
    struct TaskFailed(u64);

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Event {
        Start(u64),
        End(u64),
    }

    /// Dummy function that receives and returns a `u64` value.
    async fn dummy(val: u64) -> Result<u64, TaskFailed> {
        Ok(val)
    }

    /// Fails for every value in `failing`.
    async fn dummy_failing(val: u64, failing: &'static [u64]) -> Result<u64, TaskFailed> {
        tokio::time::sleep(Duration::from_millis(1)).await;
        match failing.contains(&val) {
            true => Err(TaskFailed(val)),
            false => Ok(val),
        }
    }

    /// Dummy function that increments and decrements a counter.
    /// This is useful to check if more than N tasks are running concurrently.
    async fn dummy_checked(val: Arc<AtomicU8>) -> Result<u8, TaskFailed> {
        val.fetch_add(1, Ordering::Acquire);
        let max = val.load(Ordering::Relaxed);
        tokio::time::sleep(Duration::from_millis(2)).await;
        val.fetch_sub(1, Ordering::Release);
        Ok(max)
    }

    /// Records when it starts and ends. Smaller values sleep longer, so
    /// tasks in the same batch complete in reverse order.
    async fn dummy_logged(val: u64, log: Arc<Mutex<Vec<Event>>>) -> Result<u64, TaskFailed> {
        log.lock().unwrap().push(Event::Start(val));
        tokio::time::sleep(Duration::from_millis((10 - val) * 5)).await;
        log.lock().unwrap().push(Event::End(val));
        Ok(val)
    }

    fn chunk_size(size: usize) -> ChunkSize {
        ChunkSize::new(size).unwrap()
    }

    #[test]
    fn test_chunk() {
        let items = (0..23).collect::<Vec<_>>();
        for size in 1..30 {
            let chunks = chunk(items.clone(), chunk_size(size));
            // Concatenating all chunks gives back the input.
            assert_eq!(chunks.concat(), items);
            let (last, full) = chunks.split_last().unwrap();
            assert!(full.iter().all(|chunk| chunk.len() == size));
            assert!(!last.is_empty() && last.len() <= size);
        }
        assert_eq!(chunk(items.clone(), chunk_size(1)).len(), 23);
        assert_eq!(chunk(items.clone(), chunk_size(23)), vec![items.clone()]);
        assert_eq!(chunk(items.clone(), chunk_size(100)), vec![items]);
        assert!(chunk(Vec::<u64>::new(), chunk_size(5)).is_empty());
    }

    #[tokio::test]
    async fn test_combine_runs_concurrently() {
        let test_value = Arc::new(AtomicU8::new(0));
        let combined = combine_deferred_tasks((0..10).map(|_| {
            let test_value = Arc::clone(&test_value);
            move || dummy_checked(test_value)
        }));
        assert_eq!(test_value.load(Ordering::SeqCst), 0);
        let max = combined.invoke().await.unwrap().into_iter().max();
        assert_eq!(max, Some(10));
    }

    #[tokio::test]
    async fn test_combine_preserves_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let combined = combine_deferred_tasks((0..5).map(|i| {
            let log = Arc::clone(&log);
            move || dummy_logged(i, log)
        }));
        assert_eq!(combined.invoke().await, Ok(vec![0, 1, 2, 3, 4]));
        // Completion order was reversed.
        let ends = log
            .lock()
            .unwrap()
            .iter()
            .filter_map(|event| match event {
                Event::End(val) => Some(*val),
                Event::Start(_) => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(ends, vec![4, 3, 2, 1, 0]);
    }

    #[tokio::test]
    async fn test_combine_fail_fast() {
        let combined = combine_deferred_tasks((0..5).map(|i| move || dummy_failing(i, &[2])));
        assert_eq!(combined.invoke().await, Err(TaskFailed(2)));

        let empty = combine_deferred_tasks((0..0).map(|i| move || dummy(i)));
        assert!(empty.is_empty());
        assert_eq!(empty.invoke().await, Ok(vec![]));
    }

    #[tokio::test]
    async fn test_execute_in_batches() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let tasks = (1..=7).map(|i| {
            let log = Arc::clone(&log);
            move || dummy_logged(i, log)
        });
        let results = execute_in_batches(tasks, chunk_size(3)).await;
        assert_eq!(results, Ok(vec![1, 2, 3, 4, 5, 6, 7]));

        let log = log.lock().unwrap();
        let position = |event: Event| log.iter().position(|e| *e == event).unwrap();
        for (batch, next) in [(1..=3, 4..=6), (4..=6, 7..=7)] {
            // Tasks of a batch all start before any of them ends.
            let first_end = batch.clone().map(|i| position(Event::End(i))).min().unwrap();
            assert!(batch.clone().all(|i| position(Event::Start(i)) < first_end));
            // The next batch starts only after the current one is done.
            let last_end = batch.map(|i| position(Event::End(i))).max().unwrap();
            assert!(next.into_iter().all(|i| position(Event::Start(i)) > last_end));
        }
    }

    #[tokio::test]
    async fn test_max_concurrent() {
        for size in [1, 3, 5, 10] {
            let test_value = Arc::new(AtomicU8::new(0));
            let tasks = (0..25).map(|_| {
                let test_value = Arc::clone(&test_value);
                move || dummy_checked(test_value)
            });
            let results = execute_in_batches(tasks, chunk_size(size)).await.unwrap();
            assert_eq!(results.len(), 25);
            let max_so_far = results.into_iter().fold(0, cmp::max);
            assert_eq!(max_so_far as usize, size);
        }
    }

    #[tokio::test]
    async fn test_matches_sequential() {
        const MAX: u64 = 31;
        let sequential = execute_sequential((0..MAX).map(|i| move || dummy(i)))
            .await
            .unwrap();
        for size in 1..=(MAX as usize + 2) {
            let tasks = (0..MAX).map(|i| move || dummy(i));
            let batched = execute_in_batches(tasks, chunk_size(size)).await.unwrap();
            assert_eq!(batched, sequential);
        }
    }

    #[tokio::test]
    async fn test_empty() {
        let results = execute_in_batches((0..0).map(|i| move || dummy(i)), ChunkSize::default());
        assert_eq!(results.await, Ok(vec![]));
    }

    #[tokio::test]
    async fn test_fail_fast_skips_later_batches() {
        let invoked = Arc::new(AtomicUsize::new(0));
        let tasks = (0..9).map(|i| {
            let invoked = Arc::clone(&invoked);
            move || {
                invoked.fetch_add(1, Ordering::SeqCst);
                dummy_failing(i, &[4])
            }
        });
        let mut future = std::pin::pin!(execute_in_batches(tasks, chunk_size(3)));
        assert_eq!(future.as_mut().await, Err(TaskFailed(4)));
        assert!(future.is_terminated());
        // The first two batches were started, the third never was.
        assert_eq!(invoked.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_best_effort() {
        let reported = Arc::new(Mutex::new(Vec::new()));
        let tasks = (0..9).map(|i| {
            let reported = Arc::clone(&reported);
            let reporter = move |error: &TaskFailed| reported.lock().unwrap().push(error.clone());
            (move || dummy_failing(i, &[1, 4, 8])).handle_errors_with(reporter)
        });
        let results = execute_in_batches(tasks, chunk_size(3)).await.unwrap();
        assert_eq!(
            results,
            vec![Some(0), None, Some(2), Some(3), None, Some(5), Some(6), Some(7), None]
        );
        assert_eq!(filter_empty(results), vec![0, 2, 3, 5, 6, 7]);
        assert_eq!(
            *reported.lock().unwrap(),
            vec![TaskFailed(1), TaskFailed(4), TaskFailed(8)]
        );
    }
}
