//! Helpers to post-process resolved results.

use futures::future::{try_join_all, MapOk, TryJoinAll};
use futures::{Future, TryFutureExt};

/// Keep only the present values, preserving their relative order.
///
/// ```rust
/// use futures_batched::results::filter_empty;
///
/// assert_eq!(filter_empty(vec![Some(1), None, Some(3), None]), vec![1, 3]);
/// ```
pub fn filter_empty<I, T>(items: I) -> Vec<T>
where
    I: IntoIterator<Item = Option<T>>,
{
    items.into_iter().flatten().collect()
}

/// Concatenate nested sequences, in order.
///
/// ```rust
/// use futures_batched::results::flatten;
///
/// assert_eq!(flatten(vec![vec![1, 2], vec![], vec![3]]), vec![1, 2, 3]);
/// assert!(flatten(Vec::<Vec<u8>>::new()).is_empty());
/// ```
pub fn flatten<I, T>(nested: I) -> Vec<T>
where
    I: IntoIterator,
    I::Item: IntoIterator<Item = T>,
{
    nested.into_iter().flatten().collect()
}

type FilterFn<T> = fn(Vec<Option<T>>) -> Vec<T>;

/// Future returned by [`resolve_all_and_filter`].
pub type ResolveAllAndFilter<F, T> = MapOk<TryJoinAll<F>, FilterFn<T>>;

/// Wait for every future concurrently, then drop the `None`s.
///
/// Fails with the first error if any of the futures fails. No error handler is
/// applied here; wrap the futures with
/// [`crate::handler::default_error_handler`] first if failures should be
/// skipped instead.
///
/// ```rust
/// use futures_batched::results::resolve_all_and_filter;
///
/// async fn lookup(id: u64) -> Result<Option<u64>, String> {
///     Ok((id % 2 == 0).then_some(id))
/// }
///
/// let resolved = tokio_test::block_on(resolve_all_and_filter((0..6).map(lookup)));
/// assert_eq!(resolved, Ok(vec![0, 2, 4]));
/// ```
pub fn resolve_all_and_filter<I, F, T, E>(futures: I) -> ResolveAllAndFilter<F, T>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<Option<T>, E>>,
{
    try_join_all(futures).map_ok(filter_empty as FilterFn<T>)
}
