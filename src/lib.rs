//! Batched, order-preserving execution of deferred futures.
//!
//! This crate runs a list of _deferred tasks_ (closures that produce a future
//! when invoked) a fixed number at a time. Tasks inside a batch run concurrently,
//! batches run strictly one after another, and the results always come back in
//! the same order as the input tasks, no matter in which order they completed.
//!
//! This is handy when you have a pile of requests for a rate-limited API and
//! you don't want to fire all of them at once: pick a chunk size and at most
//! that many requests will ever be in flight.
//!
//! The building blocks are small and can be used on their own:
//!
//! - [`sequential::execute_sequential`] runs tasks one at a time.
//! - [`batched::combine_deferred_tasks`] turns many tasks into one concurrent task.
//! - [`batched::execute_in_batches`] glues both together.
//! - [`handler::default_error_handler`] turns a failure into `None` after reporting it.
//! - [`results`] has helpers to drop `None`s and flatten nested results.
//!
//! Everything is fail-fast by default: the first error aborts the whole run and
//! later batches are never started. Wrap individual tasks with
//! [`common::DeferredTaskExt::handle_errors`] if you'd rather get partial results.
//!
//! ```rust
//! use futures_batched::batched::execute_in_batches;
//! use futures_batched::common::ChunkSize;
//!
//! async fn fetch(id: u64) -> Result<u64, std::io::Error> {
//!     Ok(id * 10)
//! }
//!
//! let tasks = (1..=7).map(|id| move || fetch(id));
//! let chunk_size = ChunkSize::new(3).unwrap();
//!
//! tokio_test::block_on(async move {
//!     let results = execute_in_batches(tasks, chunk_size).await.unwrap();
//!     assert_eq!(results, vec![10, 20, 30, 40, 50, 60, 70]);
//! });
//! ```
pub mod batched;
pub mod common;
pub mod error;
pub mod handler;
pub mod results;
pub mod sequential;
