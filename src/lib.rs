//! # Ordered Pool
//!
//! A fixed-size pool of worker threads that runs submitted tasks as soon as a worker is free
//! and hands the results back in one of two ways:
//! - [`WorkerPool::submit_batch`] returns an [`OrderedResults`] iterator yielding one outcome per item
//!   in submission order, no matter in which order the tasks finish.
//! - [`WorkerPool::submit_one`] returns a [`TaskHandle`] that can be waited on, polled or cancelled
//!   independently of every other task.
//!
//! Workers never wait for results to be consumed. A slow first item only delays *delivery* of the
//! later ones, they are computed in the meantime and held until their turn.
//!
//! ## Example
//! ```rust
//! use ordered_pool::prelude::*;
//!
//! fn main() -> Result<(), PoolError> {
//!     let pool = WorkerPool::with_num_threads(4, |n: u64| Ok::<_, String>(n * n))?;
//!
//!     let squares = pool
//!         .submit_batch(1..=5)?
//!         .collect::<Result<Vec<_>, _>>()
//!         .unwrap();
//!     assert_eq!(squares, vec![1, 4, 9, 16, 25]);
//!
//!     let handle = pool.submit_one(12)?;
//!     assert_eq!(handle.result(), Ok(144));
//!     Ok(())
//! }
//! ```
//!
//! ## Failures are results
//! An error returned by the worker function, or a panic inside it, becomes the outcome of that task.
//! It is delivered at the task's position and does not stop the following results.
//! ```rust
//! use ordered_pool::prelude::*;
//!
//! let pool = WorkerPool::with_num_threads(2, |n: i32| {
//!     if n < 0 {
//!         Err(format!("{n} is negative"))
//!     } else {
//!         Ok(n)
//!     }
//! })
//! .unwrap();
//!
//! let outcomes = pool.submit_batch([1, -2, 3]).unwrap().collect::<Vec<_>>();
//! assert_eq!(
//!     outcomes,
//!     vec![Ok(1), Err(TaskError::Failed("-2 is negative".to_string())), Ok(3)]
//! );
//! ```
//!
//! ## Tasks can be cancelled before they start
//! ```rust
//! use ordered_pool::prelude::*;
//! # use std::{thread::sleep, time::Duration};
//!
//! let pool = WorkerPool::with_num_threads(1, |ms: u64| {
//!     sleep(Duration::from_millis(ms));
//!     Ok::<_, ()>(ms)
//! })
//! .unwrap();
//!
//! let running = pool.submit_one(100).unwrap();
//! let queued = pool.submit_one(100).unwrap();
//! sleep(Duration::from_millis(20));
//!
//! assert!(queued.cancel());
//! assert!(!running.cancel());
//! assert_eq!(queued.result(), Err(TaskError::Cancelled));
//! assert_eq!(running.result(), Ok(100));
//! ```
//!
//! ## Hazards
//! A task that waits for the result of another task of the same pool can starve the pool
//! once every worker is doing so. With [`PoolConfig::max_buffered`] set, an [`OrderedResults`]
//! that is held but never consumed keeps workers of that batch waiting. Once every worker is
//! waiting on it, nothing queued behind the batch starts either: tasks of later batches and
//! [`TaskHandle`]s of [`WorkerPool::submit_one`] stall, and so does [`WorkerPool::shutdown`].
//! Consuming or dropping the iterator releases them.

mod config;
mod error;
mod internal;
mod worker_traits;
mod workers;

pub use config::PoolConfig;
pub use error::{Outcome, PoolError, TaskError};
pub use internal::{Progress, TakeNext, TaskState, WorkerStatus};
pub use worker_traits::PoolInit;
pub use workers::{OrderedResults, TaskHandle, WorkerPool};

pub mod prelude {
    pub use crate::config::PoolConfig;
    pub use crate::error::{Outcome, PoolError, TaskError};
    pub use crate::internal::{TakeNext, TaskState};
    pub use crate::worker_traits::PoolInit;
    pub use crate::workers::{OrderedResults, TaskHandle, WorkerPool};
}
