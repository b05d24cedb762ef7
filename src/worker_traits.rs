use crate::{config::PoolConfig, error::PoolError};

/// Methods for creating a worker pool.
pub trait PoolInit<F>
where
    Self: Sized,
{
    /// Create a pool from a configuration and a worker function.
    /// Spawns the worker threads, which start taking tasks from the queue immediately.
    fn with_config(config: PoolConfig, worker_function: F) -> Result<Self, PoolError>;

    /// Create a pool with a given number of worker threads and a worker function.
    /// Fails if `num_worker_threads` is zero.
    fn with_num_threads(num_worker_threads: usize, worker_function: F) -> Result<Self, PoolError> {
        Self::with_config(PoolConfig::new(num_worker_threads)?, worker_function)
    }

    /// Create a pool with a given worker function.
    /// The number of worker threads will be set to the number of available logical cores minus one, at least one.
    fn new(worker_function: F) -> Result<Self, PoolError> {
        Self::with_config(PoolConfig::default(), worker_function)
    }
}
