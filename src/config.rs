use std::{num::NonZeroUsize, thread::available_parallelism};

use crate::error::PoolError;

const DEFAULT_THREAD_NAME_PREFIX: &str = "ordered-pool";

/// Construction options of a [`crate::WorkerPool`].
///
/// ```rust
/// use ordered_pool::PoolConfig;
///
/// let config = PoolConfig::new(4)
///     .unwrap()
///     .cancel_pending_on_shutdown(true)
///     .max_buffered(64);
///
/// assert_eq!(config.worker_count().get(), 4);
/// assert!(PoolConfig::new(0).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    worker_count: NonZeroUsize,
    cancel_pending_on_shutdown: bool,
    max_buffered: Option<NonZeroUsize>,
    thread_name_prefix: String,
}

impl PoolConfig {
    /// Configuration with `worker_count` worker threads. Fails if `worker_count` is zero.
    pub fn new(worker_count: usize) -> Result<PoolConfig, PoolError> {
        let worker_count = NonZeroUsize::new(worker_count)
            .ok_or_else(|| PoolError::InvalidConfig("worker_count must be at least 1".into()))?;
        Ok(PoolConfig::with_worker_count(worker_count))
    }

    pub fn with_worker_count(worker_count: NonZeroUsize) -> PoolConfig {
        PoolConfig {
            worker_count,
            cancel_pending_on_shutdown: false,
            max_buffered: None,
            thread_name_prefix: DEFAULT_THREAD_NAME_PREFIX.to_string(),
        }
    }

    /// If set, tasks that have not started when the pool shuts down are cancelled
    /// instead of being run to completion.
    pub fn cancel_pending_on_shutdown(mut self, cancel: bool) -> PoolConfig {
        self.cancel_pending_on_shutdown = cancel;
        self
    }

    /// Cap how far batch results may run ahead of their consumer.
    ///
    /// A worker finishing batch index `i` waits while `i` is `n` or more positions
    /// ahead of the next result to be delivered. Without a cap, completed results
    /// accumulate until they are consumed. A value of zero removes the cap.
    ///
    /// The waiting worker stays occupied. A batch that is held but not consumed
    /// can therefore take every worker, and then tasks of other batches and
    /// independently submitted tasks do not start until the batch is consumed
    /// or dropped.
    pub fn max_buffered(mut self, n: usize) -> PoolConfig {
        self.max_buffered = NonZeroUsize::new(n);
        self
    }

    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> PoolConfig {
        self.thread_name_prefix = prefix.into();
        self
    }

    pub fn worker_count(&self) -> NonZeroUsize {
        self.worker_count
    }

    pub fn cancels_pending_on_shutdown(&self) -> bool {
        self.cancel_pending_on_shutdown
    }

    pub fn buffer_limit(&self) -> Option<NonZeroUsize> {
        self.max_buffered
    }

    pub fn name_prefix(&self) -> &str {
        &self.thread_name_prefix
    }
}

impl Default for PoolConfig {
    /// One worker per available logical core minus one, at least one.
    fn default() -> PoolConfig {
        let worker_count = available_parallelism()
            .ok()
            .and_then(|n| NonZeroUsize::new(n.get().saturating_sub(1)))
            .unwrap_or(NonZeroUsize::MIN);
        PoolConfig::with_worker_count(worker_count)
    }
}
