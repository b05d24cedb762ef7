//! Error types.

use std::time::Duration;

use thiserror::Error;

/// Why a task did not produce a value.
///
/// A `TaskError` is part of the task's outcome. It is stored next to the
/// successful results and handed to whoever retrieves that specific task,
/// it never unwinds a worker thread.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError<E> {
    /// The worker function returned an error.
    #[error("task failed: {0}")]
    Failed(E),

    /// The worker function panicked. Holds the panic message if it was a string.
    #[error("task panicked: {0}")]
    Panicked(String),

    /// The task was removed from the queue before a worker picked it up.
    #[error("task was cancelled before it started")]
    Cancelled,
}

impl<E> TaskError<E> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TaskError::Cancelled)
    }
}

/// The outcome of a single task: its value or the reason it has none.
pub type Outcome<R, E> = Result<R, TaskError<E>>;

/// Errors returned by the pool itself, as opposed to errors of the work it runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("pool is shutting down, no new tasks are accepted")]
    Shutdown,

    /// A bounded wait expired. The task keeps running.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The task already started or finished and can no longer be cancelled.
    #[error("task already started, cancellation rejected")]
    CancellationRejected,

    #[error("invalid pool configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to spawn worker thread: {0}")]
    Spawn(String),
}
