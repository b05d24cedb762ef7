use std::{
    fmt,
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use crate::{
    error::{Outcome, PoolError, TaskError},
    internal::{TaskState, TaskStatus},
};

/// Outcome slot of one independently submitted task. Set at most once.
pub(crate) struct HandleShared<R, E> {
    outcome: Mutex<Option<Outcome<R, E>>>,
    condvar: Condvar,
}

impl<R, E> HandleShared<R, E> {
    pub fn new() -> HandleShared<R, E> {
        HandleShared {
            outcome: Mutex::new(None),
            condvar: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Outcome<R, E>>> {
        self.outcome.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store the outcome and wake every waiter. A second outcome is ignored.
    pub fn set(&self, outcome: Outcome<R, E>) {
        let mut slot = self.lock();
        if slot.is_none() {
            *slot = Some(outcome);
            self.condvar.notify_all();
        }
    }

    fn is_set(&self) -> bool {
        self.lock().is_some()
    }

    /// Block until the outcome is set and pass it to `f`.
    fn wait_then<O>(&self, f: impl FnOnce(&Outcome<R, E>) -> O) -> O {
        let mut slot = self.lock();
        loop {
            if let Some(outcome) = slot.as_ref() {
                return f(outcome);
            }
            slot = self
                .condvar
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn wait_timeout_then<O>(
        &self,
        timeout: Duration,
        f: impl FnOnce(&Outcome<R, E>) -> O,
    ) -> Result<O, PoolError> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.lock();
        loop {
            if let Some(outcome) = slot.as_ref() {
                return Ok(f(outcome));
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(PoolError::Timeout(timeout));
            }
            slot = self
                .condvar
                .wait_timeout(slot, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

/// Removes the task from the pool's queue. Returns `false` if it was no longer queued.
pub(crate) type Withdraw = Arc<dyn Fn() -> bool + Send + Sync>;

/// Handle to a task submitted with [`crate::WorkerPool::submit_one`].
///
/// Handles are independent of each other and of any batch: they can be
/// waited on in any order. Cloning a handle gives another observer of the
/// same task, every observer receives the same outcome.
pub struct TaskHandle<R, E> {
    index: usize,
    status: TaskStatus,
    shared: Arc<HandleShared<R, E>>,
    withdraw: Withdraw,
}

impl<R, E> TaskHandle<R, E> {
    pub(crate) fn new(
        index: usize,
        status: TaskStatus,
        shared: Arc<HandleShared<R, E>>,
        withdraw: Withdraw,
    ) -> TaskHandle<R, E> {
        TaskHandle {
            index,
            status,
            shared,
            withdraw,
        }
    }

    /// Position of the task among all tasks submitted individually to its pool.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn state(&self) -> TaskState {
        self.status.get()
    }

    /// True once the outcome is available.
    pub fn done(&self) -> bool {
        self.shared.is_set()
    }

    pub fn is_running(&self) -> bool {
        self.state() == TaskState::Running
    }

    pub fn is_cancelled(&self) -> bool {
        self.state() == TaskState::Cancelled
    }

    /// Block until the outcome is available.
    pub fn wait(&self) {
        self.shared.wait_then(|_| ());
    }

    /// Block until the outcome is available or `timeout` expires.
    /// On timeout the task keeps running.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<(), PoolError> {
        self.shared.wait_timeout_then(timeout, |_| ())
    }

    /// Block until the task is finished and return its outcome.
    pub fn result(&self) -> Outcome<R, E>
    where
        R: Clone,
        E: Clone,
    {
        self.shared.wait_then(|outcome| outcome.clone())
    }

    /// Like [`TaskHandle::result`], but gives up with [`PoolError::Timeout`]
    /// after `timeout`.
    pub fn result_timeout(&self, timeout: Duration) -> Result<Outcome<R, E>, PoolError>
    where
        R: Clone,
        E: Clone,
    {
        self.shared.wait_timeout_then(timeout, |outcome| outcome.clone())
    }

    /// Cancel the task if it has not started. Returns `false` if it is already
    /// running or finished, the outcome is then left untouched.
    pub fn cancel(&self) -> bool {
        self.try_cancel().is_ok()
    }

    /// Cancel the task if it has not started.
    ///
    /// Succeeds as well if the task is already cancelled, whether through
    /// another handle or by a shutdown that cancels pending tasks.
    pub fn try_cancel(&self) -> Result<(), PoolError> {
        if (self.withdraw)() {
            self.status.cancel();
            self.shared.set(Err(TaskError::Cancelled));
            return Ok(());
        }
        if self.status.get() == TaskState::Cancelled {
            return Ok(());
        }
        Err(PoolError::CancellationRejected)
    }
}

impl<R, E> Clone for TaskHandle<R, E> {
    fn clone(&self) -> TaskHandle<R, E> {
        TaskHandle {
            index: self.index,
            status: self.status.clone(),
            shared: self.shared.clone(),
            withdraw: self.withdraw.clone(),
        }
    }
}

impl<R, E> fmt::Debug for TaskHandle<R, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("index", &self.index)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicBool, Ordering},
        thread::sleep,
    };

    use super::*;
    use crate::internal::TaskLedger;

    fn handle(queued: bool) -> (TaskHandle<u32, String>, TaskStatus, Arc<HandleShared<u32, String>>) {
        let mut ledger = TaskLedger::new();
        let (index, status) = ledger.register();
        let shared = Arc::new(HandleShared::new());
        let still_queued = Arc::new(AtomicBool::new(queued));
        let withdraw: Withdraw = Arc::new(move || still_queued.swap(false, Ordering::AcqRel));
        let handle = TaskHandle::new(index, status.clone(), shared.clone(), withdraw);
        (handle, status, shared)
    }

    #[test]
    fn test_outcome_shared_by_observers() {
        let (handle, status, shared) = handle(false);
        let observer = handle.clone();
        assert!(!handle.done());

        let waiter = std::thread::spawn(move || observer.result());
        sleep(Duration::from_millis(50));
        status.start();
        status.finish(true);
        shared.set(Ok(7));
        shared.set(Ok(8));

        assert_eq!(waiter.join().unwrap(), Ok(7));
        assert_eq!(handle.result(), Ok(7));
        assert!(handle.done());
        assert_eq!(handle.state(), TaskState::Completed);
    }

    #[test]
    fn test_result_timeout() {
        let (handle, _status, shared) = handle(false);
        assert_eq!(
            handle.result_timeout(Duration::from_millis(20)),
            Err(PoolError::Timeout(Duration::from_millis(20)))
        );
        assert_eq!(
            handle.wait_timeout(Duration::from_millis(5)),
            Err(PoolError::Timeout(Duration::from_millis(5)))
        );

        shared.set(Err(TaskError::Failed("boom".to_string())));
        assert_eq!(
            handle.result_timeout(Duration::from_millis(20)),
            Ok(Err(TaskError::Failed("boom".to_string())))
        );
    }

    #[test]
    fn test_cancel_queued_task() {
        let (handle, _status, _shared) = handle(true);
        assert!(handle.cancel());
        assert!(handle.is_cancelled());
        assert!(handle.done());
        assert_eq!(handle.result(), Err(TaskError::Cancelled));

        assert_eq!(handle.try_cancel(), Ok(()));
        assert_eq!(handle.result(), Err(TaskError::Cancelled));
    }

    #[test]
    fn test_cancel_task_already_pulled_by_shutdown() {
        let (handle, status, shared) = handle(false);
        // Shutdown removed the task from the queue and cancelled it.
        assert!(status.cancel());

        assert_eq!(handle.try_cancel(), Ok(()));
        assert!(handle.is_cancelled());

        shared.set(Err(TaskError::Cancelled));
        assert_eq!(handle.result(), Err(TaskError::Cancelled));
    }

    #[test]
    fn test_cancel_running_task_rejected() {
        let (handle, status, _shared) = handle(false);
        status.start();
        assert_eq!(handle.try_cancel(), Err(PoolError::CancellationRejected));
        assert!(handle.is_running());
        assert!(!handle.done());
    }

    #[test]
    fn test_cancel_finished_task_keeps_outcome() {
        let (handle, status, shared) = handle(false);
        status.start();
        status.finish(true);
        shared.set(Ok(1));

        assert!(!handle.cancel());
        assert_eq!(handle.state(), TaskState::Completed);
        assert_eq!(handle.result(), Ok(1));
    }
}
