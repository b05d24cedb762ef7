use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use super::task_state::{TaskState, TaskStatus};

/// Snapshot of how far the tasks of a ledger have progressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Progress {
    pub submitted: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl Progress {
    /// True once no task is waiting or running.
    pub fn is_finished(&self) -> bool {
        self.pending == 0 && self.running == 0
    }
}

#[derive(Debug, Default)]
pub(crate) struct LedgerCounters {
    submitted: AtomicUsize,
    running: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
    cancelled: AtomicUsize,
}

impl LedgerCounters {
    fn counter(&self, state: TaskState) -> Option<&AtomicUsize> {
        match state {
            TaskState::Pending => None,
            TaskState::Running => Some(&self.running),
            TaskState::Completed => Some(&self.completed),
            TaskState::Failed => Some(&self.failed),
            TaskState::Cancelled => Some(&self.cancelled),
        }
    }

    pub fn record(&self, from: TaskState, to: TaskState) {
        // Count the new state first so a concurrent snapshot never sees the task vanish.
        if let Some(counter) = self.counter(to) {
            counter.fetch_add(1, Ordering::AcqRel);
        }
        if let Some(counter) = self.counter(from) {
            counter.fetch_sub(1, Ordering::AcqRel);
        }
    }

    pub fn snapshot(&self) -> Progress {
        let submitted = self.submitted.load(Ordering::Acquire);
        let running = self.running.load(Ordering::Acquire);
        let completed = self.completed.load(Ordering::Acquire);
        let failed = self.failed.load(Ordering::Acquire);
        let cancelled = self.cancelled.load(Ordering::Acquire);
        Progress {
            submitted,
            pending: submitted.saturating_sub(running + completed + failed + cancelled),
            running,
            completed,
            failed,
            cancelled,
        }
    }
}

/// Hands out sequence indices, starting at 0, in registration order.
///
/// Registration takes `&mut self`, so indices of one ledger are assigned
/// serially even though the tasks run concurrently.
pub(crate) struct TaskLedger {
    next_index: usize,
    counters: Arc<LedgerCounters>,
}

impl TaskLedger {
    pub fn new() -> TaskLedger {
        TaskLedger {
            next_index: 0,
            counters: Arc::new(LedgerCounters::default()),
        }
    }

    /// Assign the next sequence index and the status cell that tracks the task.
    pub fn register(&mut self) -> (usize, TaskStatus) {
        let index = self.next_index;
        self.next_index += 1;
        self.counters.submitted.fetch_add(1, Ordering::AcqRel);
        (index, TaskStatus::new(self.counters.clone()))
    }

    /// Forget the last `n` registrations. Used when the tasks never reached the queue.
    pub fn rollback(&mut self, n: usize) {
        self.next_index -= n;
        self.counters.submitted.fetch_sub(n, Ordering::AcqRel);
    }

    pub fn counters(&self) -> Arc<LedgerCounters> {
        self.counters.clone()
    }

    pub fn progress(&self) -> Progress {
        self.counters.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indices_start_at_zero_and_increase() {
        let mut ledger = TaskLedger::new();
        let indices = (0..5).map(|_| ledger.register().0).collect::<Vec<_>>();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);

        let mut other = TaskLedger::new();
        assert_eq!(other.register().0, 0);
    }

    #[test]
    fn test_progress_follows_transitions() {
        let mut ledger = TaskLedger::new();
        let statuses = (0..4).map(|_| ledger.register().1).collect::<Vec<_>>();
        assert_eq!(
            ledger.progress(),
            Progress {
                submitted: 4,
                pending: 4,
                ..Progress::default()
            }
        );

        statuses[0].start();
        statuses[1].start();
        statuses[2].cancel();
        statuses[0].finish(true);

        let progress = ledger.progress();
        assert_eq!(progress.pending, 1);
        assert_eq!(progress.running, 1);
        assert_eq!(progress.completed, 1);
        assert_eq!(progress.cancelled, 1);
        assert!(!progress.is_finished());

        statuses[1].finish(false);
        statuses[3].start();
        statuses[3].finish(true);

        let progress = ledger.progress();
        assert_eq!(progress.failed, 1);
        assert_eq!(progress.completed, 2);
        assert!(progress.is_finished());
    }

    #[test]
    fn test_rollback() {
        let mut ledger = TaskLedger::new();
        ledger.register();
        ledger.register();
        ledger.rollback(2);
        assert_eq!(ledger.register().0, 0);
        assert_eq!(ledger.progress().submitted, 1);
    }
}
