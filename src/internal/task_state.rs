use std::sync::{
    Arc,
    atomic::{AtomicU8, Ordering},
};

use super::ledger::LedgerCounters;

/// Lifecycle of a submitted task.
///
/// `Pending -> Running -> Completed | Failed`, or `Pending -> Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskState {
    fn from_u8(value: u8) -> TaskState {
        match value {
            0 => TaskState::Pending,
            1 => TaskState::Running,
            2 => TaskState::Completed,
            3 => TaskState::Failed,
            _ => TaskState::Cancelled,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            TaskState::Pending => 0,
            TaskState::Running => 1,
            TaskState::Completed => 2,
            TaskState::Failed => 3,
            TaskState::Cancelled => 4,
        }
    }

    /// True once the task will never run again.
    pub fn is_finished(self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Cancelled
        )
    }
}

/// Shared state of one task. Clones observe the same task.
///
/// Every transition is also recorded in the ledger the task was registered with.
pub(crate) struct TaskStatus {
    state: Arc<AtomicU8>,
    ledger: Arc<LedgerCounters>,
}

impl TaskStatus {
    pub(crate) fn new(ledger: Arc<LedgerCounters>) -> TaskStatus {
        TaskStatus {
            state: Arc::new(AtomicU8::new(TaskState::Pending.as_u8())),
            ledger,
        }
    }

    pub fn get(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn transition(&self, from: TaskState, to: TaskState) -> bool {
        let moved = self
            .state
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if moved {
            self.ledger.record(from, to);
        }
        moved
    }

    /// Claim a pending task for execution.
    pub fn start(&self) -> bool {
        self.transition(TaskState::Pending, TaskState::Running)
    }

    /// Cancel a task that has not started.
    pub fn cancel(&self) -> bool {
        self.transition(TaskState::Pending, TaskState::Cancelled)
    }

    pub fn finish(&self, success: bool) -> bool {
        let to = if success {
            TaskState::Completed
        } else {
            TaskState::Failed
        };
        self.transition(TaskState::Running, to)
    }

    /// True if both refer to the same task.
    pub fn same_task(&self, other: &TaskStatus) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl Clone for TaskStatus {
    fn clone(&self) -> TaskStatus {
        TaskStatus {
            state: self.state.clone(),
            ledger: self.ledger.clone(),
        }
    }
}
