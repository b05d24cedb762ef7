use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

/// Whether a worker thread is executing a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerStatus {
    Idle,
    Busy,
}

/// State of a worker thread, shared between the thread and its pool.
pub(crate) struct WorkerState {
    id: usize,
    is_busy: Arc<AtomicBool>,
}

impl WorkerState {
    pub(crate) fn new(id: usize) -> WorkerState {
        WorkerState {
            id,
            is_busy: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub(crate) fn set_busy(&self) {
        self.is_busy.store(true, Ordering::Release);
    }

    pub(crate) fn set_idle(&self) {
        self.is_busy.store(false, Ordering::Release);
    }

    pub fn status(&self) -> WorkerStatus {
        if self.is_busy.load(Ordering::Acquire) {
            WorkerStatus::Busy
        } else {
            WorkerStatus::Idle
        }
    }
}

impl Clone for WorkerState {
    fn clone(&self) -> WorkerState {
        WorkerState {
            id: self.id,
            is_busy: self.is_busy.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state() {
        let state = WorkerState::new(3);
        let observer = state.clone();
        assert_eq!(observer.id(), 3);
        assert_eq!(observer.status(), WorkerStatus::Idle);

        state.set_busy();
        assert_eq!(observer.status(), WorkerStatus::Busy);

        state.set_busy();
        assert_eq!(observer.status(), WorkerStatus::Busy);

        state.set_idle();
        assert_eq!(observer.status(), WorkerStatus::Idle);
    }
}
