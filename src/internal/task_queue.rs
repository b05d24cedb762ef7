use std::{
    collections::VecDeque,
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
};

use crate::error::PoolError;

struct QueueState<T> {
    tasks: VecDeque<T>,
    closed: bool,
}

struct InnerTaskQueue<T> {
    state: Mutex<QueueState<T>>,
    condvar: Condvar,
}

impl<T> InnerTaskQueue<T> {
    fn new() -> InnerTaskQueue<T> {
        InnerTaskQueue {
            state: Mutex::new(QueueState {
                tasks: VecDeque::new(),
                closed: false,
            }),
            condvar: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn len(&self) -> usize {
        self.lock().tasks.len()
    }

    fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn push(&self, task: T) -> Result<(), PoolError> {
        let mut state = self.lock();
        if state.closed {
            return Err(PoolError::Shutdown);
        }
        state.tasks.push_back(task);
        self.condvar.notify_one();
        Ok(())
    }

    fn extend(&self, new_tasks: impl IntoIterator<Item = T>) -> Result<usize, PoolError> {
        let num_new = {
            let mut state = self.lock();
            if state.closed {
                return Err(PoolError::Shutdown);
            }
            let len = state.tasks.len();
            state.tasks.extend(new_tasks);
            state.tasks.len() - len
        };
        match num_new {
            0 => (),
            1 => self.condvar.notify_one(),
            _ => self.condvar.notify_all(),
        }
        Ok(num_new)
    }

    fn remove_where(&self, mut predicate: impl FnMut(&T) -> bool) -> Vec<T> {
        let mut state = self.lock();
        let mut removed = Vec::new();
        let mut kept = VecDeque::with_capacity(state.tasks.len());
        for task in state.tasks.drain(..) {
            if predicate(&task) {
                removed.push(task);
            } else {
                kept.push_back(task);
            }
        }
        state.tasks = kept;
        removed
    }

    fn close(&self, drain: bool) -> Vec<T> {
        let removed = {
            let mut state = self.lock();
            state.closed = true;
            if drain {
                Vec::new()
            } else {
                state.tasks.drain(..).collect()
            }
        };
        self.condvar.notify_all();
        removed
    }

    fn wait_for_task_and_then(&self, and_then: impl FnOnce(&T)) -> Option<T> {
        let mut state = self.lock();
        loop {
            match state.tasks.pop_front() {
                Some(task) => {
                    and_then(&task);
                    return Some(task);
                }
                None if state.closed => return None,
                None => {
                    state = self
                        .condvar
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner)
                }
            }
        }
    }
}

/// FIFO of pending work shared by every worker thread of a pool.
///
/// Once closed the queue rejects new work, and [`TaskQueue::wait_for_task_and_then`]
/// returns [`None`] as soon as the remaining tasks are gone.
pub(crate) struct TaskQueue<T> {
    inner: Arc<InnerTaskQueue<T>>,
}

impl<T> TaskQueue<T> {
    pub fn new() -> TaskQueue<T> {
        TaskQueue {
            inner: Arc::new(InnerTaskQueue::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    pub fn push(&self, task: T) -> Result<(), PoolError> {
        self.inner.push(task)
    }

    /// Append all tasks under a single lock, so they stay contiguous in the queue.
    pub fn extend(&self, new_tasks: impl IntoIterator<Item = T>) -> Result<usize, PoolError> {
        self.inner.extend(new_tasks)
    }

    /// Remove every queued task matching `predicate` and return them in queue order.
    pub fn remove_where(&self, predicate: impl FnMut(&T) -> bool) -> Vec<T> {
        self.inner.remove_where(predicate)
    }

    /// Stop accepting work. Queued tasks are kept for the workers if `drain`
    /// is set, otherwise they are removed and returned.
    pub fn close(&self, drain: bool) -> Vec<T> {
        self.inner.close(drain)
    }

    /// Block until a task is available and pop it. `and_then` runs while the
    /// queue is still locked, so no other thread can observe the task as
    /// neither queued nor claimed.
    pub fn wait_for_task_and_then(&self, and_then: impl FnOnce(&T)) -> Option<T> {
        self.inner.wait_for_task_and_then(and_then)
    }
}

impl<T> Clone for TaskQueue<T> {
    fn clone(&self) -> TaskQueue<T> {
        TaskQueue {
            inner: self.inner.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicBool, Ordering},
        thread::sleep,
        time::Duration,
    };

    use super::*;

    #[test]
    fn test_claim_is_atomic_with_pop() {
        let task_queue = TaskQueue::new();
        task_queue.push(5).unwrap();
        let claimed = Arc::new(AtomicBool::new(false));

        let worker = {
            let task_queue = task_queue.clone();
            let claimed = claimed.clone();
            std::thread::spawn(move || {
                task_queue.wait_for_task_and_then(|_| {
                    sleep(Duration::from_millis(50));
                    claimed.store(true, Ordering::Release);
                })
            })
        };

        // Whenever the task is gone from the queue it must already be claimed.
        loop {
            if task_queue.len() == 0 {
                assert!(claimed.load(Ordering::Acquire));
                break;
            }
            std::thread::yield_now();
        }
        assert_eq!(worker.join().unwrap(), Some(5));
    }

    #[test]
    fn test_waiters_claim_each_task_once() {
        let task_queue = TaskQueue::new();
        let workers = (0..4)
            .map(|_| {
                let task_queue = task_queue.clone();
                std::thread::spawn(move || {
                    std::iter::from_fn(|| task_queue.wait_for_task_and_then(|_| ()))
                        .collect::<Vec<_>>()
                })
            })
            .collect::<Vec<_>>();

        sleep(Duration::from_millis(50));
        assert!(workers.iter().all(|w| !w.is_finished()));

        assert_eq!(task_queue.extend(0..1), Ok(1));
        assert_eq!(task_queue.extend(0..0), Ok(0));
        assert_eq!(task_queue.extend(1..200), Ok(199));
        task_queue.close(true);

        let mut claimed = workers
            .into_iter()
            .flat_map(|w| w.join().unwrap())
            .collect::<Vec<_>>();
        claimed.sort_unstable();
        assert_eq!(claimed, (0..200).collect::<Vec<_>>());
    }

    #[test]
    fn test_and_then_sees_popped_task() {
        let task_queue = TaskQueue::new();
        task_queue.extend([7, 8]).unwrap();

        let mut seen = None;
        let task = task_queue.wait_for_task_and_then(|task| seen = Some(*task));
        assert_eq!(task, Some(7));
        assert_eq!(seen, Some(7));
    }

    #[test]
    fn test_remove_where_keeps_order() {
        let task_queue = TaskQueue::new();
        task_queue.extend(0..10).unwrap();

        let removed = task_queue.remove_where(|n| n % 3 == 0);
        assert_eq!(removed, vec![0, 3, 6, 9]);
        assert_eq!(task_queue.len(), 6);

        let rest: Vec<_> = std::iter::from_fn(|| {
            if task_queue.len() == 0 {
                None
            } else {
                task_queue.wait_for_task_and_then(|_| ())
            }
        })
        .collect();
        assert_eq!(rest, vec![1, 2, 4, 5, 7, 8]);
    }

    #[test]
    fn test_closed_queue_rejects_and_releases_waiters() {
        let task_queue: TaskQueue<u32> = TaskQueue::new();
        let waiter = {
            let task_queue = task_queue.clone();
            std::thread::spawn(move || task_queue.wait_for_task_and_then(|_| ()))
        };

        sleep(Duration::from_millis(100));
        assert!(task_queue.close(true).is_empty());
        assert_eq!(waiter.join().unwrap(), None);

        assert!(task_queue.is_closed());
        assert_eq!(task_queue.push(1), Err(PoolError::Shutdown));
        assert_eq!(task_queue.extend([1, 2]), Err(PoolError::Shutdown));
    }

    #[test]
    fn test_close_with_drain_keeps_tasks() {
        let task_queue = TaskQueue::new();
        task_queue.extend([1, 2, 3]).unwrap();

        assert!(task_queue.close(true).is_empty());
        assert_eq!(task_queue.wait_for_task_and_then(|_| ()), Some(1));
        assert_eq!(task_queue.wait_for_task_and_then(|_| ()), Some(2));
        assert_eq!(task_queue.wait_for_task_and_then(|_| ()), Some(3));
        assert_eq!(task_queue.wait_for_task_and_then(|_| ()), None);
    }

    #[test]
    fn test_close_without_drain_returns_tasks() {
        let task_queue = TaskQueue::new();
        task_queue.extend([1, 2, 3]).unwrap();

        assert_eq!(task_queue.close(false), vec![1, 2, 3]);
        assert_eq!(task_queue.len(), 0);
        assert_eq!(task_queue.wait_for_task_and_then(|_| ()), None);
    }
}
