use std::{
    any::Any,
    convert::Infallible,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    thread::{self, JoinHandle, ThreadId},
};

use tracing::{debug, trace, warn};

use super::{
    handle::{HandleShared, TaskHandle, Withdraw},
    ordered::OrderedResults,
};
use crate::{
    config::PoolConfig,
    error::{Outcome, PoolError, TaskError},
    internal::{Progress, ResultBuffer, TaskLedger, TaskQueue, TaskStatus, WorkerState, WorkerStatus},
    worker_traits::PoolInit,
};

type WorkerFn<T, R, E> = dyn Fn(T) -> Result<R, E> + Send + Sync;

/// Where the outcome of a task goes once it is known.
pub(crate) enum Sink<R, E> {
    Ordered(Arc<ResultBuffer<Outcome<R, E>>>),
    Handle(Arc<HandleShared<R, E>>),
}

impl<R, E> Sink<R, E> {
    fn deliver(&self, index: usize, outcome: Outcome<R, E>) {
        match self {
            Sink::Ordered(buffer) => {
                buffer.deposit(index, outcome);
            }
            Sink::Handle(shared) => shared.set(outcome),
        }
    }

    fn is_abandoned(&self) -> bool {
        match self {
            Sink::Ordered(buffer) => buffer.is_abandoned(),
            Sink::Handle(_) => false,
        }
    }

    fn belongs_to(&self, batch: &Arc<ResultBuffer<Outcome<R, E>>>) -> bool {
        match self {
            Sink::Ordered(buffer) => Arc::ptr_eq(buffer, batch),
            Sink::Handle(_) => false,
        }
    }
}

pub(crate) struct QueuedTask<T, R, E> {
    item: T,
    index: usize,
    status: TaskStatus,
    sink: Sink<R, E>,
}

impl<T, R, E> QueuedTask<T, R, E> {
    /// Mark a task that never started as cancelled and tell its consumer.
    fn cancel(self) {
        if self.status.cancel() {
            match self.sink {
                // The consumer waits for every index, so the gap must be filled.
                Sink::Ordered(buffer) => {
                    buffer.force_deposit(self.index, Err(TaskError::Cancelled));
                }
                Sink::Handle(shared) => shared.set(Err(TaskError::Cancelled)),
            }
        }
    }
}

/// A fixed set of worker threads executing submitted tasks with one worker function.
///
/// Workers take tasks from a shared FIFO queue as soon as they are idle and
/// never wait for results to be consumed. Results are returned either in
/// submission order through [`OrderedResults`] ([`WorkerPool::submit_batch`]) or
/// per task through a [`TaskHandle`] ([`WorkerPool::submit_one`]).
///
/// A task that blocks on the result of another task of the same pool can
/// starve the pool once every worker does so. Avoid submitting dependent tasks.
pub struct WorkerPool<T, R, E = Infallible>
where
    T: Send + 'static,
    R: Send + 'static,
    E: Send + 'static,
{
    task_queue: TaskQueue<QueuedTask<T, R, E>>,
    worker_state: Vec<WorkerState>,
    worker_threads: Mutex<Vec<JoinHandle<()>>>,
    worker_ids: Vec<ThreadId>,
    handle_ledger: Mutex<TaskLedger>,
    config: PoolConfig,
}

impl<T, R, E> WorkerPool<T, R, E>
where
    T: Send + 'static,
    R: Send + 'static,
    E: Send + 'static,
{
    /// Submit a batch of items. The returned iterator yields exactly one outcome
    /// per item, in the order of `items`.
    pub fn submit_batch(
        &self,
        items: impl IntoIterator<Item = T>,
    ) -> Result<OrderedResults<R, E>, PoolError> {
        if self.task_queue.is_closed() {
            return Err(PoolError::Shutdown);
        }

        let items = items.into_iter().collect::<Vec<_>>();
        let buffer = Arc::new(ResultBuffer::new(items.len(), self.config.buffer_limit()));
        let mut ledger = TaskLedger::new();
        let tasks = items.into_iter().map(|item| {
            let (index, status) = ledger.register();
            QueuedTask {
                item,
                index,
                status,
                sink: Sink::Ordered(buffer.clone()),
            }
        });
        let num_tasks = self.task_queue.extend(tasks)?;
        debug!(tasks = num_tasks, "batch submitted");

        let task_queue = self.task_queue.clone();
        let batch = buffer.clone();
        let withdraw = Box::new(move || {
            let withdrawn = task_queue.remove_where(|task| task.sink.belongs_to(&batch));
            if !withdrawn.is_empty() {
                debug!(tasks = withdrawn.len(), "batch dropped, withdrawing queued tasks");
            }
            for task in withdrawn {
                task.status.cancel();
            }
        });

        Ok(OrderedResults::new(buffer, ledger.counters(), withdraw))
    }

    /// Submit a single item and return a handle to its outcome.
    pub fn submit_one(&self, item: T) -> Result<TaskHandle<R, E>, PoolError> {
        let mut ledger = lock(&self.handle_ledger);
        let (index, status) = ledger.register();
        let shared = Arc::new(HandleShared::new());
        let task = QueuedTask {
            item,
            index,
            status: status.clone(),
            sink: Sink::Handle(shared.clone()),
        };
        if let Err(err) = self.task_queue.push(task) {
            ledger.rollback(1);
            return Err(err);
        }
        drop(ledger);
        trace!(index, "task submitted");

        let task_queue = self.task_queue.clone();
        let queued = status.clone();
        let withdraw: Withdraw = Arc::new(move || {
            !task_queue
                .remove_where(|task| task.status.same_task(&queued))
                .is_empty()
        });

        Ok(TaskHandle::new(index, status, shared, withdraw))
    }

    pub fn worker_count(&self) -> usize {
        self.worker_state.len()
    }

    /// Number of tasks waiting in the queue. Tasks being executed are not included.
    pub fn pending_tasks(&self) -> usize {
        self.task_queue.len()
    }

    pub fn busy_workers(&self) -> usize {
        self.worker_state
            .iter()
            .filter(|state| state.status() == WorkerStatus::Busy)
            .count()
    }

    /// Status of every worker, ordered by worker id.
    pub fn worker_statuses(&self) -> Vec<WorkerStatus> {
        self.worker_state.iter().map(WorkerState::status).collect()
    }

    /// Progress of all tasks submitted with [`WorkerPool::submit_one`].
    pub fn progress(&self) -> Progress {
        lock(&self.handle_ledger).progress()
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn is_shutdown(&self) -> bool {
        self.task_queue.is_closed()
    }

    /// Stop accepting tasks and wait for the worker threads to exit.
    /// Queued tasks are run or cancelled as configured with
    /// [`PoolConfig::cancel_pending_on_shutdown`].
    pub fn shutdown(&self) {
        self.shutdown_with(self.config.cancels_pending_on_shutdown());
    }

    /// Stop accepting tasks and wait for the worker threads to exit.
    /// If `cancel_pending` is set, queued tasks are cancelled, otherwise they
    /// are executed first. Running tasks always finish.
    ///
    /// Called from inside a worker function, the pool is closed but not joined.
    pub fn shutdown_with(&self, cancel_pending: bool) {
        let cancelled = self.task_queue.close(!cancel_pending);
        if !cancelled.is_empty() {
            debug!(tasks = cancelled.len(), "cancelling queued tasks on shutdown");
        }
        for task in cancelled {
            task.cancel();
        }

        if self.worker_ids.contains(&thread::current().id()) {
            warn!("shutdown called from a worker thread, not waiting for workers");
            return;
        }

        let mut worker_threads = lock(&self.worker_threads);
        if worker_threads.is_empty() {
            return;
        }
        debug!(workers = worker_threads.len(), "waiting for workers to exit");
        for handle in worker_threads.drain(..) {
            if handle.join().is_err() {
                warn!("worker thread panicked");
            }
        }
        debug!("pool shut down");
    }
}

impl<T, R, E, F> PoolInit<F> for WorkerPool<T, R, E>
where
    T: Send + 'static,
    R: Send + 'static,
    E: Send + 'static,
    F: Fn(T) -> Result<R, E> + Send + Sync + 'static,
{
    fn with_config(config: PoolConfig, worker_function: F) -> Result<Self, PoolError> {
        let worker_function: Arc<WorkerFn<T, R, E>> = Arc::new(worker_function);
        let task_queue = TaskQueue::new();

        let num_workers = config.worker_count().get();
        let mut worker_state = Vec::with_capacity(num_workers);
        let mut worker_threads = Vec::with_capacity(num_workers);
        for id in 0..num_workers {
            let state = WorkerState::new(id);
            let spawned = spawn_worker_thread(
                format!("{}-{}", config.name_prefix(), id),
                worker_function.clone(),
                task_queue.clone(),
                state.clone(),
            );
            match spawned {
                Ok(handle) => worker_threads.push(handle),
                Err(err) => {
                    task_queue.close(true);
                    for handle in worker_threads {
                        let _ = handle.join();
                    }
                    return Err(PoolError::Spawn(err.to_string()));
                }
            }
            worker_state.push(state);
        }
        debug!(workers = num_workers, "pool started");

        Ok(WorkerPool {
            task_queue,
            worker_state,
            worker_ids: worker_threads.iter().map(|h| h.thread().id()).collect(),
            worker_threads: Mutex::new(worker_threads),
            handle_ledger: Mutex::new(TaskLedger::new()),
            config,
        })
    }
}

fn spawn_worker_thread<T, R, E>(
    name: String,
    worker_function: Arc<WorkerFn<T, R, E>>,
    task_queue: TaskQueue<QueuedTask<T, R, E>>,
    state: WorkerState,
) -> std::io::Result<JoinHandle<()>>
where
    T: Send + 'static,
    R: Send + 'static,
    E: Send + 'static,
{
    thread::Builder::new().name(name).spawn(move || {
        loop {
            let mut started = false;
            let task = task_queue.wait_for_task_and_then(|task| {
                started = if task.sink.is_abandoned() {
                    task.status.cancel();
                    false
                } else {
                    task.status.start()
                };
                if started {
                    state.set_busy();
                }
            });
            let Some(task) = task else {
                break;
            };
            if !started {
                continue;
            }

            trace!(worker = state.id(), index = task.index, "task started");
            let outcome = execute(&*worker_function, task.item);
            task.status.finish(outcome.is_ok());
            trace!(worker = state.id(), index = task.index, ok = outcome.is_ok(), "task finished");
            task.sink.deliver(task.index, outcome);
            state.set_idle();
        }
        trace!(worker = state.id(), "worker exiting");
    })
}

/// Run the worker function, turning an error or a panic into a failure outcome.
fn execute<T, R, E, F>(worker_function: &F, item: T) -> Outcome<R, E>
where
    F: Fn(T) -> Result<R, E> + ?Sized,
{
    match panic::catch_unwind(AssertUnwindSafe(|| worker_function(item))) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(TaskError::Failed(err)),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            warn!(%message, "task panicked");
            Err(TaskError::Panicked(message))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T, R, E> Drop for WorkerPool<T, R, E>
where
    T: Send + 'static,
    R: Send + 'static,
    E: Send + 'static,
{
    /// Shut the pool down with the configured policy and wait for the workers.
    fn drop(&mut self) {
        self.shutdown();
    }
}
