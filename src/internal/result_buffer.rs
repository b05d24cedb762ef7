use std::{
    collections::VecDeque,
    num::NonZeroUsize,
    sync::{Condvar, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use tracing::{trace, warn};

use crate::error::PoolError;

/// Result of a non-blocking attempt to take the next result in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TakeNext<T> {
    /// The next result in order.
    Ready(T),
    /// The next result has not been deposited yet.
    Pending,
    /// Every result has been delivered.
    Exhausted,
}

struct BufferState<T> {
    // slots[i] belongs to index next_to_deliver + i
    slots: VecDeque<Option<T>>,
    next_to_deliver: usize,
    len: usize,
    stored: usize,
    abandoned: bool,
}

impl<T> BufferState<T> {
    fn take_next(&mut self) -> TakeNext<T> {
        if self.abandoned || self.next_to_deliver >= self.len {
            return TakeNext::Exhausted;
        }
        if !matches!(self.slots.front(), Some(Some(_))) {
            return TakeNext::Pending;
        }
        match self.slots.pop_front() {
            Some(Some(item)) => {
                trace!(index = self.next_to_deliver, "delivering result");
                self.next_to_deliver += 1;
                self.stored -= 1;
                TakeNext::Ready(item)
            }
            _ => TakeNext::Pending,
        }
    }
}

/// Holds the results of one batch until they can be released in submission order.
///
/// Workers deposit results in whatever order they finish. The consumer takes
/// them strictly by index starting at 0. Every held index is at or past the
/// delivery cursor, a delivered index is never held again.
pub(crate) struct ResultBuffer<T> {
    state: Mutex<BufferState<T>>,
    deposited: Condvar,
    delivered: Condvar,
    window: Option<NonZeroUsize>,
}

impl<T> ResultBuffer<T> {
    /// Buffer for a batch of `len` results. With a `window`, depositing index `i`
    /// blocks while `i >= next_to_deliver + window`.
    pub fn new(len: usize, window: Option<NonZeroUsize>) -> ResultBuffer<T> {
        ResultBuffer {
            state: Mutex::new(BufferState {
                slots: VecDeque::new(),
                next_to_deliver: 0,
                len,
                stored: 0,
                abandoned: false,
            }),
            deposited: Condvar::new(),
            delivered: Condvar::new(),
            window,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BufferState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store the result for `index`. Returns `false` if the result was discarded
    /// because the buffer was abandoned or the index is not an undelivered
    /// index of this batch.
    pub fn deposit(&self, index: usize, item: T) -> bool {
        let mut state = self.lock();
        if let Some(window) = self.window {
            while !state.abandoned && index >= state.next_to_deliver.saturating_add(window.get()) {
                trace!(index, next = state.next_to_deliver, "deposit waiting for consumer");
                state = self
                    .delivered
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        }
        self.store(state, index, item)
    }

    /// Store the result for `index` without waiting for the window.
    pub fn force_deposit(&self, index: usize, item: T) -> bool {
        let state = self.lock();
        self.store(state, index, item)
    }

    fn store(&self, mut state: MutexGuard<'_, BufferState<T>>, index: usize, item: T) -> bool {
        if state.abandoned {
            trace!(index, "discarding result of abandoned batch");
            return false;
        }
        if index < state.next_to_deliver || index >= state.len {
            warn!(index, next = state.next_to_deliver, len = state.len, "deposit out of range");
            return false;
        }

        let offset = index - state.next_to_deliver;
        if offset >= state.slots.len() {
            state.slots.resize_with(offset + 1, || None);
        }
        if state.slots[offset].is_some() {
            warn!(index, "duplicate deposit ignored");
            return false;
        }
        state.slots[offset] = Some(item);
        state.stored += 1;
        trace!(index, buffered = state.stored, "result deposited");

        drop(state);
        self.deposited.notify_all();
        true
    }

    /// Take the next result in order without blocking.
    pub fn try_take_next(&self) -> TakeNext<T> {
        let taken = self.lock().take_next();
        if let TakeNext::Ready(_) = taken {
            self.delivered.notify_all();
        }
        taken
    }

    /// Block until the next result in order is available and take it.
    /// Returns [`None`] once every result has been delivered.
    pub fn take_next_blocking(&self) -> Option<T> {
        let mut state = self.lock();
        loop {
            match state.take_next() {
                TakeNext::Ready(item) => {
                    drop(state);
                    self.delivered.notify_all();
                    return Some(item);
                }
                TakeNext::Exhausted => return None,
                TakeNext::Pending => {
                    state = self
                        .deposited
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner)
                }
            }
        }
    }

    /// Like [`ResultBuffer::take_next_blocking`], but gives up after `timeout`.
    pub fn take_next_timeout(&self, timeout: Duration) -> Result<Option<T>, PoolError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        loop {
            match state.take_next() {
                TakeNext::Ready(item) => {
                    drop(state);
                    self.delivered.notify_all();
                    return Ok(Some(item));
                }
                TakeNext::Exhausted => return Ok(None),
                TakeNext::Pending => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(PoolError::Timeout(timeout));
                    }
                    state = self
                        .deposited
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
            }
        }
    }

    /// Drop every held result and discard all future deposits.
    /// Releases workers blocked on the window.
    pub fn abandon(&self) {
        {
            let mut state = self.lock();
            state.abandoned = true;
            state.slots.clear();
            state.stored = 0;
        }
        self.delivered.notify_all();
        self.deposited.notify_all();
    }

    pub fn is_abandoned(&self) -> bool {
        self.lock().abandoned
    }

    /// Number of results deposited but not yet delivered.
    pub fn buffered(&self) -> usize {
        self.lock().stored
    }

    pub fn next_to_deliver(&self) -> usize {
        self.lock().next_to_deliver
    }

    pub fn len(&self) -> usize {
        self.lock().len
    }
}
