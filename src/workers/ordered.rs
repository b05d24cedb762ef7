use std::{fmt, iter::FusedIterator, sync::Arc, time::Duration};

use crate::{
    error::{Outcome, PoolError},
    internal::{LedgerCounters, Progress, ResultBuffer, TakeNext},
};

pub(crate) type Withdraw = Box<dyn FnOnce() + Send + Sync>;

/// Results of one batch, in the order the items were submitted.
///
/// Returned by [`crate::WorkerPool::submit_batch`]. The tasks start as soon as
/// workers are free, whether or not this iterator is polled. [`Iterator::next`]
/// blocks only until the result at the current position is available, results
/// of later items that finished first are held until their turn.
///
/// Dropping the iterator early withdraws the batch's tasks that have not
/// started yet and discards every result that arrives afterwards.
pub struct OrderedResults<R, E> {
    buffer: Arc<ResultBuffer<Outcome<R, E>>>,
    ledger: Arc<LedgerCounters>,
    withdraw: Option<Withdraw>,
}

impl<R, E> OrderedResults<R, E> {
    pub(crate) fn new(
        buffer: Arc<ResultBuffer<Outcome<R, E>>>,
        ledger: Arc<LedgerCounters>,
        withdraw: Withdraw,
    ) -> OrderedResults<R, E> {
        OrderedResults {
            buffer,
            ledger,
            withdraw: Some(withdraw),
        }
    }

    /// Return the next result if it is available. This function will not block.
    pub fn try_next(&mut self) -> TakeNext<Outcome<R, E>> {
        self.buffer.try_take_next()
    }

    /// Return the next result, blocking for at most `timeout`.
    /// Returns `Ok(None)` once every result has been delivered.
    pub fn next_timeout(&mut self, timeout: Duration) -> Result<Option<Outcome<R, E>>, PoolError> {
        self.buffer.take_next_timeout(timeout)
    }

    /// Position of the next result to be returned.
    pub fn position(&self) -> usize {
        self.buffer.next_to_deliver()
    }

    /// Number of results that finished but have not been returned yet.
    pub fn buffered(&self) -> usize {
        self.buffer.buffered()
    }

    /// Execution progress of the batch's tasks.
    pub fn progress(&self) -> Progress {
        self.ledger.snapshot()
    }
}

impl<R, E> Iterator for OrderedResults<R, E> {
    type Item = Outcome<R, E>;

    /// Block until the result at the current position is available and return it.
    fn next(&mut self) -> Option<Self::Item> {
        self.buffer.take_next_blocking()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.buffer.len() - self.buffer.next_to_deliver();
        (remaining, Some(remaining))
    }
}

impl<R, E> ExactSizeIterator for OrderedResults<R, E> {}

impl<R, E> FusedIterator for OrderedResults<R, E> {}

impl<R, E> Drop for OrderedResults<R, E> {
    fn drop(&mut self) {
        if let Some(withdraw) = self.withdraw.take() {
            withdraw();
        }
        self.buffer.abandon();
    }
}

impl<R, E> fmt::Debug for OrderedResults<R, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderedResults")
            .field("position", &self.position())
            .field("len", &self.buffer.len())
            .field("buffered", &self.buffered())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::{error::TaskError, internal::TaskLedger};

    fn batch(len: usize) -> (OrderedResults<u32, String>, Arc<ResultBuffer<Outcome<u32, String>>>, Arc<AtomicBool>) {
        let buffer = Arc::new(ResultBuffer::new(len, None));
        let withdrawn = Arc::new(AtomicBool::new(false));
        let flag = withdrawn.clone();
        let results = OrderedResults::new(
            buffer.clone(),
            TaskLedger::new().counters(),
            Box::new(move || flag.store(true, Ordering::Release)),
        );
        (results, buffer, withdrawn)
    }

    #[test]
    fn test_empty_batch() {
        let (mut results, _buffer, _) = batch(0);
        assert_eq!(results.len(), 0);
        assert_eq!(results.next(), None);
        assert_eq!(results.try_next(), TakeNext::Exhausted);
    }

    #[test]
    fn test_failure_delivered_in_position() {
        let (results, buffer, _) = batch(3);
        buffer.deposit(2, Ok(3));
        buffer.deposit(1, Err(TaskError::Failed("bad".to_string())));
        buffer.deposit(0, Ok(1));

        assert_eq!(results.len(), 3);
        assert_eq!(
            results.collect::<Vec<_>>(),
            vec![Ok(1), Err(TaskError::Failed("bad".to_string())), Ok(3)]
        );
    }

    #[test]
    fn test_position_and_len() {
        let (mut results, buffer, _) = batch(2);
        buffer.deposit(1, Ok(2));
        assert_eq!(results.buffered(), 1);
        assert_eq!(results.try_next(), TakeNext::Pending);
        assert_eq!(results.position(), 0);

        buffer.deposit(0, Ok(1));
        assert_eq!(results.next(), Some(Ok(1)));
        assert_eq!(results.position(), 1);
        assert_eq!(results.len(), 1);
        assert_eq!(results.next_timeout(Duration::from_millis(10)), Ok(Some(Ok(2))));
        assert_eq!(results.next_timeout(Duration::from_millis(10)), Ok(None));
    }

    #[test]
    fn test_drop_withdraws_and_abandons() {
        let (results, buffer, withdrawn) = batch(4);
        buffer.deposit(3, Ok(4));
        drop(results);

        assert!(withdrawn.load(Ordering::Acquire));
        assert!(buffer.is_abandoned());
        assert!(!buffer.deposit(0, Ok(1)));
    }
}
