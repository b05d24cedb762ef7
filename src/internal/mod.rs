mod task_queue;
pub(crate) use task_queue::TaskQueue;

mod result_buffer;
pub(crate) use result_buffer::ResultBuffer;
pub use result_buffer::TakeNext;

mod ledger;
pub(crate) use ledger::{LedgerCounters, TaskLedger};
pub use ledger::Progress;

mod task_state;
pub(crate) use task_state::TaskStatus;
pub use task_state::TaskState;

mod worker_state;
pub(crate) use worker_state::WorkerState;
pub use worker_state::WorkerStatus;
