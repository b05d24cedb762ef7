mod handle;
pub use handle::TaskHandle;

mod ordered;
pub use ordered::OrderedResults;

mod pool;
pub use pool::WorkerPool;
