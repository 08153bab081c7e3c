pub mod pool;
pub mod scheduler;

pub use pool::WorkerPool;
pub use scheduler::Scheduler;
