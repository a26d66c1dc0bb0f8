pub mod pool;

pub use pool::{JobHandler, QueueSlot, WorkerPool};
