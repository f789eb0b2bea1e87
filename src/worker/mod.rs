//! Background execution of the assignment functions.
//!
//! This module provides:
//! - `WorkerPool` - fixed set of worker threads behind one FIFO queue
//! - `TaskCall` / `WorkerFunction` - the closed registry of runnable functions
//! - `TaskHandle` - awaitable (or blocking) handle to a queued task
//! - `*_async` methods on `WorkerPool`, one per registered function

mod config;
mod facade;
mod handle;
mod pool;
mod stats;
mod task;

pub use config::{PoolConfig, DEFAULT_MAX_WORKERS, DEFAULT_THREAD_NAME_PREFIX};
pub use handle::{TaskHandle, TaskState};
pub use pool::WorkerPool;
pub use stats::PoolStats;
pub use task::{TaskCall, TaskOutput, WorkerFunction};
