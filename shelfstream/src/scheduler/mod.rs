//! Task scheduling.
//!
//! [`TaskScheduler`] owns a priority queue and a bounded worker pool.
//! Workers pull tasks strictly by priority, route them to marketplace
//! adapters, and apply the failure policy: recoverable failures re-enqueue
//! at reduced priority, sustained failure patterns pause the whole pool,
//! and terminal errors land in the failed-task ledger.

mod dispatch;
mod queue;
mod stats;
mod task;

pub use dispatch::TaskScheduler;
pub use queue::TaskQueue;
pub use stats::SchedulerStats;
pub use task::{FailedTask, Task, TaskId};
