//! spool-core
//!
//! In-process task-queue engine.
//!
//! # Modules
//! - **domain**: identifiers
//! - **queue**: task record, status machine, backoff policy, bounded queue, admission gate
//! - **store**: id -> task map with per-status counters
//! - **observability**: the counters themselves
//! - **runtime**: the `Executor` seam and the simulated workload
//! - **worker**: worker group and per-task retry loop
//! - **app**: `EngineBuilder` / `Engine` lifecycle

pub mod app;
pub mod domain;
pub mod error;
pub mod observability;
pub mod queue;
pub mod runtime;
pub mod store;
pub mod worker;

pub use app::{BuildError, Engine, EngineBuilder, Submission, Submitted};
pub use domain::TaskId;
pub use error::{ExecutionError, SubmitError};
pub use observability::Metrics;
pub use queue::{RetryPolicy, Task, TaskStatus};
pub use runtime::{Executor, SimulatedExecutor};
