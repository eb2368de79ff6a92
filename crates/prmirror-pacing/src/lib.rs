//! Request pacing, priority scheduling, and batch execution.
//!
//! This crate turns the quota state tracked by `prmirror-ratelimit` into an
//! execution discipline:
//!
//! - [`RequestPacer`] derives a recommended pre-request delay from the live
//!   quota (token-bucket style), with forced waits for rate-limit recovery.
//! - [`RequestScheduler`] runs submitted jobs through a priority min-heap
//!   with bounded concurrency, consulting the pacer before each dispatch and
//!   retrying transient failures with exponential backoff. Rate-limited jobs
//!   are boosted to high priority so they run first once the quota resets.
//! - [`BatchExecutor`] fans a homogeneous work list through the scheduler in
//!   sub-batches, aggregating successes and per-item failures while driving
//!   an observable [`ProgressTracker`].
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use prmirror_pacing::{PacerConfig, RequestPacer, RequestScheduler, SchedulerConfig, JobPriority};
//! use prmirror_ratelimit::RateLimitMonitor;
//!
//! # #[derive(Debug, thiserror::Error)]
//! # #[error("boom")]
//! # struct MyError;
//! # impl prmirror_core::ClassifyError for MyError {
//! #     fn error_class(&self) -> prmirror_core::ErrorClass { prmirror_core::ErrorClass::Fatal }
//! # }
//! # async fn example() {
//! let monitor = Arc::new(RateLimitMonitor::with_defaults());
//! let pacer = Arc::new(RequestPacer::new(monitor, PacerConfig::default()));
//! let scheduler: RequestScheduler<u64, MyError> =
//!     RequestScheduler::new(pacer, SchedulerConfig::builder().max_concurrent(3).build());
//! scheduler.start();
//!
//! let value = scheduler
//!     .submit(|| Box::pin(async { Ok(42u64) }), JobPriority::Normal)
//!     .await
//!     .unwrap();
//! assert_eq!(value, 42);
//! # }
//! ```

pub mod batch;
pub mod config;
pub mod events;
pub mod pacer;
pub mod progress;
pub mod scheduler;

pub use batch::{BatchExecutor, BatchResult};
pub use config::{
    BatchConfig, BatchConfigBuilder, PacerConfig, PacerConfigBuilder, SchedulerConfig,
    SchedulerConfigBuilder,
};
pub use events::{ProgressEvent, SchedulerEvent};
pub use pacer::{PacerStats, RequestPacer};
pub use progress::{ProgressSnapshot, ProgressState, ProgressTracker};
pub use scheduler::{
    JobHandle, JobId, JobPriority, JobState, RequestScheduler, SchedulerError, SchedulerStats,
};
