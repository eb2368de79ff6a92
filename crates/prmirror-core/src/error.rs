//! Error classification consumed by the scheduler's retry policy.
//!
//! The scheduler never inspects concrete error types; it asks the error how
//! it wants to be handled. Errors sort into three classes:
//!
//! - [`ErrorClass::RateLimited`]: the upstream quota is exhausted. The
//!   scheduler installs a forced wait on the pacer (until the reported reset
//!   instant, when one is carried) and re-enqueues the work at high priority.
//! - [`ErrorClass::Retryable`]: a transient fault. The scheduler retries
//!   with exponential backoff.
//! - [`ErrorClass::Fatal`]: retrying cannot help. The failure surfaces
//!   immediately.

use chrono::{DateTime, Utc};

/// How the scheduler should treat a failed unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The upstream quota is exhausted; wait for reset, then retry first.
    RateLimited,
    /// Transient fault; retry with exponential backoff.
    Retryable,
    /// Permanent fault; fail without retrying.
    Fatal,
}

/// Classification seam between work errors and the scheduler.
pub trait ClassifyError {
    /// Returns the retry class for this error.
    fn error_class(&self) -> ErrorClass;

    /// For rate-limit errors, the instant the quota resets, when known.
    fn rate_limit_reset(&self) -> Option<DateTime<Utc>> {
        None
    }

    /// Short tag naming the error kind, used for failure records.
    fn error_tag(&self) -> &'static str {
        match self.error_class() {
            ErrorClass::RateLimited => "RateLimited",
            ErrorClass::Retryable => "Retryable",
            ErrorClass::Fatal => "Fatal",
        }
    }
}
