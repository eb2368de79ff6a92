//! Events emitted by the scheduler and the progress tracker.

use std::time::Instant;

use prmirror_core::events::PipelineEvent;

use crate::progress::ProgressSnapshot;
use crate::scheduler::{JobId, JobPriority};

/// Events emitted by the request scheduler.
///
/// Together these form the scheduler's execution trace: every job's path
/// through the queue (enqueue, start, retries, terminal state) is visible to
/// listeners.
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    /// A job entered the queue.
    JobEnqueued {
        source: String,
        timestamp: Instant,
        id: JobId,
        priority: JobPriority,
    },
    /// A job left the queue and began executing.
    JobStarted {
        source: String,
        timestamp: Instant,
        id: JobId,
        priority: JobPriority,
    },
    /// A failed job was re-enqueued for another attempt. `priority` is the
    /// priority it re-entered the queue with (HIGH after a rate-limit hit).
    JobRetried {
        source: String,
        timestamp: Instant,
        id: JobId,
        priority: JobPriority,
        retry_count: u32,
    },
    /// A job completed successfully.
    JobCompleted {
        source: String,
        timestamp: Instant,
        id: JobId,
    },
    /// A job failed permanently.
    JobFailed {
        source: String,
        timestamp: Instant,
        id: JobId,
    },
}

impl PipelineEvent for SchedulerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            Self::JobEnqueued { .. } => "job_enqueued",
            Self::JobStarted { .. } => "job_started",
            Self::JobRetried { .. } => "job_retried",
            Self::JobCompleted { .. } => "job_completed",
            Self::JobFailed { .. } => "job_failed",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            Self::JobEnqueued { timestamp, .. }
            | Self::JobStarted { timestamp, .. }
            | Self::JobRetried { timestamp, .. }
            | Self::JobCompleted { timestamp, .. }
            | Self::JobFailed { timestamp, .. } => *timestamp,
        }
    }

    fn source(&self) -> &str {
        match self {
            Self::JobEnqueued { source, .. }
            | Self::JobStarted { source, .. }
            | Self::JobRetried { source, .. }
            | Self::JobCompleted { source, .. }
            | Self::JobFailed { source, .. } => source,
        }
    }
}

/// Event carrying a progress tracker snapshot, emitted on every change.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub source: String,
    pub timestamp: Instant,
    pub snapshot: ProgressSnapshot,
}

impl PipelineEvent for ProgressEvent {
    fn event_type(&self) -> &'static str {
        "progress"
    }

    fn timestamp(&self) -> Instant {
        self.timestamp
    }

    fn source(&self) -> &str {
        &self.source
    }
}
