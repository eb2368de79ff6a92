//! Events emitted by the rate-limit monitor.

use std::time::Instant;

use prmirror_core::events::PipelineEvent;

use crate::quota::{PoolQuota, RateLimitStatus};

/// Events emitted by the rate-limit monitor.
///
/// Only degradations are announced; a pool recovering to a better status is
/// silent.
#[derive(Debug, Clone)]
pub enum RateLimitEvent {
    /// A pool's health crossed a threshold in the worse direction.
    ThresholdCrossed {
        source: String,
        timestamp: Instant,
        quota: PoolQuota,
        status: RateLimitStatus,
    },
}

impl PipelineEvent for RateLimitEvent {
    fn event_type(&self) -> &'static str {
        match self {
            Self::ThresholdCrossed { .. } => "threshold_crossed",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            Self::ThresholdCrossed { timestamp, .. } => *timestamp,
        }
    }

    fn source(&self) -> &str {
        match self {
            Self::ThresholdCrossed { source, .. } => source,
        }
    }
}
