//! GitHub client error taxonomy.

use chrono::{DateTime, Utc};
use prmirror_core::{ClassifyError, ErrorClass};

/// Errors surfaced by GitHub API calls.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GithubError {
    /// The credential was rejected (401). Fatal to the run.
    #[error("github authentication failed: {0}")]
    Auth(String),

    /// The quota is exhausted (403 with zero remaining). Retryable once the
    /// window resets.
    #[error("github rate limit exhausted: {message}")]
    RateLimited {
        message: String,
        /// Reset instant from the `x-ratelimit-reset` header, when present.
        reset_at: Option<DateTime<Utc>>,
    },

    /// The resource does not exist (404). Fatal to the affected PR only.
    #[error("github resource not found: {0}")]
    NotFound(String),

    /// The response body did not match the expected shape. Not retried.
    #[error("invalid github payload: {0}")]
    Validation(String),

    /// Connectivity problems, timeouts, or any other non-2xx status.
    /// Retried with backoff.
    #[error("github transport failure: {0}")]
    Transport(String),
}

impl ClassifyError for GithubError {
    fn error_class(&self) -> ErrorClass {
        match self {
            Self::RateLimited { .. } => ErrorClass::RateLimited,
            Self::Transport(_) => ErrorClass::Retryable,
            Self::Auth(_) | Self::NotFound(_) | Self::Validation(_) => ErrorClass::Fatal,
        }
    }

    fn rate_limit_reset(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::RateLimited { reset_at, .. } => *reset_at,
            _ => None,
        }
    }

    fn error_tag(&self) -> &'static str {
        match self {
            Self::Auth(_) => "AuthError",
            Self::RateLimited { .. } => "RateLimitError",
            Self::NotFound(_) => "NotFoundError",
            Self::Validation(_) => "ValidationError",
            Self::Transport(_) => "TransportError",
        }
    }
}
