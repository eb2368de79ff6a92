//! Pipeline error type.

use chrono::{DateTime, Utc};
use prmirror_core::{ClassifyError, ErrorClass};
use prmirror_github::GithubError;
use prmirror_store::StoreError;

/// Errors crossing pipeline layer boundaries.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Github(#[from] GithubError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// Repo-level failure: malformed name, missing repository row.
    #[error("{0}")]
    Repo(String),
}

impl ClassifyError for SyncError {
    fn error_class(&self) -> ErrorClass {
        match self {
            Self::Github(err) => err.error_class(),
            Self::Store(_) | Self::Repo(_) => ErrorClass::Fatal,
        }
    }

    fn rate_limit_reset(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Github(err) => err.rate_limit_reset(),
            _ => None,
        }
    }

    fn error_tag(&self) -> &'static str {
        match self {
            Self::Github(err) => err.error_tag(),
            Self::Store(_) => "StoreError",
            Self::Repo(_) => "RepoError",
        }
    }
}
