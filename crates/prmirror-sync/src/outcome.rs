//! Result types for ingestion operations.

use std::time::Duration;

use chrono::{DateTime, Utc};
use prmirror_store::PullRequest;

use crate::error::SyncError;

/// Outcome of ingesting one PR.
///
/// Exactly one case applies per attempt. The row payload is present
/// wherever one exists; a dry-run "created" has nothing to carry yet.
#[derive(Debug)]
pub enum PrIngestionOutcome {
    /// A new row was created (`None` in dry-run mode).
    Created(Option<PullRequest>),
    /// An existing row's synced fields were overwritten.
    Updated(PullRequest),
    /// The row is merged and past the grace period; nothing was written.
    SkippedFrozen(PullRequest),
    /// The stored row is at least as new as the fetched data.
    SkippedUnchanged(PullRequest),
    /// The PR is closed without merge; never created or updated. Carries
    /// the pre-existing row when one exists.
    SkippedAbandoned(Option<PullRequest>),
    /// The attempt failed at the PR level.
    Error { number: i64, error: SyncError },
}

impl PrIngestionOutcome {
    /// Human-readable description of the action taken.
    pub fn action(&self) -> &'static str {
        match self {
            Self::Created(_) => "created",
            Self::Updated(_) => "updated",
            Self::SkippedFrozen(_) => "skipped (frozen)",
            Self::SkippedUnchanged(_) => "skipped (unchanged)",
            Self::SkippedAbandoned(_) => "skipped (abandoned)",
            Self::Error { .. } => "error",
        }
    }

    /// Whether the attempt completed without error.
    pub fn succeeded(&self) -> bool {
        !matches!(self, Self::Error { .. })
    }

    /// Whether a row was actually written.
    pub fn wrote(&self) -> bool {
        matches!(self, Self::Created(_) | Self::Updated(_))
    }

    /// The PR row involved, when one exists.
    pub fn pr(&self) -> Option<&PullRequest> {
        match self {
            Self::Created(pr) | Self::SkippedAbandoned(pr) => pr.as_ref(),
            Self::Updated(pr) | Self::SkippedFrozen(pr) | Self::SkippedUnchanged(pr) => Some(pr),
            Self::Error { .. } => None,
        }
    }

    /// The error, for the error case.
    pub fn error(&self) -> Option<&SyncError> {
        match self {
            Self::Error { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Aggregated result of a bulk per-repo ingestion.
#[derive(Debug, Default)]
pub struct BulkIngestionResult {
    /// PRs discovered matching the filters.
    pub total_discovered: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped_frozen: usize,
    pub skipped_unchanged: usize,
    pub skipped_abandoned: usize,
    pub failed: usize,
    /// `(pr_number, error message)` for each failed PR; repo-level
    /// failures use number -1.
    pub failed_prs: Vec<(i64, String)>,
    pub duration: Duration,
}

impl BulkIngestionResult {
    /// PRs that were actually processed (not skipped).
    pub fn total_processed(&self) -> usize {
        self.created + self.updated + self.failed
    }

    /// PRs skipped for any reason.
    pub fn total_skipped(&self) -> usize {
        self.skipped_frozen + self.skipped_unchanged + self.skipped_abandoned
    }

    /// Percentage of processed PRs that succeeded.
    pub fn success_rate(&self) -> f64 {
        let processed = self.total_processed();
        if processed == 0 {
            return 100.0;
        }
        ((self.created + self.updated) as f64 / processed as f64) * 100.0
    }
}

/// One repository's sync result inside a multi-repo run.
#[derive(Debug)]
pub struct RepoSyncResult {
    /// Full repository name (owner/repo).
    pub repository: String,
    pub result: BulkIngestionResult,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl RepoSyncResult {
    pub fn duration(&self) -> chrono::Duration {
        self.completed_at - self.started_at
    }
}

/// Aggregate over all repositories in a multi-repo run.
#[derive(Debug, Default)]
pub struct MultiRepoSyncResult {
    pub repo_results: Vec<RepoSyncResult>,
    pub total_discovered: usize,
    pub total_created: usize,
    pub total_updated: usize,
    pub total_skipped: usize,
    pub total_failed: usize,
    pub duration: Duration,
}

impl MultiRepoSyncResult {
    /// Repositories that synced without a single failure.
    pub fn repos_succeeded(&self) -> usize {
        self.repo_results
            .iter()
            .filter(|r| r.result.failed == 0)
            .count()
    }

    /// Repositories with at least one failure.
    pub fn repos_with_failures(&self) -> usize {
        self.repo_results
            .iter()
            .filter(|r| r.result.failed > 0)
            .count()
    }
}

/// Aggregated result of a failure-retry pass.
#[derive(Debug, Default)]
pub struct RetryReport {
    /// Pending failures found.
    pub total_pending: usize,
    /// Failures resolved by a successful re-ingest.
    pub succeeded: usize,
    /// Failures that failed again but stay pending.
    pub failed_again: usize,
    /// Failures escalated to permanent.
    pub marked_permanent: usize,
    /// Failures inspected but not attempted (dry run).
    pub skipped_dry_run: usize,
    pub duration: Duration,
    /// `(pr_number, outcome)` per attempted failure.
    pub results: Vec<(i64, PrIngestionOutcome)>,
}

impl RetryReport {
    /// Failures actually attempted.
    pub fn total_attempted(&self) -> usize {
        self.succeeded + self.failed_again + self.marked_permanent
    }
}
