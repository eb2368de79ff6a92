//! Retrying PRs recorded in the sync_failures table.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use prmirror_core::ClassifyError;
use prmirror_store::{RepositoryStore, SyncFailure, SyncFailureStore};

use crate::error::SyncError;
use crate::ingestion::PrIngestionService;
use crate::outcome::{PrIngestionOutcome, RetryReport};

const DEFAULT_MAX_ITEMS: i64 = 100;

/// Re-ingests pending failures, resolving them or escalating to permanent.
pub struct FailureRetryService {
    ingestion: Arc<PrIngestionService>,
    failures: SyncFailureStore,
    repos: RepositoryStore,
    max_retries: i64,
}

impl FailureRetryService {
    /// Creates a retry service with the default retry ceiling of 3.
    pub fn new(
        ingestion: Arc<PrIngestionService>,
        failures: SyncFailureStore,
        repos: RepositoryStore,
    ) -> Self {
        Self {
            ingestion,
            failures,
            repos,
            max_retries: 3,
        }
    }

    /// Overrides the retry ceiling.
    pub fn with_max_retries(mut self, max_retries: i64) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    /// Retries pending failures, oldest first.
    ///
    /// On success the failure is marked RESOLVED. On another failure, the
    /// PENDING row is updated in place (preserving the one-pending-row
    /// invariant) until the attempt count reaches the ceiling, at which
    /// point the row becomes PERMANENT.
    pub async fn retry_failures(
        &self,
        repository_id: Option<i64>,
        max_items: Option<i64>,
        dry_run: bool,
    ) -> Result<RetryReport, SyncError> {
        let started = Instant::now();
        let mut report = RetryReport::default();

        let limit = max_items.unwrap_or(DEFAULT_MAX_ITEMS);
        let pending = self.failures.get_pending(repository_id, limit).await?;
        report.total_pending = pending.len();

        if pending.is_empty() {
            tracing::info!("no pending failures to retry");
            report.duration = started.elapsed();
            return Ok(report);
        }

        tracing::info!(
            pending = pending.len(),
            limit,
            dry_run,
            "retrying pending failures"
        );

        let mut repo_cache: HashMap<i64, (String, String)> = HashMap::new();
        for failure in pending {
            let outcome = self.retry_single(&failure, &mut repo_cache, dry_run).await;

            if dry_run {
                report.skipped_dry_run += 1;
            } else if outcome.succeeded() {
                report.succeeded += 1;
                self.failures.mark_resolved(failure.id).await?;
                tracing::info!(
                    pr = failure.pr_number,
                    retries = failure.retry_count,
                    "failure resolved"
                );
            } else if failure.retry_count + 1 >= self.max_retries {
                report.marked_permanent += 1;
                self.failures.mark_permanent(failure.id).await?;
                tracing::warn!(
                    pr = failure.pr_number,
                    attempts = failure.retry_count + 1,
                    "failure marked permanent"
                );
            } else {
                report.failed_again += 1;
                let (message, tag) = outcome
                    .error()
                    .map(|e| (e.to_string(), e.error_tag()))
                    .unwrap_or_else(|| ("unknown error".to_string(), "Unknown"));
                self.failures
                    .record_failure(failure.repository_id, failure.pr_number, &message, tag)
                    .await?;
                tracing::warn!(
                    pr = failure.pr_number,
                    attempt = failure.retry_count + 1,
                    max = self.max_retries,
                    "failure persisted for another retry"
                );
            }

            report.results.push((failure.pr_number, outcome));
        }

        report.duration = started.elapsed();
        tracing::info!(
            succeeded = report.succeeded,
            failed_again = report.failed_again,
            permanent = report.marked_permanent,
            duration_secs = report.duration.as_secs_f64(),
            "retry pass complete"
        );
        Ok(report)
    }

    async fn retry_single(
        &self,
        failure: &SyncFailure,
        repo_cache: &mut HashMap<i64, (String, String)>,
        dry_run: bool,
    ) -> PrIngestionOutcome {
        if !repo_cache.contains_key(&failure.repository_id) {
            match self.repos.get_by_id(failure.repository_id).await {
                Ok(Some(repo)) => {
                    repo_cache.insert(failure.repository_id, (repo.owner, repo.name));
                }
                Ok(None) => {
                    return PrIngestionOutcome::Error {
                        number: failure.pr_number,
                        error: SyncError::Repo(format!(
                            "repository {} not found for failure {}",
                            failure.repository_id, failure.id
                        )),
                    };
                }
                Err(error) => {
                    return PrIngestionOutcome::Error {
                        number: failure.pr_number,
                        error: error.into(),
                    };
                }
            }
        }
        let (owner, name) = repo_cache
            .get(&failure.repository_id)
            .cloned()
            .expect("repository cached above");

        tracing::debug!(
            pr = failure.pr_number,
            repo = %format!("{owner}/{name}"),
            attempt = failure.retry_count + 1,
            "retrying failed PR"
        );
        match self
            .ingestion
            .ingest_pr(&owner, &name, failure.pr_number, dry_run)
            .await
        {
            Ok(outcome) => outcome,
            Err(error) => PrIngestionOutcome::Error {
                number: failure.pr_number,
                error,
            },
        }
    }

    /// Failure statistics, optionally scoped to one repository.
    pub async fn failure_stats(
        &self,
        repository_id: Option<i64>,
    ) -> Result<prmirror_store::FailureStats, SyncError> {
        Ok(self.failures.stats(repository_id).await?)
    }
}
