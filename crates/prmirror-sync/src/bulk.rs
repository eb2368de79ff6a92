//! Bulk per-repository ingestion: discovery + batch drive + aggregation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use prmirror_core::ClassifyError;
use prmirror_github::{GithubApi, GithubError, ListParams, PullRequestPager};
use prmirror_pacing::{
    BatchConfig, BatchExecutor, JobPriority, ProgressTracker, RequestScheduler, SchedulerError,
};
use prmirror_store::{CommitManager, PullRequestStore, RepositoryStore, SyncFailureStore};

use crate::error::SyncError;
use crate::ingestion::PrIngestionService;
use crate::outcome::{BulkIngestionResult, PrIngestionOutcome};

/// Attempts per page before a discovery rate-limit error becomes fatal.
const DISCOVERY_RETRY_LIMIT: u32 = 3;
/// Pad past the reported reset before discovery retries.
const DISCOVERY_RETRY_PAD: Duration = Duration::from_secs(1);

/// PR state filter for discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StateFilter {
    /// Only PRs the listing reports open.
    Open,
    /// PRs the listing marks merged, plus closed entries whose merge status
    /// the listing cannot tell apart; the per-PR fetch settles those.
    Merged,
    /// Open and merged PRs; closed-without-merge entries pass discovery and
    /// are filtered at ingestion as abandoned.
    #[default]
    All,
}

impl StateFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Merged => "merged",
            Self::All => "all",
        }
    }
}

/// Configuration for one bulk ingestion pass.
#[derive(Debug, Clone)]
pub struct BulkIngestionConfig {
    /// Only PRs created at or after this instant.
    pub since: Option<DateTime<Utc>>,
    /// Only PRs created at or before this instant.
    pub until: Option<DateTime<Utc>>,
    pub state: StateFilter,
    /// Cap on discovered PRs.
    pub max_prs: Option<usize>,
    pub dry_run: bool,
    /// Concurrent per-PR ingestions; honored by the runtime when sizing the
    /// scheduler.
    pub concurrency: usize,
}

impl Default for BulkIngestionConfig {
    fn default() -> Self {
        Self {
            since: None,
            until: None,
            state: StateFilter::All,
            max_prs: None,
            dry_run: false,
            concurrency: 5,
        }
    }
}

/// Bulk PR importer for one repository at a time.
pub struct BulkPrIngestionService {
    api: Arc<dyn GithubApi>,
    repos: RepositoryStore,
    prs: PullRequestStore,
    scheduler: Arc<RequestScheduler<PrIngestionOutcome, SyncError>>,
    progress: Option<Arc<ProgressTracker>>,
    failures: Option<SyncFailureStore>,
    commits: Option<Arc<CommitManager>>,
}

impl BulkPrIngestionService {
    pub fn new(
        api: Arc<dyn GithubApi>,
        repos: RepositoryStore,
        prs: PullRequestStore,
        scheduler: Arc<RequestScheduler<PrIngestionOutcome, SyncError>>,
    ) -> Self {
        Self {
            api,
            repos,
            prs,
            scheduler,
            progress: None,
            failures: None,
            commits: None,
        }
    }

    /// Attaches a progress tracker driven through each bulk pass.
    pub fn with_progress(mut self, progress: Arc<ProgressTracker>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Records failed PRs into the sync_failures table for later retry.
    pub fn with_failure_store(mut self, failures: SyncFailureStore) -> Self {
        self.failures = Some(failures);
        self
    }

    /// Commits in batches through the given manager as PRs land.
    pub fn with_commit_manager(mut self, commits: Arc<CommitManager>) -> Self {
        self.commits = Some(commits);
        self
    }

    /// Enumerates PR numbers matching the config filters.
    ///
    /// The listing is consumed newest-created first, so the `since` cutoff
    /// stops pagination at the first out-of-range entry. Rate-limit errors
    /// are retried up to three times, sleeping until the reported reset
    /// plus a pad; a failed page fetch is refetched, never skipped.
    pub async fn discover_prs(
        &self,
        owner: &str,
        repo: &str,
        config: &BulkIngestionConfig,
    ) -> Result<Vec<i64>, SyncError> {
        tracing::info!(
            repo = %format!("{owner}/{repo}"),
            since = ?config.since,
            until = ?config.until,
            state = config.state.as_str(),
            max_prs = ?config.max_prs,
            "discovering PRs"
        );

        let mut pager =
            PullRequestPager::new(Arc::clone(&self.api), owner, repo, ListParams::default());
        let mut numbers: Vec<i64> = Vec::new();
        let mut rate_limit_failures = 0u32;

        loop {
            let entry = match pager.next().await {
                None => break,
                Some(Ok(entry)) => {
                    rate_limit_failures = 0;
                    entry
                }
                Some(Err(error @ GithubError::RateLimited { .. })) => {
                    rate_limit_failures += 1;
                    if rate_limit_failures >= DISCOVERY_RETRY_LIMIT {
                        return Err(error.into());
                    }
                    let wait = error
                        .rate_limit_reset()
                        .and_then(|reset| (reset - Utc::now()).to_std().ok())
                        .unwrap_or(Duration::ZERO)
                        + DISCOVERY_RETRY_PAD;
                    tracing::warn!(
                        attempt = rate_limit_failures,
                        wait_secs = wait.as_secs_f64(),
                        "discovery rate limited; sleeping until reset"
                    );
                    tokio::time::sleep(wait).await;
                    continue;
                }
                Some(Err(error)) => return Err(error.into()),
            };

            if let Some(since) = config.since {
                if entry.created_at < since {
                    // Sorted by created desc: nothing further can match.
                    tracing::debug!(pr = entry.number, "reached since cutoff; stopping discovery");
                    break;
                }
            }
            if let Some(until) = config.until {
                if entry.created_at > until {
                    continue;
                }
            }

            match config.state {
                StateFilter::Open => {
                    if !entry.is_open() {
                        continue;
                    }
                }
                StateFilter::Merged => {
                    // Closed entries stay in: the list endpoint cannot
                    // separate merged from abandoned.
                    if entry.is_open() && !entry.merged_hint() {
                        continue;
                    }
                }
                StateFilter::All => {}
            }

            numbers.push(entry.number);
            if let Some(max) = config.max_prs {
                if numbers.len() >= max {
                    tracing::info!(max, "reached max PR limit");
                    break;
                }
            }
        }

        tracing::info!(
            repo = %format!("{owner}/{repo}"),
            discovered = numbers.len(),
            pages = pager.pages_fetched(),
            "discovery finished"
        );
        Ok(numbers)
    }

    /// Ingests every matching PR of one repository.
    pub async fn ingest_repository(
        &self,
        owner: &str,
        repo: &str,
        config: &BulkIngestionConfig,
    ) -> Result<BulkIngestionResult, SyncError> {
        let started = Instant::now();
        let mut result = BulkIngestionResult::default();

        let pr_numbers = self.discover_prs(owner, repo, config).await?;
        result.total_discovered = pr_numbers.len();
        if pr_numbers.is_empty() {
            tracing::info!(repo = %format!("{owner}/{repo}"), "no PRs to ingest");
            result.duration = started.elapsed();
            return Ok(result);
        }

        let (repository, _) = self.repos.get_or_create(owner, repo).await?;

        let service = Arc::new(PrIngestionService::new(
            Arc::clone(&self.api),
            self.repos.clone(),
            self.prs.clone(),
        ));
        let owner_name = owner.to_string();
        let repo_name = repo.to_string();
        let dry_run = config.dry_run;
        let commit_manager = self.commits.clone();

        let processor = move |number: i64| -> BoxFuture<'static, Result<PrIngestionOutcome, SyncError>> {
            let service = Arc::clone(&service);
            let owner = owner_name.clone();
            let repo = repo_name.clone();
            let commit_manager = commit_manager.clone();
            Box::pin(async move {
                let outcome = service.ingest_pr(&owner, &repo, number, dry_run).await?;
                if !dry_run && outcome.wrote() {
                    if let Some(commit_manager) = &commit_manager {
                        commit_manager.record_success().await?;
                    }
                }
                Ok(outcome)
            })
        };

        let mut executor = BatchExecutor::new(Arc::clone(&self.scheduler), BatchConfig::default());
        if let Some(progress) = &self.progress {
            executor = executor.with_progress(Arc::clone(progress));
        }
        let batch = executor
            .execute(
                pr_numbers.clone(),
                processor,
                JobPriority::Normal,
                Some(Box::new(|n: &i64| format!("PR #{n}"))),
            )
            .await;

        let mut failures: Vec<(i64, String, &'static str)> = Vec::new();
        for outcome in batch.succeeded {
            match outcome {
                PrIngestionOutcome::Created(_) => result.created += 1,
                PrIngestionOutcome::Updated(_) => result.updated += 1,
                PrIngestionOutcome::SkippedFrozen(_) => result.skipped_frozen += 1,
                PrIngestionOutcome::SkippedUnchanged(_) => result.skipped_unchanged += 1,
                PrIngestionOutcome::SkippedAbandoned(_) => result.skipped_abandoned += 1,
                PrIngestionOutcome::Error { number, error } => {
                    failures.push((number, error.to_string(), error.error_tag()));
                }
            }
        }
        for (index, error) in batch.failed {
            let number = pr_numbers.get(index).copied().unwrap_or(-1);
            let tag = match &error {
                SchedulerError::Job(job_error) => job_error.error_tag(),
                SchedulerError::Timeout => "Timeout",
                SchedulerError::Cancelled => "Cancelled",
            };
            failures.push((number, error.to_string(), tag));
        }

        for (number, message, tag) in failures {
            result.failed += 1;
            if let (Some(store), false) = (&self.failures, config.dry_run) {
                store
                    .record_failure(repository.id, number, &message, tag)
                    .await?;
            }
            result.failed_prs.push((number, message));
        }

        if !config.dry_run {
            self.repos
                .update_last_synced(repository.id, Utc::now())
                .await?;
            if let Some(commit_manager) = &self.commits {
                commit_manager.finalize().await?;
            }
        }

        result.duration = started.elapsed();
        tracing::info!(
            repo = %format!("{owner}/{repo}"),
            created = result.created,
            updated = result.updated,
            skipped_frozen = result.skipped_frozen,
            skipped_unchanged = result.skipped_unchanged,
            failed = result.failed,
            duration_secs = result.duration.as_secs_f64(),
            "bulk ingestion complete"
        );
        Ok(result)
    }
}
