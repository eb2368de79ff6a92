//! Sequential multi-repository orchestration.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use prmirror_github::GithubApi;
use prmirror_pacing::{ProgressTracker, RequestScheduler};
use prmirror_store::{CommitManager, PullRequestStore, RepositoryStore, SyncFailureStore};

use crate::bulk::{BulkIngestionConfig, BulkPrIngestionService};
use crate::error::SyncError;
use crate::outcome::{BulkIngestionResult, MultiRepoSyncResult, PrIngestionOutcome, RepoSyncResult};

/// Syncs a set of repositories one after another.
///
/// Repositories run sequentially; PRs within each repository run
/// concurrently through the shared scheduler. A failure at the repo level
/// (bad name, discovery error after retries) is recorded as one repo-level
/// failure and the loop continues with the next repository.
pub struct MultiRepoOrchestrator {
    api: Arc<dyn GithubApi>,
    repos: RepositoryStore,
    prs: PullRequestStore,
    scheduler: Arc<RequestScheduler<PrIngestionOutcome, SyncError>>,
    tracked_repos: Vec<String>,
    progress: Option<Arc<ProgressTracker>>,
    failures: Option<SyncFailureStore>,
    commits: Option<Arc<CommitManager>>,
}

impl MultiRepoOrchestrator {
    pub fn new(
        api: Arc<dyn GithubApi>,
        repos: RepositoryStore,
        prs: PullRequestStore,
        scheduler: Arc<RequestScheduler<PrIngestionOutcome, SyncError>>,
        tracked_repos: Vec<String>,
    ) -> Self {
        Self {
            api,
            repos,
            prs,
            scheduler,
            tracked_repos,
            progress: None,
            failures: None,
            commits: None,
        }
    }

    /// Attaches a progress tracker, reset per repository.
    pub fn with_progress(mut self, progress: Arc<ProgressTracker>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Records failed PRs into the sync_failures table.
    pub fn with_failure_store(mut self, failures: SyncFailureStore) -> Self {
        self.failures = Some(failures);
        self
    }

    /// Commits in batches through the given manager.
    pub fn with_commit_manager(mut self, commits: Arc<CommitManager>) -> Self {
        self.commits = Some(commits);
        self
    }

    /// The configured tracked repository set.
    pub fn tracked_repos(&self) -> &[String] {
        &self.tracked_repos
    }

    /// Ensures a repository row exists for every tracked repo (or the given
    /// override list). Returns the initialized full names.
    pub async fn initialize_repositories(
        &self,
        repos: Option<&[String]>,
    ) -> Result<Vec<String>, SyncError> {
        let list = repos.unwrap_or(&self.tracked_repos);
        let mut initialized = Vec::with_capacity(list.len());
        for full_name in list {
            let (owner, name) = split_full_name(full_name)?;
            let (_, created) = self.repos.get_or_create(owner, name).await?;
            if created {
                tracing::info!(repository = %full_name, "created repository record");
            }
            initialized.push(full_name.clone());
        }
        Ok(initialized)
    }

    /// Syncs every repository with the given config, aggregating results.
    pub async fn sync_all(
        &self,
        config: &BulkIngestionConfig,
        repos: Option<Vec<String>>,
    ) -> MultiRepoSyncResult {
        let started = Instant::now();
        let mut result = MultiRepoSyncResult::default();
        let repo_list = repos.unwrap_or_else(|| self.tracked_repos.clone());

        for full_name in repo_list {
            let repo_started = Utc::now();
            tracing::info!(repository = %full_name, "starting repository sync");
            if let Some(progress) = &self.progress {
                progress.reset();
            }

            let outcome = self.sync_one(&full_name, config).await;
            match outcome {
                Ok(bulk) => {
                    result.total_discovered += bulk.total_discovered;
                    result.total_created += bulk.created;
                    result.total_updated += bulk.updated;
                    result.total_skipped += bulk.total_skipped();
                    result.total_failed += bulk.failed;
                    tracing::info!(
                        repository = %full_name,
                        created = bulk.created,
                        updated = bulk.updated,
                        skipped = bulk.total_skipped(),
                        failed = bulk.failed,
                        "repository sync complete"
                    );
                    result.repo_results.push(RepoSyncResult {
                        repository: full_name,
                        result: bulk,
                        started_at: repo_started,
                        completed_at: Utc::now(),
                    });
                }
                Err(error) => {
                    tracing::error!(repository = %full_name, %error, "repository sync failed");
                    let mut failed = BulkIngestionResult::default();
                    failed.failed = 1;
                    failed
                        .failed_prs
                        .push((-1, format!("repository sync failed: {error}")));
                    result.total_failed += 1;
                    result.repo_results.push(RepoSyncResult {
                        repository: full_name,
                        result: failed,
                        started_at: repo_started,
                        completed_at: Utc::now(),
                    });
                }
            }
        }

        result.duration = started.elapsed();
        tracing::info!(
            repos = result.repo_results.len(),
            discovered = result.total_discovered,
            created = result.total_created,
            updated = result.total_updated,
            skipped = result.total_skipped,
            failed = result.total_failed,
            duration_secs = result.duration.as_secs_f64(),
            "multi-repo sync complete"
        );
        result
    }

    async fn sync_one(
        &self,
        full_name: &str,
        config: &BulkIngestionConfig,
    ) -> Result<BulkIngestionResult, SyncError> {
        let (owner, name) = split_full_name(full_name)?;
        self.repos.get_or_create(owner, name).await?;
        self.bulk_service().ingest_repository(owner, name, config).await
    }

    fn bulk_service(&self) -> BulkPrIngestionService {
        let mut service = BulkPrIngestionService::new(
            Arc::clone(&self.api),
            self.repos.clone(),
            self.prs.clone(),
            Arc::clone(&self.scheduler),
        );
        if let Some(progress) = &self.progress {
            service = service.with_progress(Arc::clone(progress));
        }
        if let Some(failures) = &self.failures {
            service = service.with_failure_store(failures.clone());
        }
        if let Some(commits) = &self.commits {
            service = service.with_commit_manager(Arc::clone(commits));
        }
        service
    }
}

fn split_full_name(full_name: &str) -> Result<(&str, &str), SyncError> {
    full_name
        .split_once('/')
        .filter(|(owner, name)| !owner.is_empty() && !name.is_empty())
        .ok_or_else(|| SyncError::Repo(format!("invalid repository name: {full_name:?}")))
}
