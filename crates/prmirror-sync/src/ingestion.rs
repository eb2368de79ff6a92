//! Per-PR ingestion: fetch → transform → upsert.

use std::sync::Arc;

use prmirror_github::{GithubApi, GithubError};
use prmirror_store::{PullRequestStore, RepositoryStore};

use crate::error::SyncError;
use crate::outcome::PrIngestionOutcome;
use crate::transform;

/// Ingests single PRs from GitHub into the store.
///
/// The per-PR boundary never panics and never leaks ordinary failures:
/// not-found, validation, and storage errors fold into an error outcome.
/// Only errors the scheduler must see for retry decisions (rate-limit,
/// transport, authentication) propagate as `Err`.
#[derive(Clone)]
pub struct PrIngestionService {
    api: Arc<dyn GithubApi>,
    repos: RepositoryStore,
    prs: PullRequestStore,
}

impl PrIngestionService {
    pub fn new(api: Arc<dyn GithubApi>, repos: RepositoryStore, prs: PullRequestStore) -> Self {
        Self { api, repos, prs }
    }

    /// Fetches one PR and stores it, honoring the lifecycle state machine.
    pub async fn ingest_pr(
        &self,
        owner: &str,
        repo: &str,
        number: i64,
        dry_run: bool,
    ) -> Result<PrIngestionOutcome, SyncError> {
        self.ingest_pr_with_summary(owner, repo, number, dry_run, None)
            .await
    }

    /// Like [`ingest_pr`](Self::ingest_pr), attaching an AI summary when
    /// merge data is applied.
    pub async fn ingest_pr_with_summary(
        &self,
        owner: &str,
        repo: &str,
        number: i64,
        dry_run: bool,
        ai_summary: Option<String>,
    ) -> Result<PrIngestionOutcome, SyncError> {
        match self.ingest_inner(owner, repo, number, dry_run, ai_summary).await {
            Ok(outcome) => {
                tracing::debug!(
                    repo = %format!("{owner}/{repo}"),
                    pr = number,
                    action = outcome.action(),
                    "ingested PR"
                );
                Ok(outcome)
            }
            Err(error) if scheduler_visible(&error) => Err(error),
            Err(error) => {
                tracing::error!(
                    repo = %format!("{owner}/{repo}"),
                    pr = number,
                    %error,
                    "PR ingestion failed"
                );
                Ok(PrIngestionOutcome::Error { number, error })
            }
        }
    }

    async fn ingest_inner(
        &self,
        owner: &str,
        repo: &str,
        number: i64,
        dry_run: bool,
        ai_summary: Option<String>,
    ) -> Result<PrIngestionOutcome, SyncError> {
        let (repository, repo_created) = self.repos.get_or_create(owner, repo).await?;
        if repo_created {
            tracing::info!(repository = %repository.full_name, "registered new repository");
        }

        let full = self.api.full_pull_request(owner, repo, number).await?;
        let gh = &full.pull_request;

        // Closed without merge: never created, never updated.
        if gh.is_abandoned() {
            let existing = self.prs.get_by_number(repository.id, number).await?;
            return Ok(PrIngestionOutcome::SkippedAbandoned(existing));
        }

        let sync = transform::sync_data_from(gh, &full.files, &full.commits, &full.reviews);
        let existing = self.prs.get_by_number(repository.id, number).await?;

        if let Some(existing_pr) = &existing {
            if self.prs.is_frozen(existing_pr) {
                return Ok(PrIngestionOutcome::SkippedFrozen(existing_pr.clone()));
            }
            if self.prs.is_unchanged(existing_pr, &sync) {
                return Ok(PrIngestionOutcome::SkippedUnchanged(existing_pr.clone()));
            }
        }

        if dry_run {
            tracing::info!(
                pr = number,
                would = if existing.is_none() { "create" } else { "update" },
                "dry run"
            );
            return Ok(match existing {
                None => PrIngestionOutcome::Created(None),
                Some(existing_pr) => PrIngestionOutcome::Updated(existing_pr),
            });
        }

        let immutable = transform::immutable_from(gh);
        let (mut pr, created) = self
            .prs
            .create_or_update(repository.id, &immutable, &sync)
            .await?;

        if gh.merged && pr.merged_by.is_none() {
            match transform::merge_data_from(gh, ai_summary) {
                Some(merge) => {
                    if let Some(updated) = self.prs.apply_merge(pr.id, &merge).await? {
                        pr = updated;
                    }
                }
                None => {
                    tracing::warn!(
                        pr = number,
                        "merged PR carries neither merged_at nor closed_at; merge data not applied"
                    );
                }
            }
        }

        Ok(if created {
            PrIngestionOutcome::Created(Some(pr))
        } else {
            PrIngestionOutcome::Updated(pr)
        })
    }
}

/// Whether an error must cross the per-PR boundary so the scheduler can
/// apply its retry policy.
fn scheduler_visible(error: &SyncError) -> bool {
    matches!(
        error,
        SyncError::Github(
            GithubError::RateLimited { .. } | GithubError::Transport(_) | GithubError::Auth(_)
        )
    )
}
