//! Shared fixtures for the scenario suite: payload builders, an in-memory
//! store bundle, a fast scheduler, and a programmable mock GitHub API.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use prmirror_github::{
    FullPullRequest, GithubApi, GithubCommit, GithubError, GithubFile, GithubPullRequest,
    GithubReview, GithubUser, ListParams, PrSummary,
};
use prmirror_pacing::{PacerConfig, RequestPacer, RequestScheduler, SchedulerConfigBuilder};
use prmirror_ratelimit::{RateLimitMonitor, RateLimitSnapshot};
use prmirror_store::{
    connect_memory, init_schema, PullRequestStore, RepositoryStore, Session, SyncFailureStore,
};
use prmirror_sync::{PrIngestionOutcome, SyncError};

pub fn user(login: &str) -> GithubUser {
    GithubUser {
        login: login.to_string(),
        id: login.len() as i64,
    }
}

pub fn gh_pr(number: i64, state: &str, merged: bool) -> GithubPullRequest {
    GithubPullRequest {
        number,
        html_url: format!("https://github.com/octo/widgets/pull/{number}"),
        state: state.to_string(),
        title: format!("PR {number}"),
        body: Some("body".to_string()),
        user: user("octocat"),
        merged_by: None,
        created_at: Utc::now() - ChronoDuration::days(10),
        updated_at: Utc::now() - ChronoDuration::hours(2),
        closed_at: None,
        merged_at: None,
        merged,
        commits: 1,
        additions: 10,
        deletions: 2,
        changed_files: 1,
        labels: Vec::new(),
        requested_reviewers: Vec::new(),
        assignees: Vec::new(),
    }
}

pub fn full_pr(pr: GithubPullRequest) -> FullPullRequest {
    FullPullRequest {
        pull_request: pr,
        files: Vec::new(),
        commits: Vec::new(),
        reviews: Vec::new(),
    }
}

pub fn summary(number: i64, state: &str, created_at: DateTime<Utc>) -> PrSummary {
    PrSummary {
        number,
        state: state.to_string(),
        created_at,
        updated_at: created_at + ChronoDuration::hours(1),
        merged_at: None,
    }
}

/// Programmable in-memory stand-in for the GitHub API.
///
/// Listings are served from one created-descending summary list, sliced by
/// the caller's `per_page`/`page`, so pagination behaves like the real
/// endpoint.
#[derive(Default)]
pub struct MockGithubApi {
    summaries: Mutex<Vec<PrSummary>>,
    prs: Mutex<HashMap<i64, FullPullRequest>>,
    list_failures: Mutex<VecDeque<GithubError>>,
    fetch_failures: Mutex<HashMap<i64, VecDeque<GithubError>>>,
    pub list_calls: AtomicU32,
    pub fetch_calls: AtomicU32,
}

impl MockGithubApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_summaries(&self, mut summaries: Vec<PrSummary>) {
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        *self.summaries.lock().unwrap() = summaries;
    }

    pub fn add_pr(&self, full: FullPullRequest) {
        let summary = PrSummary {
            number: full.pull_request.number,
            state: full.pull_request.state.clone(),
            created_at: full.pull_request.created_at,
            updated_at: full.pull_request.updated_at,
            merged_at: full.pull_request.merged_at,
        };
        let mut summaries = self.summaries.lock().unwrap();
        summaries.retain(|s| s.number != summary.number);
        summaries.push(summary);
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        drop(summaries);
        self.prs
            .lock()
            .unwrap()
            .insert(full.pull_request.number, full);
    }

    /// Replaces the stored PR payload without touching the listing.
    pub fn update_pr(&self, full: FullPullRequest) {
        self.prs
            .lock()
            .unwrap()
            .insert(full.pull_request.number, full);
    }

    pub fn push_list_failure(&self, error: GithubError) {
        self.list_failures.lock().unwrap().push_back(error);
    }

    pub fn push_fetch_failure(&self, number: i64, error: GithubError) {
        self.fetch_failures
            .lock()
            .unwrap()
            .entry(number)
            .or_default()
            .push_back(error);
    }
}

#[async_trait]
impl GithubApi for MockGithubApi {
    async fn list_pull_requests(
        &self,
        _owner: &str,
        _repo: &str,
        params: &ListParams,
        page: u32,
    ) -> Result<Vec<PrSummary>, GithubError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.list_failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        let summaries = self.summaries.lock().unwrap();
        let per_page = params.per_page as usize;
        let start = per_page * (page.saturating_sub(1)) as usize;
        Ok(summaries
            .iter()
            .skip(start)
            .take(per_page)
            .cloned()
            .collect())
    }

    async fn get_pull_request(
        &self,
        owner: &str,
        repo: &str,
        number: i64,
    ) -> Result<GithubPullRequest, GithubError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(queue) = self.fetch_failures.lock().unwrap().get_mut(&number) {
            if let Some(error) = queue.pop_front() {
                return Err(error);
            }
        }
        self.prs
            .lock()
            .unwrap()
            .get(&number)
            .map(|full| full.pull_request.clone())
            .ok_or_else(|| GithubError::NotFound(format!("PR #{number} in {owner}/{repo}")))
    }

    async fn list_files(
        &self,
        _owner: &str,
        _repo: &str,
        number: i64,
    ) -> Result<Vec<GithubFile>, GithubError> {
        Ok(self
            .prs
            .lock()
            .unwrap()
            .get(&number)
            .map(|full| full.files.clone())
            .unwrap_or_default())
    }

    async fn list_commits(
        &self,
        _owner: &str,
        _repo: &str,
        number: i64,
    ) -> Result<Vec<GithubCommit>, GithubError> {
        Ok(self
            .prs
            .lock()
            .unwrap()
            .get(&number)
            .map(|full| full.commits.clone())
            .unwrap_or_default())
    }

    async fn list_reviews(
        &self,
        _owner: &str,
        _repo: &str,
        number: i64,
    ) -> Result<Vec<GithubReview>, GithubError> {
        Ok(self
            .prs
            .lock()
            .unwrap()
            .get(&number)
            .map(|full| full.reviews.clone())
            .unwrap_or_default())
    }

    async fn fetch_rate_limit(&self) -> Result<RateLimitSnapshot, GithubError> {
        Ok(RateLimitSnapshot::new())
    }
}

pub struct TestStores {
    pub session: Arc<Session>,
    pub repos: RepositoryStore,
    pub prs: PullRequestStore,
    pub failures: SyncFailureStore,
}

pub async fn stores_with_grace(grace: Duration) -> TestStores {
    let pool = connect_memory().await.unwrap();
    init_schema(&pool).await.unwrap();
    let session = Arc::new(Session::begin(pool).await.unwrap());
    TestStores {
        repos: RepositoryStore::new(Arc::clone(&session)),
        prs: PullRequestStore::new(Arc::clone(&session), grace),
        failures: SyncFailureStore::new(Arc::clone(&session)),
        session,
    }
}

pub async fn stores() -> TestStores {
    stores_with_grace(Duration::from_secs(14 * 24 * 3600)).await
}

/// A pacer with no floor so tests are not slowed by the default interval.
pub fn fast_pacer() -> Arc<RequestPacer> {
    Arc::new(RequestPacer::new(
        Arc::new(RateLimitMonitor::with_defaults()),
        PacerConfig::builder()
            .min_request_interval(Duration::ZERO)
            .build(),
    ))
}

/// Scheduler config tuned for millisecond-scale tests.
pub fn fast_scheduler_config() -> SchedulerConfigBuilder {
    prmirror_pacing::SchedulerConfig::builder()
        .idle_poll(Duration::from_millis(1))
        .backoff_base(Duration::from_millis(1))
        .rate_limit_pad(Duration::from_millis(5))
}

/// A started scheduler for ingestion outcomes.
pub fn sync_scheduler() -> Arc<RequestScheduler<PrIngestionOutcome, SyncError>> {
    let scheduler = Arc::new(RequestScheduler::new(
        fast_pacer(),
        fast_scheduler_config().build(),
    ));
    scheduler.start();
    scheduler
}
