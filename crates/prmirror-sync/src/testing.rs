//! Shared test fixtures: payload builders, an in-memory store, and a
//! programmable mock of the GitHub API.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use prmirror_github::{
    FullPullRequest, GithubApi, GithubCommit, GithubError, GithubFile, GithubPullRequest,
    GithubReview, ListParams, PrSummary,
};
use prmirror_ratelimit::RateLimitSnapshot;
use prmirror_store::{
    connect_memory, init_schema, PullRequestStore, RepositoryStore, Session, SyncFailureStore,
};

pub(crate) mod fixtures {
    use chrono::{DateTime, Duration, Utc};
    use prmirror_github::{
        FullPullRequest, GithubCommit, GithubCommitAuthor, GithubCommitDetail, GithubFile,
        GithubPullRequest, GithubReview, GithubUser, PrSummary,
    };

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
            created_at: Utc::now() - Duration::days(10),
            updated_at: Utc::now() - Duration::hours(2),
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

    pub fn file(filename: &str) -> GithubFile {
        GithubFile {
            sha: "abc".to_string(),
            filename: filename.to_string(),
            status: "modified".to_string(),
            additions: 1,
            deletions: 0,
            changes: 1,
        }
    }

    pub fn commit(author: &str, date: DateTime<Utc>) -> GithubCommit {
        GithubCommit {
            sha: format!("sha-{author}"),
            commit: GithubCommitDetail {
                author: GithubCommitAuthor {
                    name: author.to_string(),
                    email: format!("{author}@example.com"),
                    date,
                },
                message: "change things".to_string(),
            },
        }
    }

    pub fn review(login: &str, state: &str) -> GithubReview {
        GithubReview {
            id: login.len() as i64,
            user: user(login),
            state: state.to_string(),
            submitted_at: Some(Utc::now()),
        }
    }

    pub fn summary(number: i64, state: &str, created_at: DateTime<Utc>) -> PrSummary {
        PrSummary {
            number,
            state: state.to_string(),
            created_at,
            updated_at: created_at + Duration::hours(1),
            merged_at: None,
        }
    }
}

/// Programmable in-memory stand-in for the GitHub API.
#[derive(Default)]
pub(crate) struct MockGithubApi {
    prs: Mutex<HashMap<i64, FullPullRequest>>,
    pages: Mutex<Vec<Vec<PrSummary>>>,
    list_failures: Mutex<VecDeque<GithubError>>,
    fetch_failures: Mutex<HashMap<i64, VecDeque<GithubError>>>,
    pub list_calls: AtomicU32,
    pub fetch_calls: AtomicU32,
}

impl MockGithubApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pr(&self, full: FullPullRequest) {
        self.prs
            .lock()
            .unwrap()
            .insert(full.pull_request.number, full);
    }

    pub fn set_pages(&self, pages: Vec<Vec<PrSummary>>) {
        *self.pages.lock().unwrap() = pages;
    }

    /// Queues an error returned by the next list call.
    pub fn push_list_failure(&self, error: GithubError) {
        self.list_failures.lock().unwrap().push_back(error);
    }

    /// Queues an error returned by the next fetch of `number`.
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
        _params: &ListParams,
        page: u32,
    ) -> Result<Vec<PrSummary>, GithubError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.list_failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        Ok(self
            .pages
            .lock()
            .unwrap()
            .get((page - 1) as usize)
            .cloned()
            .unwrap_or_default())
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

pub(crate) struct TestStores {
    #[allow(dead_code)]
    pub session: Arc<Session>,
    pub repos: RepositoryStore,
    pub prs: PullRequestStore,
    pub failures: SyncFailureStore,
}

pub(crate) async fn stores_with_grace(grace: Duration) -> TestStores {
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

pub(crate) async fn stores() -> TestStores {
    stores_with_grace(Duration::from_secs(14 * 24 * 3600)).await
}
