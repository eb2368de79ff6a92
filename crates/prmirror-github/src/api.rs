//! The upstream API contract consumed by the ingestion pipeline.

use async_trait::async_trait;
use prmirror_ratelimit::RateLimitSnapshot;

use crate::error::GithubError;
use crate::models::{
    FullPullRequest, GithubCommit, GithubFile, GithubPullRequest, GithubReview, PrSummary,
};

/// State filter for the PR list endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListState {
    Open,
    Closed,
    #[default]
    All,
}

impl ListState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::All => "all",
        }
    }
}

/// Sort key for the PR list endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListSort {
    #[default]
    Created,
    Updated,
    Popularity,
    LongRunning,
}

impl ListSort {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Popularity => "popularity",
            Self::LongRunning => "long-running",
        }
    }
}

/// Sort direction for the PR list endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// Parameters for the paged PR list endpoint.
///
/// Defaults to what discovery needs: every state, newest first, full pages.
#[derive(Debug, Clone)]
pub struct ListParams {
    pub state: ListState,
    pub sort: ListSort,
    pub direction: SortDirection,
    pub per_page: u32,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            state: ListState::All,
            sort: ListSort::Created,
            direction: SortDirection::Desc,
            per_page: 100,
        }
    }
}

/// Object-safe GitHub API contract.
///
/// Implementations must apply pacing before each underlying HTTP call and
/// feed response headers back to the rate-limit monitor afterwards; callers
/// assume both happen internally.
#[async_trait]
pub trait GithubApi: Send + Sync {
    /// One page of the PR list, `page` starting at 1. A short or empty page
    /// marks the end of the listing.
    async fn list_pull_requests(
        &self,
        owner: &str,
        repo: &str,
        params: &ListParams,
        page: u32,
    ) -> Result<Vec<PrSummary>, GithubError>;

    /// Full details for one PR, including stats the list endpoint omits.
    async fn get_pull_request(
        &self,
        owner: &str,
        repo: &str,
        number: i64,
    ) -> Result<GithubPullRequest, GithubError>;

    /// All files changed in a PR.
    async fn list_files(
        &self,
        owner: &str,
        repo: &str,
        number: i64,
    ) -> Result<Vec<GithubFile>, GithubError>;

    /// All commits in a PR.
    async fn list_commits(
        &self,
        owner: &str,
        repo: &str,
        number: i64,
    ) -> Result<Vec<GithubCommit>, GithubError>;

    /// All reviews on a PR.
    async fn list_reviews(
        &self,
        owner: &str,
        repo: &str,
        number: i64,
    ) -> Result<Vec<GithubReview>, GithubError>;

    /// The complete 4-part PR payload. Equivalent to four sequential calls.
    async fn full_pull_request(
        &self,
        owner: &str,
        repo: &str,
        number: i64,
    ) -> Result<FullPullRequest, GithubError> {
        let pull_request = self.get_pull_request(owner, repo, number).await?;
        let files = self.list_files(owner, repo, number).await?;
        let commits = self.list_commits(owner, repo, number).await?;
        let reviews = self.list_reviews(owner, repo, number).await?;
        Ok(FullPullRequest {
            pull_request,
            files,
            commits,
            reviews,
        })
    }

    /// Current quota across all pools. The `/rate_limit` endpoint is free
    /// and does not count against the quota it reports.
    async fn fetch_rate_limit(&self) -> Result<RateLimitSnapshot, GithubError>;
}
