//! Serde models for GitHub REST API payloads.
//!
//! Shapes follow <https://docs.github.com/en/rest/pulls/pulls>. Fields the
//! list endpoint omits (stats, merge flag) default so the same decoding
//! works for both list entries and full fetches.

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// GitHub user object.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct GithubUser {
    pub login: String,
    pub id: i64,
}

/// GitHub label object.
#[derive(Debug, Clone, Deserialize)]
pub struct GithubLabel {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Commit author info (from git, not necessarily a GitHub account).
#[derive(Debug, Clone, Deserialize)]
pub struct GithubCommitAuthor {
    pub name: String,
    #[serde(default)]
    pub email: String,
    pub date: DateTime<Utc>,
}

/// Nested commit detail object.
#[derive(Debug, Clone, Deserialize)]
pub struct GithubCommitDetail {
    pub author: GithubCommitAuthor,
    #[serde(default)]
    pub message: String,
}

/// Entry from the PR commits endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct GithubCommit {
    pub sha: String,
    pub commit: GithubCommitDetail,
}

/// Entry from the PR files endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct GithubFile {
    #[serde(default)]
    pub sha: String,
    pub filename: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub additions: i64,
    #[serde(default)]
    pub deletions: i64,
    #[serde(default)]
    pub changes: i64,
}

/// Entry from the PR reviews endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct GithubReview {
    pub id: i64,
    pub user: GithubUser,
    pub state: String,
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
}

/// Full pull request object from `GET /repos/{owner}/{repo}/pulls/{number}`.
#[derive(Debug, Clone, Deserialize)]
pub struct GithubPullRequest {
    pub number: i64,
    pub html_url: String,
    /// "open" or "closed"; merge status is carried separately.
    pub state: String,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    pub user: GithubUser,
    #[serde(default)]
    pub merged_by: Option<GithubUser>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub merged_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub merged: bool,
    #[serde(default)]
    pub commits: i64,
    #[serde(default)]
    pub additions: i64,
    #[serde(default)]
    pub deletions: i64,
    #[serde(default)]
    pub changed_files: i64,
    #[serde(default)]
    pub labels: Vec<GithubLabel>,
    #[serde(default)]
    pub requested_reviewers: Vec<GithubUser>,
    #[serde(default)]
    pub assignees: Vec<GithubUser>,
}

impl GithubPullRequest {
    /// Whether the PR was closed without being merged (abandoned).
    pub fn is_abandoned(&self) -> bool {
        self.state == "closed" && !self.merged
    }
}

/// Compact entry from the PR list endpoint.
///
/// The list endpoint does not expose the `merged` flag reliably; `merged_at`
/// is the only merge signal available here, and the open/merged/abandoned
/// decision for closed entries is deferred to the full fetch.
#[derive(Debug, Clone, Deserialize)]
pub struct PrSummary {
    pub number: i64,
    pub state: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub merged_at: Option<DateTime<Utc>>,
}

impl PrSummary {
    pub fn is_open(&self) -> bool {
        self.state == "open"
    }

    /// Best-effort merge signal from the list payload.
    pub fn merged_hint(&self) -> bool {
        self.merged_at.is_some()
    }
}

/// The four-part PR payload used by per-PR ingestion.
#[derive(Debug, Clone)]
pub struct FullPullRequest {
    pub pull_request: GithubPullRequest,
    pub files: Vec<GithubFile>,
    pub commits: Vec<GithubCommit>,
    pub reviews: Vec<GithubReview>,
}
