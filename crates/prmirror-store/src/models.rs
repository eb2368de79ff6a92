//! Persistent entities and their write payloads.
//!
//! `PullRequest` fields split by mutability: immutable-after-creation
//! ([`PrImmutable`]), overwritten on every refresh ([`PrSyncData`]), and
//! set once on merge ([`PrMergeData`]). List- and map-shaped fields are
//! stored as JSON-encoded TEXT columns.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Pull request lifecycle state.
///
/// The ingestion core records only the OPEN → MERGED transition. CLOSED
/// (closed without merge) exists for historical reasons; the core never
/// writes it; those PRs are abandoned and skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrState {
    Open,
    Merged,
    Closed,
}

impl PrState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Merged => "merged",
            Self::Closed => "closed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "open" => Some(Self::Open),
            "merged" => Some(Self::Merged),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }
}

/// Lifecycle of a recorded sync failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncFailureStatus {
    /// Waiting for a retry.
    Pending,
    /// Successfully retried.
    Resolved,
    /// Max retries exceeded; no further attempts.
    Permanent,
}

impl SyncFailureStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Resolved => "resolved",
            Self::Permanent => "permanent",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "resolved" => Some(Self::Resolved),
            "permanent" => Some(Self::Permanent),
            _ => None,
        }
    }
}

/// A tracked GitHub repository.
#[derive(Debug, Clone)]
pub struct Repository {
    pub id: i64,
    pub owner: String,
    pub name: String,
    pub full_name: String,
    pub is_active: bool,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// One commit in a PR's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitEntry {
    pub date: DateTime<Utc>,
    pub author: String,
}

/// A mirrored pull request.
#[derive(Debug, Clone)]
pub struct PullRequest {
    pub id: i64,
    pub repository_id: i64,

    // Immutable after creation.
    pub number: i64,
    pub link: String,
    pub open_date: DateTime<Utc>,
    pub submitter: String,

    // Overwritten on each refresh.
    pub title: String,
    pub description: Option<String>,
    pub last_update_date: DateTime<Utc>,
    pub state: PrState,
    pub files_changed: i64,
    pub lines_added: i64,
    pub lines_deleted: i64,
    pub commits_count: i64,
    pub labels: Vec<String>,
    pub filenames: Vec<String>,
    pub reviewers: Vec<String>,
    pub assignees: Vec<String>,
    pub commits_breakdown: Vec<CommitEntry>,
    /// username -> action tags.
    pub participants: BTreeMap<String, Vec<String>>,

    // Set on merge.
    pub close_date: Option<DateTime<Utc>>,
    pub merged_by: Option<String>,
    pub ai_summary: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PullRequest {
    pub fn is_open(&self) -> bool {
        self.state == PrState::Open
    }

    pub fn is_merged(&self) -> bool {
        self.state == PrState::Merged
    }
}

/// Immutable fields written once when a PR row is created.
#[derive(Debug, Clone)]
pub struct PrImmutable {
    pub number: i64,
    pub link: String,
    pub open_date: DateTime<Utc>,
    pub submitter: String,
}

/// Synced fields overwritten on every refresh.
#[derive(Debug, Clone)]
pub struct PrSyncData {
    pub title: String,
    pub description: Option<String>,
    pub last_update_date: DateTime<Utc>,
    pub state: PrState,
    pub files_changed: i64,
    pub lines_added: i64,
    pub lines_deleted: i64,
    pub commits_count: i64,
    pub labels: Vec<String>,
    pub filenames: Vec<String>,
    pub reviewers: Vec<String>,
    pub assignees: Vec<String>,
    pub commits_breakdown: Vec<CommitEntry>,
    pub participants: BTreeMap<String, Vec<String>>,
}

/// Merge fields applied once when a PR is observed merged.
#[derive(Debug, Clone)]
pub struct PrMergeData {
    pub close_date: DateTime<Utc>,
    pub merged_by: Option<String>,
    pub ai_summary: Option<String>,
}

/// A recorded permanently-failed ingestion attempt.
#[derive(Debug, Clone)]
pub struct SyncFailure {
    pub id: i64,
    pub repository_id: i64,
    pub pr_number: i64,
    pub error_message: String,
    pub error_type: String,
    pub retry_count: i64,
    pub status: SyncFailureStatus,
    pub failed_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
