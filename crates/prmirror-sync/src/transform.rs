//! GitHub payloads → store payloads.

use std::collections::{BTreeMap, BTreeSet};

use prmirror_github::{GithubCommit, GithubFile, GithubPullRequest, GithubReview};
use prmirror_store::{CommitEntry, PrImmutable, PrMergeData, PrState, PrSyncData};

/// Actions a participant can take on a PR, as stored in the participant
/// map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ParticipantAction {
    Comment,
    Approval,
    ChangesRequested,
    Dismissed,
    Review,
    Commit,
}

impl ParticipantAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Comment => "comment",
            Self::Approval => "approval",
            Self::ChangesRequested => "changes_requested",
            Self::Dismissed => "dismissed",
            Self::Review => "review",
            Self::Commit => "commit",
        }
    }

    /// Maps a review state string onto an action. Unknown states are
    /// dropped for forward compatibility.
    fn from_review_state(state: &str) -> Option<Self> {
        match state {
            "APPROVED" => Some(Self::Approval),
            "CHANGES_REQUESTED" => Some(Self::ChangesRequested),
            "DISMISSED" => Some(Self::Dismissed),
            "COMMENTED" | "PENDING" => Some(Self::Review),
            _ => None,
        }
    }
}

/// Effective lifecycle state of a fetched PR.
pub fn derive_state(pr: &GithubPullRequest) -> PrState {
    if pr.merged {
        PrState::Merged
    } else if pr.state == "closed" {
        PrState::Closed
    } else {
        PrState::Open
    }
}

/// Immutable fields from a fetched PR.
pub fn immutable_from(pr: &GithubPullRequest) -> PrImmutable {
    PrImmutable {
        number: pr.number,
        link: pr.html_url.clone(),
        open_date: pr.created_at,
        submitter: pr.user.login.clone(),
    }
}

/// Synced fields from the full 4-part payload.
pub fn sync_data_from(
    pr: &GithubPullRequest,
    files: &[GithubFile],
    commits: &[GithubCommit],
    reviews: &[GithubReview],
) -> PrSyncData {
    let mut participant_actions: BTreeMap<String, BTreeSet<ParticipantAction>> = BTreeMap::new();
    for review in reviews {
        if let Some(action) = ParticipantAction::from_review_state(&review.state) {
            participant_actions
                .entry(review.user.login.clone())
                .or_default()
                .insert(action);
        }
    }
    let participants: BTreeMap<String, Vec<String>> = participant_actions
        .into_iter()
        .map(|(user, actions)| {
            (
                user,
                actions.iter().map(|a| a.as_str().to_string()).collect(),
            )
        })
        .collect();

    PrSyncData {
        title: pr.title.clone(),
        description: pr.body.clone(),
        last_update_date: pr.updated_at,
        state: derive_state(pr),
        files_changed: pr.changed_files,
        lines_added: pr.additions,
        lines_deleted: pr.deletions,
        commits_count: pr.commits,
        labels: pr.labels.iter().map(|l| l.name.clone()).collect(),
        filenames: files.iter().map(|f| f.filename.clone()).collect(),
        reviewers: pr
            .requested_reviewers
            .iter()
            .map(|u| u.login.clone())
            .collect(),
        assignees: pr.assignees.iter().map(|u| u.login.clone()).collect(),
        commits_breakdown: commits
            .iter()
            .map(|c| CommitEntry {
                date: c.commit.author.date,
                author: c.commit.author.name.clone(),
            })
            .collect(),
        participants,
    }
}

/// Merge fields from a fetched PR: `merged_at` wins over `closed_at` for
/// the close date. Returns `None` when neither exists.
pub fn merge_data_from(pr: &GithubPullRequest, ai_summary: Option<String>) -> Option<PrMergeData> {
    let close_date = pr.merged_at.or(pr.closed_at)?;
    Some(PrMergeData {
        close_date,
        merged_by: pr.merged_by.as_ref().map(|u| u.login.clone()),
        ai_summary,
    })
}
