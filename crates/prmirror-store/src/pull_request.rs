//! Store for mirrored pull requests.
//!
//! Writes respect the PR state machine: OPEN rows and MERGED rows inside
//! the grace period accept sync updates; MERGED rows past the grace period
//! are frozen and updates are silently refused. The abandoned case never
//! reaches this store; the ingestion pipeline filters it out.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use crate::error::StoreError;
use crate::models::{PrImmutable, PrMergeData, PrState, PrSyncData, PullRequest};
use crate::session::Session;

/// CRUD for [`PullRequest`] rows, flushing through the shared session.
#[derive(Clone)]
pub struct PullRequestStore {
    session: Arc<Session>,
    grace_period: chrono::Duration,
}

impl PullRequestStore {
    /// Creates a store enforcing the given merge grace period.
    pub fn new(session: Arc<Session>, grace_period: Duration) -> Self {
        Self {
            session,
            grace_period: chrono::Duration::from_std(grace_period)
                .unwrap_or_else(|_| chrono::Duration::days(14)),
        }
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<PullRequest>, StoreError> {
        let mut guard = self.session.guard().await;
        let tx = guard.as_mut().ok_or(StoreError::SessionClosed)?;
        fetch_by_id(tx, id).await
    }

    pub async fn get_by_number(
        &self,
        repository_id: i64,
        number: i64,
    ) -> Result<Option<PullRequest>, StoreError> {
        let mut guard = self.session.guard().await;
        let tx = guard.as_mut().ok_or(StoreError::SessionClosed)?;
        let row = sqlx::query(
            "SELECT * FROM pull_requests WHERE repository_id = ?1 AND number = ?2",
        )
        .bind(repository_id)
        .bind(number)
        .fetch_optional(&mut **tx)
        .await?;
        row.as_ref().map(from_row).transpose()
    }

    pub async fn list_by_state(
        &self,
        repository_id: i64,
        state: PrState,
    ) -> Result<Vec<PullRequest>, StoreError> {
        let mut guard = self.session.guard().await;
        let tx = guard.as_mut().ok_or(StoreError::SessionClosed)?;
        let rows = sqlx::query(
            "SELECT * FROM pull_requests WHERE repository_id = ?1 AND state = ?2 ORDER BY number",
        )
        .bind(repository_id)
        .bind(state.as_str())
        .fetch_all(&mut **tx)
        .await?;
        rows.iter().map(from_row).collect()
    }

    /// Just the PR numbers in a state; cheap input for diffing.
    pub async fn numbers_by_state(
        &self,
        repository_id: i64,
        state: PrState,
    ) -> Result<Vec<i64>, StoreError> {
        let mut guard = self.session.guard().await;
        let tx = guard.as_mut().ok_or(StoreError::SessionClosed)?;
        let numbers = sqlx::query_scalar(
            "SELECT number FROM pull_requests WHERE repository_id = ?1 AND state = ?2 ORDER BY number",
        )
        .bind(repository_id)
        .bind(state.as_str())
        .fetch_all(&mut **tx)
        .await?;
        Ok(numbers)
    }

    /// Creates a PR row from immutable and synced fields.
    pub async fn create(
        &self,
        repository_id: i64,
        immutable: &PrImmutable,
        sync: &PrSyncData,
    ) -> Result<PullRequest, StoreError> {
        let mut guard = self.session.guard().await;
        let tx = guard.as_mut().ok_or(StoreError::SessionClosed)?;
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO pull_requests (\
                repository_id, number, link, open_date, submitter, \
                title, description, last_update_date, state, \
                files_changed, lines_added, lines_deleted, commits_count, \
                labels, filenames, reviewers, assignees, commits_breakdown, participants, \
                created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, \
                     ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21)",
        )
        .bind(repository_id)
        .bind(immutable.number)
        .bind(&immutable.link)
        .bind(immutable.open_date)
        .bind(&immutable.submitter)
        .bind(&sync.title)
        .bind(&sync.description)
        .bind(sync.last_update_date)
        .bind(sync.state.as_str())
        .bind(sync.files_changed)
        .bind(sync.lines_added)
        .bind(sync.lines_deleted)
        .bind(sync.commits_count)
        .bind(serde_json::to_string(&sync.labels)?)
        .bind(serde_json::to_string(&sync.filenames)?)
        .bind(serde_json::to_string(&sync.reviewers)?)
        .bind(serde_json::to_string(&sync.assignees)?)
        .bind(serde_json::to_string(&sync.commits_breakdown)?)
        .bind(serde_json::to_string(&sync.participants)?)
        .bind(now)
        .bind(now)
        .execute(&mut **tx)
        .await?;
        let id = result.last_insert_rowid();
        fetch_by_id(tx, id)
            .await?
            .ok_or(StoreError::Database(sqlx::Error::RowNotFound))
    }

    /// Overwrites all synced fields of an existing row. Frozen rows are
    /// returned untouched.
    pub async fn update_sync(
        &self,
        pr_id: i64,
        sync: &PrSyncData,
    ) -> Result<Option<PullRequest>, StoreError> {
        let existing = self.get_by_id(pr_id).await?;
        let Some(existing) = existing else {
            return Ok(None);
        };
        if self.is_frozen(&existing) {
            return Ok(Some(existing));
        }
        let mut guard = self.session.guard().await;
        let tx = guard.as_mut().ok_or(StoreError::SessionClosed)?;
        apply_sync(tx, pr_id, sync).await?;
        fetch_by_id(tx, pr_id).await
    }

    /// Upsert: create when missing, overwrite synced fields when present
    /// and not frozen. The bool is true when a row was created.
    pub async fn create_or_update(
        &self,
        repository_id: i64,
        immutable: &PrImmutable,
        sync: &PrSyncData,
    ) -> Result<(PullRequest, bool), StoreError> {
        let existing = self.get_by_number(repository_id, immutable.number).await?;
        match existing {
            None => {
                let created = self.create(repository_id, immutable, sync).await?;
                Ok((created, true))
            }
            Some(existing) if self.is_frozen(&existing) => Ok((existing, false)),
            Some(existing) => {
                let mut guard = self.session.guard().await;
                let tx = guard.as_mut().ok_or(StoreError::SessionClosed)?;
                apply_sync(tx, existing.id, sync).await?;
                let updated = fetch_by_id(tx, existing.id)
                    .await?
                    .ok_or(StoreError::Database(sqlx::Error::RowNotFound))?;
                Ok((updated, false))
            }
        }
    }

    /// Marks a PR merged, setting close date and merger. `ai_summary` is
    /// only written when provided.
    pub async fn apply_merge(
        &self,
        pr_id: i64,
        merge: &PrMergeData,
    ) -> Result<Option<PullRequest>, StoreError> {
        let mut guard = self.session.guard().await;
        let tx = guard.as_mut().ok_or(StoreError::SessionClosed)?;
        let result = sqlx::query(
            "UPDATE pull_requests SET \
                state = ?1, close_date = ?2, merged_by = ?3, \
                ai_summary = COALESCE(?4, ai_summary), updated_at = ?5 \
             WHERE id = ?6",
        )
        .bind(PrState::Merged.as_str())
        .bind(merge.close_date)
        .bind(&merge.merged_by)
        .bind(&merge.ai_summary)
        .bind(Utc::now())
        .bind(pr_id)
        .execute(&mut **tx)
        .await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        fetch_by_id(tx, pr_id).await
    }

    /// Whether a row is read-only: MERGED and past the grace period.
    ///
    /// A MERGED row without a close date cannot have its age measured; it
    /// stays writable and the inconsistency is logged.
    pub fn is_frozen(&self, pr: &PullRequest) -> bool {
        if pr.state != PrState::Merged {
            return false;
        }
        let Some(close_date) = pr.close_date else {
            tracing::warn!(
                pr = pr.number,
                repository_id = pr.repository_id,
                "merged PR has no close date; treating as not frozen"
            );
            return false;
        };
        Utc::now() - close_date > self.grace_period
    }

    /// Whether incoming sync data carries nothing newer than the row.
    /// Equal timestamps count as unchanged.
    pub fn is_unchanged(&self, pr: &PullRequest, incoming: &PrSyncData) -> bool {
        pr.last_update_date >= incoming.last_update_date
    }

    pub fn grace_period(&self) -> chrono::Duration {
        self.grace_period
    }
}

async fn apply_sync(
    conn: &mut SqliteConnection,
    pr_id: i64,
    sync: &PrSyncData,
) -> Result<(), StoreError> {
    sqlx::query(
        "UPDATE pull_requests SET \
            title = ?1, description = ?2, last_update_date = ?3, state = ?4, \
            files_changed = ?5, lines_added = ?6, lines_deleted = ?7, commits_count = ?8, \
            labels = ?9, filenames = ?10, reviewers = ?11, assignees = ?12, \
            commits_breakdown = ?13, participants = ?14, updated_at = ?15 \
         WHERE id = ?16",
    )
    .bind(&sync.title)
    .bind(&sync.description)
    .bind(sync.last_update_date)
    .bind(sync.state.as_str())
    .bind(sync.files_changed)
    .bind(sync.lines_added)
    .bind(sync.lines_deleted)
    .bind(sync.commits_count)
    .bind(serde_json::to_string(&sync.labels)?)
    .bind(serde_json::to_string(&sync.filenames)?)
    .bind(serde_json::to_string(&sync.reviewers)?)
    .bind(serde_json::to_string(&sync.assignees)?)
    .bind(serde_json::to_string(&sync.commits_breakdown)?)
    .bind(serde_json::to_string(&sync.participants)?)
    .bind(Utc::now())
    .bind(pr_id)
    .execute(conn)
    .await?;
    Ok(())
}

async fn fetch_by_id(
    conn: &mut SqliteConnection,
    id: i64,
) -> Result<Option<PullRequest>, StoreError> {
    let row = sqlx::query("SELECT * FROM pull_requests WHERE id = ?1")
        .bind(id)
        .fetch_optional(conn)
        .await?;
    row.as_ref().map(from_row).transpose()
}

fn from_row(row: &SqliteRow) -> Result<PullRequest, StoreError> {
    let state: String = row.try_get("state")?;
    let labels: String = row.try_get("labels")?;
    let filenames: String = row.try_get("filenames")?;
    let reviewers: String = row.try_get("reviewers")?;
    let assignees: String = row.try_get("assignees")?;
    let commits_breakdown: String = row.try_get("commits_breakdown")?;
    let participants: String = row.try_get("participants")?;
    Ok(PullRequest {
        id: row.try_get("id")?,
        repository_id: row.try_get("repository_id")?,
        number: row.try_get("number")?,
        link: row.try_get("link")?,
        open_date: row.try_get("open_date")?,
        submitter: row.try_get("submitter")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        last_update_date: row.try_get("last_update_date")?,
        state: PrState::parse(&state).unwrap_or(PrState::Open),
        files_changed: row.try_get("files_changed")?,
        lines_added: row.try_get("lines_added")?,
        lines_deleted: row.try_get("lines_deleted")?,
        commits_count: row.try_get("commits_count")?,
        labels: serde_json::from_str(&labels)?,
        filenames: serde_json::from_str(&filenames)?,
        reviewers: serde_json::from_str(&reviewers)?,
        assignees: serde_json::from_str(&assignees)?,
        commits_breakdown: serde_json::from_str(&commits_breakdown)?,
        participants: serde_json::from_str(&participants)?,
        close_date: row.try_get("close_date")?,
        merged_by: row.try_get("merged_by")?,
        ai_summary: row.try_get("ai_summary")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
