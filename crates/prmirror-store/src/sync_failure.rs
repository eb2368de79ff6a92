//! Store for recorded sync failures.
//!
//! One PENDING row per `(repository, pr_number)` at any time: recording a
//! failure for a pair that already has a pending row updates it in place
//! (incrementing the retry counter) instead of inserting. Resolved and
//! permanent rows accumulate as history.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use crate::error::StoreError;
use crate::models::{SyncFailure, SyncFailureStatus};
use crate::session::Session;

/// Per-status failure counts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailureStats {
    pub pending: i64,
    pub resolved: i64,
    pub permanent: i64,
    pub total: i64,
}

/// CRUD for [`SyncFailure`] rows, flushing through the shared session.
#[derive(Clone)]
pub struct SyncFailureStore {
    session: Arc<Session>,
}

impl SyncFailureStore {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<SyncFailure>, StoreError> {
        let mut guard = self.session.guard().await;
        let tx = guard.as_mut().ok_or(StoreError::SessionClosed)?;
        fetch_by_id(tx, id).await
    }

    /// Pending failures ready for retry, oldest first.
    pub async fn get_pending(
        &self,
        repository_id: Option<i64>,
        limit: i64,
    ) -> Result<Vec<SyncFailure>, StoreError> {
        let mut guard = self.session.guard().await;
        let tx = guard.as_mut().ok_or(StoreError::SessionClosed)?;
        let rows = match repository_id {
            Some(repo_id) => {
                sqlx::query(
                    "SELECT * FROM sync_failures \
                     WHERE status = 'pending' AND repository_id = ?1 \
                     ORDER BY failed_at, id LIMIT ?2",
                )
                .bind(repo_id)
                .bind(limit)
                .fetch_all(&mut **tx)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT * FROM sync_failures WHERE status = 'pending' \
                     ORDER BY failed_at, id LIMIT ?1",
                )
                .bind(limit)
                .fetch_all(&mut **tx)
                .await?
            }
        };
        rows.iter().map(from_row).collect()
    }

    pub async fn get_by_repo_and_pr(
        &self,
        repository_id: i64,
        pr_number: i64,
        status: SyncFailureStatus,
    ) -> Result<Option<SyncFailure>, StoreError> {
        let mut guard = self.session.guard().await;
        let tx = guard.as_mut().ok_or(StoreError::SessionClosed)?;
        let row = sqlx::query(
            "SELECT * FROM sync_failures \
             WHERE repository_id = ?1 AND pr_number = ?2 AND status = ?3",
        )
        .bind(repository_id)
        .bind(pr_number)
        .bind(status.as_str())
        .fetch_optional(&mut **tx)
        .await?;
        row.as_ref().map(from_row).transpose()
    }

    /// Records a failure: updates the existing PENDING row in place (new
    /// message, incremented retry count) or inserts a fresh one.
    pub async fn record_failure(
        &self,
        repository_id: i64,
        pr_number: i64,
        error_message: &str,
        error_type: &str,
    ) -> Result<SyncFailure, StoreError> {
        if let Some(existing) = self
            .get_by_repo_and_pr(repository_id, pr_number, SyncFailureStatus::Pending)
            .await?
        {
            let mut guard = self.session.guard().await;
            let tx = guard.as_mut().ok_or(StoreError::SessionClosed)?;
            sqlx::query(
                "UPDATE sync_failures SET \
                    retry_count = retry_count + 1, error_message = ?1, \
                    error_type = ?2, failed_at = ?3 \
                 WHERE id = ?4",
            )
            .bind(error_message)
            .bind(error_type)
            .bind(Utc::now())
            .bind(existing.id)
            .execute(&mut **tx)
            .await?;
            return fetch_by_id(tx, existing.id)
                .await?
                .ok_or(StoreError::Database(sqlx::Error::RowNotFound));
        }

        let mut guard = self.session.guard().await;
        let tx = guard.as_mut().ok_or(StoreError::SessionClosed)?;
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO sync_failures \
                (repository_id, pr_number, error_message, error_type, \
                 retry_count, status, failed_at, created_at) \
             VALUES (?1, ?2, ?3, ?4, 0, 'pending', ?5, ?6)",
        )
        .bind(repository_id)
        .bind(pr_number)
        .bind(error_message)
        .bind(error_type)
        .bind(now)
        .bind(now)
        .execute(&mut **tx)
        .await?;
        tracing::debug!(
            repository_id,
            pr = pr_number,
            error_type,
            "recorded sync failure"
        );
        fetch_by_id(tx, result.last_insert_rowid())
            .await?
            .ok_or(StoreError::Database(sqlx::Error::RowNotFound))
    }

    /// Marks a failure resolved after a successful retry.
    pub async fn mark_resolved(&self, id: i64) -> Result<Option<SyncFailure>, StoreError> {
        let mut guard = self.session.guard().await;
        let tx = guard.as_mut().ok_or(StoreError::SessionClosed)?;
        sqlx::query("UPDATE sync_failures SET status = 'resolved', resolved_at = ?1 WHERE id = ?2")
            .bind(Utc::now())
            .bind(id)
            .execute(&mut **tx)
            .await?;
        fetch_by_id(tx, id).await
    }

    /// Marks a failure permanent; no further retries.
    pub async fn mark_permanent(&self, id: i64) -> Result<Option<SyncFailure>, StoreError> {
        let mut guard = self.session.guard().await;
        let tx = guard.as_mut().ok_or(StoreError::SessionClosed)?;
        sqlx::query("UPDATE sync_failures SET status = 'permanent' WHERE id = ?1")
            .bind(id)
            .execute(&mut **tx)
            .await?;
        fetch_by_id(tx, id).await
    }

    /// Failure counts by status, optionally scoped to one repository.
    pub async fn stats(&self, repository_id: Option<i64>) -> Result<FailureStats, StoreError> {
        let mut guard = self.session.guard().await;
        let tx = guard.as_mut().ok_or(StoreError::SessionClosed)?;
        let rows = match repository_id {
            Some(repo_id) => {
                sqlx::query(
                    "SELECT status, COUNT(*) AS n FROM sync_failures \
                     WHERE repository_id = ?1 GROUP BY status",
                )
                .bind(repo_id)
                .fetch_all(&mut **tx)
                .await?
            }
            None => {
                sqlx::query("SELECT status, COUNT(*) AS n FROM sync_failures GROUP BY status")
                    .fetch_all(&mut **tx)
                    .await?
            }
        };

        let mut stats = FailureStats::default();
        for row in rows {
            let status: String = row.try_get("status")?;
            let count: i64 = row.try_get("n")?;
            match SyncFailureStatus::parse(&status) {
                Some(SyncFailureStatus::Pending) => stats.pending = count,
                Some(SyncFailureStatus::Resolved) => stats.resolved = count,
                Some(SyncFailureStatus::Permanent) => stats.permanent = count,
                None => {}
            }
            stats.total += count;
        }
        Ok(stats)
    }

    /// Deletes resolved failures, optionally only those resolved before a
    /// cutoff. Returns the number removed.
    pub async fn delete_resolved(
        &self,
        before: Option<DateTime<Utc>>,
    ) -> Result<u64, StoreError> {
        let mut guard = self.session.guard().await;
        let tx = guard.as_mut().ok_or(StoreError::SessionClosed)?;
        let result = match before {
            Some(cutoff) => {
                sqlx::query(
                    "DELETE FROM sync_failures WHERE status = 'resolved' AND resolved_at < ?1",
                )
                .bind(cutoff)
                .execute(&mut **tx)
                .await?
            }
            None => {
                sqlx::query("DELETE FROM sync_failures WHERE status = 'resolved'")
                    .execute(&mut **tx)
                    .await?
            }
        };
        Ok(result.rows_affected())
    }
}

async fn fetch_by_id(
    conn: &mut SqliteConnection,
    id: i64,
) -> Result<Option<SyncFailure>, StoreError> {
    let row = sqlx::query("SELECT * FROM sync_failures WHERE id = ?1")
        .bind(id)
        .fetch_optional(conn)
        .await?;
    row.as_ref().map(from_row).transpose()
}

fn from_row(row: &SqliteRow) -> Result<SyncFailure, StoreError> {
    let status: String = row.try_get("status")?;
    Ok(SyncFailure {
        id: row.try_get("id")?,
        repository_id: row.try_get("repository_id")?,
        pr_number: row.try_get("pr_number")?,
        error_message: row.try_get("error_message")?,
        error_type: row.try_get("error_type")?,
        retry_count: row.try_get("retry_count")?,
        status: SyncFailureStatus::parse(&status).unwrap_or(SyncFailureStatus::Pending),
        failed_at: row.try_get("failed_at")?,
        resolved_at: row.try_get("resolved_at")?,
        created_at: row.try_get("created_at")?,
    })
}
