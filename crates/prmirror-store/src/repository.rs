//! Store for tracked repositories.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use crate::error::StoreError;
use crate::models::Repository;
use crate::session::Session;

/// CRUD for [`Repository`] rows, flushing through the shared session.
#[derive(Clone)]
pub struct RepositoryStore {
    session: Arc<Session>,
}

impl RepositoryStore {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Repository>, StoreError> {
        let mut guard = self.session.guard().await;
        let tx = guard.as_mut().ok_or(StoreError::SessionClosed)?;
        fetch_by_id(tx, id).await
    }

    pub async fn get_by_full_name(&self, full_name: &str) -> Result<Option<Repository>, StoreError> {
        let mut guard = self.session.guard().await;
        let tx = guard.as_mut().ok_or(StoreError::SessionClosed)?;
        let row = sqlx::query("SELECT * FROM repositories WHERE full_name = ?1")
            .bind(full_name)
            .fetch_optional(&mut **tx)
            .await?;
        row.as_ref().map(from_row).transpose()
    }

    pub async fn get_by_owner_and_name(
        &self,
        owner: &str,
        name: &str,
    ) -> Result<Option<Repository>, StoreError> {
        let mut guard = self.session.guard().await;
        let tx = guard.as_mut().ok_or(StoreError::SessionClosed)?;
        let row = sqlx::query("SELECT * FROM repositories WHERE owner = ?1 AND name = ?2")
            .bind(owner)
            .bind(name)
            .fetch_optional(&mut **tx)
            .await?;
        row.as_ref().map(from_row).transpose()
    }

    /// All repositories flagged active, ordered by full name.
    pub async fn list_active(&self) -> Result<Vec<Repository>, StoreError> {
        let mut guard = self.session.guard().await;
        let tx = guard.as_mut().ok_or(StoreError::SessionClosed)?;
        let rows = sqlx::query("SELECT * FROM repositories WHERE is_active = 1 ORDER BY full_name")
            .fetch_all(&mut **tx)
            .await?;
        rows.iter().map(from_row).collect()
    }

    pub async fn create(&self, owner: &str, name: &str) -> Result<Repository, StoreError> {
        let mut guard = self.session.guard().await;
        let tx = guard.as_mut().ok_or(StoreError::SessionClosed)?;
        let full_name = format!("{owner}/{name}");
        let result = sqlx::query(
            "INSERT INTO repositories (owner, name, full_name, is_active, created_at) \
             VALUES (?1, ?2, ?3, 1, ?4)",
        )
        .bind(owner)
        .bind(name)
        .bind(&full_name)
        .bind(Utc::now())
        .execute(&mut **tx)
        .await?;
        let id = result.last_insert_rowid();
        tracing::info!(repository = %full_name, id, "created repository");
        fetch_by_id(tx, id)
            .await?
            .ok_or(StoreError::Database(sqlx::Error::RowNotFound))
    }

    /// Fetches the repository, creating it when absent. The bool is true
    /// when a row was created.
    pub async fn get_or_create(
        &self,
        owner: &str,
        name: &str,
    ) -> Result<(Repository, bool), StoreError> {
        if let Some(existing) = self.get_by_owner_and_name(owner, name).await? {
            return Ok((existing, false));
        }
        let created = self.create(owner, name).await?;
        Ok((created, true))
    }

    pub async fn update_last_synced(
        &self,
        id: i64,
        synced_at: DateTime<Utc>,
    ) -> Result<Option<Repository>, StoreError> {
        let mut guard = self.session.guard().await;
        let tx = guard.as_mut().ok_or(StoreError::SessionClosed)?;
        sqlx::query("UPDATE repositories SET last_synced_at = ?1 WHERE id = ?2")
            .bind(synced_at)
            .bind(id)
            .execute(&mut **tx)
            .await?;
        fetch_by_id(tx, id).await
    }

    pub async fn set_active(&self, id: i64, active: bool) -> Result<Option<Repository>, StoreError> {
        let mut guard = self.session.guard().await;
        let tx = guard.as_mut().ok_or(StoreError::SessionClosed)?;
        sqlx::query("UPDATE repositories SET is_active = ?1 WHERE id = ?2")
            .bind(active)
            .bind(id)
            .execute(&mut **tx)
            .await?;
        fetch_by_id(tx, id).await
    }

    /// Deletes the repository; pull requests and sync failures cascade.
    pub async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        let mut guard = self.session.guard().await;
        let tx = guard.as_mut().ok_or(StoreError::SessionClosed)?;
        let result = sqlx::query("DELETE FROM repositories WHERE id = ?1")
            .bind(id)
            .execute(&mut **tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

async fn fetch_by_id(
    conn: &mut SqliteConnection,
    id: i64,
) -> Result<Option<Repository>, StoreError> {
    let row = sqlx::query("SELECT * FROM repositories WHERE id = ?1")
        .bind(id)
        .fetch_optional(conn)
        .await?;
    row.as_ref().map(from_row).transpose()
}

fn from_row(row: &SqliteRow) -> Result<Repository, StoreError> {
    Ok(Repository {
        id: row.try_get("id")?,
        owner: row.try_get("owner")?,
        name: row.try_get("name")?,
        full_name: row.try_get("full_name")?,
        is_active: row.try_get("is_active")?,
        last_synced_at: row.try_get("last_synced_at")?,
        created_at: row.try_get("created_at")?,
    })
}
