//! SQLite connection helpers and startup schema initialization.

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::error::StoreError;

/// Opens (creating if missing) a SQLite database with foreign keys enforced.
pub async fn connect(url: &str) -> Result<SqlitePool, StoreError> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = SqlitePool::connect_with(options).await?;
    Ok(pool)
}

/// Opens an in-memory database on a single connection.
///
/// SQLite gives every connection its own private `:memory:` database, so the
/// pool is capped at one connection to keep all sessions on the same data.
pub async fn connect_memory() -> Result<SqlitePool, StoreError> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;
    Ok(pool)
}

/// Creates the three tables and their indexes if absent.
///
/// The partial unique index on `sync_failures` enforces the invariant that
/// at most one PENDING row exists per `(repository, pr_number)` while
/// resolved and permanent rows accumulate as history.
pub async fn init_schema(pool: &SqlitePool) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS repositories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner TEXT NOT NULL,
            name TEXT NOT NULL,
            full_name TEXT NOT NULL UNIQUE,
            is_active INTEGER NOT NULL DEFAULT 1,
            last_synced_at TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pull_requests (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            repository_id INTEGER NOT NULL REFERENCES repositories(id) ON DELETE CASCADE,
            number INTEGER NOT NULL,
            link TEXT NOT NULL,
            open_date TEXT NOT NULL,
            submitter TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT,
            last_update_date TEXT NOT NULL,
            state TEXT NOT NULL DEFAULT 'open',
            files_changed INTEGER NOT NULL DEFAULT 0,
            lines_added INTEGER NOT NULL DEFAULT 0,
            lines_deleted INTEGER NOT NULL DEFAULT 0,
            commits_count INTEGER NOT NULL DEFAULT 0,
            labels TEXT NOT NULL DEFAULT '[]',
            filenames TEXT NOT NULL DEFAULT '[]',
            reviewers TEXT NOT NULL DEFAULT '[]',
            assignees TEXT NOT NULL DEFAULT '[]',
            commits_breakdown TEXT NOT NULL DEFAULT '[]',
            participants TEXT NOT NULL DEFAULT '{}',
            close_date TEXT,
            merged_by TEXT,
            ai_summary TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (repository_id, number)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sync_failures (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            repository_id INTEGER NOT NULL REFERENCES repositories(id) ON DELETE CASCADE,
            pr_number INTEGER NOT NULL,
            error_message TEXT NOT NULL,
            error_type TEXT NOT NULL,
            retry_count INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'pending',
            failed_at TEXT NOT NULL,
            resolved_at TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS uq_sync_failures_pending
            ON sync_failures (repository_id, pr_number) WHERE status = 'pending'
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_pull_requests_repo_state
            ON pull_requests (repository_id, state)
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_sync_failures_status
            ON sync_failures (status, failed_at)
        "#,
    )
    .execute(pool)
    .await?;

    tracing::debug!("database schema ready");
    Ok(())
}
