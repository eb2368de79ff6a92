//! Database session with independent flush and commit.
//!
//! A [`Session`] keeps one open transaction on a pooled SQLite connection.
//! Store writes execute statements on that transaction (the "flush": SQL is
//! sent, nothing is durable yet); [`Session::commit`] lands the transaction
//! boundary and immediately opens the next one. The transaction sits behind
//! a tokio mutex which doubles as the session-level write lock: concurrent
//! per-PR workers sharing one session serialize here, and the commit
//! manager's commits take the same lock as every flush.
//!
//! Dropping a session rolls back whatever was flushed since the last
//! commit, which is exactly the crash semantics the commit manager's
//! batch-durability contract builds on.

use sqlx::sqlite::SqlitePool;
use sqlx::{Sqlite, Transaction};
use tokio::sync::{Mutex, MutexGuard};

use crate::error::StoreError;

type Tx = Transaction<'static, Sqlite>;

/// A single-writer database session. Not shared across runs; create one per
/// sync operation.
pub struct Session {
    pool: SqlitePool,
    tx: Mutex<Option<Tx>>,
}

impl Session {
    /// Begins a session with an open transaction.
    pub async fn begin(pool: SqlitePool) -> Result<Self, StoreError> {
        let tx = pool.begin().await?;
        Ok(Self {
            pool,
            tx: Mutex::new(Some(tx)),
        })
    }

    /// Locks the open transaction for a flush. Store-internal.
    pub(crate) async fn guard(&self) -> MutexGuard<'_, Option<Tx>> {
        self.tx.lock().await
    }

    /// Commits everything flushed so far and opens the next transaction.
    pub async fn commit(&self) -> Result<(), StoreError> {
        let mut guard = self.tx.lock().await;
        if let Some(tx) = guard.take() {
            tx.commit().await?;
        }
        *guard = Some(self.pool.begin().await?);
        Ok(())
    }

    /// Discards everything flushed since the last commit and opens a fresh
    /// transaction.
    pub async fn rollback(&self) -> Result<(), StoreError> {
        let mut guard = self.tx.lock().await;
        if let Some(tx) = guard.take() {
            tx.rollback().await?;
        }
        *guard = Some(self.pool.begin().await?);
        Ok(())
    }

    /// Commits and closes the session; later operations fail with
    /// [`StoreError::SessionClosed`].
    pub async fn finish(&self) -> Result<(), StoreError> {
        let mut guard = self.tx.lock().await;
        if let Some(tx) = guard.take() {
            tx.commit().await?;
        }
        Ok(())
    }

    /// The pool this session draws connections from.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
