//! Batch commit boundaries for bulk writes.
//!
//! Committing once per item is slow; committing once per run loses the
//! whole run on a crash. The commit manager lands the transaction boundary
//! every `batch_size` successful writes, bounding loss to the trailing
//! partial batch: after K recorded successes and an abrupt termination,
//! `floor(K / batch_size) * batch_size` items are durable.

use std::sync::{Arc, Mutex};

use crate::error::StoreError;
use crate::session::Session;

#[derive(Default)]
struct Counters {
    uncommitted: usize,
    total_committed: usize,
}

/// Commits the shared session every `batch_size` recorded successes.
pub struct CommitManager {
    session: Arc<Session>,
    batch_size: usize,
    counters: Mutex<Counters>,
}

impl CommitManager {
    /// Creates a manager committing every `batch_size` successes.
    pub fn new(session: Arc<Session>, batch_size: usize) -> Self {
        Self {
            session,
            batch_size: batch_size.max(1),
            counters: Mutex::new(Counters::default()),
        }
    }

    /// Records one successful write; commits when the batch fills.
    ///
    /// Returns the number of items committed (0 while the batch is still
    /// filling).
    pub async fn record_success(&self) -> Result<usize, StoreError> {
        let batch_full = {
            let mut counters = self.counters.lock().expect("commit counters poisoned");
            counters.uncommitted += 1;
            counters.uncommitted >= self.batch_size
        };
        if batch_full {
            self.commit().await
        } else {
            Ok(0)
        }
    }

    /// Commits whatever is pending. Serializes with store flushes on the
    /// session lock.
    pub async fn commit(&self) -> Result<usize, StoreError> {
        let pending = self.counters.lock().expect("commit counters poisoned").uncommitted;
        if pending == 0 {
            return Ok(0);
        }
        self.session.commit().await?;
        let committed = {
            let mut counters = self.counters.lock().expect("commit counters poisoned");
            let committed = counters.uncommitted;
            counters.total_committed += committed;
            counters.uncommitted = 0;
            committed
        };
        tracing::debug!(
            committed,
            total = self.total_committed(),
            "committed write batch"
        );
        Ok(committed)
    }

    /// Commits the trailing partial batch at the end of a run.
    pub async fn finalize(&self) -> Result<usize, StoreError> {
        self.commit().await
    }

    /// Writes recorded since the last commit.
    pub fn uncommitted_count(&self) -> usize {
        self.counters.lock().expect("commit counters poisoned").uncommitted
    }

    /// Total writes committed across all batches.
    pub fn total_committed(&self) -> usize {
        self.counters
            .lock()
            .expect("commit counters poisoned")
            .total_committed
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}
