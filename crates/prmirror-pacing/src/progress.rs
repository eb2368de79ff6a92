//! Observable progress tracking for batch operations.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use prmirror_core::events::{EventListeners, FnListener};

use crate::events::ProgressEvent;

/// State of a tracked operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressState {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl ProgressState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Immutable view of a tracker's state, delivered to observers on every
/// change.
#[derive(Debug, Clone)]
pub struct ProgressSnapshot {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub state: ProgressState,
    pub current_item: Option<String>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub elapsed: Duration,
}

impl ProgressSnapshot {
    /// Items not yet processed.
    pub fn remaining(&self) -> usize {
        self.total.saturating_sub(self.completed + self.failed)
    }

    /// Percentage of items processed, 0-100. An empty batch reads complete.
    pub fn progress_percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        ((self.completed + self.failed) as f64 / self.total as f64) * 100.0
    }

    /// Percentage of processed items that succeeded, 0-100.
    pub fn success_rate(&self) -> f64 {
        let processed = self.completed + self.failed;
        if processed == 0 {
            return 100.0;
        }
        (self.completed as f64 / processed as f64) * 100.0
    }
}

struct ProgressInner {
    total: usize,
    completed: usize,
    failed: usize,
    state: ProgressState,
    current_item: Option<String>,
    error: Option<String>,
    started_at: Option<DateTime<Utc>>,
    start_instant: Option<Instant>,
    metadata: HashMap<String, String>,
}

impl ProgressInner {
    fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            total: self.total,
            completed: self.completed,
            failed: self.failed,
            state: self.state,
            current_item: self.current_item.clone(),
            error: self.error.clone(),
            started_at: self.started_at,
            elapsed: self
                .start_instant
                .map(|s| s.elapsed())
                .unwrap_or(Duration::ZERO),
        }
    }
}

/// Observable progress tracker for long-running batch operations.
///
/// Observers registered through [`on_progress`](Self::on_progress) receive
/// a snapshot on every change. A panicking observer is isolated and logged;
/// it can never corrupt the tracker's own state.
pub struct ProgressTracker {
    name: String,
    inner: Mutex<ProgressInner>,
    listeners: Mutex<EventListeners<ProgressEvent>>,
}

impl ProgressTracker {
    /// Creates a tracker with an initial total of zero.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_total(0, name)
    }

    /// Creates a tracker expecting `total` items.
    pub fn with_total(total: usize, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: Mutex::new(ProgressInner {
                total,
                completed: 0,
                failed: 0,
                state: ProgressState::Pending,
                current_item: None,
                error: None,
                started_at: None,
                start_instant: None,
                metadata: HashMap::new(),
            }),
            listeners: Mutex::new(EventListeners::new()),
        }
    }

    /// Registers an observer receiving a snapshot on every change.
    pub fn on_progress<F>(&self, f: F)
    where
        F: Fn(&ProgressSnapshot) + Send + Sync + 'static,
    {
        self.listeners
            .lock()
            .expect("progress listeners poisoned")
            .add(FnListener::new(move |event: &ProgressEvent| {
                f(&event.snapshot)
            }));
    }

    fn notify(&self, snapshot: ProgressSnapshot) {
        let event = ProgressEvent {
            source: self.name.clone(),
            timestamp: Instant::now(),
            snapshot,
        };
        self.listeners
            .lock()
            .expect("progress listeners poisoned")
            .emit(&event);
    }

    fn mutate<F: FnOnce(&mut ProgressInner)>(&self, f: F) {
        let snapshot = {
            let mut inner = self.inner.lock().expect("progress lock poisoned");
            f(&mut inner);
            inner.snapshot()
        };
        self.notify(snapshot);
    }

    /// Sets the expected total (when it is not known upfront).
    pub fn set_total(&self, total: usize) {
        self.mutate(|inner| inner.total = total);
    }

    /// Adds to the expected total (for dynamically discovered work).
    pub fn add_total(&self, count: usize) {
        self.mutate(|inner| inner.total += count);
    }

    /// Marks the operation as started.
    pub fn start(&self) {
        let total = self.inner.lock().expect("progress lock poisoned").total;
        tracing::info!(operation = %self.name, total, "operation started");
        self.mutate(|inner| {
            inner.state = ProgressState::InProgress;
            inner.started_at = Some(Utc::now());
            inner.start_instant = Some(Instant::now());
        });
    }

    /// Records one successfully processed item.
    pub fn increment(&self) {
        self.mutate(|inner| {
            inner.completed += 1;
            inner.current_item = None;
        });
    }

    /// Records one failed item.
    pub fn increment_failed(&self, error: Option<&str>) {
        if let Some(error) = error {
            tracing::warn!(operation = %self.name, error, "batch item failed");
        }
        self.mutate(|inner| {
            inner.failed += 1;
            inner.current_item = None;
        });
    }

    /// Sets the description of the item currently being processed.
    pub fn set_current(&self, item: impl Into<String>) {
        let item = item.into();
        self.mutate(|inner| inner.current_item = Some(item));
    }

    /// Marks the operation as successfully completed.
    pub fn complete(&self) {
        let snap = self.snapshot();
        tracing::info!(
            operation = %self.name,
            completed = snap.completed,
            failed = snap.failed,
            elapsed_secs = snap.elapsed.as_secs_f64(),
            "operation completed"
        );
        self.mutate(|inner| {
            inner.state = ProgressState::Completed;
            inner.current_item = None;
        });
    }

    /// Marks the operation as failed.
    pub fn fail(&self, error: impl Into<String>) {
        let error = error.into();
        tracing::error!(operation = %self.name, %error, "operation failed");
        self.mutate(|inner| {
            inner.state = ProgressState::Failed;
            inner.error = Some(error);
            inner.current_item = None;
        });
    }

    /// Marks the operation as cancelled.
    pub fn cancel(&self) {
        self.mutate(|inner| {
            inner.state = ProgressState::Cancelled;
            inner.current_item = None;
        });
    }

    /// Resets the tracker for reuse.
    pub fn reset(&self) {
        self.mutate(|inner| {
            inner.completed = 0;
            inner.failed = 0;
            inner.state = ProgressState::Pending;
            inner.current_item = None;
            inner.error = None;
            inner.started_at = None;
            inner.start_instant = None;
            inner.metadata.clear();
        });
    }

    /// Current state.
    pub fn state(&self) -> ProgressState {
        self.inner.lock().expect("progress lock poisoned").state
    }

    /// Whether the operation is in progress.
    pub fn is_running(&self) -> bool {
        self.state() == ProgressState::InProgress
    }

    /// Whether the operation reached a terminal state.
    pub fn is_done(&self) -> bool {
        matches!(
            self.state(),
            ProgressState::Completed | ProgressState::Failed | ProgressState::Cancelled
        )
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.inner.lock().expect("progress lock poisoned").snapshot()
    }

    /// Stores an arbitrary metadata value.
    pub fn set_metadata(&self, key: impl Into<String>, value: impl Into<String>) {
        self.inner
            .lock()
            .expect("progress lock poisoned")
            .metadata
            .insert(key.into(), value.into());
    }

    /// Retrieves a stored metadata value.
    pub fn metadata(&self, key: &str) -> Option<String> {
        self.inner
            .lock()
            .expect("progress lock poisoned")
            .metadata
            .get(key)
            .cloned()
    }
}
