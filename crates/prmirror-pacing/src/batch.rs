//! Batch execution over the scheduler.
//!
//! Fans a homogeneous work list through the scheduler in sub-batches,
//! aggregating per-item outcomes and driving an optional progress tracker.
//! Cancellation is cooperative: no new sub-batch starts after `cancel()`,
//! but items already in flight run to completion.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use prmirror_core::ClassifyError;

use crate::config::BatchConfig;
use crate::progress::ProgressTracker;
use crate::scheduler::{JobPriority, RequestScheduler, SchedulerError};

/// Aggregated result of a batch operation.
#[derive(Debug)]
pub struct BatchResult<R, E: fmt::Debug + fmt::Display> {
    /// Results of successful items, in submission order.
    pub succeeded: Vec<R>,
    /// `(item index, error)` for each failed item.
    pub failed: Vec<(usize, SchedulerError<E>)>,
}

impl<R, E: fmt::Debug + fmt::Display> BatchResult<R, E> {
    fn new() -> Self {
        Self {
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }

    /// Total number of items processed.
    pub fn total_count(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    /// Number of successful items.
    pub fn success_count(&self) -> usize {
        self.succeeded.len()
    }

    /// Number of failed items.
    pub fn failure_count(&self) -> usize {
        self.failed.len()
    }

    /// Whether every item succeeded.
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Runs a processor over a sequence of items via the scheduler.
pub struct BatchExecutor<R, E: fmt::Debug + fmt::Display> {
    scheduler: Arc<RequestScheduler<R, E>>,
    progress: Option<Arc<ProgressTracker>>,
    config: BatchConfig,
    cancelled: AtomicBool,
}

impl<R, E> BatchExecutor<R, E>
where
    R: Send + 'static,
    E: ClassifyError + fmt::Debug + fmt::Display + Send + 'static,
{
    /// Creates an executor submitting through `scheduler`.
    pub fn new(scheduler: Arc<RequestScheduler<R, E>>, config: BatchConfig) -> Self {
        Self {
            scheduler,
            progress: None,
            config,
            cancelled: AtomicBool::new(false),
        }
    }

    /// Attaches a progress tracker driven through the batch lifecycle.
    pub fn with_progress(mut self, progress: Arc<ProgressTracker>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Processes every item through the scheduler.
    ///
    /// All items are attempted unless `stop_on_error` is configured, in
    /// which case execution stops between sub-batches after the first
    /// failure. `item_name` labels the current item on the progress tracker.
    pub async fn execute<T, F>(
        &self,
        items: Vec<T>,
        processor: F,
        priority: JobPriority,
        item_name: Option<Box<dyn Fn(&T) -> String + Send + Sync>>,
    ) -> BatchResult<R, E>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn(T) -> BoxFuture<'static, Result<R, E>> + Send + Sync + 'static,
    {
        self.cancelled.store(false, Ordering::SeqCst);
        let mut result = BatchResult::new();
        if items.is_empty() {
            return result;
        }

        if let Some(progress) = &self.progress {
            progress.set_total(items.len());
            progress.start();
        }

        let processor = Arc::new(processor);
        let mut stopped_on_error = false;
        let mut index_base = 0usize;
        let mut iter = items.into_iter();

        loop {
            let chunk: Vec<T> = iter.by_ref().take(self.config.max_batch_size).collect();
            if chunk.is_empty() {
                break;
            }
            if self.cancelled.load(Ordering::SeqCst) {
                tracing::info!(batch = %self.config.name, "batch cancelled; skipping remaining items");
                break;
            }
            let chunk_len = chunk.len();

            let mut submissions = Vec::with_capacity(chunk_len);
            for item in chunk {
                if let (Some(progress), Some(name)) = (&self.progress, &item_name) {
                    progress.set_current(name(&item));
                }
                let processor = Arc::clone(&processor);
                submissions.push(self.scheduler.submit(
                    move || (*processor)(item.clone()),
                    priority,
                ));
            }

            let outcomes = futures::future::join_all(submissions).await;
            for (offset, outcome) in outcomes.into_iter().enumerate() {
                match outcome {
                    Ok(value) => {
                        result.succeeded.push(value);
                        if let Some(progress) = &self.progress {
                            progress.increment();
                        }
                    }
                    Err(error) => {
                        if let Some(progress) = &self.progress {
                            progress.increment_failed(Some(&error.to_string()));
                        }
                        result.failed.push((index_base + offset, error));
                    }
                }
            }

            if self.config.stop_on_error && !result.failed.is_empty() {
                stopped_on_error = true;
                break;
            }
            index_base += chunk_len;
        }

        if let Some(progress) = &self.progress {
            if self.cancelled.load(Ordering::SeqCst) {
                progress.cancel();
            } else if stopped_on_error {
                let first = result
                    .failed
                    .first()
                    .map(|(_, e)| e.to_string())
                    .unwrap_or_default();
                progress.fail(format!("stopped on error: {first}"));
            } else {
                progress.complete();
            }
        }

        tracing::debug!(
            batch = %self.config.name,
            succeeded = result.success_count(),
            failed = result.failure_count(),
            "batch finished"
        );
        result
    }

    /// Cancels the batch. No new sub-batches start; in-flight items finish.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether the batch has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
