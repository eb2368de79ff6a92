//! Priority request scheduler with pacing, bounded concurrency, and retry.
//!
//! A single worker loop drains a binary min-heap keyed on
//! `(priority, enqueue time, sequence)`. Before each dispatch the loop
//! sleeps the pacer's recommended delay; dispatch itself is gated by a
//! counting semaphore so at most `max_concurrent` jobs are ever in flight.
//!
//! The scheduler is the only layer that retries. Failed jobs are classified
//! through [`ClassifyError`]: rate-limit errors install a forced wait on the
//! pacer and re-enter the queue at HIGH priority so they run first once the
//! quota resets; other retryable errors back off exponentially; fatal errors
//! surface immediately.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use pin_project_lite::pin_project;
use prmirror_core::{ClassifyError, ErrorClass};
use tokio::sync::{oneshot, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;

use crate::config::SchedulerConfig;
use crate::events::SchedulerEvent;
use crate::pacer::RequestPacer;

/// Identifier for a queued job, unique within one scheduler instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// Priority levels for queued jobs. Lower runs first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum JobPriority {
    /// Rate-limit recovery and other must-run-first work.
    High,
    /// Regular sync operations.
    #[default]
    Normal,
    /// Background and optional work.
    Low,
}

impl JobPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Normal => "normal",
            Self::Low => "low",
        }
    }
}

/// State of a queued job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    InFlight,
    Completed,
    Failed,
    Cancelled,
}

/// Errors surfaced by [`RequestScheduler::submit`].
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError<E: fmt::Debug + fmt::Display> {
    /// The job itself failed (after retries were exhausted, or immediately
    /// for fatal errors).
    #[error("job failed: {0}")]
    Job(E),
    /// The caller's timeout elapsed; the job may still run.
    #[error("timed out waiting for job result")]
    Timeout,
    /// The job was cancelled before producing a result.
    #[error("job cancelled before completion")]
    Cancelled,
}

type JobFn<T, E> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, E>> + Send + Sync>;
type ReplySender<T, E> = oneshot::Sender<Result<T, SchedulerError<E>>>;

struct QueuedJob<T, E: fmt::Debug + fmt::Display> {
    id: JobId,
    priority: JobPriority,
    enqueued_at_ns: u64,
    seq: u64,
    state: JobState,
    run: JobFn<T, E>,
    reply: Option<ReplySender<T, E>>,
    retry_count: u32,
    max_retries: u32,
}

struct HeapSlot<T, E: fmt::Debug + fmt::Display>(QueuedJob<T, E>);

impl<T, E: fmt::Debug + fmt::Display> HeapSlot<T, E> {
    fn key(&self) -> (JobPriority, u64, u64) {
        (self.0.priority, self.0.enqueued_at_ns, self.0.seq)
    }
}

impl<T, E: fmt::Debug + fmt::Display> PartialEq for HeapSlot<T, E> {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl<T, E: fmt::Debug + fmt::Display> Eq for HeapSlot<T, E> {}

impl<T, E: fmt::Debug + fmt::Display> PartialOrd for HeapSlot<T, E> {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl<T, E: fmt::Debug + fmt::Display> Ord for HeapSlot<T, E> {
    // Reversed so the std max-heap pops the minimum key.
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other.key().cmp(&self.key())
    }
}

// pin-project-lite's macro grammar doesn't support multiple trait bounds on a
// generic parameter, so the bound is expressed as this single supertrait.
trait DebugDisplay: fmt::Debug + fmt::Display {}
impl<E: fmt::Debug + fmt::Display> DebugDisplay for E {}

pin_project! {
    /// Future resolving to a submitted job's outcome.
    pub struct JobHandle<T, E: DebugDisplay> {
        id: JobId,
        #[pin]
        rx: oneshot::Receiver<Result<T, SchedulerError<E>>>,
    }
}

impl<T, E: fmt::Debug + fmt::Display> JobHandle<T, E> {
    /// The id of the job this handle resolves.
    pub fn id(&self) -> JobId {
        self.id
    }
}

impl<T, E: fmt::Debug + fmt::Display> Future for JobHandle<T, E> {
    type Output = Result<T, SchedulerError<E>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        match this.rx.poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(SchedulerError::Cancelled)),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    in_flight: AtomicU64,
    /// Jobs popped from the queue whose executor task has not finished.
    /// Covers the window where a job holds neither a queue slot nor a
    /// semaphore permit, so idleness checks cannot lose it.
    dispatched: AtomicU64,
}

struct Shared<T, E: fmt::Debug + fmt::Display> {
    pacer: Arc<RequestPacer>,
    config: SchedulerConfig,
    queue: Mutex<BinaryHeap<HeapSlot<T, E>>>,
    semaphore: Arc<Semaphore>,
    running: AtomicBool,
    seq: AtomicU64,
    epoch: Instant,
    counters: Counters,
    active: Mutex<Vec<JoinHandle<()>>>,
}

impl<T, E: fmt::Debug + fmt::Display> Shared<T, E> {
    fn emit(&self, event: SchedulerEvent) {
        self.config.event_listeners.emit(&event);
    }

    fn name(&self) -> String {
        self.config.name.clone()
    }
}

/// Point-in-time scheduler statistics.
#[derive(Debug, Clone)]
pub struct SchedulerStats {
    pub queue_size: usize,
    pub is_running: bool,
    pub is_idle: bool,
    pub max_concurrent: usize,
    pub total_submitted: u64,
    pub total_completed: u64,
    pub total_failed: u64,
    pub in_flight: u64,
}

/// Priority-based async request scheduler with rate limiting.
pub struct RequestScheduler<T, E: fmt::Debug + fmt::Display> {
    shared: Arc<Shared<T, E>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<T, E> RequestScheduler<T, E>
where
    T: Send + 'static,
    E: ClassifyError + fmt::Debug + fmt::Display + Send + 'static,
{
    /// Creates a scheduler; no work runs until [`start`](Self::start).
    pub fn new(pacer: Arc<RequestPacer>, config: SchedulerConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent));
        Self {
            shared: Arc::new(Shared {
                pacer,
                config,
                queue: Mutex::new(BinaryHeap::new()),
                semaphore,
                running: AtomicBool::new(false),
                seq: AtomicU64::new(0),
                epoch: Instant::now(),
                counters: Counters::default(),
                active: Mutex::new(Vec::new()),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Starts the worker loop. Idempotent.
    pub fn start(&self) {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let shared = Arc::clone(&self.shared);
        let handle = tokio::spawn(worker_loop(shared));
        *self.worker.lock().expect("scheduler worker lock poisoned") = Some(handle);
        tracing::info!(
            scheduler = %self.shared.config.name,
            max_concurrent = self.shared.config.max_concurrent,
            "request scheduler started"
        );
    }

    /// Whether the scheduler is accepting and dispatching work.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Adds a job to the queue, fire-and-forget.
    pub fn enqueue<F>(&self, job: F, priority: JobPriority) -> JobId
    where
        F: Fn() -> BoxFuture<'static, Result<T, E>> + Send + Sync + 'static,
    {
        self.push_job(Arc::new(job), priority, None)
    }

    /// Submits a job and awaits its outcome.
    pub async fn submit<F>(&self, job: F, priority: JobPriority) -> Result<T, SchedulerError<E>>
    where
        F: Fn() -> BoxFuture<'static, Result<T, E>> + Send + Sync + 'static,
    {
        self.submit_with_timeout(job, priority, None).await
    }

    /// Submits a job and awaits its outcome, bounded by `timeout`.
    ///
    /// On timeout the waiting handle is cancelled; the job itself is not
    /// interrupted and may still run to completion.
    pub async fn submit_with_timeout<F>(
        &self,
        job: F,
        priority: JobPriority,
        timeout: Option<Duration>,
    ) -> Result<T, SchedulerError<E>>
    where
        F: Fn() -> BoxFuture<'static, Result<T, E>> + Send + Sync + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let id = self.push_job(Arc::new(job), priority, Some(tx));
        let handle = JobHandle { id, rx };
        match timeout {
            Some(limit) => match tokio::time::timeout(limit, handle).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::debug!(job = %id, "submit timed out; abandoning handle");
                    Err(SchedulerError::Timeout)
                }
            },
            None => handle.await,
        }
    }

    fn push_job(
        &self,
        run: JobFn<T, E>,
        priority: JobPriority,
        reply: Option<ReplySender<T, E>>,
    ) -> JobId {
        let shared = &self.shared;
        let seq = shared.seq.fetch_add(1, Ordering::SeqCst);
        let id = JobId(seq);
        let job = QueuedJob {
            id,
            priority,
            enqueued_at_ns: shared.epoch.elapsed().as_nanos() as u64,
            seq,
            state: JobState::Pending,
            run,
            reply,
            retry_count: 0,
            max_retries: shared.config.max_retries,
        };
        shared.counters.submitted.fetch_add(1, Ordering::SeqCst);
        shared.emit(SchedulerEvent::JobEnqueued {
            source: shared.name(),
            timestamp: Instant::now(),
            id,
            priority,
        });
        let queue_size = {
            let mut queue = shared.queue.lock().expect("scheduler queue poisoned");
            queue.push(HeapSlot(job));
            queue.len()
        };
        tracing::debug!(job = %id, priority = priority.as_str(), queue_size, "job enqueued");
        id
    }

    /// Number of jobs waiting in the queue.
    pub fn queue_size(&self) -> usize {
        self.shared.queue.lock().expect("scheduler queue poisoned").len()
    }

    /// True when nothing is queued, dispatched, or in flight.
    pub fn is_idle(&self) -> bool {
        self.queue_size() == 0 && self.shared.counters.dispatched.load(Ordering::SeqCst) == 0
    }

    /// Current scheduler statistics.
    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            queue_size: self.queue_size(),
            is_running: self.is_running(),
            is_idle: self.is_idle(),
            max_concurrent: self.shared.config.max_concurrent,
            total_submitted: self.shared.counters.submitted.load(Ordering::SeqCst),
            total_completed: self.shared.counters.completed.load(Ordering::SeqCst),
            total_failed: self.shared.counters.failed.load(Ordering::SeqCst),
            in_flight: self.shared.counters.in_flight.load(Ordering::SeqCst),
        }
    }

    /// Stops the scheduler.
    ///
    /// With `wait` the queue is drained up to `timeout` before outstanding
    /// executor tasks are cancelled. Pending handles resolve to
    /// [`SchedulerError::Cancelled`].
    pub async fn shutdown(&self, wait: bool, timeout: Duration) {
        self.shared.running.store(false, Ordering::SeqCst);

        if wait {
            let deadline = Instant::now() + timeout;
            loop {
                if self.is_idle() {
                    break;
                }
                if Instant::now() >= deadline {
                    tracing::warn!(
                        scheduler = %self.shared.config.name,
                        pending = self.queue_size(),
                        "shutdown timed out before the queue drained"
                    );
                    break;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        }

        if let Some(handle) = self
            .worker
            .lock()
            .expect("scheduler worker lock poisoned")
            .take()
        {
            handle.abort();
        }
        for handle in self
            .shared
            .active
            .lock()
            .expect("scheduler active set poisoned")
            .drain(..)
        {
            handle.abort();
        }

        let drained: Vec<HeapSlot<T, E>> = {
            let mut queue = self.shared.queue.lock().expect("scheduler queue poisoned");
            queue.drain().collect()
        };
        for mut slot in drained {
            slot.0.state = JobState::Cancelled;
            if let Some(tx) = slot.0.reply.take() {
                let _ = tx.send(Err(SchedulerError::Cancelled));
            }
        }

        tracing::info!(
            scheduler = %self.shared.config.name,
            completed = self.shared.counters.completed.load(Ordering::SeqCst),
            failed = self.shared.counters.failed.load(Ordering::SeqCst),
            "request scheduler stopped"
        );
    }
}

async fn worker_loop<T, E>(shared: Arc<Shared<T, E>>)
where
    T: Send + 'static,
    E: ClassifyError + fmt::Debug + fmt::Display + Send + 'static,
{
    loop {
        let queue_empty = shared
            .queue
            .lock()
            .expect("scheduler queue poisoned")
            .is_empty();
        if queue_empty {
            // Keep draining after shutdown until the queue is empty.
            if !shared.running.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(shared.config.idle_poll).await;
            continue;
        }

        let delay = shared.pacer.recommended_delay();
        if delay > Duration::ZERO {
            tokio::time::sleep(delay).await;
        }

        let job = shared
            .queue
            .lock()
            .expect("scheduler queue poisoned")
            .pop()
            .map(|slot| slot.0);
        let Some(job) = job else { continue };
        shared.counters.dispatched.fetch_add(1, Ordering::SeqCst);

        let permit = match Arc::clone(&shared.semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };

        let task_shared = Arc::clone(&shared);
        let handle = tokio::spawn(execute_job(task_shared, job, permit));
        let mut active = shared.active.lock().expect("scheduler active set poisoned");
        active.retain(|h| !h.is_finished());
        active.push(handle);
    }
}

async fn execute_job<T, E>(
    shared: Arc<Shared<T, E>>,
    mut job: QueuedJob<T, E>,
    permit: OwnedSemaphorePermit,
) where
    T: Send + 'static,
    E: ClassifyError + fmt::Debug + fmt::Display + Send + 'static,
{
    // A forced wait is a hard block: a job that was already selected when
    // the rate-limit error landed must still not fire before the reset.
    loop {
        let wait = shared.pacer.forced_wait_remaining();
        if wait.is_zero() {
            break;
        }
        tokio::time::sleep(wait).await;
    }

    job.state = JobState::InFlight;
    shared.counters.in_flight.fetch_add(1, Ordering::SeqCst);
    shared.emit(SchedulerEvent::JobStarted {
        source: shared.name(),
        timestamp: Instant::now(),
        id: job.id,
        priority: job.priority,
    });

    shared.pacer.on_request_start();
    let result = (job.run)().await;
    // Headers flow to the monitor inside the job's own client call; this
    // hook runs before the permit is released so the monitor is current
    // when the worker selects the next item.
    shared.pacer.on_request_complete(None);
    shared.counters.in_flight.fetch_sub(1, Ordering::SeqCst);

    match result {
        Ok(value) => {
            job.state = JobState::Completed;
            shared.counters.completed.fetch_add(1, Ordering::SeqCst);
            #[cfg(feature = "metrics")]
            metrics::counter!("scheduler_jobs_completed_total").increment(1);
            shared.emit(SchedulerEvent::JobCompleted {
                source: shared.name(),
                timestamp: Instant::now(),
                id: job.id,
            });
            if let Some(tx) = job.reply.take() {
                let _ = tx.send(Ok(value));
            }
        }
        Err(error) => handle_job_error(&shared, job, error).await,
    }

    drop(permit);
    shared.counters.dispatched.fetch_sub(1, Ordering::SeqCst);
}

async fn handle_job_error<T, E>(shared: &Arc<Shared<T, E>>, mut job: QueuedJob<T, E>, error: E)
where
    T: Send + 'static,
    E: ClassifyError + fmt::Debug + fmt::Display + Send + 'static,
{
    job.retry_count += 1;
    tracing::warn!(
        job = %job.id,
        attempt = job.retry_count,
        max_retries = job.max_retries,
        error = %error,
        "job attempt failed"
    );

    match error.error_class() {
        ErrorClass::RateLimited => {
            if let Some(reset_at) = error.rate_limit_reset() {
                let pad = chrono::Duration::from_std(shared.config.rate_limit_pad)
                    .unwrap_or_else(|_| chrono::Duration::seconds(5));
                shared.pacer.force_wait_until(reset_at + pad);
            }
            if job.retry_count <= job.max_retries {
                // Boosted so it runs first once the forced wait elapses.
                job.priority = JobPriority::High;
                requeue(shared, job);
                return;
            }
        }
        ErrorClass::Retryable => {
            if job.retry_count <= job.max_retries {
                let backoff = backoff_delay(shared.config.backoff_base, job.retry_count);
                tracing::debug!(
                    job = %job.id,
                    backoff_ms = backoff.as_millis() as u64,
                    "retrying after backoff"
                );
                tokio::time::sleep(backoff).await;
                requeue(shared, job);
                return;
            }
        }
        ErrorClass::Fatal => {}
    }

    job.state = JobState::Failed;
    shared.counters.failed.fetch_add(1, Ordering::SeqCst);
    #[cfg(feature = "metrics")]
    metrics::counter!("scheduler_jobs_failed_total").increment(1);
    shared.emit(SchedulerEvent::JobFailed {
        source: shared.name(),
        timestamp: Instant::now(),
        id: job.id,
    });
    tracing::error!(job = %job.id, state = ?job.state, error = %error, "job failed permanently");
    if let Some(tx) = job.reply.take() {
        let _ = tx.send(Err(SchedulerError::Job(error)));
    }
}

fn requeue<T, E>(shared: &Arc<Shared<T, E>>, mut job: QueuedJob<T, E>)
where
    T: Send + 'static,
    E: ClassifyError + fmt::Debug + fmt::Display + Send + 'static,
{
    job.state = JobState::Pending;
    shared.emit(SchedulerEvent::JobRetried {
        source: shared.name(),
        timestamp: Instant::now(),
        id: job.id,
        priority: job.priority,
        retry_count: job.retry_count,
    });
    shared
        .queue
        .lock()
        .expect("scheduler queue poisoned")
        .push(HeapSlot(job));
}

/// Exponential backoff: attempt n sleeps `min(2^n, 60)` backoff units.
fn backoff_delay(base: Duration, retry_count: u32) -> Duration {
    let units = (1u64 << retry_count.min(6)).min(60);
    base.saturating_mul(units as u32)
}
