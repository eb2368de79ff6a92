//! Configuration for the pacer, the scheduler, and the batch executor.

use std::time::Duration;

use prmirror_core::events::{EventListeners, FnListener};

use crate::events::SchedulerEvent;
use crate::scheduler::{JobId, JobPriority};

/// Configuration for the request pacer.
#[derive(Clone, Debug)]
pub struct PacerConfig {
    /// Floor for the recommended delay.
    pub(crate) min_request_interval: Duration,
    /// Ceiling for the recommended delay.
    pub(crate) max_request_interval: Duration,
    /// Percentage of the pool limit held back as an untouchable reserve.
    pub(crate) reserve_buffer_pct: f64,
    /// Extra requests the formula may borrow for short bursts.
    pub(crate) burst_allowance: u32,
    /// Name of this pacer instance.
    pub(crate) name: String,
}

impl PacerConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> PacerConfigBuilder {
        PacerConfigBuilder::new()
    }
}

impl Default for PacerConfig {
    fn default() -> Self {
        PacerConfigBuilder::new().build()
    }
}

/// Builder for pacer configuration.
pub struct PacerConfigBuilder {
    min_request_interval: Duration,
    max_request_interval: Duration,
    reserve_buffer_pct: f64,
    burst_allowance: u32,
    name: String,
}

impl PacerConfigBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self {
            min_request_interval: Duration::from_millis(100),
            max_request_interval: Duration::from_secs(60),
            reserve_buffer_pct: 10.0,
            burst_allowance: 5,
            name: "pacer".to_string(),
        }
    }

    /// Sets the minimum delay between requests.
    ///
    /// Default: 100ms
    pub fn min_request_interval(mut self, interval: Duration) -> Self {
        self.min_request_interval = interval;
        self
    }

    /// Sets the maximum delay between requests.
    ///
    /// Default: 60s
    pub fn max_request_interval(mut self, interval: Duration) -> Self {
        self.max_request_interval = interval;
        self
    }

    /// Sets the percentage of the pool limit reserved and never spent by
    /// paced requests.
    ///
    /// Default: 10.0
    pub fn reserve_buffer_pct(mut self, pct: f64) -> Self {
        self.reserve_buffer_pct = pct;
        self
    }

    /// Sets the burst allowance added to the effective remaining budget.
    ///
    /// Default: 5
    pub fn burst_allowance(mut self, allowance: u32) -> Self {
        self.burst_allowance = allowance;
        self
    }

    /// Sets the name of this pacer instance.
    ///
    /// Default: "pacer"
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> PacerConfig {
        PacerConfig {
            min_request_interval: self.min_request_interval,
            max_request_interval: self.max_request_interval,
            reserve_buffer_pct: self.reserve_buffer_pct,
            burst_allowance: self.burst_allowance,
            name: self.name,
        }
    }
}

impl Default for PacerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for the request scheduler.
#[derive(Clone)]
pub struct SchedulerConfig {
    /// Maximum number of jobs in flight at once.
    pub(crate) max_concurrent: usize,
    /// Retry attempts per job before the failure surfaces.
    pub(crate) max_retries: u32,
    /// Safety pad added to a reported rate-limit reset instant.
    pub(crate) rate_limit_pad: Duration,
    /// Unit for the exponential backoff: attempt n sleeps
    /// `min(2^n, 60) * backoff_base`.
    pub(crate) backoff_base: Duration,
    /// Sleep between queue polls when the queue is empty.
    pub(crate) idle_poll: Duration,
    /// Name of this scheduler instance.
    pub(crate) name: String,
    /// Event listeners.
    pub(crate) event_listeners: EventListeners<SchedulerEvent>,
}

impl SchedulerConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> SchedulerConfigBuilder {
        SchedulerConfigBuilder::new()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfigBuilder::new().build()
    }
}

/// Builder for scheduler configuration.
pub struct SchedulerConfigBuilder {
    max_concurrent: usize,
    max_retries: u32,
    rate_limit_pad: Duration,
    backoff_base: Duration,
    idle_poll: Duration,
    name: String,
    event_listeners: EventListeners<SchedulerEvent>,
}

impl SchedulerConfigBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self {
            max_concurrent: 5,
            max_retries: 3,
            rate_limit_pad: Duration::from_secs(5),
            backoff_base: Duration::from_secs(1),
            idle_poll: Duration::from_millis(10),
            name: "scheduler".to_string(),
            event_listeners: EventListeners::new(),
        }
    }

    /// Sets the maximum number of concurrently executing jobs.
    ///
    /// Default: 5
    pub fn max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max.max(1);
        self
    }

    /// Sets the maximum retry attempts per job.
    ///
    /// Default: 3
    pub fn max_retries(mut self, max: u32) -> Self {
        self.max_retries = max;
        self
    }

    /// Sets the pad added past a reported rate-limit reset before the next
    /// dispatch.
    ///
    /// Default: 5s
    pub fn rate_limit_pad(mut self, pad: Duration) -> Self {
        self.rate_limit_pad = pad;
        self
    }

    /// Sets the backoff unit. Attempt n sleeps `min(2^n, 60)` units, so the
    /// default of one second gives the standard 2s/4s/8s… ladder capped at
    /// a minute.
    ///
    /// Default: 1s
    pub fn backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// Sets the idle poll interval used while the queue is empty.
    ///
    /// Default: 10ms
    pub fn idle_poll(mut self, interval: Duration) -> Self {
        self.idle_poll = interval;
        self
    }

    /// Sets the name of this scheduler instance.
    ///
    /// Default: "scheduler"
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Registers a callback fired when a job begins executing.
    pub fn on_job_started<F>(mut self, f: F) -> Self
    where
        F: Fn(JobId, JobPriority) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let SchedulerEvent::JobStarted { id, priority, .. } = event {
                f(*id, *priority);
            }
        }));
        self
    }

    /// Registers a callback fired when a job is re-enqueued for retry. The
    /// priority argument is the priority the job re-entered the queue with.
    pub fn on_job_retried<F>(mut self, f: F) -> Self
    where
        F: Fn(JobId, JobPriority, u32) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let SchedulerEvent::JobRetried {
                id,
                priority,
                retry_count,
                ..
            } = event
            {
                f(*id, *priority, *retry_count);
            }
        }));
        self
    }

    /// Registers a callback fired when a job fails permanently.
    pub fn on_job_failed<F>(mut self, f: F) -> Self
    where
        F: Fn(JobId) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let SchedulerEvent::JobFailed { id, .. } = event {
                f(*id);
            }
        }));
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> SchedulerConfig {
        SchedulerConfig {
            max_concurrent: self.max_concurrent,
            max_retries: self.max_retries,
            rate_limit_pad: self.rate_limit_pad,
            backoff_base: self.backoff_base,
            idle_poll: self.idle_poll,
            name: self.name,
            event_listeners: self.event_listeners,
        }
    }
}

impl Default for SchedulerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for the batch executor.
#[derive(Clone, Debug)]
pub struct BatchConfig {
    /// Maximum items submitted to the scheduler per sub-batch.
    pub(crate) max_batch_size: usize,
    /// Stop between sub-batches on the first failure.
    pub(crate) stop_on_error: bool,
    /// Name of this executor instance.
    pub(crate) name: String,
}

impl BatchConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> BatchConfigBuilder {
        BatchConfigBuilder::new()
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfigBuilder::new().build()
    }
}

/// Builder for batch executor configuration.
pub struct BatchConfigBuilder {
    max_batch_size: usize,
    stop_on_error: bool,
    name: String,
}

impl BatchConfigBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self {
            max_batch_size: 50,
            stop_on_error: false,
            name: "batch".to_string(),
        }
    }

    /// Sets the maximum sub-batch size.
    ///
    /// Default: 50
    pub fn max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size.max(1);
        self
    }

    /// Stops between sub-batches after the first failure.
    ///
    /// Default: false
    pub fn stop_on_error(mut self, stop: bool) -> Self {
        self.stop_on_error = stop;
        self
    }

    /// Sets the name of this executor instance.
    ///
    /// Default: "batch"
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> BatchConfig {
        BatchConfig {
            max_batch_size: self.max_batch_size,
            stop_on_error: self.stop_on_error,
            name: self.name,
        }
    }
}

impl Default for BatchConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
