//! Adaptive request pacing from live quota state.
//!
//! The pacer reads the monitor's per-pool quota and answers one question:
//! how long should the caller wait before firing the next request? The
//! derivation spreads the remaining budget (minus a reserve, plus a burst
//! allowance) evenly over the time left until the window resets, then
//! stretches the result as quota health degrades:
//!
//! ```text
//! reserve   = limit * reserve_buffer_pct / 100
//! effective = max(1, remaining - reserve + burst_allowance)
//! delay     = clamp((until_reset / effective) * throttle(status), min, max)
//! ```
//!
//! A forced wait, installed by the scheduler when the upstream reports an
//! exhausted quota, overrides the formula until its deadline passes.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use prmirror_ratelimit::{PoolQuota, RateLimitMonitor, RateLimitPool, RateLimitStatus};

use crate::config::PacerConfig;

const VELOCITY_WINDOW: Duration = Duration::from_secs(60);

struct PacerState {
    last_request_at: Option<Instant>,
    window: VecDeque<Instant>,
    wait_until: Option<DateTime<Utc>>,
}

/// Computes recommended pre-request delays from monitored quota state.
pub struct RequestPacer {
    monitor: Arc<RateLimitMonitor>,
    config: PacerConfig,
    state: Mutex<PacerState>,
}

impl RequestPacer {
    /// Creates a pacer reading quota state from the given monitor.
    pub fn new(monitor: Arc<RateLimitMonitor>, config: PacerConfig) -> Self {
        Self {
            monitor,
            config,
            state: Mutex::new(PacerState {
                last_request_at: None,
                window: VecDeque::new(),
                wait_until: None,
            }),
        }
    }

    /// The monitor this pacer reads from.
    pub fn monitor(&self) -> &Arc<RateLimitMonitor> {
        &self.monitor
    }

    /// Recommended delay before the next core-pool request.
    pub fn recommended_delay(&self) -> Duration {
        self.recommended_delay_for(RateLimitPool::Core)
    }

    /// Recommended delay before the next request against `pool`.
    ///
    /// Never negative. An active forced wait wins over the formula; with no
    /// quota data the minimum interval applies.
    pub fn recommended_delay_for(&self, pool: RateLimitPool) -> Duration {
        {
            let mut state = self.state.lock().expect("pacer lock poisoned");
            if let Some(until) = state.wait_until {
                let remaining = until - Utc::now();
                match remaining.to_std() {
                    Ok(d) if d > Duration::ZERO => return d,
                    _ => state.wait_until = None,
                }
            }
        }

        match self.monitor.pool_quota(pool) {
            Some(quota) => self.optimal_delay(&quota),
            None => self.config.min_request_interval,
        }
    }

    fn optimal_delay(&self, quota: &PoolQuota) -> Duration {
        let until_reset = quota.seconds_until_reset();
        if until_reset <= 0 {
            return self.config.min_request_interval;
        }

        let reserve = quota.limit as f64 * (self.config.reserve_buffer_pct / 100.0);
        let effective =
            (quota.remaining as f64 - reserve + self.config.burst_allowance as f64).max(1.0);
        let base = until_reset as f64 / effective;

        let status = self.monitor.status(quota.pool);
        let adjusted = base * throttle_multiplier(status);

        let min = self.config.min_request_interval.as_secs_f64();
        let max = self.config.max_request_interval.as_secs_f64();
        Duration::from_secs_f64(adjusted.clamp(min, max))
    }

    /// Records that a request is starting, feeding the 60-second velocity
    /// window behind [`requests_per_minute`](Self::requests_per_minute).
    pub fn on_request_start(&self) {
        let now = Instant::now();
        let mut state = self.state.lock().expect("pacer lock poisoned");
        state.last_request_at = Some(now);
        state.window.push_back(now);
        prune_window(&mut state.window, now);
    }

    /// Records that a request completed, forwarding any response headers to
    /// the monitor.
    pub fn on_request_complete(&self, headers: Option<&HashMap<String, String>>) {
        if let Some(headers) = headers {
            self.monitor.update_from_headers(headers);
        }
    }

    /// Forces all callers to wait `duration` from now.
    pub fn force_wait(&self, duration: Duration) {
        let until = Utc::now() + chrono::Duration::from_std(duration).unwrap_or_default();
        self.state.lock().expect("pacer lock poisoned").wait_until = Some(until);
        tracing::info!(
            pacer = %self.config.name,
            wait_secs = duration.as_secs_f64(),
            "forced wait installed"
        );
    }

    /// Forces all callers to wait until `instant`.
    pub fn force_wait_until(&self, instant: DateTime<Utc>) {
        self.state.lock().expect("pacer lock poisoned").wait_until = Some(instant);
        let remaining = (instant - Utc::now()).num_milliseconds().max(0);
        tracing::info!(
            pacer = %self.config.name,
            until = %instant,
            remaining_ms = remaining,
            "forced wait installed"
        );
    }

    /// Clears any forced wait.
    pub fn clear_forced_wait(&self) {
        self.state.lock().expect("pacer lock poisoned").wait_until = None;
    }

    /// Whether a forced wait is currently in effect.
    pub fn is_forced_wait_active(&self) -> bool {
        let state = self.state.lock().expect("pacer lock poisoned");
        matches!(state.wait_until, Some(until) if until > Utc::now())
    }

    /// Time left in the forced wait, zero if none is active.
    pub fn forced_wait_remaining(&self) -> Duration {
        let state = self.state.lock().expect("pacer lock poisoned");
        state
            .wait_until
            .and_then(|until| (until - Utc::now()).to_std().ok())
            .unwrap_or(Duration::ZERO)
    }

    /// Requests started in the last 60 seconds.
    pub fn requests_per_minute(&self) -> usize {
        let now = Instant::now();
        let mut state = self.state.lock().expect("pacer lock poisoned");
        prune_window(&mut state.window, now);
        state.window.len()
    }

    /// Instant the most recent request started, if any.
    pub fn last_request_at(&self) -> Option<Instant> {
        self.state.lock().expect("pacer lock poisoned").last_request_at
    }

    /// Current pacing statistics for diagnostics.
    pub fn stats(&self) -> PacerStats {
        let quota = self.monitor.pool_quota(RateLimitPool::Core);
        let status = self.monitor.status(RateLimitPool::Core);
        PacerStats {
            requests_per_minute: self.requests_per_minute(),
            recommended_delay: self.recommended_delay(),
            throttle_multiplier: throttle_multiplier(status),
            status,
            remaining: quota.as_ref().map(|q| q.remaining),
            seconds_until_reset: quota.as_ref().map(|q| q.seconds_until_reset()),
            forced_wait_active: self.is_forced_wait_active(),
            forced_wait_remaining: self.forced_wait_remaining(),
        }
    }
}

fn prune_window(window: &mut VecDeque<Instant>, now: Instant) {
    while let Some(front) = window.front() {
        if now.duration_since(*front) > VELOCITY_WINDOW {
            window.pop_front();
        } else {
            break;
        }
    }
}

/// Delay multiplier applied as quota health degrades.
fn throttle_multiplier(status: RateLimitStatus) -> f64 {
    match status {
        RateLimitStatus::Healthy => 1.0,
        RateLimitStatus::Warning => 1.5,
        RateLimitStatus::Critical => 2.0,
        RateLimitStatus::Exhausted => 4.0,
    }
}

/// Point-in-time pacer diagnostics.
#[derive(Debug, Clone)]
pub struct PacerStats {
    pub requests_per_minute: usize,
    pub recommended_delay: Duration,
    pub throttle_multiplier: f64,
    pub status: RateLimitStatus,
    pub remaining: Option<u32>,
    pub seconds_until_reset: Option<i64>,
    pub forced_wait_active: bool,
    pub forced_wait_remaining: Duration,
}
