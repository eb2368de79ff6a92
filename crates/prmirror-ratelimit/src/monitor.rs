//! Passive rate-limit monitor.
//!
//! The monitor folds `x-ratelimit-*` headers (and, optionally, a seeded
//! `/rate_limit` snapshot) into the latest known per-pool quota. It never
//! spends quota itself and never errors to callers: queries on an unknown
//! pool fail open as HEALTHY with a diagnostic log.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use crate::config::RateLimitConfig;
use crate::events::RateLimitEvent;
use crate::quota::{
    PoolQuota, RateLimitPool, RateLimitSnapshot, RateLimitStatus, TokenKind,
};

#[derive(Default)]
struct MonitorState {
    snapshot: RateLimitSnapshot,
    previous_status: HashMap<RateLimitPool, RateLimitStatus>,
    token: Option<TokenKind>,
}

/// Tracks GitHub API quota passively from response headers.
pub struct RateLimitMonitor {
    config: RateLimitConfig,
    state: Mutex<MonitorState>,
}

impl RateLimitMonitor {
    /// Creates a monitor with the given configuration.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            state: Mutex::new(MonitorState::default()),
        }
    }

    /// Creates a monitor with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(RateLimitConfig::default())
    }

    /// Ingests one response's rate-limit headers.
    ///
    /// Zero API cost; call after every request. The update is a no-op when
    /// `track_from_headers` is disabled. Parsing never fails.
    pub fn update_from_headers(&self, headers: &HashMap<String, String>) {
        if !self.config.track_from_headers {
            return;
        }
        let partial = RateLimitSnapshot::from_headers(headers, RateLimitPool::Core);
        self.apply(partial);
    }

    /// Seeds the monitor from a full `/rate_limit` snapshot.
    ///
    /// Used by the client at startup to bootstrap state and verify the
    /// credential before any paid request is made.
    pub fn seed(&self, snapshot: RateLimitSnapshot) {
        self.apply(snapshot);
    }

    fn apply(&self, partial: RateLimitSnapshot) {
        let mut crossings: Vec<RateLimitEvent> = Vec::new();
        {
            let mut state = self.state.lock().expect("monitor lock poisoned");
            state.snapshot.merge(partial);

            if state.token.is_none() {
                if let Some(core) = state.snapshot.core() {
                    state.token = Some(TokenKind::from_limit(core.limit));
                }
            }

            let mut transitions: Vec<(RateLimitPool, PoolQuota, RateLimitStatus)> = Vec::new();
            for (pool, quota) in state.snapshot.pools() {
                let current = quota.status(
                    self.config.healthy_threshold_pct,
                    self.config.warning_threshold_pct,
                );
                let previous = state
                    .previous_status
                    .get(pool)
                    .copied()
                    .unwrap_or(RateLimitStatus::Healthy);
                if current != previous {
                    transitions.push((*pool, quota.clone(), current));
                }
            }
            for (pool, quota, current) in transitions {
                let previous = state
                    .previous_status
                    .insert(pool, current)
                    .unwrap_or(RateLimitStatus::Healthy);
                // Degradation only; improvements stay silent.
                if current > previous {
                    self.log_degradation(&quota, current);
                    crossings.push(RateLimitEvent::ThresholdCrossed {
                        source: self.config.name.clone(),
                        timestamp: Instant::now(),
                        quota,
                        status: current,
                    });
                }
            }

            #[cfg(feature = "metrics")]
            for (pool, quota) in state.snapshot.pools() {
                metrics::gauge!(
                    "ratelimit_remaining",
                    "pool" => pool.as_str()
                )
                .set(quota.remaining as f64);
            }
        }

        // Listeners run outside the lock on owned event data, so a callback
        // that re-enters the monitor cannot deadlock.
        for event in &crossings {
            self.config.event_listeners.emit(event);
        }
    }

    fn log_degradation(&self, quota: &PoolQuota, status: RateLimitStatus) {
        let escalate = status >= RateLimitStatus::Critical
            && quota.remaining_percent() < self.config.critical_threshold_pct;
        if escalate {
            tracing::error!(
                pool = %quota.pool,
                remaining = quota.remaining,
                limit = quota.limit,
                status = %status,
                "rate limit severely degraded"
            );
        } else {
            tracing::warn!(
                pool = %quota.pool,
                remaining = quota.remaining,
                limit = quota.limit,
                status = %status,
                "rate limit degraded"
            );
        }
    }

    /// Latest quota for a pool, if any data has been seen.
    pub fn pool_quota(&self, pool: RateLimitPool) -> Option<PoolQuota> {
        let state = self.state.lock().expect("monitor lock poisoned");
        state.snapshot.get(pool).cloned()
    }

    /// Health status for a pool. Fails open: HEALTHY when no data exists.
    pub fn status(&self, pool: RateLimitPool) -> RateLimitStatus {
        match self.pool_quota(pool) {
            Some(quota) => quota.status(
                self.config.healthy_threshold_pct,
                self.config.warning_threshold_pct,
            ),
            None => RateLimitStatus::Healthy,
        }
    }

    /// Whether `count` requests can be made while keeping the configured
    /// reserve. Fails open with a diagnostic when no data exists.
    pub fn can_make_request(&self, pool: RateLimitPool, count: u32) -> bool {
        match self.pool_quota(pool) {
            Some(quota) => quota.remaining >= count + self.config.min_remaining_buffer,
            None => {
                tracing::debug!(pool = %pool, "no rate limit data, assuming request is allowed");
                true
            }
        }
    }

    /// Requests available after the reserve buffer; 0 without data.
    pub fn requests_available(&self, pool: RateLimitPool) -> u32 {
        self.pool_quota(pool)
            .map(|q| q.remaining.saturating_sub(self.config.min_remaining_buffer))
            .unwrap_or(0)
    }

    /// Seconds until the pool resets; 0 without data or when already past.
    pub fn time_until_reset(&self, pool: RateLimitPool) -> i64 {
        self.pool_quota(pool)
            .map(|q| q.seconds_until_reset())
            .unwrap_or(0)
    }

    /// Credential classification, once any limit has been observed.
    pub fn token_kind(&self) -> Option<TokenKind> {
        self.state.lock().expect("monitor lock poisoned").token
    }

    /// Copy of the full current snapshot.
    pub fn snapshot(&self) -> RateLimitSnapshot {
        self.state
            .lock()
            .expect("monitor lock poisoned")
            .snapshot
            .clone()
    }
}
