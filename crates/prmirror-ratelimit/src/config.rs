//! Configuration for the rate-limit monitor.

use prmirror_core::events::{EventListeners, FnListener};

use crate::events::RateLimitEvent;
use crate::quota::{PoolQuota, RateLimitStatus};

/// Configuration for the rate-limit monitor.
#[derive(Clone)]
pub struct RateLimitConfig {
    /// Remaining % at or above which a pool is HEALTHY.
    pub(crate) healthy_threshold_pct: f64,
    /// Remaining % at or above which a pool is WARNING (below healthy).
    pub(crate) warning_threshold_pct: f64,
    /// Remaining % below which CRITICAL diagnostics escalate to error logs.
    pub(crate) critical_threshold_pct: f64,
    /// Requests held back from `can_make_request` as a safety reserve.
    pub(crate) min_remaining_buffer: u32,
    /// Whether response headers update the monitor at all.
    pub(crate) track_from_headers: bool,
    /// Name of this monitor instance.
    pub(crate) name: String,
    /// Event listeners.
    pub(crate) event_listeners: EventListeners<RateLimitEvent>,
}

impl RateLimitConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> RateLimitConfigBuilder {
        RateLimitConfigBuilder::new()
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        RateLimitConfigBuilder::new().build()
    }
}

/// Builder for rate-limit monitor configuration.
pub struct RateLimitConfigBuilder {
    healthy_threshold_pct: f64,
    warning_threshold_pct: f64,
    critical_threshold_pct: f64,
    min_remaining_buffer: u32,
    track_from_headers: bool,
    name: String,
    event_listeners: EventListeners<RateLimitEvent>,
}

impl RateLimitConfigBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self {
            healthy_threshold_pct: 50.0,
            warning_threshold_pct: 20.0,
            critical_threshold_pct: 5.0,
            min_remaining_buffer: 10,
            track_from_headers: true,
            name: "rate-limit".to_string(),
            event_listeners: EventListeners::new(),
        }
    }

    /// Sets the remaining % at or above which a pool is HEALTHY.
    ///
    /// Default: 50.0
    pub fn healthy_threshold_pct(mut self, pct: f64) -> Self {
        self.healthy_threshold_pct = pct;
        self
    }

    /// Sets the remaining % at or above which a pool is WARNING.
    ///
    /// Default: 20.0
    pub fn warning_threshold_pct(mut self, pct: f64) -> Self {
        self.warning_threshold_pct = pct;
        self
    }

    /// Sets the remaining % below which CRITICAL logging escalates from
    /// warn to error. The status ladder itself is unaffected: any non-zero
    /// remainder below the warning line reports CRITICAL.
    ///
    /// Default: 5.0
    pub fn critical_threshold_pct(mut self, pct: f64) -> Self {
        self.critical_threshold_pct = pct;
        self
    }

    /// Sets the number of requests held in reserve by `can_make_request`.
    ///
    /// Default: 10
    pub fn min_remaining_buffer(mut self, buffer: u32) -> Self {
        self.min_remaining_buffer = buffer;
        self
    }

    /// Enables or disables passive tracking from response headers.
    ///
    /// Default: true
    pub fn track_from_headers(mut self, enabled: bool) -> Self {
        self.track_from_headers = enabled;
        self
    }

    /// Sets the name of this monitor instance.
    ///
    /// Default: "rate-limit"
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Registers a callback fired when a pool's health degrades.
    ///
    /// The callback receives the pool quota and the new (worse) status.
    /// Improvements are silent.
    pub fn on_degraded<F>(mut self, f: F) -> Self
    where
        F: Fn(&PoolQuota, RateLimitStatus) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            let RateLimitEvent::ThresholdCrossed { quota, status, .. } = event;
            f(quota, *status);
        }));
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> RateLimitConfig {
        RateLimitConfig {
            healthy_threshold_pct: self.healthy_threshold_pct,
            warning_threshold_pct: self.warning_threshold_pct,
            critical_threshold_pct: self.critical_threshold_pct,
            min_remaining_buffer: self.min_remaining_buffer,
            track_from_headers: self.track_from_headers,
            name: self.name,
            event_listeners: self.event_listeners,
        }
    }
}

impl Default for RateLimitConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
