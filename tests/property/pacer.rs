//! Pacer invariants: delays are never negative, never exceed the
//! configured ceiling, shrink as quota grows, and grow with time until
//! reset.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use prmirror_pacing::{PacerConfig, RequestPacer};
use prmirror_ratelimit::{PoolQuota, RateLimitMonitor, RateLimitPool, RateLimitSnapshot};
use proptest::prelude::*;

fn pacer_for(limit: u32, remaining: u32, reset_in_secs: i64, max_interval: Duration) -> RequestPacer {
    let monitor = RateLimitMonitor::with_defaults();
    let mut snapshot = RateLimitSnapshot::new();
    snapshot.insert(PoolQuota {
        pool: RateLimitPool::Core,
        limit,
        remaining: remaining.min(limit),
        used: limit.saturating_sub(remaining),
        reset_at: Utc::now() + chrono::Duration::seconds(reset_in_secs),
    });
    monitor.seed(snapshot);
    RequestPacer::new(
        Arc::new(monitor),
        PacerConfig::builder()
            .min_request_interval(Duration::ZERO)
            .max_request_interval(max_interval)
            .reserve_buffer_pct(10.0)
            .burst_allowance(5)
            .build(),
    )
}

// Comparisons tolerate the sub-second drift between constructing the
// quota and evaluating the formula.
const SLACK: Duration = Duration::from_millis(50);

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// The recommended delay never exceeds the configured ceiling
    /// (non-negativity comes from the Duration type itself).
    #[test]
    fn delay_is_bounded(
        limit in 1u32..=10_000,
        remaining in 0u32..=10_000,
        reset_in in -100i64..=7200,
    ) {
        let max = Duration::from_secs(300);
        let pacer = pacer_for(limit, remaining, reset_in, max);
        let delay = pacer.recommended_delay();
        prop_assert!(delay <= max + SLACK, "delay {delay:?} above ceiling");
    }

    /// With everything else fixed, more remaining quota never increases
    /// the delay.
    #[test]
    fn delay_is_monotone_in_remaining(
        limit in 100u32..=10_000,
        remaining in 0u32..=9_000,
        extra in 1u32..=1_000,
        reset_in in 1i64..=7200,
    ) {
        let max = Duration::from_secs(600);
        let scarcer = pacer_for(limit, remaining.min(limit), reset_in, max).recommended_delay();
        let richer = pacer_for(limit, (remaining + extra).min(limit), reset_in, max).recommended_delay();
        prop_assert!(
            richer <= scarcer + SLACK,
            "more quota increased the delay: {richer:?} > {scarcer:?}"
        );
    }

    /// With everything else fixed, a later reset never decreases the
    /// delay.
    #[test]
    fn delay_is_monotone_in_reset_distance(
        limit in 100u32..=10_000,
        remaining in 1u32..=10_000,
        reset_in in 1i64..=3600,
        extra in 1i64..=3600,
    ) {
        let max = Duration::from_secs(7200);
        let near = pacer_for(limit, remaining, reset_in, max).recommended_delay();
        let far = pacer_for(limit, remaining, reset_in + extra, max).recommended_delay();
        prop_assert!(
            far + SLACK >= near,
            "later reset decreased the delay: {far:?} < {near:?}"
        );
    }

    /// A reset in the past always yields the floor interval.
    #[test]
    fn past_reset_yields_floor(
        limit in 1u32..=10_000,
        remaining in 0u32..=10_000,
        past in 1i64..=10_000,
    ) {
        let pacer = pacer_for(limit, remaining, -past, Duration::from_secs(60));
        prop_assert_eq!(pacer.recommended_delay(), Duration::ZERO);
    }
}
