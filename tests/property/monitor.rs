//! Monitor invariants: threshold callbacks fire on degradations only, and
//! header parsing never fails.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use prmirror_ratelimit::{RateLimitConfig, RateLimitMonitor, RateLimitStatus};
use proptest::prelude::*;

fn headers_for(limit: u32, remaining: u32) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    headers.insert("x-ratelimit-limit".to_string(), limit.to_string());
    headers.insert("x-ratelimit-remaining".to_string(), remaining.to_string());
    headers
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// For any sequence of quota observations, every callback invocation
    /// corresponds to a strictly worse status than the previous one for
    /// that pool.
    #[test]
    fn callbacks_fire_on_degradation_only(
        observations in proptest::collection::vec(0u32..=100, 1..30),
    ) {
        let transitions: Arc<Mutex<Vec<RateLimitStatus>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&transitions);
        let monitor = RateLimitMonitor::new(
            RateLimitConfig::builder()
                .on_degraded(move |_quota, status| {
                    sink.lock().unwrap().push(status);
                })
                .build(),
        );

        // Replay the observation sequence and track the expected status by
        // the same ladder the monitor uses.
        let mut expected = RateLimitStatus::Healthy;
        let mut expected_degradations = Vec::new();
        for remaining in &observations {
            let status = if *remaining == 0 {
                RateLimitStatus::Exhausted
            } else if *remaining >= 50 {
                RateLimitStatus::Healthy
            } else if *remaining >= 20 {
                RateLimitStatus::Warning
            } else {
                RateLimitStatus::Critical
            };
            if status > expected {
                expected_degradations.push(status);
            }
            expected = status;

            monitor.update_from_headers(&headers_for(100, *remaining));
        }

        let seen = transitions.lock().unwrap().clone();
        prop_assert_eq!(seen, expected_degradations);
    }

    /// Header parsing accepts arbitrary garbage without panicking and
    /// without producing an unusable snapshot.
    #[test]
    fn header_parsing_never_fails(
        limit in ".{0,12}",
        remaining in ".{0,12}",
        reset in ".{0,12}",
        resource in "[a-z_]{0,24}",
    ) {
        let monitor = RateLimitMonitor::with_defaults();
        let mut headers = HashMap::new();
        headers.insert("x-ratelimit-limit".to_string(), limit);
        headers.insert("x-ratelimit-remaining".to_string(), remaining);
        headers.insert("x-ratelimit-reset".to_string(), reset);
        headers.insert("x-ratelimit-resource".to_string(), resource);

        monitor.update_from_headers(&headers);
        // Whatever came in, the monitor stays queryable.
        let _ = monitor.status(Default::default());
        let _ = monitor.can_make_request(Default::default(), 1);
    }
}

#[test]
fn improvement_after_recovery_stays_silent() {
    let fired = Arc::new(AtomicUsize::new(0));
    let sink = Arc::clone(&fired);
    let monitor = RateLimitMonitor::new(
        RateLimitConfig::builder()
            .on_degraded(move |_quota, _status| {
                sink.fetch_add(1, Ordering::SeqCst);
            })
            .build(),
    );

    monitor.update_from_headers(&headers_for(100, 10)); // healthy -> critical
    monitor.update_from_headers(&headers_for(100, 90)); // recovery, silent
    monitor.update_from_headers(&headers_for(100, 60)); // still healthy, silent
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}
