//! Scheduler invariants: selection order and the concurrency cap.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use prmirror_pacing::{JobPriority, RequestScheduler};
use prmirror_sync::SyncError;
use proptest::prelude::*;
use tokio::runtime::Runtime;

fn priority_from_index(index: u8) -> JobPriority {
    match index % 3 {
        0 => JobPriority::High,
        1 => JobPriority::Normal,
        _ => JobPriority::Low,
    }
}

fn fast_scheduler(max_concurrent: usize) -> Arc<RequestScheduler<usize, SyncError>> {
    use prmirror_pacing::{PacerConfig, RequestPacer, SchedulerConfig};
    use prmirror_ratelimit::RateLimitMonitor;

    let pacer = Arc::new(RequestPacer::new(
        Arc::new(RateLimitMonitor::with_defaults()),
        PacerConfig::builder()
            .min_request_interval(Duration::ZERO)
            .build(),
    ));
    Arc::new(RequestScheduler::new(
        pacer,
        SchedulerConfig::builder()
            .idle_poll(Duration::from_millis(1))
            .max_concurrent(max_concurrent)
            .build(),
    ))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Among jobs enqueued before the scheduler starts, the execution
    /// order is exactly (priority, enqueue order).
    #[test]
    fn selection_follows_priority_then_fifo(
        priorities in proptest::collection::vec(0u8..3, 1..20),
    ) {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let scheduler = fast_scheduler(1);
            let order: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));

            let jobs: Vec<(usize, JobPriority)> = priorities
                .iter()
                .enumerate()
                .map(|(index, p)| (index, priority_from_index(*p)))
                .collect();

            for (index, priority) in &jobs {
                let order = Arc::clone(&order);
                let index = *index;
                scheduler.enqueue(
                    move || {
                        let order = Arc::clone(&order);
                        Box::pin(async move {
                            order.lock().unwrap().push(index);
                            Ok(index)
                        })
                    },
                    *priority,
                );
            }

            scheduler.start();
            let deadline = std::time::Instant::now() + Duration::from_secs(5);
            while scheduler.stats().total_completed < jobs.len() as u64 {
                prop_assert!(std::time::Instant::now() < deadline, "scheduler stalled");
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
            scheduler.shutdown(true, Duration::from_secs(1)).await;

            // Expected order: stable sort of indexes by priority.
            let mut expected: Vec<usize> = (0..jobs.len()).collect();
            expected.sort_by_key(|i| jobs[*i].1);

            let seen = order.lock().unwrap().clone();
            prop_assert_eq!(seen, expected);
            Ok(())
        })?;
    }

    /// The number of in-flight jobs never exceeds the configured cap.
    #[test]
    fn in_flight_never_exceeds_the_cap(
        max_concurrent in 1usize..=6,
        job_count in 1usize..=30,
    ) {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let scheduler = fast_scheduler(max_concurrent);
            scheduler.start();

            let current = Arc::new(AtomicUsize::new(0));
            let peak = Arc::new(AtomicUsize::new(0));

            let mut handles = Vec::new();
            for index in 0..job_count {
                let current = Arc::clone(&current);
                let peak = Arc::clone(&peak);
                handles.push(scheduler.submit(
                    move || {
                        let current = Arc::clone(&current);
                        let peak = Arc::clone(&peak);
                        Box::pin(async move {
                            let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                            peak.fetch_max(now, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(2)).await;
                            current.fetch_sub(1, Ordering::SeqCst);
                            Ok(index)
                        })
                    },
                    JobPriority::Normal,
                ));
            }
            for handle in futures::future::join_all(handles).await {
                handle.unwrap();
            }
            scheduler.shutdown(true, Duration::from_secs(1)).await;

            prop_assert!(
                peak.load(Ordering::SeqCst) <= max_concurrent,
                "peak {} exceeded cap {}",
                peak.load(Ordering::SeqCst),
                max_concurrent
            );
            prop_assert_eq!(current.load(Ordering::SeqCst), 0);
            Ok(())
        })?;
    }
}
