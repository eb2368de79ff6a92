//! A rate-limit hit mid-batch delays the stream, boosts the retried
//! job to high priority, and everything still completes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use prmirror_github::GithubError;
use prmirror_pacing::{JobPriority, RequestScheduler};
use prmirror_sync::SyncError;

use crate::support::{fast_pacer, fast_scheduler_config};

#[tokio::test]
async fn rate_limited_job_waits_for_reset_and_runs_first() {
    let retried: Arc<Mutex<Vec<JobPriority>>> = Arc::new(Mutex::new(Vec::new()));
    let retried_sink = Arc::clone(&retried);

    let pacer = fast_pacer();
    let scheduler: Arc<RequestScheduler<usize, SyncError>> = Arc::new(RequestScheduler::new(
        Arc::clone(&pacer),
        fast_scheduler_config()
            .max_concurrent(1)
            .on_job_retried(move |_id, priority, _count| {
                retried_sink.lock().unwrap().push(priority);
            })
            .build(),
    ));
    scheduler.start();

    // The Instant bound is taken first so it can only be earlier than the
    // wall-clock reset the scheduler waits on.
    let reset_instant = Instant::now() + Duration::from_millis(200);
    let reset_at = Utc::now() + chrono::Duration::milliseconds(200);
    let injected = Arc::new(AtomicUsize::new(0));
    let run_log: Arc<Mutex<Vec<(usize, Instant)>>> = Arc::new(Mutex::new(Vec::new()));

    let mut handles = Vec::new();
    for task in 1..=10usize {
        let injected = Arc::clone(&injected);
        let run_log = Arc::clone(&run_log);
        let job = move || -> futures::future::BoxFuture<'static, Result<usize, SyncError>> {
            let injected = Arc::clone(&injected);
            let run_log = Arc::clone(&run_log);
            Box::pin(async move {
                // Task 4's first attempt reports an exhausted quota.
                if task == 4 && injected.fetch_add(1, Ordering::SeqCst) == 0 {
                    return Err(SyncError::Github(GithubError::RateLimited {
                        message: "quota exhausted".into(),
                        reset_at: Some(reset_at),
                    }));
                }
                run_log.lock().unwrap().push((task, Instant::now()));
                Ok(task)
            })
        };
        handles.push(async { scheduler.submit(job, JobPriority::Normal).await });
    }

    let results = futures::future::join_all(handles).await;
    scheduler.shutdown(true, Duration::from_secs(5)).await;

    // All ten tasks eventually complete.
    for result in results {
        result.unwrap();
    }
    let log = run_log.lock().unwrap().clone();
    assert_eq!(log.len(), 10);

    // The retried task re-entered the queue at high priority.
    assert_eq!(retried.lock().unwrap().as_slice(), &[JobPriority::High]);

    // Task 4's successful run happened no earlier than the reset plus the
    // scheduler's pad.
    let task4_ran_at = log.iter().find(|(task, _)| *task == 4).unwrap().1;
    assert!(
        task4_ran_at >= reset_instant + Duration::from_millis(5),
        "task 4 ran {:?} before the padded reset",
        (reset_instant + Duration::from_millis(5)) - task4_ran_at
    );

    // Tasks submitted after the hit were all held behind the forced wait.
    for (task, ran_at) in log.iter().filter(|(task, _)| *task > 4) {
        assert!(
            *ran_at >= reset_instant,
            "task {task} ran before the quota reset"
        );
    }
}
