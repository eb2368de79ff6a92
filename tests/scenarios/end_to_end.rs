//! Full-stack sync through the runtime: mock upstream, real scheduler,
//! pacer, stores, commit batching, and failure recording.

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use prmirror::{Settings, SyncRuntime};
use prmirror_github::{GithubApi, GithubError};
use prmirror_pacing::{PacerConfig, RequestPacer};
use prmirror_ratelimit::RateLimitMonitor;

use crate::support::{full_pr, gh_pr, user, MockGithubApi};

async fn runtime_with(api: Arc<MockGithubApi>, dir: &tempfile::TempDir) -> SyncRuntime {
    let settings = Settings {
        database_url: format!("sqlite://{}", dir.path().join("e2e.db").display()),
        tracked_repos: vec!["octo/widgets".to_string(), "octo/gadgets".to_string()],
        min_request_interval: std::time::Duration::ZERO,
        commit_batch_size: 5,
        ..Settings::default()
    };
    let monitor = Arc::new(RateLimitMonitor::with_defaults());
    let pacer = Arc::new(RequestPacer::new(
        Arc::clone(&monitor),
        PacerConfig::builder()
            .min_request_interval(std::time::Duration::ZERO)
            .build(),
    ));
    let runtime = SyncRuntime::init_with_api(settings, api as Arc<dyn GithubApi>, monitor, pacer)
        .await
        .unwrap();
    runtime.start();
    runtime
}

fn seed_upstream(api: &MockGithubApi) {
    // An open PR, a merged PR, an abandoned PR, and one that 404s.
    api.add_pr(full_pr(gh_pr(1, "open", false)));

    let mut merged = gh_pr(2, "closed", true);
    merged.merged_at = Some(Utc::now() - ChronoDuration::days(1));
    merged.merged_by = Some(user("maintainer"));
    api.add_pr(full_pr(merged));

    api.add_pr(full_pr(gh_pr(3, "closed", false)));

    api.add_pr(full_pr(gh_pr(4, "open", false)));
    api.push_fetch_failure(4, GithubError::NotFound("gone".into()));
    api.push_fetch_failure(4, GithubError::NotFound("gone".into()));
}

#[tokio::test]
async fn multi_repo_sync_and_idempotent_second_pass() {
    let dir = tempfile::tempdir().unwrap();
    let api = Arc::new(MockGithubApi::new());
    seed_upstream(&api);

    let runtime = runtime_with(Arc::clone(&api), &dir).await;
    let orchestrator = runtime.orchestrator();

    let first = orchestrator.sync_all(&runtime.bulk_config(), None).await;

    // Two repos, each discovering the same four upstream PRs.
    assert_eq!(first.repo_results.len(), 2);
    assert_eq!(first.total_discovered, 8);
    assert_eq!(first.total_created, 4); // open + merged, per repo
    assert_eq!(first.total_failed, 2); // the 404 PR, per repo
    assert_eq!(first.total_skipped, 2); // the abandoned PR, per repo
    assert_eq!(first.repos_succeeded(), 0);
    assert_eq!(first.repos_with_failures(), 2);

    // Failures were recorded for later retry, one per repo.
    let retry = runtime.retry_service();
    let stats = retry.failure_stats(None).await.unwrap();
    assert_eq!(stats.pending, 2);

    // Second pass over identical upstream data: everything already stored
    // is skipped unchanged, the abandoned PR stays out, and the 404 PR now
    // resolves (its injected failures are used up).
    let second = orchestrator.sync_all(&runtime.bulk_config(), None).await;
    assert_eq!(second.total_created, 2); // PR 4 finally lands, per repo
    assert_eq!(second.total_updated, 0);
    assert_eq!(second.total_skipped, 6); // 2 unchanged + 1 abandoned, per repo
    assert_eq!(second.total_failed, 0);

    // The retry pass resolves the recorded failures.
    let report = retry.retry_failures(None, None, false).await.unwrap();
    assert_eq!(report.total_pending, 2);
    assert_eq!(report.succeeded, 2);
    let stats = retry.failure_stats(None).await.unwrap();
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.resolved, 2);

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn merged_pr_round_trips_through_the_runtime() {
    let dir = tempfile::tempdir().unwrap();
    let api = Arc::new(MockGithubApi::new());
    let merged_at = Utc::now() - ChronoDuration::hours(6);
    let mut pr = gh_pr(10, "closed", true);
    pr.merged_at = Some(merged_at);
    pr.merged_by = Some(user("maintainer"));
    api.add_pr(full_pr(pr));

    let runtime = runtime_with(Arc::clone(&api), &dir).await;
    let service = runtime.ingestion_service();

    let outcome = service
        .ingest_pr("octo", "widgets", 10, false)
        .await
        .unwrap();
    let stored = outcome.pr().unwrap();
    assert!(stored.is_merged());
    assert_eq!(stored.close_date.unwrap(), merged_at);
    assert_eq!(stored.merged_by.as_deref(), Some("maintainer"));

    runtime.shutdown().await.unwrap();
}
