//! Crash-safe batch commits. Full batches survive an interrupt; the
//! trailing partial batch is lost.

use std::sync::Arc;

use prmirror_github::GithubApi;
use prmirror_store::{
    connect, init_schema, CommitManager, PullRequestStore, RepositoryStore, Session,
};
use prmirror_sync::PrIngestionService;

use crate::support::{full_pr, gh_pr, MockGithubApi};

#[tokio::test]
async fn interrupt_after_twelve_ingests_keeps_ten() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mirror.db");
    let url = format!("sqlite://{}", path.display());

    let api = Arc::new(MockGithubApi::new());
    for number in 1..=12 {
        api.add_pr(full_pr(gh_pr(number, "open", false)));
    }

    {
        let pool = connect(&url).await.unwrap();
        init_schema(&pool).await.unwrap();
        let session = Arc::new(Session::begin(pool).await.unwrap());
        let repos = RepositoryStore::new(Arc::clone(&session));
        let prs = PullRequestStore::new(
            Arc::clone(&session),
            std::time::Duration::from_secs(14 * 24 * 3600),
        );
        let commits = CommitManager::new(Arc::clone(&session), 5);
        let service = PrIngestionService::new(
            Arc::clone(&api) as Arc<dyn GithubApi>,
            repos,
            prs,
        );

        for number in 1..=12 {
            let outcome = service
                .ingest_pr("octo", "widgets", number, false)
                .await
                .unwrap();
            assert!(outcome.wrote(), "PR {number} should have been written");
            commits.record_success().await.unwrap();
        }

        assert_eq!(commits.total_committed(), 10);
        assert_eq!(commits.uncommitted_count(), 2);
        // Interrupt: no finalize. The session drops with batch three open.
    }

    let pool = connect(&url).await.unwrap();
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pull_requests")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 10);

    // The repository row landed inside the first committed batch.
    let repos: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM repositories")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(repos, 1);
}

#[tokio::test]
async fn finalize_lands_the_trailing_partial_batch() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("finalized.db");
    let url = format!("sqlite://{}", path.display());

    let api = Arc::new(MockGithubApi::new());
    for number in 1..=7 {
        api.add_pr(full_pr(gh_pr(number, "open", false)));
    }

    {
        let pool = connect(&url).await.unwrap();
        init_schema(&pool).await.unwrap();
        let session = Arc::new(Session::begin(pool).await.unwrap());
        let repos = RepositoryStore::new(Arc::clone(&session));
        let prs = PullRequestStore::new(
            Arc::clone(&session),
            std::time::Duration::from_secs(14 * 24 * 3600),
        );
        let commits = CommitManager::new(Arc::clone(&session), 5);
        let service = PrIngestionService::new(
            Arc::clone(&api) as Arc<dyn GithubApi>,
            repos,
            prs,
        );

        for number in 1..=7 {
            service
                .ingest_pr("octo", "widgets", number, false)
                .await
                .unwrap();
            commits.record_success().await.unwrap();
        }
        assert_eq!(commits.finalize().await.unwrap(), 2);
    }

    let pool = connect(&url).await.unwrap();
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pull_requests")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 7);
}
