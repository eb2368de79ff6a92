//! Lifecycle behavior through the public ingestion service: idempotent
//! re-ingest, frozen immutability, abandoned exclusion.

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use prmirror_github::GithubApi;
use prmirror_store::PrState;
use prmirror_sync::PrIngestionService;

use crate::support::{full_pr, gh_pr, stores, user, MockGithubApi, TestStores};

async fn service(api: Arc<MockGithubApi>) -> (PrIngestionService, TestStores) {
    let stores = stores().await;
    let service = PrIngestionService::new(
        api as Arc<dyn GithubApi>,
        stores.repos.clone(),
        stores.prs.clone(),
    );
    (service, stores)
}

#[tokio::test]
async fn re_ingesting_identical_data_is_idempotent() {
    let api = Arc::new(MockGithubApi::new());
    api.add_pr(full_pr(gh_pr(4663, "open", false)));
    let (service, stores) = service(Arc::clone(&api)).await;

    let first = service
        .ingest_pr("octo", "widgets", 4663, false)
        .await
        .unwrap();
    assert_eq!(first.action(), "created");
    let created = first.pr().unwrap().clone();

    let second = service
        .ingest_pr("octo", "widgets", 4663, false)
        .await
        .unwrap();
    assert_eq!(second.action(), "skipped (unchanged)");

    // The stored row is byte-for-byte what the first pass wrote.
    let stored = stores.prs.get_by_id(created.id).await.unwrap().unwrap();
    assert_eq!(stored.updated_at, created.updated_at);
    assert_eq!(stored.last_update_date, created.last_update_date);
    assert_eq!(stored.title, created.title);
}

#[tokio::test]
async fn frozen_pr_ignores_upstream_edits() {
    let api = Arc::new(MockGithubApi::new());
    let mut pr = gh_pr(4646, "closed", true);
    pr.title = "Old Title".to_string();
    pr.merged_at = Some(Utc::now() - ChronoDuration::days(30));
    pr.merged_by = Some(user("maintainer"));
    api.add_pr(full_pr(pr.clone()));
    let (service, stores) = service(Arc::clone(&api)).await;

    let first = service
        .ingest_pr("octo", "widgets", 4646, false)
        .await
        .unwrap();
    assert_eq!(first.action(), "created");

    // Upstream edits the title well past the 14-day grace period.
    pr.title = "Shiny New Title".to_string();
    pr.updated_at = Utc::now();
    api.update_pr(full_pr(pr));

    let second = service
        .ingest_pr("octo", "widgets", 4646, false)
        .await
        .unwrap();
    assert_eq!(second.action(), "skipped (frozen)");

    let repo = stores
        .repos
        .get_by_full_name("octo/widgets")
        .await
        .unwrap()
        .unwrap();
    let stored = stores
        .prs
        .get_by_number(repo.id, 4646)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.title, "Old Title");
    assert_eq!(stored.state, PrState::Merged);
}

#[tokio::test]
async fn abandoned_pr_is_never_written() {
    let api = Arc::new(MockGithubApi::new());
    api.add_pr(full_pr(gh_pr(103, "closed", false)));
    let (service, stores) = service(Arc::clone(&api)).await;

    let outcome = service
        .ingest_pr("octo", "widgets", 103, false)
        .await
        .unwrap();
    assert_eq!(outcome.action(), "skipped (abandoned)");
    assert!(outcome.pr().is_none());

    let repo = stores
        .repos
        .get_by_full_name("octo/widgets")
        .await
        .unwrap()
        .unwrap();
    assert!(stores
        .prs
        .get_by_number(repo.id, 103)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn prior_open_row_survives_abandonment_unchanged() {
    let api = Arc::new(MockGithubApi::new());
    let mut pr = gh_pr(103, "open", false);
    pr.title = "Open once".to_string();
    api.add_pr(full_pr(pr.clone()));
    let (service, stores) = service(Arc::clone(&api)).await;

    service
        .ingest_pr("octo", "widgets", 103, false)
        .await
        .unwrap();

    pr.state = "closed".to_string();
    pr.updated_at = Utc::now();
    api.update_pr(full_pr(pr));

    let outcome = service
        .ingest_pr("octo", "widgets", 103, false)
        .await
        .unwrap();
    assert_eq!(outcome.action(), "skipped (abandoned)");
    let returned = outcome.pr().unwrap();
    assert_eq!(returned.title, "Open once");
    assert_eq!(returned.state, PrState::Open);

    let repo = stores
        .repos
        .get_by_full_name("octo/widgets")
        .await
        .unwrap()
        .unwrap();
    let stored = stores
        .prs
        .get_by_number(repo.id, 103)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.state, PrState::Open);
}
