//! Discovery stops paginating at the first out-of-range entry.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use prmirror_github::GithubApi;
use prmirror_sync::{BulkIngestionConfig, BulkPrIngestionService, StateFilter};

use crate::support::{stores, summary, sync_scheduler, MockGithubApi};

#[tokio::test]
async fn since_cutoff_stops_pagination_early() {
    let api = Arc::new(MockGithubApi::new());
    let now = Utc::now();
    let cutoff = now - ChronoDuration::days(60);

    // 150 PRs newest-first: 60 created after the cutoff, then 90 older.
    // The listing pages at 100, so entries 101..150 live on page 2.
    let mut summaries = Vec::new();
    for i in 0..150i64 {
        summaries.push(summary(150 - i, "open", now - ChronoDuration::days(i)));
    }
    api.set_summaries(summaries);

    let stores = stores().await;
    let service = BulkPrIngestionService::new(
        Arc::clone(&api) as Arc<dyn GithubApi>,
        stores.repos.clone(),
        stores.prs.clone(),
        sync_scheduler(),
    );

    let config = BulkIngestionConfig {
        since: Some(cutoff),
        state: StateFilter::All,
        ..Default::default()
    };
    let numbers = service
        .discover_prs("octo", "widgets", &config)
        .await
        .unwrap();

    // Days 0..=60 are inside the range; day 61 stops the walk.
    assert_eq!(numbers.len(), 61);
    assert_eq!(numbers.first().copied(), Some(150));
    assert_eq!(numbers.last().copied(), Some(90));

    // The cutoff sits inside page 1; page 2 is never requested.
    assert_eq!(api.list_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unfiltered_discovery_walks_every_page() {
    let api = Arc::new(MockGithubApi::new());
    let now = Utc::now();
    let mut summaries = Vec::new();
    for i in 0..150i64 {
        summaries.push(summary(150 - i, "open", now - ChronoDuration::minutes(i)));
    }
    api.set_summaries(summaries);

    let stores = stores().await;
    let service = BulkPrIngestionService::new(
        Arc::clone(&api) as Arc<dyn GithubApi>,
        stores.repos.clone(),
        stores.prs.clone(),
        sync_scheduler(),
    );

    let numbers = service
        .discover_prs("octo", "widgets", &BulkIngestionConfig::default())
        .await
        .unwrap();

    assert_eq!(numbers.len(), 150);
    // Page 1 (full), page 2 (short); the short page ends the listing.
    assert_eq!(api.list_calls.load(Ordering::SeqCst), 2);
}
