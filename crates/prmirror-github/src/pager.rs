//! Lazy page-at-a-time iteration over the PR list endpoint.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::api::{GithubApi, ListParams};
use crate::error::GithubError;
use crate::models::PrSummary;

/// Lazily walks the PR listing one page at a time.
///
/// Pages are fetched on demand, so a consumer that stops early (discovery
/// hitting its `since` cutoff) never pays for pages it does not read. A
/// failed page fetch does not advance the pager: calling `next()` again
/// retries the same page, which is what discovery's rate-limit retry relies
/// on.
pub struct PullRequestPager {
    api: Arc<dyn GithubApi>,
    owner: String,
    repo: String,
    params: ListParams,
    next_page: u32,
    buffer: VecDeque<PrSummary>,
    done: bool,
    pages_fetched: u32,
}

impl PullRequestPager {
    pub fn new(
        api: Arc<dyn GithubApi>,
        owner: impl Into<String>,
        repo: impl Into<String>,
        params: ListParams,
    ) -> Self {
        Self {
            api,
            owner: owner.into(),
            repo: repo.into(),
            params,
            next_page: 1,
            buffer: VecDeque::new(),
            done: false,
            pages_fetched: 0,
        }
    }

    /// The next list entry, fetching a page when the buffer runs dry.
    /// Returns `None` once the listing is exhausted.
    pub async fn next(&mut self) -> Option<Result<PrSummary, GithubError>> {
        if let Some(item) = self.buffer.pop_front() {
            return Some(Ok(item));
        }
        if self.done {
            return None;
        }

        let page = self.next_page;
        match self
            .api
            .list_pull_requests(&self.owner, &self.repo, &self.params, page)
            .await
        {
            Ok(items) => {
                self.pages_fetched += 1;
                self.next_page += 1;
                if (items.len() as u32) < self.params.per_page {
                    self.done = true;
                }
                tracing::debug!(
                    repo = %format!("{}/{}", self.owner, self.repo),
                    page,
                    items = items.len(),
                    "fetched PR list page"
                );
                self.buffer.extend(items);
                self.buffer.pop_front().map(Ok)
            }
            Err(error) => Some(Err(error)),
        }
    }

    /// Number of pages fetched so far.
    pub fn pages_fetched(&self) -> u32 {
        self.pages_fetched
    }
}
