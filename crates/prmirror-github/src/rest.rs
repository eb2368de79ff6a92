//! reqwest-backed implementation of the GitHub API contract.
//!
//! Every call runs the same discipline: consult the pacer, fire the HTTP
//! request, then hand the `x-ratelimit-*` headers to the monitor before the
//! response is interpreted. Non-2xx statuses map onto the [`GithubError`]
//! taxonomy; undecodable entries in list payloads are dropped with a warning
//! instead of failing the whole page.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use prmirror_pacing::RequestPacer;
use prmirror_ratelimit::{
    PoolQuota, RateLimitMonitor, RateLimitPool, RateLimitSnapshot, TokenKind,
};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::api::{GithubApi, ListParams};
use crate::error::GithubError;
use crate::models::{
    GithubCommit, GithubFile, GithubPullRequest, GithubReview, PrSummary,
};

const DEFAULT_BASE_URL: &str = "https://api.github.com";
const DEFAULT_USER_AGENT: &str = "prmirror/0.1";
const PAGE_SIZE: u32 = 100;

/// GitHub REST client with built-in pacing and rate-limit tracking.
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
    monitor: Arc<RateLimitMonitor>,
    pacer: Option<Arc<RequestPacer>>,
}

impl RestClient {
    /// Creates a new client builder.
    pub fn builder() -> RestClientBuilder {
        RestClientBuilder::new()
    }

    /// The monitor this client reports headers to.
    pub fn monitor(&self) -> &Arc<RateLimitMonitor> {
        &self.monitor
    }

    /// Bootstraps the monitor from the free `/rate_limit` endpoint and logs
    /// the credential verdict. Call once at startup.
    pub async fn prime_monitor(&self) -> Result<(), GithubError> {
        let snapshot = self.fetch_rate_limit().await?;
        self.monitor.seed(snapshot);
        match self.monitor.token_kind() {
            Some(TokenKind::Pat) => {
                tracing::info!("github credential verified: authenticated PAT");
            }
            Some(TokenKind::Anonymous) => {
                tracing::warn!(
                    "github credential appears unauthenticated (60 requests/hour); \
                     set a personal access token for 5000/hour"
                );
            }
            None => {}
        }
        Ok(())
    }

    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value, GithubError> {
        if let Some(pacer) = &self.pacer {
            let delay = pacer.recommended_delay();
            if delay > Duration::ZERO {
                tracing::debug!(delay_ms = delay.as_millis() as u64, path, "pacing request");
                tokio::time::sleep(delay).await;
            }
            pacer.on_request_start();
        }

        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| GithubError::Transport(format!("request to {path} failed: {e}")))?;

        let status = response.status().as_u16();
        let headers = header_map(response.headers());
        match &self.pacer {
            Some(pacer) => pacer.on_request_complete(Some(&headers)),
            None => self.monitor.update_from_headers(&headers),
        }

        if !(200..300).contains(&status) {
            return Err(classify_status(status, &headers, path));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| GithubError::Validation(format!("undecodable body from {path}: {e}")))
    }

    /// Fetches every page of a list endpoint, dropping entries that fail to
    /// decode.
    async fn paged_items<T: DeserializeOwned>(
        &self,
        path: &str,
        what: &str,
    ) -> Result<Vec<T>, GithubError> {
        let mut out = Vec::new();
        let mut page = 1u32;
        loop {
            let value = self
                .get_json(
                    path,
                    &[
                        ("per_page", PAGE_SIZE.to_string()),
                        ("page", page.to_string()),
                    ],
                )
                .await?;
            let Value::Array(items) = value else {
                return Err(GithubError::Validation(format!(
                    "expected an array of {what} from {path}"
                )));
            };
            let count = items.len();
            out.extend(decode_entries(items, what));
            if (count as u32) < PAGE_SIZE {
                break;
            }
            page += 1;
        }
        Ok(out)
    }
}

#[async_trait]
impl GithubApi for RestClient {
    async fn list_pull_requests(
        &self,
        owner: &str,
        repo: &str,
        params: &ListParams,
        page: u32,
    ) -> Result<Vec<PrSummary>, GithubError> {
        let path = format!("/repos/{owner}/{repo}/pulls");
        let value = self
            .get_json(
                &path,
                &[
                    ("state", params.state.as_str().to_string()),
                    ("sort", params.sort.as_str().to_string()),
                    ("direction", params.direction.as_str().to_string()),
                    ("per_page", params.per_page.to_string()),
                    ("page", page.to_string()),
                ],
            )
            .await?;
        let Value::Array(items) = value else {
            return Err(GithubError::Validation(format!(
                "expected an array of pull requests from {path}"
            )));
        };
        Ok(decode_entries(items, "pull request list entry"))
    }

    async fn get_pull_request(
        &self,
        owner: &str,
        repo: &str,
        number: i64,
    ) -> Result<GithubPullRequest, GithubError> {
        let path = format!("/repos/{owner}/{repo}/pulls/{number}");
        let value = self.get_json(&path, &[]).await?;
        serde_json::from_value(value)
            .map_err(|e| GithubError::Validation(format!("pull request #{number}: {e}")))
    }

    async fn list_files(
        &self,
        owner: &str,
        repo: &str,
        number: i64,
    ) -> Result<Vec<GithubFile>, GithubError> {
        self.paged_items(&format!("/repos/{owner}/{repo}/pulls/{number}/files"), "file")
            .await
    }

    async fn list_commits(
        &self,
        owner: &str,
        repo: &str,
        number: i64,
    ) -> Result<Vec<GithubCommit>, GithubError> {
        self.paged_items(
            &format!("/repos/{owner}/{repo}/pulls/{number}/commits"),
            "commit",
        )
        .await
    }

    async fn list_reviews(
        &self,
        owner: &str,
        repo: &str,
        number: i64,
    ) -> Result<Vec<GithubReview>, GithubError> {
        self.paged_items(
            &format!("/repos/{owner}/{repo}/pulls/{number}/reviews"),
            "review",
        )
        .await
    }

    async fn fetch_rate_limit(&self) -> Result<RateLimitSnapshot, GithubError> {
        let value = self.get_json("/rate_limit", &[]).await?;
        Ok(snapshot_from_value(&value))
    }
}

/// Builder for [`RestClient`].
pub struct RestClientBuilder {
    token: Option<String>,
    user_agent: String,
    base_url: String,
    timeout: Duration,
    monitor: Option<Arc<RateLimitMonitor>>,
    pacer: Option<Arc<RequestPacer>>,
}

impl RestClientBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self {
            token: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
            monitor: None,
            pacer: None,
        }
    }

    /// Sets the bearer token. Without one, requests run anonymously at 60
    /// requests/hour.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        if !token.is_empty() {
            self.token = Some(token);
        }
        self
    }

    /// Sets the User-Agent header (GitHub requires one).
    ///
    /// Default: "prmirror/0.1"
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Overrides the API base URL (GitHub Enterprise, local test servers).
    ///
    /// Default: "https://api.github.com"
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        self.base_url = base_url;
        self
    }

    /// Sets the per-request timeout.
    ///
    /// Default: 30s
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Attaches a monitor for header tracking. Ignored when a pacer is also
    /// attached; the pacer's monitor wins so there is one source of truth.
    pub fn monitor(mut self, monitor: Arc<RateLimitMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Attaches a pacer consulted before every request.
    pub fn pacer(mut self, pacer: Arc<RequestPacer>) -> Self {
        self.pacer = Some(pacer);
        self
    }

    /// Builds the client.
    pub fn build(self) -> Result<RestClient, GithubError> {
        use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert(
            USER_AGENT,
            self.user_agent.parse::<HeaderValue>().map_err(|_| {
                GithubError::Validation("user agent contains invalid header characters".into())
            })?,
        );
        if let Some(token) = &self.token {
            let mut value = format!("Bearer {token}")
                .parse::<HeaderValue>()
                .map_err(|_| {
                    GithubError::Auth("token contains invalid header characters".into())
                })?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(self.timeout)
            .build()
            .map_err(|e| GithubError::Transport(format!("client construction failed: {e}")))?;

        let monitor = match (&self.pacer, self.monitor) {
            (Some(pacer), _) => Arc::clone(pacer.monitor()),
            (None, Some(monitor)) => monitor,
            (None, None) => Arc::new(RateLimitMonitor::with_defaults()),
        };

        tracing::debug!(
            base_url = %self.base_url,
            authenticated = self.token.is_some(),
            "github client ready"
        );
        Ok(RestClient {
            http,
            base_url: self.base_url,
            monitor,
            pacer: self.pacer,
        })
    }
}

impl Default for RestClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn header_map(headers: &reqwest::header::HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect()
}

fn decode_entries<T: DeserializeOwned>(items: Vec<Value>, what: &str) -> Vec<T> {
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        match serde_json::from_value::<T>(item) {
            Ok(entry) => out.push(entry),
            Err(error) => {
                tracing::warn!(what, %error, "skipping undecodable list entry");
            }
        }
    }
    out
}

/// Maps a non-2xx response onto the error taxonomy.
fn classify_status(
    status: u16,
    headers: &HashMap<String, String>,
    context: &str,
) -> GithubError {
    match status {
        401 => GithubError::Auth(format!("credential rejected (401) for {context}")),
        403 => {
            let exhausted = headers
                .get("x-ratelimit-remaining")
                .map(|v| v.trim() == "0")
                .unwrap_or(false);
            if exhausted {
                GithubError::RateLimited {
                    message: format!("quota exhausted on {context}"),
                    reset_at: headers
                        .get("x-ratelimit-reset")
                        .and_then(|v| v.trim().parse::<i64>().ok())
                        .and_then(reset_instant),
                }
            } else {
                GithubError::Transport(format!("access forbidden (403) for {context}"))
            }
        }
        404 => GithubError::NotFound(context.to_string()),
        other => GithubError::Transport(format!("unexpected status {other} for {context}")),
    }
}

fn reset_instant(ts: i64) -> Option<DateTime<Utc>> {
    if ts <= 0 {
        return None;
    }
    Utc.timestamp_opt(ts, 0).single()
}

/// Parses a `/rate_limit` response body into a snapshot.
fn snapshot_from_value(value: &Value) -> RateLimitSnapshot {
    let mut snapshot = RateLimitSnapshot::new();
    let Some(resources) = value.get("resources").and_then(Value::as_object) else {
        return snapshot;
    };
    for pool in RateLimitPool::all() {
        let Some(entry) = resources.get(pool.as_str()) else {
            continue;
        };
        let limit = entry.get("limit").and_then(Value::as_u64).unwrap_or(0) as u32;
        let remaining = entry.get("remaining").and_then(Value::as_u64).unwrap_or(0) as u32;
        let used = entry.get("used").and_then(Value::as_u64).unwrap_or(0) as u32;
        let reset_at = entry
            .get("reset")
            .and_then(Value::as_i64)
            .and_then(reset_instant)
            .unwrap_or_else(Utc::now);
        snapshot.insert(PoolQuota {
            pool,
            limit,
            remaining,
            used,
            reset_at,
        });
    }
    snapshot
}
