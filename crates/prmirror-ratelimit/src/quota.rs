//! Quota state for GitHub's rate-limit resource pools.
//!
//! Data arrives from two places: the free `GET /rate_limit` endpoint and the
//! `x-ratelimit-*` headers GitHub attaches to every response. Header parsing
//! never fails; malformed or missing fields fall back to conservative
//! defaults so a bad response can only make the monitor *more* cautious.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, TimeZone, Utc};

/// GitHub rate-limit resource pools.
///
/// Each pool carries its own separate quota. Most REST operations draw from
/// `core`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RateLimitPool {
    #[default]
    Core,
    Search,
    Graphql,
    CodeSearch,
    IntegrationManifest,
    DependencySnapshots,
    CodeScanningUpload,
    ActionsRunnerRegistration,
    Scim,
}

impl RateLimitPool {
    /// The pool name as it appears in the `x-ratelimit-resource` header and
    /// the `/rate_limit` response.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Core => "core",
            Self::Search => "search",
            Self::Graphql => "graphql",
            Self::CodeSearch => "code_search",
            Self::IntegrationManifest => "integration_manifest",
            Self::DependencySnapshots => "dependency_snapshots",
            Self::CodeScanningUpload => "code_scanning_upload",
            Self::ActionsRunnerRegistration => "actions_runner_registration",
            Self::Scim => "scim",
        }
    }

    /// Parses a pool name; `None` for pools we do not track.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "core" => Some(Self::Core),
            "search" => Some(Self::Search),
            "graphql" => Some(Self::Graphql),
            "code_search" => Some(Self::CodeSearch),
            "integration_manifest" => Some(Self::IntegrationManifest),
            "dependency_snapshots" => Some(Self::DependencySnapshots),
            "code_scanning_upload" => Some(Self::CodeScanningUpload),
            "actions_runner_registration" => Some(Self::ActionsRunnerRegistration),
            "scim" => Some(Self::Scim),
            _ => None,
        }
    }

    /// All pools, in the order GitHub documents them.
    pub fn all() -> [Self; 9] {
        [
            Self::Core,
            Self::Search,
            Self::Graphql,
            Self::CodeSearch,
            Self::IntegrationManifest,
            Self::DependencySnapshots,
            Self::CodeScanningUpload,
            Self::ActionsRunnerRegistration,
            Self::Scim,
        ]
    }
}

impl fmt::Display for RateLimitPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rate-limit health, ordered from best to worst so that a degradation is
/// simply `new > old`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RateLimitStatus {
    Healthy,
    Warning,
    Critical,
    Exhausted,
}

impl RateLimitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Warning => "warning",
            Self::Critical => "critical",
            Self::Exhausted => "exhausted",
        }
    }
}

impl fmt::Display for RateLimitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of credential behind the current quota.
///
/// An authenticated PAT gets 5000 requests/hour on the core pool; anonymous
/// callers get 60.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Pat,
    Anonymous,
}

impl TokenKind {
    /// Classifies a credential from the observed core-pool limit.
    pub fn from_limit(limit: u32) -> Self {
        if limit >= 5000 {
            Self::Pat
        } else {
            Self::Anonymous
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Pat)
    }
}

/// Quota state for a single resource pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolQuota {
    pub pool: RateLimitPool,
    /// Maximum requests allowed per window.
    pub limit: u32,
    /// Requests remaining in the current window.
    pub remaining: u32,
    /// Requests used in the current window.
    pub used: u32,
    /// UTC instant at which the window resets.
    pub reset_at: DateTime<Utc>,
}

impl PoolQuota {
    /// Percentage of quota consumed (0.0 to 100.0).
    pub fn usage_percent(&self) -> f64 {
        if self.limit == 0 {
            return 100.0;
        }
        (self.used as f64 / self.limit as f64) * 100.0
    }

    /// Percentage of quota remaining (0.0 to 100.0).
    pub fn remaining_percent(&self) -> f64 {
        if self.limit == 0 {
            return 0.0;
        }
        (self.remaining as f64 / self.limit as f64) * 100.0
    }

    /// Whole seconds until the window resets; 0 once the reset has passed.
    pub fn seconds_until_reset(&self) -> i64 {
        (self.reset_at - Utc::now()).num_seconds().max(0)
    }

    /// Health status against the given thresholds.
    ///
    /// `remaining == 0` is always [`RateLimitStatus::Exhausted`]; any
    /// non-zero remainder below the warning line is
    /// [`RateLimitStatus::Critical`].
    pub fn status(&self, healthy_pct: f64, warning_pct: f64) -> RateLimitStatus {
        if self.remaining == 0 {
            return RateLimitStatus::Exhausted;
        }
        let pct = self.remaining_percent();
        if pct >= healthy_pct {
            RateLimitStatus::Healthy
        } else if pct >= warning_pct {
            RateLimitStatus::Warning
        } else {
            RateLimitStatus::Critical
        }
    }

    /// Parses a quota from response headers.
    ///
    /// The `x-ratelimit-resource` header selects the pool, falling back to
    /// `default_pool` when absent or unknown. Missing or malformed numeric
    /// fields fall back to `limit = 5000`, `remaining = limit`, `used = 0`,
    /// `reset = now`.
    pub fn from_headers(headers: &HashMap<String, String>, default_pool: RateLimitPool) -> Self {
        let pool = headers
            .get("x-ratelimit-resource")
            .and_then(|v| RateLimitPool::parse(v))
            .unwrap_or(default_pool);

        let limit = parse_u32(headers.get("x-ratelimit-limit")).unwrap_or(5000);
        let remaining = parse_u32(headers.get("x-ratelimit-remaining")).unwrap_or(limit);
        let used = parse_u32(headers.get("x-ratelimit-used")).unwrap_or(0);
        let reset_at = parse_u32(headers.get("x-ratelimit-reset"))
            .filter(|ts| *ts > 0)
            .and_then(|ts| Utc.timestamp_opt(ts as i64, 0).single())
            .unwrap_or_else(Utc::now);

        Self {
            pool,
            limit,
            remaining,
            used,
            reset_at,
        }
    }
}

fn parse_u32(value: Option<&String>) -> Option<u32> {
    value.and_then(|v| v.trim().parse::<u32>().ok())
}

/// Point-in-time view of all known pools, accumulated from headers or a
/// `/rate_limit` response.
#[derive(Debug, Clone, Default)]
pub struct RateLimitSnapshot {
    pub timestamp: Option<DateTime<Utc>>,
    pools: HashMap<RateLimitPool, PoolQuota>,
}

impl RateLimitSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a single-pool snapshot from response headers.
    pub fn from_headers(headers: &HashMap<String, String>, default_pool: RateLimitPool) -> Self {
        let quota = PoolQuota::from_headers(headers, default_pool);
        let mut pools = HashMap::new();
        pools.insert(quota.pool, quota);
        Self {
            timestamp: Some(Utc::now()),
            pools,
        }
    }

    /// Inserts or replaces one pool's quota.
    pub fn insert(&mut self, quota: PoolQuota) {
        self.timestamp = Some(Utc::now());
        self.pools.insert(quota.pool, quota);
    }

    /// Merges `other` into this snapshot; pools present in `other` win.
    pub fn merge(&mut self, other: RateLimitSnapshot) {
        self.timestamp = match (self.timestamp, other.timestamp) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        self.pools.extend(other.pools);
    }

    pub fn get(&self, pool: RateLimitPool) -> Option<&PoolQuota> {
        self.pools.get(&pool)
    }

    /// Convenience accessor for the core pool.
    pub fn core(&self) -> Option<&PoolQuota> {
        self.get(RateLimitPool::Core)
    }

    pub fn pools(&self) -> impl Iterator<Item = (&RateLimitPool, &PoolQuota)> {
        self.pools.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }
}
