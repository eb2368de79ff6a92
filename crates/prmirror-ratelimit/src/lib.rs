//! Rate-limit tracking for the GitHub API.
//!
//! GitHub attaches `x-ratelimit-*` headers to every response, so quota state
//! can be tracked passively at zero API cost. This crate models the per-pool
//! quota ([`PoolQuota`], [`RateLimitSnapshot`]) and provides the
//! [`RateLimitMonitor`], which folds headers into the latest known state,
//! classifies health, and notifies observers when a pool degrades.
//!
//! # Example
//!
//! ```rust
//! use std::collections::HashMap;
//! use prmirror_ratelimit::{RateLimitConfig, RateLimitMonitor, RateLimitStatus};
//!
//! let monitor = RateLimitMonitor::new(
//!     RateLimitConfig::builder()
//!         .on_degraded(|quota, status| {
//!             eprintln!("pool {} degraded to {:?} ({} left)", quota.pool, status, quota.remaining);
//!         })
//!         .build(),
//! );
//!
//! let mut headers = HashMap::new();
//! headers.insert("x-ratelimit-limit".to_string(), "5000".to_string());
//! headers.insert("x-ratelimit-remaining".to_string(), "4200".to_string());
//! monitor.update_from_headers(&headers);
//!
//! assert_eq!(monitor.status(Default::default()), RateLimitStatus::Healthy);
//! ```

pub mod config;
pub mod events;
pub mod monitor;
pub mod quota;

pub use config::{RateLimitConfig, RateLimitConfigBuilder};
pub use events::RateLimitEvent;
pub use monitor::RateLimitMonitor;
pub use quota::{PoolQuota, RateLimitPool, RateLimitSnapshot, RateLimitStatus, TokenKind};
