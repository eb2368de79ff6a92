//! prmirror: mirror GitHub pull-request activity into a local SQLite
//! store under a strict rate-limit budget.
//!
//! The workspace splits the ingestion core into focused crates; this
//! umbrella re-exports them and adds the glue an application needs:
//! env-driven [`Settings`] and the [`SyncRuntime`] that wires monitor,
//! pacer, scheduler, client, and stores together.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use prmirror::{Settings, SyncRuntime};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let runtime = SyncRuntime::init(Settings::from_env()?).await?;
//! runtime.start();
//!
//! let result = runtime
//!     .orchestrator()
//!     .sync_all(&runtime.bulk_config(), None)
//!     .await;
//! println!(
//!     "synced {} repos: {} created, {} updated, {} failed",
//!     result.repo_results.len(),
//!     result.total_created,
//!     result.total_updated,
//!     result.total_failed,
//! );
//!
//! runtime.shutdown().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Crate map
//!
//! | Crate | What lives there |
//! |---|---|
//! | `prmirror-core` | Event listeners, error classification. |
//! | `prmirror-ratelimit` | Quota snapshots, health status, passive monitor. |
//! | `prmirror-pacing` | Request pacer, priority scheduler, batch executor, progress. |
//! | `prmirror-github` | API contract, payload models, REST client, pager. |
//! | `prmirror-store` | SQLite schema, session, entity stores, commit manager. |
//! | `prmirror-sync` | Per-PR / bulk / multi-repo ingestion, failure retry. |

pub mod runtime;
pub mod settings;

pub use runtime::SyncRuntime;
pub use settings::Settings;

pub use prmirror_core as core;
pub use prmirror_github as github;
pub use prmirror_pacing as pacing;
pub use prmirror_ratelimit as ratelimit;
pub use prmirror_store as store;
pub use prmirror_sync as sync;

pub use prmirror_sync::{
    BulkIngestionConfig, BulkIngestionResult, MultiRepoSyncResult, PrIngestionOutcome,
    RetryReport, StateFilter,
};
