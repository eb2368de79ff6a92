//! Local relational store for mirrored pull-request activity.
//!
//! Three tables and nothing else: `repositories`, `pull_requests`, and
//! `sync_failures` (see [`schema`]). All access goes through a [`Session`],
//! which keeps one open SQLite transaction behind an async mutex. That
//! mutex is the session-level write lock: every store write flushes a
//! statement onto the open transaction, and the [`CommitManager`] decides
//! when the transaction boundary actually lands. On a crash, everything
//! since the last commit rolls back; nothing older is lost.

pub mod commit;
pub mod error;
pub mod models;
pub mod pull_request;
pub mod repository;
pub mod schema;
pub mod session;
pub mod sync_failure;

pub use commit::CommitManager;
pub use error::StoreError;
pub use models::{
    CommitEntry, PrImmutable, PrMergeData, PrState, PrSyncData, PullRequest, Repository,
    SyncFailure, SyncFailureStatus,
};
pub use pull_request::PullRequestStore;
pub use repository::RepositoryStore;
pub use schema::{connect, connect_memory, init_schema};
pub use session::Session;
pub use sync_failure::{FailureStats, SyncFailureStore};
