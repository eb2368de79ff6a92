//! The PR ingestion pipeline.
//!
//! Four layers, each built on the one below:
//!
//! - [`PrIngestionService`]: fetch one PR, classify it against the
//!   lifecycle state machine (open / merged / abandoned / frozen /
//!   unchanged), and upsert it through the store.
//! - [`BulkPrIngestionService`]: discover candidate PR numbers for one
//!   repository via lazy paged listing with early stop, then drive them
//!   through the batch executor and scheduler.
//! - [`MultiRepoOrchestrator`]: sync the tracked repository set
//!   sequentially, converting per-repo errors into repo-level failures so
//!   the run continues.
//! - [`FailureRetryService`]: re-ingest PRs recorded in the sync_failures
//!   table, resolving them or escalating to permanent.
//!
//! The per-PR boundary is strict: only scheduler-classified errors
//! (rate-limit, transport, auth) cross it as `Err`; everything else folds
//! into a [`PrIngestionOutcome`].

pub mod bulk;
pub mod error;
pub mod ingestion;
pub mod orchestrator;
pub mod outcome;
pub mod retry;
pub mod transform;

#[cfg(test)]
pub(crate) mod testing;

pub use bulk::{BulkIngestionConfig, BulkPrIngestionService, StateFilter};
pub use error::SyncError;
pub use ingestion::PrIngestionService;
pub use orchestrator::MultiRepoOrchestrator;
pub use outcome::{
    BulkIngestionResult, MultiRepoSyncResult, PrIngestionOutcome, RepoSyncResult, RetryReport,
};
pub use retry::FailureRetryService;
pub use transform::ParticipantAction;
