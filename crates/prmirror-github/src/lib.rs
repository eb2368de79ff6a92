//! GitHub API surface consumed by the ingestion pipeline.
//!
//! The pipeline never speaks HTTP directly; it talks to the object-safe
//! [`GithubApi`] trait. The [`RestClient`] implementation wires the trait to
//! the real REST API and, before every call, consults the request pacer and
//! feeds rate-limit headers back to the monitor afterwards, so callers get
//! pacing for free.
//!
//! Upstream failures map onto the [`GithubError`] taxonomy, whose
//! [`ClassifyError`](prmirror_core::ClassifyError) impl tells the scheduler
//! how to react: 401 is fatal, 403-with-exhausted-quota retries after the
//! reset instant, 404 kills only the affected PR, everything else backs off.

pub mod api;
pub mod error;
pub mod models;
pub mod pager;
pub mod rest;

pub use api::{GithubApi, ListParams, ListSort, ListState, SortDirection};
pub use error::GithubError;
pub use models::{
    FullPullRequest, GithubCommit, GithubCommitAuthor, GithubCommitDetail, GithubFile,
    GithubLabel, GithubPullRequest, GithubReview, GithubUser, PrSummary,
};
pub use pager::PullRequestPager;
pub use rest::{RestClient, RestClientBuilder};
