//! Wiring: settings → monitor → pacer → scheduler → client → stores.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use prmirror_github::{GithubApi, RestClient};
use prmirror_pacing::{PacerConfig, RequestPacer, RequestScheduler, SchedulerConfig};
use prmirror_ratelimit::{RateLimitConfig, RateLimitMonitor};
use prmirror_store::{
    connect, init_schema, CommitManager, PullRequestStore, RepositoryStore, Session,
    SyncFailureStore,
};
use prmirror_sync::{
    BulkIngestionConfig, FailureRetryService, MultiRepoOrchestrator, PrIngestionOutcome,
    PrIngestionService, StateFilter, SyncError,
};

use crate::settings::Settings;

/// Fully wired ingestion core, ready to hand out services.
pub struct SyncRuntime {
    settings: Settings,
    session: Arc<Session>,
    monitor: Arc<RateLimitMonitor>,
    pacer: Arc<RequestPacer>,
    scheduler: Arc<RequestScheduler<PrIngestionOutcome, SyncError>>,
    api: Arc<dyn GithubApi>,
    repos: RepositoryStore,
    prs: PullRequestStore,
    failures: SyncFailureStore,
    commits: Arc<CommitManager>,
}

impl SyncRuntime {
    /// Builds the runtime against the real GitHub REST API.
    pub async fn init(settings: Settings) -> Result<Self> {
        let monitor = Arc::new(RateLimitMonitor::new(monitor_config(&settings)));
        let pacer = Arc::new(RequestPacer::new(
            Arc::clone(&monitor),
            pacer_config(&settings),
        ));
        let client = RestClient::builder()
            .token(settings.github_token.clone())
            .user_agent(settings.user_agent.clone())
            .pacer(Arc::clone(&pacer))
            .build()
            .context("building github client")?;
        Self::init_with_api(settings, Arc::new(client), monitor, pacer).await
    }

    /// Builds the runtime around a caller-supplied API implementation.
    /// Used by tests and by alternate transports.
    pub async fn init_with_api(
        settings: Settings,
        api: Arc<dyn GithubApi>,
        monitor: Arc<RateLimitMonitor>,
        pacer: Arc<RequestPacer>,
    ) -> Result<Self> {
        tracing::info!(
            database = %settings.masked_database_url(),
            tracked_repos = settings.tracked_repos.len(),
            "initializing sync runtime"
        );
        let pool = connect(&settings.database_url)
            .await
            .context("opening database")?;
        init_schema(&pool).await.context("initializing schema")?;
        let session = Arc::new(Session::begin(pool).await.context("opening session")?);

        let scheduler = Arc::new(RequestScheduler::new(
            Arc::clone(&pacer),
            SchedulerConfig::builder()
                .max_concurrent(settings.max_concurrent_requests)
                .max_retries(settings.max_retries)
                .name("pr-sync")
                .build(),
        ));

        let repos = RepositoryStore::new(Arc::clone(&session));
        let prs = PullRequestStore::new(Arc::clone(&session), settings.merge_grace_period);
        let failures = SyncFailureStore::new(Arc::clone(&session));
        let commits = Arc::new(CommitManager::new(
            Arc::clone(&session),
            settings.commit_batch_size,
        ));

        Ok(Self {
            settings,
            session,
            monitor,
            pacer,
            scheduler,
            api,
            repos,
            prs,
            failures,
            commits,
        })
    }

    /// Starts the scheduler worker.
    pub fn start(&self) {
        self.scheduler.start();
    }

    /// The default bulk config derived from settings.
    pub fn bulk_config(&self) -> BulkIngestionConfig {
        BulkIngestionConfig {
            state: StateFilter::All,
            concurrency: self.settings.max_concurrent_requests,
            ..BulkIngestionConfig::default()
        }
    }

    /// Multi-repo orchestrator over the tracked set, wired with failure
    /// recording and batch commits.
    pub fn orchestrator(&self) -> MultiRepoOrchestrator {
        MultiRepoOrchestrator::new(
            Arc::clone(&self.api),
            self.repos.clone(),
            self.prs.clone(),
            Arc::clone(&self.scheduler),
            self.settings.tracked_repos.clone(),
        )
        .with_failure_store(self.failures.clone())
        .with_commit_manager(Arc::clone(&self.commits))
    }

    /// Per-PR ingestion service.
    pub fn ingestion_service(&self) -> PrIngestionService {
        PrIngestionService::new(Arc::clone(&self.api), self.repos.clone(), self.prs.clone())
    }

    /// Retry service over recorded sync failures.
    pub fn retry_service(&self) -> FailureRetryService {
        FailureRetryService::new(
            Arc::new(self.ingestion_service()),
            self.failures.clone(),
            self.repos.clone(),
        )
        .with_max_retries(self.settings.max_retries as i64)
    }

    /// Drains the scheduler and commits any trailing partial batch.
    pub async fn shutdown(&self) -> Result<()> {
        self.scheduler.shutdown(true, Duration::from_secs(30)).await;
        self.commits.finalize().await.context("final commit")?;
        self.session.finish().await.context("closing session")?;
        Ok(())
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn monitor(&self) -> &Arc<RateLimitMonitor> {
        &self.monitor
    }

    pub fn pacer(&self) -> &Arc<RequestPacer> {
        &self.pacer
    }

    pub fn scheduler(&self) -> &Arc<RequestScheduler<PrIngestionOutcome, SyncError>> {
        &self.scheduler
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn commit_manager(&self) -> &Arc<CommitManager> {
        &self.commits
    }
}

fn monitor_config(settings: &Settings) -> RateLimitConfig {
    RateLimitConfig::builder()
        .healthy_threshold_pct(settings.healthy_threshold_pct)
        .warning_threshold_pct(settings.warning_threshold_pct)
        .critical_threshold_pct(settings.critical_threshold_pct)
        .min_remaining_buffer(settings.min_remaining_buffer)
        .track_from_headers(settings.track_from_headers)
        .build()
}

fn pacer_config(settings: &Settings) -> PacerConfig {
    PacerConfig::builder()
        .min_request_interval(settings.min_request_interval)
        .max_request_interval(settings.max_request_interval)
        .reserve_buffer_pct(settings.reserve_buffer_pct)
        .burst_allowance(settings.burst_allowance)
        .build()
}
