//! The per-job state machine driver.
//!
//! One task per admitted job runs the pipeline sequentially: allocate
//! workspace → fetch through the adapter (with an internal retry loop)
//! → locate content → build the archive → register it. A semaphore
//! permit held for the task's lifetime enforces the global concurrency
//! cap on every exit path.

use crate::archive::{self, ArchiveError, BuilderConfig, EntryProgress};
use crate::logbus::LogBus;
use crate::registry::ArtifactRegistry;
use crate::steam::adapter::WorkshopFetcher;
use crate::steam::events::{FetchEvent, FetchOutcome};
use crate::workspace::WorkspaceManager;
use modvault_model::{AppId, FailureKind, ItemMetadata, Job, JobId, JobState};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Progress band boundaries. Downloading covers [10, 60]; each
/// download-state marker bumps by 2 up to 55 and adapter completion
/// lands on 60. Archiving covers [65, 100] with a floor of 70 once the
/// builder starts and 95 at the last entry.
const DOWNLOAD_FLOOR: u8 = 10;
const DOWNLOAD_TICK: u8 = 2;
const DOWNLOAD_TICK_CAP: u8 = 55;
const DOWNLOAD_DONE: u8 = 60;
const ARCHIVE_ENTERED: u8 = 65;
const ARCHIVE_FLOOR: u8 = 70;
const ARCHIVE_CEILING: u8 = 95;

const LOG_SOURCE: &str = "orchestrator";

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub app_id: AppId,
    /// Jobs running concurrently; submissions beyond this are rejected.
    pub max_concurrent: usize,
    /// Fetch attempts per job for retry-eligible outcomes.
    pub max_attempts: u32,
    /// Linear backoff base: attempt `n` waits `n * retry_base`.
    pub retry_base: Duration,
    /// Reject archives larger than this, when set.
    pub max_archive_bytes: Option<u64>,
    pub builder: BuilderConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            app_id: AppId(221100),
            max_concurrent: 3,
            max_attempts: 5,
            retry_base: Duration::from_secs(5),
            max_archive_bytes: None,
            builder: BuilderConfig::default(),
        }
    }
}

/// Rejection carrying the occupancy the caller reports back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("download capacity exhausted ({current}/{max})")]
pub struct CapacityError {
    pub current: usize,
    pub max: usize,
}

#[derive(Clone)]
pub struct Orchestrator {
    config: OrchestratorConfig,
    registry: Arc<ArtifactRegistry>,
    workspaces: Arc<WorkspaceManager>,
    fetcher: Arc<dyn WorkshopFetcher>,
    bus: Arc<LogBus>,
    permits: Arc<Semaphore>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        registry: Arc<ArtifactRegistry>,
        workspaces: Arc<WorkspaceManager>,
        fetcher: Arc<dyn WorkshopFetcher>,
        bus: Arc<LogBus>,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent));
        Self {
            config,
            registry,
            workspaces,
            fetcher,
            bus,
            permits,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ArtifactRegistry> {
        &self.registry
    }

    pub fn workspaces(&self) -> &Arc<WorkspaceManager> {
        &self.workspaces
    }

    pub fn bus(&self) -> &Arc<LogBus> {
        &self.bus
    }

    /// (currently running, cap)
    pub fn occupancy(&self) -> (usize, usize) {
        let max = self.config.max_concurrent;
        (max - self.permits.available_permits(), max)
    }

    /// Admits a job or rejects it when the cap is hit. Admitted jobs
    /// return immediately; the pipeline runs on its own task.
    pub async fn submit(&self, metadata: ItemMetadata) -> Result<JobId, CapacityError> {
        let permit = match Arc::clone(&self.permits).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                let (current, max) = self.occupancy();
                self.bus.warning(
                    LOG_SOURCE,
                    format!("rejected submission, capacity exhausted ({current}/{max})"),
                );
                return Err(CapacityError { current, max });
            }
        };

        let job = Job::new(JobId::new(), metadata);
        let id = job.id;
        let item_id = job.item_id;
        self.registry.insert(job).await;

        let token = CancellationToken::new();
        self.registry.register_cancel(id, token.clone()).await;
        self.bus.info(
            LOG_SOURCE,
            format!("job {id} admitted for workshop item {item_id}"),
        );

        let orchestrator = self.clone();
        tokio::spawn(async move {
            let _permit = permit;
            tokio::select! {
                _ = token.cancelled() => {
                    // Whoever cancelled owns the cleanup.
                    info!(job = %id, "pipeline cancelled");
                }
                result = orchestrator.pipeline(id, item_id, &token) => {
                    if let Err(kind) = result {
                        orchestrator.fail_job(id, kind).await;
                    }
                }
            }
            orchestrator.registry.drop_cancel(id).await;
        });

        Ok(id)
    }

    async fn pipeline(
        &self,
        id: JobId,
        item_id: modvault_model::WorkshopItemId,
        cancel: &CancellationToken,
    ) -> Result<(), FailureKind> {
        let app_id = self.config.app_id;

        // Starting → Preparing: create the scratch tree.
        self.registry.transition(id, JobState::Preparing).await;
        let workspace = self
            .workspaces
            .allocate(id)
            .await
            .map_err(|err| {
                error!(job = %id, %err, "workspace allocation failed");
                FailureKind::Internal
            })?;
        self.registry
            .update(id, |job| job.workspace = Some(workspace.clone()))
            .await;

        // Preparing → Downloading: session first, then the retry loop.
        self.registry.transition(id, JobState::Downloading).await;
        if let Err(failure) = self.fetcher.prepare_session().await {
            warn!(job = %id, %failure, "session not usable");
            self.bus
                .error(LOG_SOURCE, format!("job {id}: {failure}"));
            return Err(failure.failure_kind());
        }

        self.fetch_with_retries(id, item_id, &workspace, cancel)
            .await?;

        // The adapter verified the canonical path; the fallback search
        // also covers older tool layouts before giving up.
        let content = self
            .workspaces
            .find_content(&workspace, app_id, item_id)
            .await
            .ok_or(FailureKind::NoContent)?;

        // Downloading → CreatingArchive.
        self.registry
            .transition(id, JobState::CreatingArchive)
            .await;
        self.registry.raise_progress(id, ARCHIVE_ENTERED).await;
        self.bus
            .info(LOG_SOURCE, format!("job {id}: packaging content"));

        let archive_path = workspace.join(format!("{item_id}.zip"));
        let built = self
            .build_archive(id, &content, &archive_path, cancel)
            .await?;

        if let Some(limit) = self.config.max_archive_bytes {
            if built.size > limit {
                error!(job = %id, size = built.size, limit, "archive exceeds the configured limit");
                return Err(FailureKind::Internal);
            }
        }

        // CreatingArchive → Completed: archive fields land with the state.
        self.registry.complete(id, built.path, built.size).await;
        self.bus.success(
            LOG_SOURCE,
            format!(
                "job {id}: archive ready ({} entries, {} bytes)",
                built.entries, built.size
            ),
        );
        Ok(())
    }

    /// The internal retry loop of the Downloading state. Retries never
    /// traverse the state machine; each new attempt restarts the
    /// progress sequence at the band floor.
    async fn fetch_with_retries(
        &self,
        id: JobId,
        item_id: modvault_model::WorkshopItemId,
        workspace: &PathBuf,
        cancel: &CancellationToken,
    ) -> Result<(), FailureKind> {
        let app_id = self.config.app_id;

        for attempt in 1..=self.config.max_attempts {
            if attempt > 1 {
                // Clean slate between attempts: same id, fresh tree.
                self.workspaces.dispose(workspace).await.ok();
                self.workspaces.allocate(id).await.map_err(|_| FailureKind::Internal)?;
                self.registry.begin_attempt(id, attempt, DOWNLOAD_FLOOR).await;
                self.bus.warning(
                    LOG_SOURCE,
                    format!(
                        "job {id}: retrying fetch (attempt {attempt}/{})",
                        self.config.max_attempts
                    ),
                );
            } else {
                self.registry.raise_progress(id, DOWNLOAD_FLOOR).await;
            }

            let (event_tx, event_rx) = mpsc::channel::<FetchEvent>(256);
            let consumer = self.spawn_event_consumer(id, event_rx);

            let outcome = self
                .fetcher
                .fetch(workspace, app_id, item_id, event_tx, cancel.child_token())
                .await;
            // The sender side is gone once fetch returns; drain fully.
            let _ = consumer.await;

            match outcome {
                FetchOutcome::ContentWritten(path) => {
                    self.registry.raise_progress(id, DOWNLOAD_DONE).await;
                    self.bus.info(
                        LOG_SOURCE,
                        format!("job {id}: content written to {}", path.display()),
                    );
                    return Ok(());
                }
                outcome if outcome.is_retryable() && attempt < self.config.max_attempts => {
                    warn!(job = %id, ?outcome, attempt, "fetch attempt failed, will retry");
                    tokio::time::sleep(self.config.retry_base * attempt).await;
                }
                outcome => {
                    let kind = outcome
                        .failure_kind()
                        .unwrap_or(FailureKind::Internal);
                    self.bus.error(
                        LOG_SOURCE,
                        format!("job {id}: fetch failed ({})", kind.as_str()),
                    );
                    return Err(kind);
                }
            }
        }
        Err(FailureKind::TransientFailure)
    }

    /// Applies adapter events to the job record: output lines go to the
    /// log bus, download hints advance the progress heuristic.
    fn spawn_event_consumer(
        &self,
        id: JobId,
        mut events: mpsc::Receiver<FetchEvent>,
    ) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(&self.registry);
        let bus = Arc::clone(&self.bus);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    FetchEvent::OutputLine(line) => bus.debug("steamcmd", line),
                    FetchEvent::ProgressTick => {
                        registry
                            .update(id, |job| {
                                let bumped = job.progress.saturating_add(DOWNLOAD_TICK);
                                if bumped <= DOWNLOAD_TICK_CAP && bumped > job.progress {
                                    job.progress = bumped;
                                }
                            })
                            .await;
                    }
                }
            }
        })
    }

    async fn build_archive(
        &self,
        id: JobId,
        content: &PathBuf,
        archive_path: &PathBuf,
        cancel: &CancellationToken,
    ) -> Result<archive::BuiltArchive, FailureKind> {
        let (progress_tx, mut progress_rx) = mpsc::channel::<EntryProgress>(64);
        let registry = Arc::clone(&self.registry);
        let progress_task = tokio::spawn(async move {
            while let Some(progress) = progress_rx.recv().await {
                let span = (ARCHIVE_CEILING - ARCHIVE_FLOOR) as u64;
                let scaled = if progress.entries_total == 0 {
                    0
                } else {
                    progress.entries_done * span / progress.entries_total
                };
                registry
                    .raise_progress(id, ARCHIVE_FLOOR + scaled as u8)
                    .await;
            }
        });

        self.registry.raise_progress(id, ARCHIVE_FLOOR).await;
        let result = archive::build(
            content,
            archive_path,
            &self.config.builder,
            progress_tx,
            cancel.child_token(),
        )
        .await;
        let _ = progress_task.await;

        result.map_err(|err| {
            error!(job = %id, %err, "archive build failed");
            match err {
                ArchiveError::NoContent => FailureKind::NoContent,
                ArchiveError::TooSmall { .. } => FailureKind::ArchiveTooSmall,
                ArchiveError::Timeout => FailureKind::Timeout,
                ArchiveError::Cancelled | ArchiveError::Io(_) | ArchiveError::Zip(_) => {
                    FailureKind::Internal
                }
            }
        })
    }

    /// Records a terminal failure and disposes the workspace. The job
    /// record stays visible in the Error state until cleaned.
    async fn fail_job(&self, id: JobId, kind: FailureKind) {
        if self.registry.fail(id, kind).await {
            self.bus.error(
                LOG_SOURCE,
                format!("job {id} failed: {}", kind.as_str()),
            );
        }
        let workspace = self
            .registry
            .snapshot(id)
            .await
            .and_then(|job| job.workspace);
        if let Some(workspace) = workspace {
            if self.workspaces.dispose(&workspace).await.is_ok() {
                self.registry
                    .update(id, |job| job.workspace = None)
                    .await;
            }
        }
    }

    /// External cancellation: stop the pipeline, dispose the scratch
    /// tree, drop the record. Idempotent; returns false only for ids
    /// this process has never seen.
    pub async fn forget(&self, id: JobId) -> bool {
        if let Some(token) = self.registry.cancel_token(id).await {
            token.cancel();
        }
        let Some(job) = self.registry.remove(id).await else {
            return self.registry.is_tombstoned(id).await;
        };
        if let Some(workspace) = job.workspace {
            if let Err(err) = self.workspaces.dispose(&workspace).await {
                warn!(job = %id, %err, "failed to dispose workspace during cleanup");
            }
        }
        self.registry.drop_cancel(id).await;
        self.bus
            .info(LOG_SOURCE, format!("job {id} cleaned up"));
        true
    }

    /// Marks a delivered job cleaned, disposes its tree, and drops the
    /// record after a short delay so a final status poll still resolves.
    pub async fn finish_delivery(&self, id: JobId, linger: Duration) {
        let Some(job) = self.registry.snapshot(id).await else {
            return;
        };
        if job.state != JobState::Completed {
            return;
        }
        if let Some(workspace) = &job.workspace {
            if let Err(err) = self.workspaces.dispose(workspace).await {
                warn!(job = %id, %err, "failed to dispose workspace after delivery");
            }
        }
        self.registry
            .update(id, |job| {
                job.state = JobState::Cleaned;
                job.workspace = None;
                job.archive_path = None;
                job.archive_size = None;
            })
            .await;
        self.bus
            .info(LOG_SOURCE, format!("job {id} delivered and cleaned"));

        let orchestrator = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(linger).await;
            orchestrator.registry.remove(id).await;
            orchestrator.registry.drop_cancel(id).await;
        });
    }

    /// Graceful shutdown: cancel in-flight jobs and dispose every
    /// workspace still on record.
    pub async fn shutdown(&self) {
        let jobs = self.registry.snapshots().await;
        for job in jobs {
            if let Some(token) = self.registry.cancel_token(job.id).await {
                token.cancel();
            }
            if let Some(workspace) = job.workspace {
                let _ = self.workspaces.dispose(&workspace).await;
            }
        }
        self.bus.info(LOG_SOURCE, "orchestrator shut down");
    }
}
