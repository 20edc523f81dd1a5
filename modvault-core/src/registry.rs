//! Process-resident table of job records.
//!
//! The registry owns every [`Job`]; other components hold ids. The
//! orchestrator is the single writer of state and progress, readers
//! take cloned snapshots, and every mutation happens under one write
//! lock so a snapshot is always a consistent view.

use modvault_model::{FailureKind, Job, JobId, JobState};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[derive(Debug, Default)]
pub struct ArtifactRegistry {
    jobs: RwLock<HashMap<JobId, Job>>,
    cancels: Mutex<HashMap<JobId, CancellationToken>>,
    /// Ids of jobs already cleaned and dropped, so a repeated cleanup
    /// call stays idempotent instead of reporting not-found.
    tombstones: Mutex<HashSet<JobId>>,
}

impl ArtifactRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, job: Job) {
        self.jobs.write().await.insert(job.id, job);
    }

    pub async fn snapshot(&self, id: JobId) -> Option<Job> {
        self.jobs.read().await.get(&id).cloned()
    }

    pub async fn snapshots(&self) -> Vec<Job> {
        self.jobs.read().await.values().cloned().collect()
    }

    pub async fn contains(&self, id: JobId) -> bool {
        self.jobs.read().await.contains_key(&id)
    }

    /// Applies `mutate` to the job under the write lock. Returns false
    /// for unknown ids.
    pub async fn update<F>(&self, id: JobId, mutate: F) -> bool
    where
        F: FnOnce(&mut Job),
    {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(&id) {
            Some(job) => {
                mutate(job);
                true
            }
            None => false,
        }
    }

    /// Moves the job along the state graph. Invalid transitions are
    /// rejected and logged; terminal states stamp `finished_at`.
    pub async fn transition(&self, id: JobId, next: JobState) -> bool {
        let mut jobs = self.jobs.write().await;
        let Some(job) = jobs.get_mut(&id) else {
            return false;
        };
        if !job.state.can_transition_to(next) {
            warn!(job = %id, from = ?job.state, to = ?next, "rejected invalid state transition");
            return false;
        }
        job.state = next;
        if next.is_terminal() && job.finished_at.is_none() {
            job.finished_at = Some(chrono::Utc::now());
        }
        true
    }

    /// Records a terminal failure: state, stable reason, finish time.
    pub async fn fail(&self, id: JobId, kind: FailureKind) -> bool {
        let mut jobs = self.jobs.write().await;
        let Some(job) = jobs.get_mut(&id) else {
            return false;
        };
        if !job.state.can_transition_to(JobState::Error) {
            warn!(job = %id, state = ?job.state, "job already terminal, keeping first error");
            return false;
        }
        job.state = JobState::Error;
        job.last_error = Some(kind);
        job.finished_at = Some(chrono::Utc::now());
        true
    }

    /// Raises progress within the current attempt; decreases are
    /// ignored to keep observations monotonic.
    pub async fn raise_progress(&self, id: JobId, percent: u8) {
        self.update(id, |job| {
            if percent > job.progress {
                job.progress = percent.min(100);
            }
        })
        .await;
    }

    /// Begins a new fetch attempt: bumps the counter and restarts the
    /// progress sequence at the download band floor.
    pub async fn begin_attempt(&self, id: JobId, attempt: u32, floor: u8) {
        self.update(id, |job| {
            job.attempt = attempt;
            job.progress = floor;
        })
        .await;
    }

    /// Registers the finished archive and completes the job in one
    /// write, so `archive_path` is visible exactly when the state is.
    pub async fn complete(&self, id: JobId, archive_path: PathBuf, archive_size: u64) -> bool {
        let mut jobs = self.jobs.write().await;
        let Some(job) = jobs.get_mut(&id) else {
            return false;
        };
        if !job.state.can_transition_to(JobState::Completed) {
            warn!(job = %id, state = ?job.state, "cannot complete from current state");
            return false;
        }
        job.state = JobState::Completed;
        job.progress = 100;
        job.archive_path = Some(archive_path);
        job.archive_size = Some(archive_size);
        job.finished_at = Some(chrono::Utc::now());
        true
    }

    /// The archive path and size for a completed job.
    pub async fn resolve_artifact(&self, id: JobId) -> Option<(PathBuf, u64)> {
        let jobs = self.jobs.read().await;
        let job = jobs.get(&id)?;
        if job.state != JobState::Completed {
            return None;
        }
        Some((job.archive_path.clone()?, job.archive_size?))
    }

    pub async fn remove(&self, id: JobId) -> Option<Job> {
        let removed = self.jobs.write().await.remove(&id);
        if removed.is_some() {
            self.tombstones.lock().await.insert(id);
        }
        removed
    }

    pub async fn is_tombstoned(&self, id: JobId) -> bool {
        self.tombstones.lock().await.contains(&id)
    }

    pub async fn register_cancel(&self, id: JobId, token: CancellationToken) {
        self.cancels.lock().await.insert(id, token);
    }

    pub async fn cancel_token(&self, id: JobId) -> Option<CancellationToken> {
        self.cancels.lock().await.get(&id).cloned()
    }

    pub async fn drop_cancel(&self, id: JobId) {
        self.cancels.lock().await.remove(&id);
    }
}
