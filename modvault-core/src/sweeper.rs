//! Periodic reaper for stale jobs and orphaned scratch trees.

use crate::logbus::LogBus;
use crate::registry::ArtifactRegistry;
use crate::workspace::WorkspaceManager;
use chrono::Utc;
use modvault_model::FailureKind;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const LOG_SOURCE: &str = "sweeper";

#[derive(Debug, Clone)]
pub struct SweeperConfig {
    pub interval: Duration,
    /// Jobs older than this (from `started_at`) are reaped.
    pub stale_after: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10 * 60),
            stale_after: Duration::from_secs(2 * 60 * 60),
        }
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Non-terminal jobs forced into the Error state.
    pub timed_out: u64,
    /// Terminal jobs dropped from the registry.
    pub dropped: u64,
}

/// Runs until `shutdown` fires, sweeping every `config.interval`.
pub async fn run(
    registry: Arc<ArtifactRegistry>,
    workspaces: Arc<WorkspaceManager>,
    bus: Arc<LogBus>,
    config: SweeperConfig,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(config.interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately; skip it so startup is quiet.
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let stats = sweep_once(&registry, &workspaces, &bus, &config).await;
                if stats.timed_out > 0 || stats.dropped > 0 {
                    info!(timed_out = stats.timed_out, dropped = stats.dropped, "sweep pass finished");
                }
            }
        }
    }
}

/// One sweep pass. Non-terminal jobs past the deadline fail with
/// `Timeout` exactly once and lose their workspace; terminal jobs past
/// the deadline are dropped entirely (an unfetched archive goes with
/// its workspace).
pub async fn sweep_once(
    registry: &ArtifactRegistry,
    workspaces: &WorkspaceManager,
    bus: &LogBus,
    config: &SweeperConfig,
) -> SweepStats {
    let now = Utc::now();
    let mut stats = SweepStats::default();

    for job in registry.snapshots().await {
        let age = (now - job.started_at).to_std().unwrap_or_default();
        if age < config.stale_after {
            continue;
        }

        if job.state.is_terminal() {
            if let Some(workspace) = &job.workspace {
                if let Err(err) = workspaces.dispose(workspace).await {
                    warn!(job = %job.id, %err, "failed to dispose stale workspace");
                }
            }
            registry.remove(job.id).await;
            registry.drop_cancel(job.id).await;
            stats.dropped += 1;
            bus.info(
                LOG_SOURCE,
                format!("dropped stale job {} ({})", job.id, job.state.as_str()),
            );
        } else {
            if let Some(token) = registry.cancel_token(job.id).await {
                token.cancel();
            }
            if registry.fail(job.id, FailureKind::Timeout).await {
                stats.timed_out += 1;
                bus.warning(
                    LOG_SOURCE,
                    format!("job {} exceeded the stale deadline, timed out", job.id),
                );
            }
            if let Some(workspace) = &job.workspace {
                if workspaces.dispose(workspace).await.is_ok() {
                    registry.update(job.id, |job| job.workspace = None).await;
                }
            }
        }
    }
    stats
}
