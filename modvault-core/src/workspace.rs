//! Per-job scratch space: allocation, content location, disposal.

use modvault_model::{AppId, JobId, WorkshopItemId};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// Owns the download root and every per-job directory under it. Paths
/// handed to other components are borrowed; disposal always goes
/// through this type.
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
}

/// The directory steamcmd writes workshop content into, relative to the
/// install dir it was pointed at.
pub fn canonical_content_dir(workspace: &Path, app_id: AppId, item_id: WorkshopItemId) -> PathBuf {
    workspace
        .join("steamapps")
        .join("workshop")
        .join("content")
        .join(app_id.to_string())
        .join(item_id.to_string())
}

impl WorkspaceManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, job_id: JobId) -> PathBuf {
        self.root.join(job_id.to_string())
    }

    /// Creates the per-job directory. Idempotent per job id.
    pub async fn allocate(&self, job_id: JobId) -> io::Result<PathBuf> {
        let path = self.path_for(job_id);
        fs::create_dir_all(&path).await?;
        Ok(path)
    }

    /// Candidate content locations, most plausible first. Older tool
    /// versions and interrupted runs leave content outside the
    /// canonical layout; the workspace root itself is deliberately not
    /// a candidate because it also holds the tool's own metadata.
    pub fn content_candidates(
        workspace: &Path,
        app_id: AppId,
        item_id: WorkshopItemId,
    ) -> [PathBuf; 4] {
        [
            canonical_content_dir(workspace, app_id, item_id),
            workspace
                .join("workshop")
                .join("content")
                .join(app_id.to_string())
                .join(item_id.to_string()),
            workspace
                .join("steamapps")
                .join("workshop")
                .join("content")
                .join(item_id.to_string()),
            workspace.join("content").join(item_id.to_string()),
        ]
    }

    /// The first candidate directory that exists and is non-empty.
    pub async fn find_content(
        &self,
        workspace: &Path,
        app_id: AppId,
        item_id: WorkshopItemId,
    ) -> Option<PathBuf> {
        for candidate in Self::content_candidates(workspace, app_id, item_id) {
            if dir_is_non_empty(&candidate).await {
                debug!(path = %candidate.display(), "located produced content");
                return Some(candidate);
            }
        }
        None
    }

    /// Removes a job tree. Succeeds when the tree is already gone, so
    /// every caller can dispose unconditionally.
    pub async fn dispose(&self, workspace: &Path) -> io::Result<()> {
        if !workspace.starts_with(&self.root) {
            warn!(path = %workspace.display(), "refusing to dispose path outside download root");
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "workspace outside download root",
            ));
        }
        match fs::remove_dir_all(workspace).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Startup sweep: removes every residual job tree unconditionally.
    /// Active jobs do not survive a restart, so anything found here is
    /// an orphan.
    pub async fn sweep_all(&self) -> io::Result<usize> {
        fs::create_dir_all(&self.root).await?;
        let mut removed = 0;
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                if let Err(err) = fs::remove_dir_all(&path).await {
                    warn!(path = %path.display(), %err, "failed to sweep residual workspace");
                } else {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }
}

async fn dir_is_non_empty(path: &Path) -> bool {
    match fs::read_dir(path).await {
        Ok(mut entries) => matches!(entries.next_entry().await, Ok(Some(_))),
        Err(_) => false,
    }
}
