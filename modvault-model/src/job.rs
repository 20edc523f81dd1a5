use crate::error::FailureKind;
use crate::ids::{JobId, WorkshopItemId};
use crate::metadata::ItemMetadata;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Lifecycle state of a download job.
///
/// Transitions form a directed graph with no back-edges:
/// `Starting → Preparing → Downloading → CreatingArchive → Completed → Cleaned`,
/// any non-terminal state may move to `Error`, and `Error → Cleaned`
/// once the workspace has been disposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Admitted, workspace not yet created.
    Starting,
    /// Workspace created, about to invoke the steam client.
    Preparing,
    /// The steam client is running.
    Downloading,
    /// Client finished, the archive builder is running.
    CreatingArchive,
    /// Archive produced and registered.
    Completed,
    /// Terminal failure; reason recorded in `last_error`.
    Error,
    /// Workspace (and possibly archive) removed.
    Cleaned,
}

impl JobState {
    /// Whether the state machine permits moving from `self` to `next`.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        use JobState::*;
        match (self, next) {
            (Starting, Preparing)
            | (Preparing, Downloading)
            | (Downloading, CreatingArchive)
            | (CreatingArchive, Completed)
            | (Completed, Cleaned)
            | (Error, Cleaned) => true,
            (Starting | Preparing | Downloading | CreatingArchive, Error) => true,
            _ => false,
        }
    }

    /// Terminal states no longer count against the admission cap.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Error | JobState::Cleaned)
    }

    /// States that occupy an execution slot.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            JobState::Preparing | JobState::Downloading | JobState::CreatingArchive
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Starting => "starting",
            JobState::Preparing => "preparing",
            JobState::Downloading => "downloading",
            JobState::CreatingArchive => "creating_archive",
            JobState::Completed => "completed",
            JobState::Error => "error",
            JobState::Cleaned => "cleaned",
        }
    }
}

/// The unit of work: one submission through the pipeline from admission
/// to terminal state. Owned by the registry; the orchestrator is the
/// single writer of `state` and `progress`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub item_id: WorkshopItemId,
    pub state: JobState,
    /// Percent, monotonic non-decreasing within a single attempt.
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive_size: Option<u64>,
    pub metadata: ItemMetadata,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<FailureKind>,
    /// 1-based fetch attempt counter; bumped on internal retries.
    pub attempt: u32,
}

impl Job {
    pub fn new(id: JobId, metadata: ItemMetadata) -> Self {
        Self {
            id,
            item_id: metadata.item_id,
            state: JobState::Starting,
            progress: 0,
            workspace: None,
            archive_path: None,
            archive_size: None,
            metadata,
            started_at: Utc::now(),
            finished_at: None,
            last_error: None,
            attempt: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::AppId;

    fn meta() -> ItemMetadata {
        ItemMetadata {
            item_id: WorkshopItemId(42),
            app_id: AppId(221100),
            title: "test item".into(),
            author: None,
            preview_url: None,
            declared_size: None,
            valid: true,
        }
    }

    #[test]
    fn happy_path_is_a_valid_walk() {
        use JobState::*;
        let path = [Starting, Preparing, Downloading, CreatingArchive, Completed, Cleaned];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{:?} -> {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn no_back_edges() {
        use JobState::*;
        assert!(!Preparing.can_transition_to(Starting));
        assert!(!Downloading.can_transition_to(Preparing));
        assert!(!Completed.can_transition_to(CreatingArchive));
        assert!(!Cleaned.can_transition_to(Completed));
        assert!(!Error.can_transition_to(Downloading));
    }

    #[test]
    fn error_only_from_non_terminal() {
        use JobState::*;
        for state in [Starting, Preparing, Downloading, CreatingArchive] {
            assert!(state.can_transition_to(Error));
        }
        assert!(!Completed.can_transition_to(Error));
        assert!(!Cleaned.can_transition_to(Error));
        assert!(!Error.can_transition_to(Error));
    }

    #[test]
    fn terminal_states_release_the_slot() {
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Error.is_terminal());
        assert!(JobState::Cleaned.is_terminal());
        assert!(!JobState::Downloading.is_terminal());
    }

    #[test]
    fn active_states_match_the_cap_window() {
        use JobState::*;
        assert!(Preparing.is_active());
        assert!(Downloading.is_active());
        assert!(CreatingArchive.is_active());
        assert!(!Starting.is_active());
        assert!(!Completed.is_active());
    }

    #[test]
    fn new_job_snapshot_shape() {
        let job = Job::new(JobId::new(), meta());
        assert_eq!(job.state, JobState::Starting);
        assert_eq!(job.progress, 0);
        assert_eq!(job.attempt, 1);
        assert!(job.workspace.is_none());
        assert!(job.archive_path.is_none());

        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["state"], "starting");
        assert_eq!(json["itemId"], 42);
        // Terminal-only fields stay off the wire until set.
        assert!(json.get("archivePath").is_none());
        assert!(json.get("lastError").is_none());
    }
}
