//! Typed events and outcomes produced by one steamcmd invocation.
//!
//! The adapter pushes events one way, to whoever is driving the fetch;
//! it never holds a reference back to the job being worked on.

use super::markers::SecondFactorKind;
use modvault_model::FailureKind;
use std::path::PathBuf;

/// Events emitted while a fetch is running.
#[derive(Debug, Clone)]
pub enum FetchEvent {
    /// One line of tool output, already trimmed.
    OutputLine(String),
    /// A download-state marker was observed; advance the progress heuristic.
    ProgressTick,
}

/// The classified result of one invocation of the external tool,
/// combining exit status, output markers, and filesystem inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The expected content directory exists and is non-empty.
    ContentWritten(PathBuf),
    NeedsSecondFactor(SecondFactorKind),
    SessionExpired,
    AccessDenied,
    NotFound,
    /// Retry-eligible failure; carries a short detail line.
    TransientFailure(String),
    Timeout,
}

impl FetchOutcome {
    /// Maps a failed outcome to the stable job-level failure kind.
    /// `ContentWritten` has no failure kind.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            FetchOutcome::ContentWritten(_) => None,
            // A mid-pipeline re-auth demand surfaces the same way to
            // callers whether the prompt fired or the session lapsed.
            FetchOutcome::NeedsSecondFactor(_) | FetchOutcome::SessionExpired => {
                Some(FailureKind::SecondFactorRequired)
            }
            FetchOutcome::AccessDenied => Some(FailureKind::AccessDenied),
            FetchOutcome::NotFound => Some(FailureKind::NotFound),
            FetchOutcome::TransientFailure(_) => Some(FailureKind::TransientFailure),
            FetchOutcome::Timeout => Some(FailureKind::Timeout),
        }
    }

    /// Whether the orchestrator's internal retry loop may try again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FetchOutcome::TransientFailure(_) | FetchOutcome::Timeout
        )
    }
}
