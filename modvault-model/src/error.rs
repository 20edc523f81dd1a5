use serde::{Deserialize, Serialize};

/// Stable failure taxonomy surfaced to callers.
///
/// The serialized form of each variant is the reason string callers see
/// in `lastError` and in HTTP error bodies; it never carries detail
/// text or stack traces.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, thiserror::Error,
)]
pub enum FailureKind {
    /// Submitted URL does not contain an `id=<digits>` workshop item.
    #[error("InvalidUrl")]
    InvalidUrl,
    /// Metadata lookup reported the item as not valid.
    #[error("InvalidItem")]
    InvalidItem,
    /// The item belongs to a different application than the configured one.
    #[error("WrongApplication")]
    WrongApplication,
    /// Admission cap reached; the submission was rejected, not queued.
    #[error("CapacityExhausted")]
    CapacityExhausted,
    /// steamcmd prompted for a second factor and no cached session exists.
    #[error("SecondFactorRequired")]
    SecondFactorRequired,
    /// No subscription or access to the requested item.
    #[error("AccessDenied")]
    AccessDenied,
    /// The item does not exist on the platform.
    #[error("NotFound")]
    NotFound,
    /// A deadline elapsed after all retries.
    #[error("Timeout")]
    Timeout,
    /// Post-fetch verification found the expected content path absent or empty.
    #[error("NoContent")]
    NoContent,
    /// The produced archive is below the minimum size floor.
    #[error("ArchiveTooSmall")]
    ArchiveTooSmall,
    /// Retry-eligible tool failure that persisted through all attempts.
    #[error("TransientFailure")]
    TransientFailure,
    /// Any other unexpected condition.
    #[error("Internal")]
    Internal,
}

impl FailureKind {
    /// The stable reason string, identical to the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::InvalidUrl => "InvalidUrl",
            FailureKind::InvalidItem => "InvalidItem",
            FailureKind::WrongApplication => "WrongApplication",
            FailureKind::CapacityExhausted => "CapacityExhausted",
            FailureKind::SecondFactorRequired => "SecondFactorRequired",
            FailureKind::AccessDenied => "AccessDenied",
            FailureKind::NotFound => "NotFound",
            FailureKind::Timeout => "Timeout",
            FailureKind::NoContent => "NoContent",
            FailureKind::ArchiveTooSmall => "ArchiveTooSmall",
            FailureKind::TransientFailure => "TransientFailure",
            FailureKind::Internal => "Internal",
        }
    }

    /// Whether the orchestrator may retry a fetch that failed this way.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FailureKind::TransientFailure | FailureKind::Timeout)
    }
}
