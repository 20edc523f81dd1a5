use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use modvault_core::orchestrator::CapacityError;
use modvault_model::FailureKind;
use serde_json::json;
use std::fmt;

pub type AppResult<T> = Result<T, AppError>;

/// Error surfaced to HTTP callers: a status code, the stable failure
/// kind, and a short human message. Never a stack trace.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub kind: FailureKind,
    pub message: String,
    /// Extra top-level body fields, e.g. occupancy on 429.
    pub extra: Option<serde_json::Value>,
}

impl AppError {
    pub fn new(status: StatusCode, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            status,
            kind,
            message: message.into(),
            extra: None,
        }
    }

    pub fn invalid_url() -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            FailureKind::InvalidUrl,
            "URL does not reference a workshop item",
        )
    }

    pub fn invalid_item() -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            FailureKind::InvalidItem,
            "workshop item metadata failed validation",
        )
    }

    pub fn wrong_application(expected: modvault_model::AppId, got: modvault_model::AppId) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            FailureKind::WrongApplication,
            format!("item belongs to app {got}, this service downloads for app {expected}"),
        )
    }

    pub fn job_not_found() -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            FailureKind::NotFound,
            "unknown job id",
        )
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, FailureKind::AccessDenied, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            FailureKind::Internal,
            message,
        )
    }
}

impl From<CapacityError> for AppError {
    fn from(err: CapacityError) -> Self {
        let mut error = Self::new(
            StatusCode::TOO_MANY_REQUESTS,
            FailureKind::CapacityExhausted,
            "maximum concurrent downloads reached, retry later",
        );
        error.extra = Some(json!({ "current": err.current, "max": err.max }));
        error
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut body = json!({
            "error": {
                "kind": self.kind.as_str(),
                "message": self.message,
                "status": self.status.as_u16(),
            }
        });
        if let (Some(obj), Some(serde_json::Value::Object(extra))) =
            (body.as_object_mut(), self.extra)
        {
            obj.extend(extra);
        }

        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_error_carries_occupancy_at_top_level() {
        let error = AppError::from(CapacityError { current: 1, max: 1 });
        assert_eq!(error.status, StatusCode::TOO_MANY_REQUESTS);
        let extra = error.extra.as_ref().unwrap();
        assert_eq!(extra["current"], 1);
        assert_eq!(extra["max"], 1);
    }

    #[test]
    fn display_leads_with_the_stable_kind() {
        let error = AppError::invalid_url();
        assert!(error.to_string().starts_with("InvalidUrl"));
    }
}
