//! Structured API errors.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::Value;

use crate::auth::AuthError;
use crate::rate_limit::WindowScope;
use crate::services::{ServiceError, ValidationError};

const KEEP_FOREVER: &str = "Sign up to keep your transcriptions forever!";
const MANAGE_ACCOUNT: &str = "Sign up to create an account and manage your transcriptions!";
const RELIABLE_PROCESSING: &str = "Sign up to get priority support and more reliable processing!";
const UNLIMITED_UPLOADS: &str = "Sign up for free to get unlimited uploads and advanced features!";
const LARGER_FILES: &str = "Sign up for free to upload files up to 25MB!";
const MORE_TYPES: &str = "Sign up for free to upload more file types!";

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    signup_suggestion: Option<&'a str>,
}

/// An error as the client sees it: status, stable code and message.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
    pub retry_after: Option<u64>,
    pub signup_suggestion: Option<&'static str>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            details: None,
            retry_after: None,
            signup_suggestion: None,
        }
    }

    fn with_details(mut self, details: Option<Value>) -> Self {
        self.details = details;
        self
    }

    fn suggest(mut self, suggestion: &'static str) -> Self {
        self.signup_suggestion = Some(suggestion);
        self
    }

    /// Drop the sign-up call to action for already authenticated callers.
    pub fn without_signup(mut self) -> Self {
        self.signup_suggestion = None;
        self
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_request", message)
    }

    fn internal() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            "An unexpected error occurred. Please try again later.",
        )
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        let (status, suggestion) = match &e {
            ValidationError::FileTooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, Some(LARGER_FILES)),
            ValidationError::InvalidFileType { .. } => (StatusCode::BAD_REQUEST, Some(MORE_TYPES)),
            _ => (StatusCode::BAD_REQUEST, None),
        };
        let mut err = Self::new(status, e.code(), e.to_string()).with_details(e.details());
        err.signup_suggestion = suggestion;
        err
    }
}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::Validation(v) => v.into(),
            ServiceError::RateLimited {
                scope,
                limit,
                retry_after_secs,
            } => {
                let (code, message) = match scope {
                    WindowScope::Hour => (
                        "rate_limit_exceeded",
                        format!(
                            "Upload limit reached. Try again in {} minutes or sign up for unlimited uploads.",
                            retry_after_secs.div_ceil(60)
                        ),
                    ),
                    WindowScope::Day => (
                        "daily_limit_exceeded",
                        "Daily upload limit reached. Try again tomorrow or sign up for unlimited uploads."
                            .to_string(),
                    ),
                };
                let mut err = Self::new(StatusCode::TOO_MANY_REQUESTS, code, message)
                    .with_details(Some(serde_json::json!({
                        "limit": limit,
                        "window": scope.to_string(),
                    })))
                    .suggest(UNLIMITED_UPLOADS);
                err.retry_after = Some(retry_after_secs.max(1));
                err
            }
            ServiceError::NotFound => Self::new(
                StatusCode::NOT_FOUND,
                "session_not_found",
                "Session not found. Please check your session token.",
            )
            .suggest(MANAGE_ACCOUNT),
            ServiceError::Expired => Self::new(
                StatusCode::GONE,
                "session_expired",
                "This session has expired. Anonymous sessions are valid for 7 days.",
            )
            .suggest(KEEP_FOREVER),
            ServiceError::AlreadyClaimed => Self::new(
                StatusCode::CONFLICT,
                "already_claimed",
                "This session has already been claimed by an account.",
            ),
            ServiceError::StillProcessing {
                status,
                progress_percentage,
            } => Self::new(
                StatusCode::ACCEPTED,
                "still_processing",
                "Transcription is still being processed. Please check the status endpoint.",
            )
            .with_details(Some(serde_json::json!({
                "status": status,
                "progress_percentage": progress_percentage,
            }))),
            ServiceError::ProcessingFailed(reason) => Self::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                "processing_failed",
                format!("Processing failed: {}", reason),
            )
            .suggest(RELIABLE_PROCESSING),
            ServiceError::ProjectNotFound => {
                Self::new(StatusCode::NOT_FOUND, "project_not_found", "Project not found.")
            }
            ServiceError::OutputNotFound => {
                Self::new(StatusCode::NOT_FOUND, "output_not_found", "Output not found.")
            }
            e @ ServiceError::InvalidTransition { .. } => {
                Self::new(StatusCode::CONFLICT, "invalid_status_transition", e.to_string())
            }
            e @ ServiceError::InvalidOutputKind(_) => {
                Self::new(StatusCode::BAD_REQUEST, "invalid_output_kind", e.to_string())
                    .with_details(Some(serde_json::json!({
                        "allowed_kinds": ["blog", "social", "email"],
                    })))
            }
            ServiceError::TranscriptionNotReady => Self::new(
                StatusCode::CONFLICT,
                "transcription_not_ready",
                "The project has no completed transcription yet.",
            ),
            ServiceError::Storage(e) => {
                tracing::error!(error = %e, "Storage failure");
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "storage_error",
                    "The file could not be stored. Please try again.",
                )
            }
            ServiceError::Database(e) => {
                tracing::error!(error = %e, "Database failure");
                Self::internal()
            }
            ServiceError::Internal(e) => {
                tracing::error!(error = %e, "Internal failure");
                Self::internal()
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        if let AuthError::InvalidToken(reason) = &e {
            tracing::debug!(reason = %reason, "Rejected bearer token");
        }
        Self::new(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "A valid bearer token is required.",
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.code,
            message: &self.message,
            details: self.details.as_ref(),
            retry_after: self.retry_after,
            signup_suggestion: self.signup_suggestion,
        };
        let mut response = (self.status, Json(body)).into_response();
        if let Some(secs) = self.retry_after {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_maps_to_429_with_retry_after() {
        let err = ApiError::from(ServiceError::RateLimited {
            scope: WindowScope::Hour,
            limit: 3,
            retry_after_secs: 1200,
        });
        assert_eq!(err.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err.code, "rate_limit_exceeded");
        assert!(err.message.contains("20 minutes"));

        let response = err.into_response();
        assert_eq!(response.headers()[header::RETRY_AFTER], "1200");
    }

    #[test]
    fn test_daily_limit_code() {
        let err = ApiError::from(ServiceError::RateLimited {
            scope: WindowScope::Day,
            limit: 5,
            retry_after_secs: 3600,
        });
        assert_eq!(err.code, "daily_limit_exceeded");
        assert_eq!(err.retry_after, Some(3600));
    }

    #[test]
    fn test_lifecycle_statuses() {
        assert_eq!(ApiError::from(ServiceError::NotFound).status, StatusCode::NOT_FOUND);
        assert_eq!(ApiError::from(ServiceError::Expired).status, StatusCode::GONE);
        assert_eq!(ApiError::from(ServiceError::AlreadyClaimed).status, StatusCode::CONFLICT);
        assert_eq!(
            ApiError::from(ServiceError::ProcessingFailed("boom".into())).status,
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert!(ApiError::from(ServiceError::Expired).signup_suggestion.is_some());
    }

    #[test]
    fn test_file_too_large_details() {
        let err = ApiError::from(ServiceError::Validation(ValidationError::FileTooLarge {
            file_size_mb: 50.0,
            max_size_mb: 10,
        }));
        assert_eq!(err.status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(err.code, "file_too_large");
        assert_eq!(err.details.unwrap()["max_size_mb"], 10);
    }

    #[test]
    fn test_internal_errors_hide_detail() {
        let err = ApiError::from(ServiceError::Internal("secret connection string".into()));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.message.contains("secret"));
    }

    #[test]
    fn test_auth_errors_are_401() {
        for e in [AuthError::MissingToken, AuthError::NotConfigured] {
            assert_eq!(ApiError::from(e).status, StatusCode::UNAUTHORIZED);
        }
    }
}
