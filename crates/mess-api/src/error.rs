//! # API Error Types
//!
//! Structured error type implementing `axum::response::IntoResponse`.
//! Maps [`MessError`] variants to HTTP status codes and returns JSON bodies
//! with a machine-readable code, a message, and optional details.
//! Internal error details never reach the client.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use mess_core::{MessError, ValidationErrors};

/// Structured JSON error response body.
///
/// Every error response on the API surface uses this shape.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// Inner error detail.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "NOT_FOUND", "VALIDATION_ERROR").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Field violations for validation errors. Never set for 500s.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Application-level error type that implements [`IntoResponse`] for Axum.
#[derive(Error, Debug)]
pub enum AppError {
    /// One or more request fields are missing or malformed (400).
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    /// Resource not found (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Request body could not be parsed (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Authentication failure (401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Authorization failure, caller's role is insufficient (403).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Uniqueness violation or already-consumed meal (409).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Entity is in the wrong lifecycle state for the operation (422).
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Internal server error (500). Message is logged but not returned to client.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Return the HTTP status code and machine-readable error code for this error.
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            Self::InvalidState(_) => (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_STATE"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let (message, details) = match &self {
            Self::Internal(_) => ("An internal error occurred".to_string(), None),
            Self::Validation(errors) => (
                "request validation failed".to_string(),
                Some(serde_json::json!({ "violations": errors.violations() })),
            ),
            Self::NotFound(m)
            | Self::BadRequest(m)
            | Self::Unauthorized(m)
            | Self::Forbidden(m)
            | Self::Conflict(m)
            | Self::InvalidState(m) => (m.clone(), None),
        };

        if matches!(&self, Self::Internal(_)) {
            tracing::error!(error = %self, "internal server error");
        }

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<MessError> for AppError {
    fn from(err: MessError) -> Self {
        match err {
            MessError::Validation(errors) => Self::Validation(errors),
            MessError::NotFound(m) => Self::NotFound(m),
            MessError::Conflict(m) => Self::Conflict(m),
            MessError::Unauthorized => Self::Unauthorized("invalid email or credential".into()),
            MessError::InvalidState(m) => Self::InvalidState(m),
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn response_parts(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn status_codes() {
        let cases = [
            (AppError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (AppError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (AppError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED),
            (AppError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (AppError::Conflict("x".into()), StatusCode::CONFLICT),
            (AppError::InvalidState("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (AppError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(err.status_and_code().0, expected, "{err}");
        }
    }

    #[tokio::test]
    async fn validation_lists_every_violation() {
        let mut errors = ValidationErrors::new();
        errors.push("planType", "is required");
        errors.push("amount", "must not be negative");
        let (status, body) = response_parts(AppError::Validation(errors)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        let violations = body["error"]["details"]["violations"].as_array().unwrap();
        assert_eq!(violations.len(), 2);
        assert_eq!(violations[0]["field"], "planType");
        assert_eq!(violations[1]["message"], "must not be negative");
    }

    #[tokio::test]
    async fn internal_error_hides_detail() {
        let (status, body) =
            response_parts(AppError::Internal("connection refused to 10.0.0.5".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["code"], "INTERNAL_ERROR");
        assert_eq!(body["error"]["message"], "An internal error occurred");
        assert!(body["error"].get("details").is_none());
    }

    #[tokio::test]
    async fn domain_conflict_keeps_message() {
        let err: AppError = MessError::Conflict("already consumed today".into()).into();
        let (status, body) = response_parts(err).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["message"], "already consumed today");
    }

    #[tokio::test]
    async fn domain_unauthorized_uses_fixed_message() {
        let (status, body) = response_parts(MessError::Unauthorized.into()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["message"], "invalid email or credential");
    }

    #[test]
    fn invalid_state_maps_to_422() {
        let err: AppError = MessError::InvalidState("meal not included in plan".into()).into();
        assert_eq!(err.status_and_code(), (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_STATE"));
    }
}
