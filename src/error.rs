// HTTP API Error Types
use axum::{http::StatusCode, response::IntoResponse, Json};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::context::ScopedContext;
use crate::database::DatabaseError;
use crate::services::TenantError;

/// HTTP API error returned by business-logic handlers
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest(String),
    ValidationError {
        message: String,
        field_errors: Option<HashMap<String, String>>,
    },

    // 404 Not Found
    NotFound(String),

    // 409 Conflict
    Conflict(String),

    // 500 Internal Server Error
    InternalServerError(String),

    // 503 Service Unavailable
    ServiceUnavailable(String),
}

impl ApiError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::BadRequest(_) => 400,
            ApiError::ValidationError { .. } => 400,
            ApiError::NotFound(_) => 404,
            ApiError::Conflict(_) => 409,
            ApiError::InternalServerError(_) => 500,
            ApiError::ServiceUnavailable(_) => 503,
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg) => msg,
            ApiError::ValidationError { message, .. } => message,
            ApiError::NotFound(msg) => msg,
            ApiError::Conflict(msg) => msg,
            ApiError::InternalServerError(msg) => msg,
            ApiError::ServiceUnavailable(msg) => msg,
        }
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        let mut response = json!({
            "error": true,
            "message": self.message(),
            "code": self.error_code()
        });

        if let ApiError::ValidationError { field_errors: Some(field_errors), .. } = self {
            response["field_errors"] = json!(field_errors);
        }

        response
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::ValidationError { .. } => "VALIDATION_ERROR",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
        }
    }
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn validation_error(
        message: impl Into<String>,
        field_errors: Option<HashMap<String, String>>,
    ) -> Self {
        ApiError::ValidationError {
            message: message.into(),
            field_errors,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError::Conflict(message.into())
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        ApiError::ServiceUnavailable(message.into())
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound(msg) => ApiError::not_found(msg),
            DatabaseError::Duplicate(msg) => ApiError::conflict(msg),
            DatabaseError::ConfigMissing(_) | DatabaseError::Unavailable(_) => {
                tracing::error!("Database unavailable: {}", err);
                ApiError::service_unavailable("Database temporarily unavailable")
            }
            DatabaseError::InvalidSettingName(name) => {
                tracing::error!("Invalid isolation setting name: {}", name);
                ApiError::internal_server_error("Database error occurred")
            }
            DatabaseError::Sqlx(sqlx_err) => {
                // Log the real error but return generic message
                tracing::error!("SQLx error: {}", sqlx_err);
                ApiError::internal_server_error("Database error occurred")
            }
        }
    }
}

impl From<TenantError> for ApiError {
    fn from(err: TenantError) -> Self {
        match err {
            TenantError::Invalid(field_errors) => {
                ApiError::validation_error("Invalid organization", Some(field_errors))
            }
            TenantError::Database(db_err) => db_err.into(),
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_json())).into_response()
    }
}

/// Every way the tenant pipeline can refuse a call.
///
/// A missing correlation id is not here: it is always defaulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionKind {
    MissingTenantHeader,
    InvalidTenantHeaderFormat,
    InvalidTenantIdentifier,
    TenantNotFound,
    TenantDeleted,
    TenantLookupFailed,
    IsolationBindingFailed,
}

impl RejectionKind {
    pub fn status(self) -> StatusCode {
        match self {
            RejectionKind::MissingTenantHeader => StatusCode::BAD_REQUEST,
            RejectionKind::InvalidTenantHeaderFormat => StatusCode::BAD_REQUEST,
            RejectionKind::InvalidTenantIdentifier => StatusCode::BAD_REQUEST,
            RejectionKind::TenantNotFound => StatusCode::NOT_FOUND,
            RejectionKind::TenantDeleted => StatusCode::GONE,
            RejectionKind::TenantLookupFailed => StatusCode::SERVICE_UNAVAILABLE,
            RejectionKind::IsolationBindingFailed => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Fragment appended to the error base URI
    pub fn code(self) -> &'static str {
        match self {
            RejectionKind::MissingTenantHeader => "missing-header",
            RejectionKind::InvalidTenantHeaderFormat => "invalid-header",
            RejectionKind::InvalidTenantIdentifier => "invalid-organization-id",
            RejectionKind::TenantNotFound => "organization-not-found",
            RejectionKind::TenantDeleted => "organization-deleted",
            RejectionKind::TenantLookupFailed => "organization-lookup-failed",
            RejectionKind::IsolationBindingFailed => "isolation-binding-failed",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            RejectionKind::MissingTenantHeader => "Missing Required Header",
            RejectionKind::InvalidTenantHeaderFormat => "Invalid Header Format",
            RejectionKind::InvalidTenantIdentifier => "Invalid Organization Identifier",
            RejectionKind::TenantNotFound => "Organization Not Found",
            RejectionKind::TenantDeleted => "Organization Deleted",
            RejectionKind::TenantLookupFailed => "Organization Lookup Failed",
            RejectionKind::IsolationBindingFailed => "Isolation Binding Failed",
        }
    }
}

/// A terminal refusal raised by a pipeline stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub kind: RejectionKind,
    pub detail: String,
}

impl Rejection {
    pub fn new(kind: RejectionKind, detail: impl Into<String>) -> Self {
        Self { kind, detail: detail.into() }
    }

    /// Build the wire envelope, stamping the call's correlation id and the current time
    pub fn into_envelope(self, base_uri: &str, instance: &str) -> ErrorEnvelope {
        ErrorEnvelope {
            error_type: format!("{}#{}", base_uri.trim_end_matches('#'), self.kind.code()),
            title: self.kind.title(),
            status: self.kind.status().as_u16(),
            detail: self.detail,
            instance: instance.to_string(),
            request_id: ScopedContext::correlation_id().map(|id| id.to_string()),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind.title(), self.detail)
    }
}

impl std::error::Error for Rejection {}

/// Problem-style body written by rejecting stages
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    #[serde(rename = "type")]
    pub error_type: String,
    pub title: &'static str,
    pub status: u16,
    pub detail: String,
    pub instance: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl IntoResponse for ErrorEnvelope {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}
