//! Error types for dualsignd

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use dualsign_adapters::AdapterError;
use dualsign_core::{ErrorKind, SigningError, StorageError};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

/// Process-level errors raised while starting or running the daemon
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("adapter error: {0}")]
    Adapter(#[from] AdapterError),

    #[error("server error: {0}")]
    Server(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for ServiceError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// API-facing errors
#[derive(Debug, Error)]
pub enum ApiError {
    /// Failure of a signing, read or finalize operation
    #[error(transparent)]
    Signing(#[from] SigningError),

    /// Contract creation rejected; configuration problems are the caller's here
    #[error(transparent)]
    Creation(SigningError),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    fn inner(&self) -> &SigningError {
        match self {
            Self::Signing(err) | Self::Creation(err) => err,
        }
    }

    pub fn status(&self) -> StatusCode {
        let kind = self.inner().kind();
        match (self, kind) {
            (_, ErrorKind::NotFound) => StatusCode::NOT_FOUND,
            (_, ErrorKind::InvalidState) => StatusCode::CONFLICT,
            (_, kind) if kind.is_client_error() => StatusCode::BAD_REQUEST,
            (Self::Creation(_), ErrorKind::ConfigError) => StatusCode::UNPROCESSABLE_ENTITY,
            (_, kind) if kind.is_retryable_delivery() => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self.inner() {
            SigningError::RoleNotAllowed {
                role,
                party,
                allowed,
            } => Some(json!({ "role": role, "party": party, "allowed": allowed })),
            SigningError::InvalidState { status, reason, .. } => {
                Some(json!({ "status": status, "reason": reason }))
            }
            SigningError::InvalidInput {
                role: Some(role), ..
            }
            | SigningError::InvalidImage { role, .. }
            | SigningError::InvalidRole { role, .. } => Some(json!({ "role": role })),
            SigningError::Config {
                document_id: Some(document_id),
                ..
            } => Some(json!({ "document_id": document_id })),
            _ => None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let inner = self.inner();
        if status.is_server_error() {
            tracing::error!(kind = inner.kind().as_str(), error = %inner, "request failed");
        } else {
            tracing::debug!(kind = inner.kind().as_str(), error = %inner, "request rejected");
        }

        let body = ErrorResponse {
            error: inner.to_string(),
            code: inner.kind().as_str().to_string(),
            details: self.details(),
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;
