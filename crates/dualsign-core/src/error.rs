use crate::machine::StateViolation;
use crate::storage::StorageError;
use crate::types::{ContractStatus, Party};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse error classification exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    NotFound,
    InvalidState,
    ConfigError,
    InvalidInput,
    RoleNotAllowed,
    InvalidImage,
    InvalidRole,
    RenderFailed,
    SignFailed,
    DeliveryFailed,
    Storage,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::InvalidState => "INVALID_STATE",
            Self::ConfigError => "CONFIG_ERROR",
            Self::InvalidInput => "INVALID_INPUT",
            Self::RoleNotAllowed => "ROLE_NOT_ALLOWED",
            Self::InvalidImage => "INVALID_IMAGE",
            Self::InvalidRole => "INVALID_ROLE",
            Self::RenderFailed => "RENDER_FAILED",
            Self::SignFailed => "SIGN_FAILED",
            Self::DeliveryFailed => "DELIVERY_FAILED",
            Self::Storage => "STORAGE",
        }
    }

    /// Whether the caller can fix the request and retry.
    pub fn is_client_error(self) -> bool {
        matches!(
            self,
            Self::InvalidInput | Self::RoleNotAllowed | Self::InvalidImage | Self::InvalidRole
        )
    }

    /// Finalization infrastructure failures; the contract stays completed and unsent.
    pub fn is_retryable_delivery(self) -> bool {
        matches!(
            self,
            Self::RenderFailed | Self::SignFailed | Self::DeliveryFailed
        )
    }
}

/// Signing workflow errors.
#[derive(Debug, Error)]
pub enum SigningError {
    #[error("contract {document_id} not found")]
    NotFound { document_id: String },

    #[error("contract {document_id} is {status}: {reason}")]
    InvalidState {
        document_id: String,
        status: ContractStatus,
        reason: StateViolation,
    },

    #[error("configuration error: {message}")]
    Config {
        document_id: Option<String>,
        message: String,
    },

    #[error("invalid input{}: {message}", role_suffix(.role))]
    InvalidInput {
        role: Option<String>,
        message: String,
    },

    #[error("role '{role}' is not allowed for the {party} side; allowed roles: [{}]", .allowed.join(", "))]
    RoleNotAllowed {
        role: String,
        party: Party,
        allowed: Vec<String>,
    },

    #[error("invalid signature image for role '{role}': {message}")]
    InvalidImage { role: String, message: String },

    #[error("invalid role '{role}': {message}")]
    InvalidRole { role: String, message: String },

    #[error("render failed: {0}")]
    RenderFailed(String),

    #[error("external signing failed: {0}")]
    SignFailed(String),

    #[error("document delivery failed: {0}")]
    DeliveryFailed(String),

    #[error("storage error: {0}")]
    Storage(StorageError),
}

fn role_suffix(role: &Option<String>) -> String {
    role.as_deref()
        .map(|role| format!(" for role '{role}'"))
        .unwrap_or_default()
}

impl SigningError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::InvalidState { .. } => ErrorKind::InvalidState,
            Self::Config { .. } => ErrorKind::ConfigError,
            Self::InvalidInput { .. } => ErrorKind::InvalidInput,
            Self::RoleNotAllowed { .. } => ErrorKind::RoleNotAllowed,
            Self::InvalidImage { .. } => ErrorKind::InvalidImage,
            Self::InvalidRole { .. } => ErrorKind::InvalidRole,
            Self::RenderFailed(_) => ErrorKind::RenderFailed,
            Self::SignFailed(_) => ErrorKind::SignFailed,
            Self::DeliveryFailed(_) => ErrorKind::DeliveryFailed,
            Self::Storage(_) => ErrorKind::Storage,
        }
    }

    pub fn not_found(document_id: impl Into<String>) -> Self {
        Self::NotFound {
            document_id: document_id.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            document_id: None,
            message: message.into(),
        }
    }

    pub fn invalid_input(role: Option<&str>, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            role: role.map(str::to_string),
            message: message.into(),
        }
    }

    /// Attach the contract the configuration belongs to.
    pub fn for_document(self, id: &str) -> Self {
        match self {
            Self::Config {
                document_id: None,
                message,
            } => Self::Config {
                document_id: Some(id.to_string()),
                message,
            },
            other => other,
        }
    }
}

impl From<StorageError> for SigningError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidImage { role, message } => Self::InvalidImage { role, message },
            StorageError::InvalidRole { role, message } => Self::InvalidRole { role, message },
            StorageError::NotFound(document_id) => Self::NotFound { document_id },
            other => Self::Storage(other),
        }
    }
}
