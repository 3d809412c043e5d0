//! Interfaces of the external collaborators used around a signing workflow.

use async_trait::async_trait;
use thiserror::Error;

pub const PDF_MAGIC: &[u8] = b"%PDF-";

/// Whether `bytes` start like a PDF document.
pub fn looks_like_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(PDF_MAGIC)
}

/// Failure reported by a collaborator. The pipeline decides which
/// [`crate::ErrorKind`] it maps to based on the call site.
#[derive(Debug, Clone, Error)]
pub enum CollaboratorError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("upstream returned {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("unexpected response: {0}")]
    InvalidResponse(String),

    #[error("not configured: {0}")]
    NotConfigured(String),
}

/// File attached to an outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub fn pdf(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            content_type: "application/pdf".to_string(),
            bytes,
        }
    }
}

/// Message handed to a [`Notifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
    pub attachments: Vec<Attachment>,
}

/// Renders the canonical view of a document into PDF bytes.
#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    async fn render(&self, view_url: &str) -> Result<Vec<u8>, CollaboratorError>;
}

/// Submits a PDF to an external signing authority and returns the signed PDF.
#[async_trait]
pub trait Countersigner: Send + Sync {
    async fn countersign(&self, pdf: Vec<u8>) -> Result<Vec<u8>, CollaboratorError>;
}

/// Delivers messages to contacts.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &OutboundMessage) -> Result<(), CollaboratorError>;
}
