use dualsign_core::CollaboratorError;
use thiserror::Error;

/// Errors raised by the HTTP adapters.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("tls setup failed: {0}")]
    Tls(String),
}

pub type AdapterResult<T> = Result<T, AdapterError>;

impl From<AdapterError> for CollaboratorError {
    fn from(err: AdapterError) -> Self {
        match err {
            AdapterError::Http(e) if e.is_timeout() => {
                CollaboratorError::Transport(format!("request timed out: {e}"))
            }
            AdapterError::Http(e) => CollaboratorError::Transport(e.to_string()),
            AdapterError::Status { status, body } => CollaboratorError::Upstream {
                status,
                message: body,
            },
            AdapterError::InvalidResponse(message) => CollaboratorError::InvalidResponse(message),
            other @ (AdapterError::Io { .. } | AdapterError::Tls(_)) => {
                CollaboratorError::NotConfigured(other.to_string())
            }
        }
    }
}

/// Fail on non-2xx, keeping a bounded excerpt of the body for diagnostics.
pub(crate) async fn ensure_success(response: reqwest::Response) -> AdapterResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(AdapterError::Status {
        status: status.as_u16(),
        body: body.chars().take(512).collect(),
    })
}
