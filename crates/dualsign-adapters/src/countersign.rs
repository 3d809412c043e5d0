//! Countersigning through an external signing authority over mutual TLS.

use crate::error::{ensure_success, AdapterError, AdapterResult};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use dualsign_core::{looks_like_pdf, CollaboratorError, Countersigner};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Certificate, Client, Identity};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Location of the authority and the client credentials presented to it.
#[derive(Debug, Clone)]
pub struct CountersignerConfig {
    pub endpoint: String,
    pub client_cert_path: PathBuf,
    pub client_key_path: PathBuf,
    pub ca_cert_path: Option<PathBuf>,
    pub timeout: Duration,
}

#[derive(Debug, Serialize)]
struct SignRequest {
    document: String,
}

#[derive(Debug, Deserialize)]
struct SignResponse {
    signed_document: String,
}

/// Client for a signing authority that requires a client certificate.
#[derive(Debug, Clone)]
pub struct MtlsCountersigner {
    client: Client,
    endpoint: String,
}

impl MtlsCountersigner {
    /// Build from PEM material: `identity_pem` holds the client certificate
    /// chain followed by its private key.
    pub fn from_pem(
        endpoint: impl Into<String>,
        identity_pem: &[u8],
        ca_pem: Option<&[u8]>,
        timeout: Duration,
    ) -> AdapterResult<Self> {
        let identity =
            Identity::from_pem(identity_pem).map_err(|e| AdapterError::Tls(e.to_string()))?;
        let mut builder = Client::builder()
            .use_rustls_tls()
            .identity(identity)
            .timeout(timeout);
        if let Some(ca_pem) = ca_pem {
            let ca = Certificate::from_pem(ca_pem).map_err(|e| AdapterError::Tls(e.to_string()))?;
            builder = builder.add_root_certificate(ca);
        }
        Ok(Self {
            client: builder.build()?,
            endpoint: endpoint.into(),
        })
    }

    /// Load certificate, key and optional CA bundle from disk.
    pub fn from_files(config: &CountersignerConfig) -> AdapterResult<Self> {
        let mut identity = read(&config.client_cert_path)?;
        if !identity.ends_with(b"\n") {
            identity.push(b'\n');
        }
        identity.extend(read(&config.client_key_path)?);
        let ca = config.ca_cert_path.as_deref().map(read).transpose()?;
        Self::from_pem(
            config.endpoint.clone(),
            &identity,
            ca.as_deref(),
            config.timeout,
        )
    }

    async fn submit(&self, pdf: &[u8]) -> AdapterResult<Vec<u8>> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&SignRequest {
                document: STANDARD.encode(pdf),
            })
            .send()
            .await?;
        let response = ensure_success(response).await?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?;
        decode_signed_response(content_type.as_deref(), &body)
    }
}

fn read(path: &Path) -> AdapterResult<Vec<u8>> {
    std::fs::read(path).map_err(|source| AdapterError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Accept a raw PDF body or a JSON envelope carrying the signed PDF in base64.
pub fn decode_signed_response(content_type: Option<&str>, body: &[u8]) -> AdapterResult<Vec<u8>> {
    let media_type = content_type
        .and_then(|value| value.split(';').next())
        .map(|value| value.trim().to_ascii_lowercase())
        .unwrap_or_default();

    let signed = if media_type == "application/json" {
        let envelope: SignResponse = serde_json::from_slice(body).map_err(|e| {
            AdapterError::InvalidResponse(format!("malformed signing response: {e}"))
        })?;
        STANDARD.decode(envelope.signed_document.trim()).map_err(|e| {
            AdapterError::InvalidResponse(format!("signed_document is not base64: {e}"))
        })?
    } else if media_type == "application/pdf" || looks_like_pdf(body) {
        body.to_vec()
    } else {
        return Err(AdapterError::InvalidResponse(format!(
            "unexpected signing response type `{media_type}`"
        )));
    };

    if !looks_like_pdf(&signed) {
        return Err(AdapterError::InvalidResponse(
            "signed payload is not a PDF".to_string(),
        ));
    }
    Ok(signed)
}

#[async_trait]
impl Countersigner for MtlsCountersigner {
    async fn countersign(&self, pdf: Vec<u8>) -> Result<Vec<u8>, CollaboratorError> {
        tracing::debug!(endpoint = %self.endpoint, bytes = pdf.len(), "submitting for countersignature");
        Ok(self.submit(&pdf).await?)
    }
}
