//! Headless-browser rendering over HTTP.

use crate::error::{ensure_success, AdapterError, AdapterResult};
use async_trait::async_trait;
use dualsign_core::{looks_like_pdf, CollaboratorError, DocumentRenderer};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Serialize)]
struct RenderRequest<'a> {
    url: &'a str,
    format: &'a str,
    print_background: bool,
}

/// Renders a view URL by POSTing it to a PDF rendering service.
#[derive(Debug, Clone)]
pub struct HttpRenderer {
    client: Client,
    endpoint: String,
    page_format: String,
}

impl HttpRenderer {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> AdapterResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            page_format: "A4".to_string(),
        })
    }

    pub fn with_page_format(mut self, format: impl Into<String>) -> Self {
        self.page_format = format.into();
        self
    }

    async fn fetch(&self, view_url: &str) -> AdapterResult<Vec<u8>> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&RenderRequest {
                url: view_url,
                format: &self.page_format,
                print_background: true,
            })
            .send()
            .await?;
        let bytes = ensure_success(response).await?.bytes().await?;
        if !looks_like_pdf(&bytes) {
            return Err(AdapterError::InvalidResponse(
                "renderer response is not a PDF".to_string(),
            ));
        }
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl DocumentRenderer for HttpRenderer {
    async fn render(&self, view_url: &str) -> Result<Vec<u8>, CollaboratorError> {
        tracing::debug!(endpoint = %self.endpoint, view_url, "requesting render");
        Ok(self.fetch(view_url).await?)
    }
}
