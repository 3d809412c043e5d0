//! Email delivery through an HTTP mail relay.

use crate::error::{ensure_success, AdapterResult};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use dualsign_core::{CollaboratorError, Notifier, OutboundMessage};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Serialize)]
struct RelayAttachment<'a> {
    filename: &'a str,
    content_type: &'a str,
    content_base64: String,
}

#[derive(Debug, Serialize)]
struct RelayMessage<'a> {
    from: &'a str,
    to: &'a [String],
    subject: &'a str,
    text: &'a str,
    attachments: Vec<RelayAttachment<'a>>,
}

/// Posts outbound messages as JSON to a transactional mail relay.
#[derive(Debug, Clone)]
pub struct HttpMailRelay {
    client: Client,
    endpoint: String,
    from: String,
    api_token: Option<String>,
}

impl HttpMailRelay {
    pub fn new(
        endpoint: impl Into<String>,
        from: impl Into<String>,
        timeout: Duration,
    ) -> AdapterResult<Self> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            endpoint: endpoint.into(),
            from: from.into(),
            api_token: None,
        })
    }

    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    async fn deliver(&self, message: &OutboundMessage) -> AdapterResult<()> {
        let payload = RelayMessage {
            from: &self.from,
            to: &message.recipients,
            subject: &message.subject,
            text: &message.body,
            attachments: message
                .attachments
                .iter()
                .map(|a| RelayAttachment {
                    filename: &a.filename,
                    content_type: &a.content_type,
                    content_base64: STANDARD.encode(&a.bytes),
                })
                .collect(),
        };
        let mut request = self.client.post(&self.endpoint).json(&payload);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }
        ensure_success(request.send().await?).await?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for HttpMailRelay {
    async fn send(&self, message: &OutboundMessage) -> Result<(), CollaboratorError> {
        self.deliver(message).await?;
        tracing::debug!(
            recipients = message.recipients.len(),
            subject = %message.subject,
            "message handed to mail relay"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::serve;
    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use dualsign_core::Attachment;
    use serde_json::Value;
    use std::sync::{Arc, Mutex};

    type Captured = Arc<Mutex<Vec<(Option<String>, Value)>>>;

    async fn capture(
        State(captured): State<Captured>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> StatusCode {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        captured.lock().unwrap().push((auth, body));
        StatusCode::ACCEPTED
    }

    fn message() -> OutboundMessage {
        OutboundMessage {
            recipients: vec!["legal@company.test".to_string(), "buyer@customer.test".to_string()],
            subject: "Contract doc-1 is fully signed".to_string(),
            body: "attached".to_string(),
            attachments: vec![Attachment::pdf("doc-1.pdf", b"%PDF-1.4".to_vec())],
        }
    }

    #[tokio::test]
    async fn relays_message_with_base64_attachments_and_token() {
        let captured: Captured = Arc::default();
        let base = serve(
            Router::new()
                .route("/send", post(capture))
                .with_state(captured.clone()),
        )
        .await;

        let relay = HttpMailRelay::new(format!("{base}/send"), "noreply@dualsign.test", Duration::from_secs(5))
            .unwrap()
            .with_api_token("secret");
        relay.send(&message()).await.unwrap();

        let captured = captured.lock().unwrap();
        let (auth, body) = &captured[0];
        assert_eq!(auth.as_deref(), Some("Bearer secret"));
        assert_eq!(body["from"], "noreply@dualsign.test");
        assert_eq!(body["to"].as_array().unwrap().len(), 2);
        assert_eq!(body["attachments"][0]["filename"], "doc-1.pdf");
        assert_eq!(
            body["attachments"][0]["content_base64"],
            STANDARD.encode(b"%PDF-1.4")
        );
    }

    #[tokio::test]
    async fn relay_rejection_is_an_upstream_error() {
        let base = serve(Router::new().route(
            "/send",
            post(|| async { (StatusCode::UNAUTHORIZED, "bad token") }),
        ))
        .await;
        let relay =
            HttpMailRelay::new(format!("{base}/send"), "noreply@dualsign.test", Duration::from_secs(5))
                .unwrap();
        let err = relay.send(&message()).await.unwrap_err();
        assert!(matches!(err, CollaboratorError::Upstream { status: 401, .. }));
    }
}
