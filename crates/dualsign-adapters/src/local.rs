//! Deterministic local adapters for development and single-node runs.

use async_trait::async_trait;
use dualsign_core::{CollaboratorError, DocumentRenderer, Notifier, OutboundMessage};

/// Logs outbound messages instead of delivering them.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, message: &OutboundMessage) -> Result<(), CollaboratorError> {
        let attachments: Vec<_> = message
            .attachments
            .iter()
            .map(|a| format!("{} ({} bytes)", a.filename, a.bytes.len()))
            .collect();
        tracing::info!(
            recipients = ?message.recipients,
            subject = %message.subject,
            attachments = ?attachments,
            "outbound message (log only)"
        );
        Ok(())
    }
}

/// Returns a fixed single-page PDF naming the rendered view.
#[derive(Debug, Clone, Default)]
pub struct StaticRenderer;

impl StaticRenderer {
    fn document(view_url: &str) -> Vec<u8> {
        let text = view_url.replace('\\', "\\\\").replace('(', "\\(").replace(')', "\\)");
        let stream = format!("BT /F1 12 Tf 72 720 Td ({text}) Tj ET");
        format!(
            "%PDF-1.4\n\
             1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n\
             2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n\
             3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 595 842] /Contents 4 0 R \
             /Resources << /Font << /F1 5 0 R >> >> >> endobj\n\
             4 0 obj << /Length {} >> stream\n{stream}\nendstream endobj\n\
             5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n\
             trailer << /Root 1 0 R >>\n%%EOF\n",
            stream.len()
        )
        .into_bytes()
    }
}

#[async_trait]
impl DocumentRenderer for StaticRenderer {
    async fn render(&self, view_url: &str) -> Result<Vec<u8>, CollaboratorError> {
        Ok(Self::document(view_url))
    }
}
