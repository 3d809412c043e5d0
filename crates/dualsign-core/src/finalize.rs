//! Post-completion finalization: render, optionally countersign, email, and
//! record `final_sent_at` exactly once.

use crate::collab::{
    looks_like_pdf, Attachment, Countersigner, DocumentRenderer, Notifier, OutboundMessage,
};
use crate::error::{ErrorKind, SigningError};
use crate::locks::KeyedLocks;
use crate::machine::check_finalizable;
use crate::storage::DualsignStorage;
use crate::types::ContractRecord;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Tunables for the finalization pipeline.
#[derive(Debug, Clone)]
pub struct FinalizationSettings {
    /// Base of the canonical view; the document id is appended as a path segment.
    pub view_base_url: String,
    pub render_timeout: Duration,
    pub countersign_timeout: Duration,
    /// `{document_id}` is substituted in subject and body.
    pub subject: String,
    pub body: String,
}

impl Default for FinalizationSettings {
    fn default() -> Self {
        Self {
            view_base_url: "http://localhost:3000/contracts/view".to_string(),
            render_timeout: Duration::from_secs(60),
            countersign_timeout: Duration::from_secs(90),
            subject: "Contract {document_id} is fully signed".to_string(),
            body: "All parties have signed contract {document_id}. The final document is attached."
                .to_string(),
        }
    }
}

/// Result of a finalization attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FinalizationReport {
    /// This attempt delivered the document and recorded the send.
    Sent {
        recipients: Vec<String>,
        countersigned: bool,
        sent_at: DateTime<Utc>,
    },
    /// A previous (or concurrent) attempt already recorded the send.
    AlreadySent { sent_at: Option<DateTime<Utc>> },
    /// Neither party has a contact address.
    NoRecipients,
    /// Finalization failed after the contract completed; retry via finalize.
    Failed { kind: ErrorKind, message: String },
}

impl FinalizationReport {
    pub fn is_sent(&self) -> bool {
        matches!(self, Self::Sent { .. })
    }
}

/// Renders, countersigns and delivers completed contracts.
pub struct FinalizationPipeline {
    storage: Arc<dyn DualsignStorage>,
    renderer: Arc<dyn DocumentRenderer>,
    countersigner: Option<Arc<dyn Countersigner>>,
    notifier: Arc<dyn Notifier>,
    settings: FinalizationSettings,
    in_flight: KeyedLocks,
}

impl FinalizationPipeline {
    pub fn new(
        storage: Arc<dyn DualsignStorage>,
        renderer: Arc<dyn DocumentRenderer>,
        notifier: Arc<dyn Notifier>,
        settings: FinalizationSettings,
    ) -> Self {
        Self {
            storage,
            renderer,
            countersigner: None,
            notifier,
            settings,
            in_flight: KeyedLocks::new(),
        }
    }

    pub fn with_countersigner(mut self, countersigner: Arc<dyn Countersigner>) -> Self {
        self.countersigner = Some(countersigner);
        self
    }

    pub fn countersign_enabled(&self) -> bool {
        self.countersigner.is_some()
    }

    pub fn settings(&self) -> &FinalizationSettings {
        &self.settings
    }

    /// Canonical view URL rendered for `document_id`.
    pub fn view_url(&self, document_id: &str) -> String {
        format!(
            "{}/{}",
            self.settings.view_base_url.trim_end_matches('/'),
            document_id
        )
    }

    /// Finalize a completed contract.
    ///
    /// Render, countersign and delivery failures leave the contract completed
    /// and unsent so the call can simply be repeated.
    pub async fn finalize(&self, document_id: &str) -> Result<FinalizationReport, SigningError> {
        let _flight = self.in_flight.acquire(document_id).await;

        let contract = self
            .storage
            .get_contract(document_id)
            .await?
            .ok_or_else(|| SigningError::not_found(document_id))?;
        check_finalizable(contract.status).map_err(|reason| SigningError::InvalidState {
            document_id: document_id.to_string(),
            status: contract.status,
            reason,
        })?;

        let recipients = recipients(&contract);
        if recipients.is_empty() {
            tracing::warn!(document_id, "no contact addresses; skipping finalization");
            return Ok(FinalizationReport::NoRecipients);
        }
        if let Some(sent_at) = contract.final_sent_at {
            tracing::debug!(document_id, %sent_at, "final document already sent");
            return Ok(FinalizationReport::AlreadySent {
                sent_at: Some(sent_at),
            });
        }

        let view_url = self.view_url(document_id);
        tracing::debug!(document_id, view_url = %view_url, "rendering final document");
        let rendered = tokio::time::timeout(
            self.settings.render_timeout,
            self.renderer.render(&view_url),
        )
        .await
        .map_err(|_| {
            SigningError::RenderFailed(format!(
                "render timed out after {}s",
                self.settings.render_timeout.as_secs()
            ))
        })?
        .map_err(|e| SigningError::RenderFailed(e.to_string()))?;
        if !looks_like_pdf(&rendered) {
            return Err(SigningError::RenderFailed(
                "renderer returned a payload that is not a PDF".to_string(),
            ));
        }

        let (pdf, countersigned) = match &self.countersigner {
            Some(countersigner) => {
                tracing::debug!(document_id, bytes = rendered.len(), "countersigning");
                let signed = tokio::time::timeout(
                    self.settings.countersign_timeout,
                    countersigner.countersign(rendered),
                )
                .await
                .map_err(|_| {
                    SigningError::SignFailed(format!(
                        "countersigning timed out after {}s",
                        self.settings.countersign_timeout.as_secs()
                    ))
                })?
                .map_err(|e| SigningError::SignFailed(e.to_string()))?;
                if !looks_like_pdf(&signed) {
                    return Err(SigningError::SignFailed(
                        "signing authority returned a payload that is not a PDF".to_string(),
                    ));
                }
                (signed, true)
            }
            None => (rendered, false),
        };

        let message = OutboundMessage {
            recipients: recipients.clone(),
            subject: self.settings.subject.replace("{document_id}", document_id),
            body: self.settings.body.replace("{document_id}", document_id),
            attachments: vec![Attachment::pdf(format!("{document_id}.pdf"), pdf)],
        };
        self.notifier
            .send(&message)
            .await
            .map_err(|e| SigningError::DeliveryFailed(e.to_string()))?;

        let sent_at = Utc::now();
        if self.storage.mark_final_sent(document_id, sent_at).await? {
            tracing::info!(
                document_id,
                recipients = recipients.len(),
                countersigned,
                "final document sent"
            );
            return Ok(FinalizationReport::Sent {
                recipients,
                countersigned,
                sent_at,
            });
        }

        tracing::warn!(
            document_id,
            "final document delivered but another attempt recorded the send first"
        );
        let current = self.storage.get_contract(document_id).await?;
        Ok(FinalizationReport::AlreadySent {
            sent_at: current.and_then(|c| c.final_sent_at),
        })
    }
}

/// Company then customer address, trimmed, non-empty, deduplicated ignoring case.
pub fn recipients(contract: &ContractRecord) -> Vec<String> {
    let mut seen = HashSet::new();
    [Some(contract.company_email.as_str()), contract.customer_email.as_deref()]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|address| !address.is_empty())
        .filter(|address| seen.insert(address.to_ascii_lowercase()))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ContractStore, InMemoryDualsignStorage};
    use crate::test_support::{
        complete_contract, RecordingNotifier, ScriptedCountersigner, ScriptedRenderer,
    };
    use crate::types::ContractStatus;

    fn pipeline(
        storage: &InMemoryDualsignStorage,
        renderer: Arc<ScriptedRenderer>,
        notifier: Arc<RecordingNotifier>,
    ) -> FinalizationPipeline {
        FinalizationPipeline::new(
            Arc::new(storage.clone()),
            renderer,
            notifier,
            FinalizationSettings {
                render_timeout: Duration::from_millis(200),
                countersign_timeout: Duration::from_millis(200),
                ..FinalizationSettings::default()
            },
        )
    }

    #[test]
    fn recipients_are_deduplicated_case_insensitively() {
        let contract = ContractRecord {
            contract_id: 1,
            document_id: "doc-1".to_string(),
            config: serde_json::json!({}),
            status: ContractStatus::Completed,
            company_email: " Legal@Acme.test ".to_string(),
            customer_email: Some("legal@acme.test".to_string()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            final_sent_at: None,
        };
        assert_eq!(recipients(&contract), vec!["Legal@Acme.test"]);
    }

    #[tokio::test]
    async fn sends_once_and_records_timestamp() {
        let storage = InMemoryDualsignStorage::new();
        complete_contract(&storage, "doc-1").await;
        let renderer = Arc::new(ScriptedRenderer::ok());
        let notifier = Arc::new(RecordingNotifier::default());
        let pipeline = pipeline(&storage, renderer.clone(), notifier.clone());

        let report = pipeline.finalize("doc-1").await.unwrap();
        assert!(report.is_sent());
        assert_eq!(renderer.calls(), 1);
        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].attachments[0].filename, "doc-1.pdf");
        assert!(sent[0].subject.contains("doc-1"));

        let again = pipeline.finalize("doc-1").await.unwrap();
        assert!(matches!(again, FinalizationReport::AlreadySent { sent_at: Some(_) }));
        assert_eq!(notifier.sent().len(), 1);
        assert_eq!(renderer.calls(), 1);
    }

    #[tokio::test]
    async fn render_failure_is_resumable() {
        let storage = InMemoryDualsignStorage::new();
        complete_contract(&storage, "doc-1").await;
        let renderer = Arc::new(ScriptedRenderer::failing_first(1));
        let notifier = Arc::new(RecordingNotifier::default());
        let pipeline = pipeline(&storage, renderer, notifier.clone());

        let err = pipeline.finalize("doc-1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RenderFailed);
        let contract = storage.get_contract("doc-1").await.unwrap().unwrap();
        assert_eq!(contract.status, ContractStatus::Completed);
        assert!(contract.final_sent_at.is_none());
        assert!(notifier.sent().is_empty());

        assert!(pipeline.finalize("doc-1").await.unwrap().is_sent());
    }

    #[tokio::test]
    async fn render_timeout_maps_to_render_failed() {
        let storage = InMemoryDualsignStorage::new();
        complete_contract(&storage, "doc-1").await;
        let renderer = Arc::new(ScriptedRenderer::slow(Duration::from_secs(5)));
        let pipeline = pipeline(&storage, renderer, Arc::new(RecordingNotifier::default()));

        let err = pipeline.finalize("doc-1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RenderFailed);
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn countersigned_bytes_replace_the_rendering() {
        let storage = InMemoryDualsignStorage::new();
        complete_contract(&storage, "doc-1").await;
        let notifier = Arc::new(RecordingNotifier::default());
        let pipeline = pipeline(&storage, Arc::new(ScriptedRenderer::ok()), notifier.clone())
            .with_countersigner(Arc::new(ScriptedCountersigner::ok()));

        let report = pipeline.finalize("doc-1").await.unwrap();
        assert!(matches!(
            report,
            FinalizationReport::Sent {
                countersigned: true,
                ..
            }
        ));
        let bytes = &notifier.sent()[0].attachments[0].bytes;
        assert!(bytes.ends_with(ScriptedCountersigner::MARKER));
    }

    #[tokio::test]
    async fn non_pdf_countersign_response_is_sign_failed() {
        let storage = InMemoryDualsignStorage::new();
        complete_contract(&storage, "doc-1").await;
        let pipeline = pipeline(
            &storage,
            Arc::new(ScriptedRenderer::ok()),
            Arc::new(RecordingNotifier::default()),
        )
        .with_countersigner(Arc::new(ScriptedCountersigner::garbage()));

        let err = pipeline.finalize("doc-1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SignFailed);
    }

    #[tokio::test]
    async fn delivery_failure_leaves_contract_unsent() {
        let storage = InMemoryDualsignStorage::new();
        complete_contract(&storage, "doc-1").await;
        let notifier = Arc::new(RecordingNotifier::failing());
        let pipeline = pipeline(&storage, Arc::new(ScriptedRenderer::ok()), notifier);

        let err = pipeline.finalize("doc-1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DeliveryFailed);
        let contract = storage.get_contract("doc-1").await.unwrap().unwrap();
        assert!(contract.final_sent_at.is_none());
    }

    #[tokio::test]
    async fn only_completed_contracts_finalize() {
        let storage = InMemoryDualsignStorage::new();
        let pipeline = pipeline(
            &storage,
            Arc::new(ScriptedRenderer::ok()),
            Arc::new(RecordingNotifier::default()),
        );
        let err = pipeline.finalize("doc-missing").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        crate::test_support::pending_contract(&storage, "doc-2").await;
        let err = pipeline.finalize("doc-2").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_finalization_sends_exactly_once() {
        let storage = InMemoryDualsignStorage::new();
        complete_contract(&storage, "doc-1").await;
        let notifier = Arc::new(RecordingNotifier::default());
        let pipeline = Arc::new(pipeline(
            &storage,
            Arc::new(ScriptedRenderer::slow(Duration::from_millis(20))),
            notifier.clone(),
        ));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let pipeline = pipeline.clone();
                tokio::spawn(async move { pipeline.finalize("doc-1").await.unwrap() })
            })
            .collect();
        let mut reports = Vec::new();
        for handle in handles {
            reports.push(handle.await.unwrap());
        }

        assert_eq!(reports.iter().filter(|r| r.is_sent()).count(), 1);
        assert_eq!(
            reports
                .iter()
                .filter(|r| matches!(r, FinalizationReport::AlreadySent { .. }))
                .count(),
            1
        );
        assert_eq!(notifier.sent().len(), 1);
        let contract = storage.get_contract("doc-1").await.unwrap().unwrap();
        assert!(contract.final_sent_at.is_some());
    }
}
