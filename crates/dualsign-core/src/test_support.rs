//! Scripted collaborators and fixtures shared by unit tests.

use crate::collab::{CollaboratorError, Countersigner, DocumentRenderer, Notifier, OutboundMessage};
use crate::storage::{ContractStore, InMemoryDualsignStorage};
use crate::types::{ContractRecord, ContractStatus, NewContract};
use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub const PNG: &str = "data:image/png;base64,iVBORw0KGgo=";
pub const PDF: &[u8] = b"%PDF-1.4\n% test document\n";

pub async fn pending_contract(storage: &InMemoryDualsignStorage, document_id: &str) -> ContractRecord {
    storage
        .create_contract(NewContract {
            document_id: document_id.to_string(),
            config: json!({
                "signatures": [{"role": "customer_director"}, {"role": "company_witness"}]
            }),
            company_email: "legal@company.test".to_string(),
            customer_email: Some("buyer@customer.test".to_string()),
        })
        .await
        .unwrap()
}

pub async fn complete_contract(storage: &InMemoryDualsignStorage, document_id: &str) {
    pending_contract(storage, document_id).await;
    let mut tx = storage.begin_signing(document_id).await.unwrap().unwrap();
    tx.set_status(ContractStatus::Pending, ContractStatus::CustomerSigned)
        .await
        .unwrap();
    tx.set_status(ContractStatus::CustomerSigned, ContractStatus::Completed)
        .await
        .unwrap();
    tx.commit().await.unwrap();
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<OutboundMessage>>,
    fail: AtomicBool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            sent: Mutex::default(),
            fail: AtomicBool::new(true),
        }
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, message: &OutboundMessage) -> Result<(), CollaboratorError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Transport("relay unreachable".to_string()));
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

pub struct ScriptedRenderer {
    calls: AtomicUsize,
    fail_first: usize,
    delay: Duration,
}

impl ScriptedRenderer {
    pub fn ok() -> Self {
        Self::failing_first(0)
    }

    pub fn failing_first(fail_first: usize) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_first,
            delay: Duration::ZERO,
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::ok()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentRenderer for ScriptedRenderer {
    async fn render(&self, _view_url: &str) -> Result<Vec<u8>, CollaboratorError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if call < self.fail_first {
            return Err(CollaboratorError::Upstream {
                status: 503,
                message: "renderer busy".to_string(),
            });
        }
        Ok(PDF.to_vec())
    }
}

pub struct ScriptedCountersigner {
    garbage: bool,
}

impl ScriptedCountersigner {
    pub const MARKER: &'static [u8] = b"% countersigned\n";

    pub fn ok() -> Self {
        Self { garbage: false }
    }

    pub fn garbage() -> Self {
        Self { garbage: true }
    }
}

#[async_trait]
impl Countersigner for ScriptedCountersigner {
    async fn countersign(&self, mut pdf: Vec<u8>) -> Result<Vec<u8>, CollaboratorError> {
        if self.garbage {
            return Ok(b"<html>error</html>".to_vec());
        }
        pdf.extend_from_slice(Self::MARKER);
        Ok(pdf)
    }
}
