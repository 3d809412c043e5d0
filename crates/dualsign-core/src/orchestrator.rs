//! Signing transaction orchestration.
//!
//! One signing attempt validates the submission, upserts every signature,
//! recomputes completeness and moves the contract forward inside a single
//! storage transaction. Side effects that talk to the outside world (the
//! handoff notification and finalization) run only after commit.

use crate::collab::{Notifier, OutboundMessage};
use crate::error::SigningError;
use crate::finalize::{FinalizationPipeline, FinalizationReport};
use crate::machine::{check_guard, complete_phase};
use crate::roles::{derive_required_roles, RequiredRoles, RoleClassifier};
use crate::signature::{group_by_party_and_role, missing_roles, prepare_submission};
use crate::storage::DualsignStorage;
use crate::types::{
    new_document_id, ContractRecord, ContractStatus, NewContract, Party, SignatureRecord,
    SignatureUpsert, SubmittedSignature,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Request to open a new contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractDraft {
    pub config: Value,
    pub company_email: String,
    #[serde(default)]
    pub customer_email: Option<String>,
}

/// Message sent to the company once the customer phase closes.
#[derive(Debug, Clone)]
pub struct HandoffSettings {
    /// `{document_id}` and `{view_url}` are substituted.
    pub subject: String,
    pub body: String,
}

impl Default for HandoffSettings {
    fn default() -> Self {
        Self {
            subject: "Contract {document_id} is ready for your signature".to_string(),
            body: "The customer has signed contract {document_id}. Review and sign it at {view_url}."
                .to_string(),
        }
    }
}

/// Non-fatal problem attached to a successful signing outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SigningWarning {
    pub code: String,
    pub message: String,
}

impl SigningWarning {
    fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

/// Result of one signing attempt.
#[derive(Debug, Clone, Serialize)]
pub struct SigningOutcome {
    pub document_id: String,
    pub party: Party,
    pub status: ContractStatus,
    /// Whether this attempt moved the contract forward.
    pub transitioned: bool,
    pub accepted_roles: Vec<String>,
    /// Required roles of `party` still lacking a signature.
    pub missing_roles: Vec<String>,
    pub warnings: Vec<SigningWarning>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finalization: Option<FinalizationReport>,
}

impl SigningOutcome {
    pub fn is_partial(&self) -> bool {
        !self.missing_roles.is_empty()
    }
}

/// Entry point for contract creation, signing and finalization.
pub struct SigningOrchestrator {
    storage: Arc<dyn DualsignStorage>,
    classifier: Arc<dyn RoleClassifier>,
    notifier: Arc<dyn Notifier>,
    finalizer: Arc<FinalizationPipeline>,
    handoff: HandoffSettings,
}

impl SigningOrchestrator {
    pub fn new(
        storage: Arc<dyn DualsignStorage>,
        classifier: Arc<dyn RoleClassifier>,
        notifier: Arc<dyn Notifier>,
        finalizer: Arc<FinalizationPipeline>,
    ) -> Self {
        Self {
            storage,
            classifier,
            notifier,
            finalizer,
            handoff: HandoffSettings::default(),
        }
    }

    pub fn with_handoff(mut self, handoff: HandoffSettings) -> Self {
        self.handoff = handoff;
        self
    }

    pub fn storage(&self) -> &Arc<dyn DualsignStorage> {
        &self.storage
    }

    pub fn finalizer(&self) -> &Arc<FinalizationPipeline> {
        &self.finalizer
    }

    /// Required roles of a configuration, rejecting sets neither party can complete.
    pub fn required_roles(&self, config: &Value) -> Result<RequiredRoles, SigningError> {
        let required = derive_required_roles(config, self.classifier.as_ref())?;
        required.ensure_classified()?;
        required.require_party(Party::Customer)?;
        required.require_party(Party::Company)?;
        Ok(required)
    }

    /// Create a pending contract after validating contacts and configuration.
    pub async fn create_contract(&self, draft: ContractDraft) -> Result<ContractRecord, SigningError> {
        let company_email = normalize_email("company_email", &draft.company_email)?
            .ok_or_else(|| SigningError::invalid_input(None, "company_email is required"))?;
        let customer_email = match draft.customer_email.as_deref() {
            Some(raw) => normalize_email("customer_email", raw)?,
            None => None,
        };
        let required = self.required_roles(&draft.config)?;

        let record = self
            .storage
            .create_contract(NewContract {
                document_id: new_document_id(),
                config: draft.config,
                company_email,
                customer_email,
            })
            .await?;
        tracing::info!(
            document_id = %record.document_id,
            customer_roles = required.customer.len(),
            company_roles = required.company.len(),
            "contract created"
        );
        Ok(record)
    }

    pub async fn get_contract(&self, document_id: &str) -> Result<ContractRecord, SigningError> {
        self.storage
            .get_contract(document_id)
            .await?
            .ok_or_else(|| SigningError::not_found(document_id))
    }

    pub async fn list_signatures(
        &self,
        document_id: &str,
    ) -> Result<Vec<SignatureRecord>, SigningError> {
        Ok(self.storage.list_signatures(document_id).await?)
    }

    /// Submit signatures for `party` and advance the contract when its set is complete.
    pub async fn attempt_sign(
        &self,
        document_id: &str,
        party: Party,
        submitted: Vec<SubmittedSignature>,
    ) -> Result<SigningOutcome, SigningError> {
        let mut tx = self
            .storage
            .begin_signing(document_id)
            .await?
            .ok_or_else(|| SigningError::not_found(document_id))?;
        let current = tx.contract().status;

        check_guard(current, party).map_err(|reason| SigningError::InvalidState {
            document_id: document_id.to_string(),
            status: current,
            reason,
        })?;

        let required = derive_required_roles(&tx.contract().config, self.classifier.as_ref())
            .and_then(|required| required.ensure_classified().map(|_| required))
            .map_err(|e| e.for_document(document_id))?;
        let allowed = required
            .require_party(party)
            .map_err(|e| e.for_document(document_id))?
            .to_vec();

        let upserts = collect_submission(party, &submitted)?;
        if let Some(rejected) = upserts.iter().find(|u| !allowed.contains(&u.role)) {
            return Err(SigningError::RoleNotAllowed {
                role: rejected.role.clone(),
                party,
                allowed,
            });
        }

        let accepted_roles: Vec<String> = upserts.iter().map(|u| u.role.clone()).collect();
        for upsert in upserts {
            tx.upsert_signature(upsert).await?;
        }

        let rows = tx.list_signatures().await?;
        let missing = missing_roles(&group_by_party_and_role(&rows), party, &allowed);

        let mut transitioned = false;
        if missing.is_empty() {
            let next = complete_phase(current, party).map_err(|reason| {
                SigningError::InvalidState {
                    document_id: document_id.to_string(),
                    status: current,
                    reason,
                }
            })?;
            tx.set_status(current, next).await?;
            transitioned = true;
        }
        let committed = tx.commit().await?;
        drop(tx);

        if transitioned {
            tracing::info!(
                document_id,
                party = %party,
                from = %current,
                to = %committed.status,
                "contract advanced"
            );
        } else {
            tracing::info!(
                document_id,
                party = %party,
                missing = ?missing,
                "partial signing recorded"
            );
        }

        let mut outcome = SigningOutcome {
            document_id: document_id.to_string(),
            party,
            status: committed.status,
            transitioned,
            accepted_roles,
            missing_roles: missing,
            warnings: Vec::new(),
            finalization: None,
        };

        if transitioned {
            match committed.status {
                ContractStatus::CustomerSigned => {
                    if let Some(warning) = self.notify_company(&committed).await {
                        outcome.warnings.push(warning);
                    }
                }
                ContractStatus::Completed => {
                    outcome.finalization = Some(self.finalize_after_commit(document_id).await);
                }
                ContractStatus::Pending => {}
            }
        }

        Ok(outcome)
    }

    /// Finalize a completed contract; safe to repeat after a failure.
    pub async fn finalize(&self, document_id: &str) -> Result<FinalizationReport, SigningError> {
        self.finalizer.finalize(document_id).await
    }

    async fn finalize_after_commit(&self, document_id: &str) -> FinalizationReport {
        match self.finalizer.finalize(document_id).await {
            Ok(report) => report,
            Err(err) => {
                tracing::warn!(
                    document_id,
                    kind = err.kind().as_str(),
                    error = %err,
                    "finalization failed; contract stays completed and can be finalized again"
                );
                FinalizationReport::Failed {
                    kind: err.kind(),
                    message: err.to_string(),
                }
            }
        }
    }

    async fn notify_company(&self, contract: &ContractRecord) -> Option<SigningWarning> {
        let document_id = contract.document_id.as_str();
        let address = contract.company_email.trim();
        if address.is_empty() {
            tracing::warn!(document_id, "no company contact; handoff not sent");
            return Some(SigningWarning::new(
                "NO_COMPANY_CONTACT",
                "customer signing complete but the company has no contact address",
            ));
        }

        let view_url = self.finalizer.view_url(document_id);
        let fill = |template: &str| {
            template
                .replace("{document_id}", document_id)
                .replace("{view_url}", &view_url)
        };
        let message = OutboundMessage {
            recipients: vec![address.to_string()],
            subject: fill(&self.handoff.subject),
            body: fill(&self.handoff.body),
            attachments: Vec::new(),
        };

        match self.notifier.send(&message).await {
            Ok(()) => {
                tracing::debug!(document_id, "company notified");
                None
            }
            Err(err) => {
                tracing::warn!(document_id, error = %err, "company notification failed");
                Some(SigningWarning::new(
                    "NOTIFY_FAILED",
                    format!("company notification failed: {err}"),
                ))
            }
        }
    }
}

/// Validate every item; a repeated role keeps its first position and its last value.
fn collect_submission(
    party: Party,
    submitted: &[SubmittedSignature],
) -> Result<Vec<SignatureUpsert>, SigningError> {
    if submitted.is_empty() {
        return Err(SigningError::invalid_input(None, "no signatures submitted"));
    }
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut upserts: Vec<SignatureUpsert> = Vec::with_capacity(submitted.len());
    for item in submitted {
        let upsert = prepare_submission(party, item)?;
        match positions.get(&upsert.role) {
            Some(&index) => upserts[index] = upsert,
            None => {
                positions.insert(upsert.role.clone(), upserts.len());
                upserts.push(upsert);
            }
        }
    }
    Ok(upserts)
}

fn normalize_email(field: &str, raw: &str) -> Result<Option<String>, SigningError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let valid = trimmed
        .split_once('@')
        .map(|(local, domain)| !local.is_empty() && !domain.is_empty())
        .unwrap_or(false)
        && !trimmed.chars().any(char::is_whitespace);
    if !valid {
        return Err(SigningError::invalid_input(
            None,
            format!("{field} is not a valid email address"),
        ));
    }
    Ok(Some(trimmed.to_string()))
}
