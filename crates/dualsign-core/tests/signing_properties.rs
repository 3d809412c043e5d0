//! Property tests for role derivation and partial signing.

use dualsign_core::*;
use proptest::prelude::*;
use serde_json::json;
use std::sync::Arc;

const PNG: &str = "data:image/png;base64,iVBORw0KGgo=";

struct NullNotifier;

#[async_trait::async_trait]
impl Notifier for NullNotifier {
    async fn send(&self, _message: &OutboundMessage) -> Result<(), CollaboratorError> {
        Ok(())
    }
}

struct PdfRenderer;

#[async_trait::async_trait]
impl DocumentRenderer for PdfRenderer {
    async fn render(&self, _view_url: &str) -> Result<Vec<u8>, CollaboratorError> {
        Ok(b"%PDF-1.4\n".to_vec())
    }
}

fn orchestrator(storage: &InMemoryDualsignStorage) -> SigningOrchestrator {
    let finalizer = Arc::new(FinalizationPipeline::new(
        Arc::new(storage.clone()),
        Arc::new(PdfRenderer),
        Arc::new(NullNotifier),
        FinalizationSettings::default(),
    ));
    SigningOrchestrator::new(
        Arc::new(storage.clone()),
        Arc::new(NamingConventionClassifier),
        Arc::new(NullNotifier),
        finalizer,
    )
}

/// Distinct customer role names.
fn arb_customer_roles() -> impl Strategy<Value = Vec<String>> {
    prop::collection::btree_set("[a-z]{1,8}", 2..6)
        .prop_map(|suffixes| suffixes.into_iter().map(|s| format!("customer_{s}")).collect())
}

/// Role identifiers with surrounding whitespace, case noise and duplicates.
fn arb_role_entries() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(
        (
            prop_oneof![Just("customer"), Just("Company"), Just("CUSTOMER"), Just("company")],
            "[a-z]{0,6}",
            prop_oneof![Just(""), Just(" "), Just("\t")],
        )
            .prop_map(|(prefix, rest, pad)| format!("{pad}{prefix}_{rest}{pad}")),
        0..12,
    )
}

proptest! {
    /// Extraction trims, drops duplicates and keeps first-seen order.
    #[test]
    fn extracted_roles_are_trimmed_unique_and_ordered(entries in arb_role_entries()) {
        let config = json!({ "signatures": entries.iter().map(|r| json!({"role": r})).collect::<Vec<_>>() });
        let roles = roles::extract_role_ids(&config).unwrap();

        let mut expected: Vec<String> = Vec::new();
        for entry in &entries {
            let trimmed = entry.trim().to_string();
            if !expected.contains(&trimmed) {
                expected.push(trimmed);
            }
        }
        prop_assert_eq!(roles, expected);
    }

    /// Every classified role lands in exactly one party set.
    #[test]
    fn partition_is_exhaustive_and_disjoint(entries in arb_role_entries()) {
        let config = json!({ "signatures": entries });
        let required = roles::derive_required_roles(&config, &NamingConventionClassifier).unwrap();
        prop_assert!(required.unclassified.is_empty());
        for role in &required.customer {
            prop_assert!(role.to_ascii_lowercase().contains("customer"));
            prop_assert!(!required.company.contains(role));
        }
        for role in &required.company {
            prop_assert!(!role.to_ascii_lowercase().contains("customer"));
        }
    }

    /// Submitting a strict subset keeps the contract pending and reports the rest.
    #[test]
    fn strict_subset_stays_pending(
        customer_roles in arb_customer_roles(),
        take in 1usize..5,
    ) {
        let take = take.min(customer_roles.len() - 1);
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let storage = InMemoryDualsignStorage::new();
            let orchestrator = orchestrator(&storage);
            let mut declared = customer_roles.clone();
            declared.push("company_witness".to_string());
            let contract = orchestrator
                .create_contract(ContractDraft {
                    config: json!({ "signatures": declared }),
                    company_email: "legal@company.test".to_string(),
                    customer_email: None,
                })
                .await
                .unwrap();

            let submitted: Vec<_> = customer_roles[..take]
                .iter()
                .map(|role| SubmittedSignature::new(role.clone(), PNG))
                .collect();
            let outcome = orchestrator
                .attempt_sign(&contract.document_id, Party::Customer, submitted)
                .await
                .unwrap();

            assert_eq!(outcome.status, ContractStatus::Pending);
            assert!(!outcome.transitioned);
            assert_eq!(outcome.missing_roles, customer_roles[take..].to_vec());
        });
    }

    /// Splitting the full customer set across calls transitions exactly once.
    #[test]
    fn split_submission_transitions_once(
        customer_roles in arb_customer_roles(),
        split in 1usize..5,
    ) {
        let split = split.min(customer_roles.len() - 1);
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let storage = InMemoryDualsignStorage::new();
            let orchestrator = orchestrator(&storage);
            let mut declared = customer_roles.clone();
            declared.push("company_witness".to_string());
            let contract = orchestrator
                .create_contract(ContractDraft {
                    config: json!({ "signatures": declared }),
                    company_email: "legal@company.test".to_string(),
                    customer_email: None,
                })
                .await
                .unwrap();

            let mut transitions = 0;
            for chunk in [&customer_roles[..split], &customer_roles[split..]] {
                let submitted = chunk
                    .iter()
                    .map(|role| SubmittedSignature::new(role.clone(), PNG))
                    .collect();
                let outcome = orchestrator
                    .attempt_sign(&contract.document_id, Party::Customer, submitted)
                    .await
                    .unwrap();
                if outcome.transitioned {
                    transitions += 1;
                }
            }
            assert_eq!(transitions, 1);
            let stored = orchestrator.get_contract(&contract.document_id).await.unwrap();
            assert_eq!(stored.status, ContractStatus::CustomerSigned);
        });
    }
}
