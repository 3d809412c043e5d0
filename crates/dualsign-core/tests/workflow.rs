use async_trait::async_trait;
use dualsign_core::*;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const PNG: &str = "data:image/png;base64,iVBORw0KGgo=";

#[derive(Default)]
struct Outbox {
    messages: Mutex<Vec<OutboundMessage>>,
}

impl Outbox {
    fn finals(&self) -> usize {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| !m.attachments.is_empty())
            .count()
    }

    fn handoffs(&self) -> usize {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.attachments.is_empty())
            .count()
    }
}

#[async_trait]
impl Notifier for Outbox {
    async fn send(&self, message: &OutboundMessage) -> Result<(), CollaboratorError> {
        self.messages.lock().unwrap().push(message.clone());
        Ok(())
    }
}

#[derive(Default)]
struct SlowRenderer {
    calls: AtomicUsize,
}

#[async_trait]
impl DocumentRenderer for SlowRenderer {
    async fn render(&self, view_url: &str) -> Result<Vec<u8>, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        Ok(format!("%PDF-1.4\n% {view_url}\n").into_bytes())
    }
}

struct AppendingCountersigner;

#[async_trait]
impl Countersigner for AppendingCountersigner {
    async fn countersign(&self, mut pdf: Vec<u8>) -> Result<Vec<u8>, CollaboratorError> {
        pdf.extend_from_slice(b"% signed\n");
        Ok(pdf)
    }
}

struct World {
    storage: InMemoryDualsignStorage,
    outbox: Arc<Outbox>,
    renderer: Arc<SlowRenderer>,
    orchestrator: Arc<SigningOrchestrator>,
}

fn world(countersign: bool) -> World {
    let storage = InMemoryDualsignStorage::new();
    let outbox = Arc::new(Outbox::default());
    let renderer = Arc::new(SlowRenderer::default());
    let mut pipeline = FinalizationPipeline::new(
        Arc::new(storage.clone()),
        renderer.clone(),
        outbox.clone(),
        FinalizationSettings {
            view_base_url: "https://sign.example.test/view/".to_string(),
            ..FinalizationSettings::default()
        },
    );
    if countersign {
        pipeline = pipeline.with_countersigner(Arc::new(AppendingCountersigner));
    }
    let orchestrator = SigningOrchestrator::new(
        Arc::new(storage.clone()),
        Arc::new(NamingConventionClassifier),
        outbox.clone(),
        Arc::new(pipeline),
    );
    World {
        storage,
        outbox,
        renderer,
        orchestrator: Arc::new(orchestrator),
    }
}

async fn create(world: &World, roles: &[&str]) -> String {
    world
        .orchestrator
        .create_contract(ContractDraft {
            config: json!({ "signatures": roles.iter().map(|r| json!({"role": r})).collect::<Vec<_>>() }),
            company_email: "legal@company.test".to_string(),
            customer_email: Some("buyer@customer.test".to_string()),
        })
        .await
        .unwrap()
        .document_id
}

#[tokio::test]
async fn end_to_end_director_and_witness() {
    let world = world(true);
    let id = create(&world, &["customer_director", "company_witness"]).await;

    let outcome = world
        .orchestrator
        .attempt_sign(
            &id,
            Party::Customer,
            vec![SubmittedSignature::new("customer_director", PNG).with_signer("Ada Lovelace", "Director")],
        )
        .await
        .unwrap();
    assert_eq!(outcome.status, ContractStatus::CustomerSigned);
    assert!(outcome.missing_roles.is_empty());
    assert_eq!(world.outbox.handoffs(), 1);

    let outcome = world
        .orchestrator
        .attempt_sign(
            &id,
            Party::Company,
            vec![SubmittedSignature::new("company_witness", PNG)],
        )
        .await
        .unwrap();
    assert_eq!(outcome.status, ContractStatus::Completed);
    match outcome.finalization {
        Some(FinalizationReport::Sent {
            recipients,
            countersigned,
            ..
        }) => {
            assert_eq!(recipients, vec!["legal@company.test", "buyer@customer.test"]);
            assert!(countersigned);
        }
        other => panic!("unexpected finalization: {other:?}"),
    }
    assert_eq!(world.outbox.finals(), 1);

    let contract = world.orchestrator.get_contract(&id).await.unwrap();
    assert!(contract.final_sent_at.is_some());

    let signatures = world.orchestrator.list_signatures(&id).await.unwrap();
    let parties: Vec<_> = signatures.iter().map(|s| s.party).collect();
    assert_eq!(parties, vec![Party::Customer, Party::Company]);
    assert_eq!(signatures[0].signer_name.as_deref(), Some("Ada Lovelace"));

    let err = world
        .orchestrator
        .attempt_sign(
            &id,
            Party::Company,
            vec![SubmittedSignature::new("company_witness", PNG)],
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert_eq!(world.outbox.finals(), 1);

    let messages = world.outbox.messages.lock().unwrap().clone();
    let last = messages.last().unwrap();
    assert_eq!(last.attachments[0].filename, format!("{id}.pdf"));
    let pdf = String::from_utf8_lossy(&last.attachments[0].bytes).to_string();
    assert!(pdf.contains(&format!("https://sign.example.test/view/{id}")));
    assert!(pdf.ends_with("% signed\n"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_customer_signers_transition_exactly_once() {
    let world = world(false);
    let roles = [
        "customer_director",
        "customer_cfo",
        "customer_counsel",
        "customer_secretary",
        "company_witness",
    ];
    let id = create(&world, &roles).await;

    let handles: Vec<_> = roles[..4]
        .iter()
        .map(|role| {
            let orchestrator = world.orchestrator.clone();
            let id = id.clone();
            let role = role.to_string();
            tokio::spawn(async move {
                orchestrator
                    .attempt_sign(&id, Party::Customer, vec![SubmittedSignature::new(role, PNG)])
                    .await
                    .unwrap()
            })
        })
        .collect();

    let mut transitions = 0;
    for handle in handles {
        if handle.await.unwrap().transitioned {
            transitions += 1;
        }
    }
    assert_eq!(transitions, 1);
    assert_eq!(world.outbox.handoffs(), 1);
    assert_eq!(world.storage.list_signatures(&id).await.unwrap().len(), 4);
    let contract = world.storage.get_contract(&id).await.unwrap().unwrap();
    assert_eq!(contract.status, ContractStatus::CustomerSigned);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_company_and_finalize_retry_send_once() {
    let world = world(false);
    let id = create(&world, &["customer_director", "company_witness"]).await;
    world
        .orchestrator
        .attempt_sign(
            &id,
            Party::Customer,
            vec![SubmittedSignature::new("customer_director", PNG)],
        )
        .await
        .unwrap();

    let signer = {
        let orchestrator = world.orchestrator.clone();
        let id = id.clone();
        tokio::spawn(async move {
            orchestrator
                .attempt_sign(
                    &id,
                    Party::Company,
                    vec![SubmittedSignature::new("company_witness", PNG)],
                )
                .await
        })
    };
    let retries: Vec<_> = (0..3)
        .map(|_| {
            let orchestrator = world.orchestrator.clone();
            let id = id.clone();
            tokio::spawn(async move { orchestrator.finalize(&id).await })
        })
        .collect();

    let outcome = signer.await.unwrap().unwrap();
    assert_eq!(outcome.status, ContractStatus::Completed);
    for retry in retries {
        // Retries that ran before completion are rejected; the rest collapse.
        match retry.await.unwrap() {
            Ok(report) => assert!(matches!(
                report,
                FinalizationReport::Sent { .. } | FinalizationReport::AlreadySent { .. }
            )),
            Err(err) => assert_eq!(err.kind(), ErrorKind::InvalidState),
        }
    }

    assert_eq!(world.outbox.finals(), 1);
    assert_eq!(world.renderer.calls.load(Ordering::SeqCst), 1);
    let contract = world.storage.get_contract(&id).await.unwrap().unwrap();
    assert!(contract.final_sent_at.is_some());
}
