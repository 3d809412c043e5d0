//! In-memory storage backend.
//!
//! Signing transactions hold a per-contract async lock for their whole
//! lifetime and stage writes locally, so an aborted transaction leaves no
//! trace. Deterministic and test-friendly; production deployments should
//! use the PostgreSQL backend.

use super::traits::{ContractStore, SignatureStore, SigningTransaction};
use super::{StorageError, StorageResult};
use crate::locks::KeyedLocks;
use crate::signature::{sort_signatures, validate_upsert};
use crate::types::{
    ContractRecord, ContractStatus, NewContract, SignatureRecord, SignatureUpsert,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::OwnedMutexGuard;

#[derive(Default)]
struct Inner {
    contracts: RwLock<HashMap<String, ContractRecord>>,
    signatures: RwLock<HashMap<i64, BTreeMap<String, SignatureRecord>>>,
    next_contract_id: AtomicI64,
    locks: KeyedLocks,
}

/// In-memory dual-signature storage.
#[derive(Clone, Default)]
pub struct InMemoryDualsignStorage {
    inner: Arc<Inner>,
}

impl InMemoryDualsignStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Inner {
    fn contract(&self, document_id: &str) -> StorageResult<Option<ContractRecord>> {
        let guard = self
            .contracts
            .read()
            .map_err(|_| StorageError::Backend("contracts lock poisoned".to_string()))?;
        Ok(guard.get(document_id).cloned())
    }

    fn committed_signatures(&self, contract_id: i64) -> StorageResult<BTreeMap<String, SignatureRecord>> {
        let guard = self
            .signatures
            .read()
            .map_err(|_| StorageError::Backend("signatures lock poisoned".to_string()))?;
        Ok(guard.get(&contract_id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl ContractStore for InMemoryDualsignStorage {
    async fn create_contract(&self, contract: NewContract) -> StorageResult<ContractRecord> {
        let mut guard = self
            .inner
            .contracts
            .write()
            .map_err(|_| StorageError::Backend("contracts lock poisoned".to_string()))?;

        if guard.contains_key(&contract.document_id) {
            return Err(StorageError::Conflict(format!(
                "contract {} already exists",
                contract.document_id
            )));
        }

        let now = Utc::now();
        let record = ContractRecord {
            contract_id: self.inner.next_contract_id.fetch_add(1, Ordering::SeqCst) + 1,
            document_id: contract.document_id,
            config: contract.config,
            status: ContractStatus::Pending,
            company_email: contract.company_email,
            customer_email: contract.customer_email,
            created_at: now,
            updated_at: now,
            final_sent_at: None,
        };
        guard.insert(record.document_id.clone(), record.clone());
        Ok(record)
    }

    async fn get_contract(&self, document_id: &str) -> StorageResult<Option<ContractRecord>> {
        self.inner.contract(document_id)
    }

    async fn begin_signing(
        &self,
        document_id: &str,
    ) -> StorageResult<Option<Box<dyn SigningTransaction>>> {
        let guard = self.inner.locks.acquire(document_id).await;
        let Some(contract) = self.inner.contract(document_id)? else {
            return Ok(None);
        };
        Ok(Some(Box::new(MemorySigningTransaction {
            inner: self.inner.clone(),
            guard: Some(guard),
            original_status: contract.status,
            contract,
            staged_signatures: BTreeMap::new(),
        })))
    }

    async fn mark_final_sent(
        &self,
        document_id: &str,
        sent_at: DateTime<Utc>,
    ) -> StorageResult<bool> {
        let mut guard = self
            .inner
            .contracts
            .write()
            .map_err(|_| StorageError::Backend("contracts lock poisoned".to_string()))?;
        let record = guard
            .get_mut(document_id)
            .ok_or_else(|| StorageError::NotFound(document_id.to_string()))?;

        if record.status != ContractStatus::Completed || record.final_sent_at.is_some() {
            return Ok(false);
        }
        record.final_sent_at = Some(sent_at);
        record.updated_at = sent_at;
        Ok(true)
    }

    fn backend_label(&self) -> &'static str {
        "memory"
    }
}

#[async_trait]
impl SignatureStore for InMemoryDualsignStorage {
    async fn upsert_signature(
        &self,
        document_id: &str,
        signature: SignatureUpsert,
    ) -> StorageResult<SignatureRecord> {
        let mut tx = self
            .begin_signing(document_id)
            .await?
            .ok_or_else(|| StorageError::NotFound(document_id.to_string()))?;
        let record = tx.upsert_signature(signature).await?;
        tx.commit().await?;
        Ok(record)
    }

    async fn list_signatures(&self, document_id: &str) -> StorageResult<Vec<SignatureRecord>> {
        let contract = self
            .inner
            .contract(document_id)?
            .ok_or_else(|| StorageError::NotFound(document_id.to_string()))?;
        let mut rows: Vec<_> = self
            .inner
            .committed_signatures(contract.contract_id)?
            .into_values()
            .collect();
        sort_signatures(&mut rows);
        Ok(rows)
    }
}

struct MemorySigningTransaction {
    inner: Arc<Inner>,
    guard: Option<OwnedMutexGuard<()>>,
    original_status: ContractStatus,
    contract: ContractRecord,
    staged_signatures: BTreeMap<String, SignatureRecord>,
}

impl MemorySigningTransaction {
    fn ensure_open(&self) -> StorageResult<()> {
        if self.guard.is_none() {
            return Err(StorageError::InvariantViolation(
                "signing transaction already committed".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl SigningTransaction for MemorySigningTransaction {
    fn contract(&self) -> &ContractRecord {
        &self.contract
    }

    async fn upsert_signature(
        &mut self,
        signature: SignatureUpsert,
    ) -> StorageResult<SignatureRecord> {
        self.ensure_open()?;
        validate_upsert(&signature)?;

        let record = SignatureRecord {
            contract_id: self.contract.contract_id,
            role: signature.role.trim().to_string(),
            image: signature.image,
            signer_name: signature.signer_name,
            signer_title: signature.signer_title,
            party: signature.party,
            signed_at: Utc::now(),
        };
        self.staged_signatures
            .insert(record.role.clone(), record.clone());
        Ok(record)
    }

    async fn list_signatures(&mut self) -> StorageResult<Vec<SignatureRecord>> {
        self.ensure_open()?;
        let mut current = self.inner.committed_signatures(self.contract.contract_id)?;
        for (role, record) in &self.staged_signatures {
            current.insert(role.clone(), record.clone());
        }
        let mut rows: Vec<_> = current.into_values().collect();
        sort_signatures(&mut rows);
        Ok(rows)
    }

    async fn set_status(&mut self, from: ContractStatus, to: ContractStatus) -> StorageResult<()> {
        self.ensure_open()?;
        if self.contract.status != from {
            return Err(StorageError::InvariantViolation(format!(
                "invalid status transition for {}: expected {from}, found {}",
                self.contract.document_id, self.contract.status
            )));
        }
        self.contract.status = to;
        self.contract.updated_at = Utc::now();
        Ok(())
    }

    async fn commit(&mut self) -> StorageResult<ContractRecord> {
        self.ensure_open()?;

        // Signatures land before the status so a reader that observes the new
        // status also observes every signature that justified it.
        if !self.staged_signatures.is_empty() {
            let mut guard = self
                .inner
                .signatures
                .write()
                .map_err(|_| StorageError::Backend("signatures lock poisoned".to_string()))?;
            let slots = guard.entry(self.contract.contract_id).or_default();
            for (role, record) in std::mem::take(&mut self.staged_signatures) {
                slots.insert(role, record);
            }
        }

        let committed = {
            let mut guard = self
                .inner
                .contracts
                .write()
                .map_err(|_| StorageError::Backend("contracts lock poisoned".to_string()))?;
            let record = guard
                .get_mut(&self.contract.document_id)
                .ok_or_else(|| StorageError::NotFound(self.contract.document_id.clone()))?;
            if record.status != self.original_status {
                return Err(StorageError::InvariantViolation(format!(
                    "contract {} changed status outside its lock",
                    self.contract.document_id
                )));
            }
            if self.contract.status != self.original_status {
                record.status = self.contract.status;
                record.updated_at = self.contract.updated_at;
            }
            record.clone()
        };

        self.contract = committed.clone();
        self.original_status = committed.status;
        self.guard = None;
        Ok(committed)
    }
}
