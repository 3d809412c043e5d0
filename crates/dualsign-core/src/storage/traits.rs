use super::StorageResult;
use crate::types::{ContractRecord, ContractStatus, NewContract, SignatureRecord, SignatureUpsert};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Storage interface for contract lifecycle records.
#[async_trait]
pub trait ContractStore: Send + Sync {
    /// Insert a new contract in the pending state.
    async fn create_contract(&self, contract: NewContract) -> StorageResult<ContractRecord>;

    /// Get one contract by document identifier.
    async fn get_contract(&self, document_id: &str) -> StorageResult<Option<ContractRecord>>;

    /// Open a signing transaction holding the contract's exclusive lock.
    ///
    /// Returns `None` when the contract does not exist. Dropping the
    /// transaction without committing discards every staged write.
    async fn begin_signing(
        &self,
        document_id: &str,
    ) -> StorageResult<Option<Box<dyn SigningTransaction>>>;

    /// Set `final_sent_at` only if it is still unset and the contract is completed.
    ///
    /// Returns `false` when another writer got there first.
    async fn mark_final_sent(
        &self,
        document_id: &str,
        sent_at: DateTime<Utc>,
    ) -> StorageResult<bool>;

    fn backend_label(&self) -> &'static str;
}

/// Storage interface for per-role signatures.
#[async_trait]
pub trait SignatureStore: Send + Sync {
    /// Write the current signature for `(contract, role)` in its own transaction.
    async fn upsert_signature(
        &self,
        document_id: &str,
        signature: SignatureUpsert,
    ) -> StorageResult<SignatureRecord>;

    /// All signatures of a contract ordered by party, role, then signing time.
    async fn list_signatures(&self, document_id: &str) -> StorageResult<Vec<SignatureRecord>>;
}

/// One atomic unit of work against a single locked contract.
#[async_trait]
pub trait SigningTransaction: Send {
    /// Contract as read under the lock, including staged status changes.
    fn contract(&self) -> &ContractRecord;

    async fn upsert_signature(&mut self, signature: SignatureUpsert)
        -> StorageResult<SignatureRecord>;

    /// Signatures as seen by this transaction, staged writes included.
    async fn list_signatures(&mut self) -> StorageResult<Vec<SignatureRecord>>;

    /// Move the contract from `from` to `to`; fails if the status is not `from`.
    async fn set_status(&mut self, from: ContractStatus, to: ContractStatus)
        -> StorageResult<()>;

    /// Make all staged writes durable and release the lock.
    async fn commit(&mut self) -> StorageResult<ContractRecord>;
}

/// Unified storage bundle used by the signing workflow.
pub trait DualsignStorage: ContractStore + SignatureStore + Send + Sync {}

impl<T> DualsignStorage for T where T: ContractStore + SignatureStore + Send + Sync {}
