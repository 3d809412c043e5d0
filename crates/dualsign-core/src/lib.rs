//! Two-party contract signing workflow engine.
//!
//! A contract is signed first by every required customer role, then by every
//! required company role. Required roles are derived from the contract's
//! configuration on every attempt. Once the company side completes, the
//! finalization pipeline renders the document, optionally countersigns it
//! through an external authority and emails it to both parties exactly once.
//!
//! Design stance:
//! - Each signing attempt is one storage transaction holding the contract lock.
//! - Network calls (handoff notification, rendering, countersigning, email)
//!   happen only after commit and never roll back a committed transition.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

pub mod collab;
mod error;
pub mod finalize;
mod locks;
pub mod machine;
pub mod orchestrator;
pub mod roles;
pub mod signature;
pub mod storage;
mod types;

#[cfg(test)]
mod test_support;

pub use collab::{
    looks_like_pdf, Attachment, CollaboratorError, Countersigner, DocumentRenderer, Notifier,
    OutboundMessage,
};
pub use error::{ErrorKind, SigningError};
pub use finalize::{FinalizationPipeline, FinalizationReport, FinalizationSettings};
pub use locks::KeyedLocks;
pub use machine::StateViolation;
pub use orchestrator::{
    ContractDraft, HandoffSettings, SigningOrchestrator, SigningOutcome, SigningWarning,
};
pub use roles::{NamingConventionClassifier, RequiredRoles, RoleClass, RoleClassifier};
pub use storage::{
    ContractStore, DualsignStorage, InMemoryDualsignStorage, SignatureStore, SigningTransaction,
    StorageError, StorageResult,
};
pub use types::{
    new_document_id, ContractRecord, ContractStatus, NewContract, Party, SignatureRecord,
    SignatureUpsert, SubmittedSignature,
};
