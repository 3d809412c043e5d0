//! Contract and signature persistence.
//!
//! Postgres is the production source of truth; the in-memory backend mirrors
//! its locking and transaction semantics for tests and single-node runs.

mod error;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
mod traits;

pub use error::{StorageError, StorageResult};
pub use memory::InMemoryDualsignStorage;
pub use traits::{ContractStore, DualsignStorage, SignatureStore, SigningTransaction};
