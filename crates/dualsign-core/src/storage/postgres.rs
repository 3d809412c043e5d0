//! PostgreSQL storage backend.
//!
//! The transactional source of truth. A signing transaction is a real
//! database transaction that locks the contract row with `SELECT ... FOR
//! UPDATE`; dropping it without commit rolls everything back.

use super::traits::{ContractStore, SignatureStore, SigningTransaction};
use super::{StorageError, StorageResult};
use crate::signature::{sort_signatures, validate_upsert};
use crate::types::{
    ContractRecord, ContractStatus, NewContract, Party, SignatureRecord, SignatureUpsert,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};

const CONTRACT_COLUMNS: &str = "contract_id, document_id, config, status, company_email, \
     customer_email, created_at, updated_at, final_sent_at";

const SIGNATURE_COLUMNS: &str =
    "contract_id, role, image, signer_name, signer_title, party, signed_at";

/// PostgreSQL-backed dual-signature storage.
#[derive(Clone)]
pub struct PostgresDualsignStorage {
    pool: PgPool,
}

impl PostgresDualsignStorage {
    /// Connect to PostgreSQL and initialize required schema.
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        Self::connect_with_options(database_url, 10, 5).await
    }

    /// Connect with explicit pool parameters.
    pub async fn connect_with_options(
        database_url: &str,
        max_connections: u32,
        connect_timeout_secs: u64,
    ) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(std::time::Duration::from_secs(connect_timeout_secs))
            .connect(database_url)
            .await
            .map_err(|e| StorageError::Backend(format!("failed to connect postgres: {e}")))?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create adapter from an existing pool.
    pub async fn from_pool(pool: PgPool) -> StorageResult<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn init_schema(&self) -> StorageResult<()> {
        let ddl = [
            r#"
            CREATE TABLE IF NOT EXISTS dualsign_contracts (
                contract_id BIGSERIAL PRIMARY KEY,
                document_id TEXT NOT NULL UNIQUE,
                config JSONB NOT NULL,
                status TEXT NOT NULL,
                company_email TEXT NOT NULL,
                customer_email TEXT,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                final_sent_at TIMESTAMPTZ
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS dualsign_signatures (
                signature_id BIGSERIAL PRIMARY KEY,
                contract_id BIGINT NOT NULL REFERENCES dualsign_contracts (contract_id),
                role TEXT NOT NULL,
                image TEXT NOT NULL,
                signer_name TEXT,
                signer_title TEXT,
                party TEXT NOT NULL,
                signed_at TIMESTAMPTZ NOT NULL,
                UNIQUE (contract_id, role)
            )
            "#,
        ];

        for stmt in ddl {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(format!("schema init failed: {e}")))?;
        }
        Ok(())
    }

    async fn contract_id(&self, document_id: &str) -> StorageResult<i64> {
        let row = sqlx::query("SELECT contract_id FROM dualsign_contracts WHERE document_id = $1")
            .bind(document_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?
            .ok_or_else(|| StorageError::NotFound(document_id.to_string()))?;
        row.try_get("contract_id")
            .map_err(|e| StorageError::Backend(e.to_string()))
    }
}

#[async_trait]
impl ContractStore for PostgresDualsignStorage {
    async fn create_contract(&self, contract: NewContract) -> StorageResult<ContractRecord> {
        let now = Utc::now();
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO dualsign_contracts
                (document_id, config, status, company_email, customer_email, created_at, updated_at, final_sent_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6, NULL)
            RETURNING {CONTRACT_COLUMNS}
            "#
        ))
        .bind(&contract.document_id)
        .bind(&contract.config)
        .bind(ContractStatus::Pending.as_str())
        .bind(&contract.company_email)
        .bind(&contract.customer_email)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_conflict)?;

        contract_row_to_record(row)
    }

    async fn get_contract(&self, document_id: &str) -> StorageResult<Option<ContractRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {CONTRACT_COLUMNS} FROM dualsign_contracts WHERE document_id = $1"
        ))
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        row.map(contract_row_to_record).transpose()
    }

    async fn begin_signing(
        &self,
        document_id: &str,
    ) -> StorageResult<Option<Box<dyn SigningTransaction>>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let row = sqlx::query(&format!(
            "SELECT {CONTRACT_COLUMNS} FROM dualsign_contracts WHERE document_id = $1 FOR UPDATE"
        ))
        .bind(document_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let contract = contract_row_to_record(row)?;
        Ok(Some(Box::new(PostgresSigningTransaction {
            tx: Some(tx),
            contract,
        })))
    }

    async fn mark_final_sent(
        &self,
        document_id: &str,
        sent_at: DateTime<Utc>,
    ) -> StorageResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE dualsign_contracts
               SET final_sent_at = $1,
                   updated_at = $1
             WHERE document_id = $2
               AND status = $3
               AND final_sent_at IS NULL
            "#,
        )
        .bind(sent_at)
        .bind(document_id)
        .bind(ContractStatus::Completed.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }
        self.contract_id(document_id).await?;
        Ok(false)
    }

    fn backend_label(&self) -> &'static str {
        "postgres"
    }
}

#[async_trait]
impl SignatureStore for PostgresDualsignStorage {
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
        let contract_id = self.contract_id(document_id).await?;
        let rows = sqlx::query(&format!(
            "SELECT {SIGNATURE_COLUMNS} FROM dualsign_signatures WHERE contract_id = $1"
        ))
        .bind(contract_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        let mut records = rows
            .into_iter()
            .map(signature_row_to_record)
            .collect::<StorageResult<Vec<_>>>()?;
        sort_signatures(&mut records);
        Ok(records)
    }
}

struct PostgresSigningTransaction {
    tx: Option<Transaction<'static, Postgres>>,
    contract: ContractRecord,
}

impl PostgresSigningTransaction {
    fn open(&mut self) -> StorageResult<&mut Transaction<'static, Postgres>> {
        self.tx.as_mut().ok_or_else(|| {
            StorageError::InvariantViolation("signing transaction already committed".to_string())
        })
    }
}

#[async_trait]
impl SigningTransaction for PostgresSigningTransaction {
    fn contract(&self) -> &ContractRecord {
        &self.contract
    }

    async fn upsert_signature(
        &mut self,
        signature: SignatureUpsert,
    ) -> StorageResult<SignatureRecord> {
        validate_upsert(&signature)?;
        let contract_id = self.contract.contract_id;
        let tx = self.open()?;

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO dualsign_signatures
                (contract_id, role, image, signer_name, signer_title, party, signed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (contract_id, role) DO UPDATE
               SET image = EXCLUDED.image,
                   signer_name = EXCLUDED.signer_name,
                   signer_title = EXCLUDED.signer_title,
                   party = EXCLUDED.party,
                   signed_at = EXCLUDED.signed_at
            RETURNING {SIGNATURE_COLUMNS}
            "#
        ))
        .bind(contract_id)
        .bind(signature.role.trim())
        .bind(&signature.image)
        .bind(&signature.signer_name)
        .bind(&signature.signer_title)
        .bind(signature.party.as_str())
        .bind(Utc::now())
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        signature_row_to_record(row)
    }

    async fn list_signatures(&mut self) -> StorageResult<Vec<SignatureRecord>> {
        let contract_id = self.contract.contract_id;
        let tx = self.open()?;
        let rows = sqlx::query(&format!(
            "SELECT {SIGNATURE_COLUMNS} FROM dualsign_signatures WHERE contract_id = $1"
        ))
        .bind(contract_id)
        .fetch_all(&mut **tx)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        let mut records = rows
            .into_iter()
            .map(signature_row_to_record)
            .collect::<StorageResult<Vec<_>>>()?;
        sort_signatures(&mut records);
        Ok(records)
    }

    async fn set_status(&mut self, from: ContractStatus, to: ContractStatus) -> StorageResult<()> {
        let contract_id = self.contract.contract_id;
        let now = Utc::now();
        let tx = self.open()?;
        let result = sqlx::query(
            r#"
            UPDATE dualsign_contracts
               SET status = $1,
                   updated_at = $2
             WHERE contract_id = $3
               AND status = $4
            "#,
        )
        .bind(to.as_str())
        .bind(now)
        .bind(contract_id)
        .bind(from.as_str())
        .execute(&mut **tx)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        if result.rows_affected() != 1 {
            return Err(StorageError::InvariantViolation(format!(
                "invalid status transition for {}: expected {from}, found {}",
                self.contract.document_id, self.contract.status
            )));
        }
        self.contract.status = to;
        self.contract.updated_at = now;
        Ok(())
    }

    async fn commit(&mut self) -> StorageResult<ContractRecord> {
        let tx = self.tx.take().ok_or_else(|| {
            StorageError::InvariantViolation("signing transaction already committed".to_string())
        })?;
        tx.commit()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(self.contract.clone())
    }
}

fn contract_row_to_record(row: PgRow) -> StorageResult<ContractRecord> {
    let status: String = row
        .try_get("status")
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    Ok(ContractRecord {
        contract_id: row
            .try_get("contract_id")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        document_id: row
            .try_get("document_id")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        config: row
            .try_get("config")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        status: status
            .parse::<ContractStatus>()
            .map_err(StorageError::Serialization)?,
        company_email: row
            .try_get("company_email")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        customer_email: row
            .try_get("customer_email")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        created_at: row
            .try_get("created_at")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        updated_at: row
            .try_get("updated_at")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        final_sent_at: row
            .try_get("final_sent_at")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
    })
}

fn signature_row_to_record(row: PgRow) -> StorageResult<SignatureRecord> {
    let party: String = row
        .try_get("party")
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    Ok(SignatureRecord {
        contract_id: row
            .try_get("contract_id")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        role: row
            .try_get("role")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        image: row
            .try_get("image")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        signer_name: row
            .try_get("signer_name")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        signer_title: row
            .try_get("signer_title")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        party: party.parse::<Party>().map_err(StorageError::Serialization)?,
        signed_at: row
            .try_get("signed_at")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
    })
}

fn map_sqlx_conflict(err: sqlx::Error) -> StorageError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23505") {
            return StorageError::Conflict(db_err.message().to_string());
        }
    }
    StorageError::Backend(err.to_string())
}
