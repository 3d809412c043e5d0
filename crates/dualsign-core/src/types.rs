use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// One of the two signer sides of a contract.
///
/// Ordering puts the customer first; listings and groupings rely on it for
/// stable, human-scannable output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Party {
    Customer,
    Company,
}

impl Party {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Company => "company",
        }
    }
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Party {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "customer" => Ok(Self::Customer),
            "company" => Ok(Self::Company),
            other => Err(format!("unknown party `{other}`")),
        }
    }
}

/// Contract lifecycle status. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContractStatus {
    Pending,
    CustomerSigned,
    Completed,
}

impl ContractStatus {
    /// Persisted representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::CustomerSigned => "customer_signed",
            Self::Completed => "completed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl fmt::Display for ContractStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContractStatus {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "pending" => Ok(Self::Pending),
            "customer_signed" => Ok(Self::CustomerSigned),
            "completed" => Ok(Self::Completed),
            other => Err(format!("unknown contract status `{other}`")),
        }
    }
}

/// Generate a fresh document identifier.
pub fn new_document_id() -> String {
    format!("doc-{}", Uuid::new_v4())
}

/// Persistent contract record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractRecord {
    pub contract_id: i64,
    pub document_id: String,
    pub config: Value,
    pub status: ContractStatus,
    pub company_email: String,
    pub customer_email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub final_sent_at: Option<DateTime<Utc>>,
}

/// Contract insert payload. Identity and timestamps are assigned by storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewContract {
    pub document_id: String,
    pub config: Value,
    pub company_email: String,
    pub customer_email: Option<String>,
}

/// Current signature for one `(contract, role)` slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureRecord {
    pub contract_id: i64,
    pub role: String,
    pub image: String,
    pub signer_name: Option<String>,
    pub signer_title: Option<String>,
    pub party: Party,
    pub signed_at: DateTime<Utc>,
}

/// Signature write issued against the store; the timestamp is assigned on write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureUpsert {
    pub role: String,
    pub party: Party,
    pub image: String,
    pub signer_name: Option<String>,
    pub signer_title: Option<String>,
}

/// One signature item as submitted by a signer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmittedSignature {
    pub role: String,
    pub image: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

impl SubmittedSignature {
    pub fn new(role: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            image: image.into(),
            name: None,
            title: None,
        }
    }

    pub fn with_signer(mut self, name: impl Into<String>, title: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self.title = Some(title.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_roundtrips_through_storage_form() {
        for status in [
            ContractStatus::Pending,
            ContractStatus::CustomerSigned,
            ContractStatus::Completed,
        ] {
            assert_eq!(status.as_str().parse::<ContractStatus>(), Ok(status));
        }
        assert!("signed".parse::<ContractStatus>().is_err());
    }

    #[test]
    fn party_parses_case_insensitively() {
        assert_eq!(" Company ".parse::<Party>(), Ok(Party::Company));
        assert!("vendor".parse::<Party>().is_err());
        assert!(Party::Customer < Party::Company);
    }

    #[test]
    fn document_ids_are_prefixed_and_unique() {
        let a = new_document_id();
        let b = new_document_id();
        assert!(a.starts_with("doc-"));
        assert_ne!(a, b);
    }
}
