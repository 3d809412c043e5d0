//! Required-role derivation from a contract configuration.
//!
//! Roles come from `config.signatures[*].role` (falling back to `.id`, or the
//! entry itself when it is a bare string). They are trimmed, deduplicated in
//! first-seen order, and partitioned per party by a [`RoleClassifier`].

use crate::error::SigningError;
use crate::signature::validate_role;
use crate::types::Party;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;

/// Classification of a single role identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleClass {
    Customer,
    Company,
    Unclassified,
}

/// Decides which party owns a role.
pub trait RoleClassifier: Send + Sync {
    fn classify(&self, role: &str) -> RoleClass;
}

/// Substring convention: `customer` wins over `company`; matching is case-insensitive.
#[derive(Debug, Clone, Copy, Default)]
pub struct NamingConventionClassifier;

impl RoleClassifier for NamingConventionClassifier {
    fn classify(&self, role: &str) -> RoleClass {
        let lowered = role.to_ascii_lowercase();
        if lowered.contains("customer") {
            RoleClass::Customer
        } else if lowered.contains("company") {
            RoleClass::Company
        } else {
            RoleClass::Unclassified
        }
    }
}

/// Required roles partitioned by signer party.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RequiredRoles {
    pub customer: Vec<String>,
    pub company: Vec<String>,
    pub unclassified: Vec<String>,
}

impl RequiredRoles {
    pub fn for_party(&self, party: Party) -> &[String] {
        match party {
            Party::Customer => &self.customer,
            Party::Company => &self.company,
        }
    }

    pub fn contains(&self, party: Party, role: &str) -> bool {
        self.for_party(party).iter().any(|r| r == role)
    }

    pub fn is_empty(&self) -> bool {
        self.customer.is_empty() && self.company.is_empty() && self.unclassified.is_empty()
    }

    /// Reject configurations listing roles no party can ever satisfy.
    pub fn ensure_classified(&self) -> Result<(), SigningError> {
        if self.unclassified.is_empty() {
            return Ok(());
        }
        tracing::warn!(
            roles = ?self.unclassified,
            "configuration lists roles matching neither customer nor company"
        );
        Err(SigningError::config(format!(
            "required roles [{}] match neither the customer nor the company naming convention",
            self.unclassified.join(", ")
        )))
    }

    /// The party's required set; empty means the configuration cannot be signed by it.
    pub fn require_party(&self, party: Party) -> Result<&[String], SigningError> {
        let roles = self.for_party(party);
        if roles.is_empty() {
            return Err(SigningError::config(format!(
                "configuration declares no {party} signature roles"
            )));
        }
        Ok(roles)
    }
}

/// Extract the ordered, deduplicated role identifiers declared in `config`.
pub fn extract_role_ids(config: &Value) -> Result<Vec<String>, SigningError> {
    let parsed;
    let config = match config {
        Value::String(raw) => {
            parsed = serde_json::from_str::<Value>(raw)
                .map_err(|e| SigningError::config(format!("configuration is not JSON: {e}")))?;
            &parsed
        }
        other => other,
    };

    let object = config
        .as_object()
        .ok_or_else(|| SigningError::config("configuration must be a JSON object"))?;

    let entries = match object.get("signatures") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(entries)) => entries,
        Some(_) => return Err(SigningError::config("`signatures` must be an array")),
    };

    let mut seen = HashSet::new();
    let mut roles = Vec::new();
    for (index, entry) in entries.iter().enumerate() {
        let candidate = match entry {
            Value::String(role) => Some(role.as_str()),
            Value::Object(fields) => fields
                .get("role")
                .and_then(Value::as_str)
                .filter(|role| !role.trim().is_empty())
                .or_else(|| fields.get("id").and_then(Value::as_str)),
            _ => {
                return Err(SigningError::config(format!(
                    "signatures[{index}] must be an object or a string"
                )))
            }
        };

        let Some(role) = candidate.map(str::trim).filter(|role| !role.is_empty()) else {
            continue;
        };
        if seen.insert(role.to_string()) {
            roles.push(role.to_string());
        }
    }

    Ok(roles)
}

/// Derive and partition the required roles of a configuration.
///
/// A role no signer could ever submit (see [`validate_role`]) is a
/// configuration error, not something to discover at signing time.
pub fn derive_required_roles(
    config: &Value,
    classifier: &dyn RoleClassifier,
) -> Result<RequiredRoles, SigningError> {
    let mut required = RequiredRoles::default();
    for role in extract_role_ids(config)? {
        validate_role(&role).map_err(|err| {
            tracing::warn!(role = %role, error = %err, "configuration lists an unsignable role");
            SigningError::config(format!("required {err}"))
        })?;
        match classifier.classify(&role) {
            RoleClass::Customer => required.customer.push(role),
            RoleClass::Company => required.company.push(role),
            RoleClass::Unclassified => required.unclassified.push(role),
        }
    }
    Ok(required)
}
