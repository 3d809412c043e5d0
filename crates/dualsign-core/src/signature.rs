//! Signature validation, ordering and grouping.

use crate::error::SigningError;
use crate::storage::StorageError;
use crate::types::{Party, SignatureRecord, SignatureUpsert, SubmittedSignature};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::collections::BTreeMap;

pub const MAX_ROLE_LEN: usize = 100;
pub const MAX_SIGNER_FIELD_LEN: usize = 200;
pub const MAX_IMAGE_BYTES: usize = 2 * 1024 * 1024;

const IMAGE_SUBTYPES: &[&str] = &["png", "jpeg", "jpg", "gif", "webp", "svg+xml"];

/// Signatures keyed `party -> role -> record`.
pub type GroupedSignatures = BTreeMap<Party, BTreeMap<String, SignatureRecord>>;

/// Role shape: non-empty after trimming and at most [`MAX_ROLE_LEN`] characters.
pub fn validate_role(role: &str) -> Result<(), StorageError> {
    let trimmed = role.trim();
    if trimmed.is_empty() {
        return Err(StorageError::InvalidRole {
            role: role.to_string(),
            message: "role must not be empty".to_string(),
        });
    }
    if trimmed.chars().count() > MAX_ROLE_LEN {
        return Err(StorageError::InvalidRole {
            role: role.to_string(),
            message: format!("role exceeds {MAX_ROLE_LEN} characters"),
        });
    }
    Ok(())
}

/// Accept only `data:image/<known subtype>;base64,<payload>` references.
pub fn validate_image(role: &str, image: &str) -> Result<(), StorageError> {
    let invalid = |message: String| StorageError::InvalidImage {
        role: role.to_string(),
        message,
    };

    let rest = strip_prefix_ignore_case(image.trim(), "data:image/")
        .ok_or_else(|| invalid("expected a data:image/...;base64 reference".to_string()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| invalid("missing data url payload".to_string()))?;
    let subtype = strip_suffix_ignore_case(header, ";base64")
        .ok_or_else(|| invalid("image payload must be base64 encoded".to_string()))?
        .to_ascii_lowercase();
    if !IMAGE_SUBTYPES.contains(&subtype.as_str()) {
        return Err(invalid(format!("unsupported image type `image/{subtype}`")));
    }
    if payload.is_empty() {
        return Err(invalid("image payload is empty".to_string()));
    }
    let decoded = STANDARD
        .decode(payload)
        .map_err(|e| invalid(format!("image payload is not valid base64: {e}")))?;
    if decoded.len() > MAX_IMAGE_BYTES {
        return Err(invalid(format!(
            "image exceeds {} bytes",
            MAX_IMAGE_BYTES
        )));
    }
    Ok(())
}

/// Validate a store write before it touches persistent state.
pub fn validate_upsert(upsert: &SignatureUpsert) -> Result<(), StorageError> {
    validate_role(&upsert.role)?;
    validate_image(&upsert.role, &upsert.image)
}

/// Turn a submitted item into a store write for `party`.
///
/// Every failure is reported as invalid input naming the offending role.
pub fn prepare_submission(
    party: Party,
    item: &SubmittedSignature,
) -> Result<SignatureUpsert, SigningError> {
    let role = item.role.trim().to_string();
    validate_role(&item.role)
        .and_then(|_| validate_image(&role, &item.image))
        .map_err(|err| SigningError::invalid_input(Some(&role), detail(err)))?;

    Ok(SignatureUpsert {
        signer_name: signer_field(&role, "name", item.name.as_deref())?,
        signer_title: signer_field(&role, "title", item.title.as_deref())?,
        image: item.image.trim().to_string(),
        role,
        party,
    })
}

fn signer_field(
    role: &str,
    field: &str,
    value: Option<&str>,
) -> Result<Option<String>, SigningError> {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    if value.chars().count() > MAX_SIGNER_FIELD_LEN {
        return Err(SigningError::invalid_input(
            Some(role),
            format!("signer {field} exceeds {MAX_SIGNER_FIELD_LEN} characters"),
        ));
    }
    Ok(Some(value.to_string()))
}

fn detail(err: StorageError) -> String {
    match err {
        StorageError::InvalidImage { message, .. } | StorageError::InvalidRole { message, .. } => {
            message
        }
        other => other.to_string(),
    }
}

/// Order by party, then role, then signing time.
pub fn sort_signatures(rows: &mut [SignatureRecord]) {
    rows.sort_by(|a, b| {
        a.party
            .cmp(&b.party)
            .then_with(|| a.role.cmp(&b.role))
            .then_with(|| a.signed_at.cmp(&b.signed_at))
    });
}

/// Reshape signature rows into `party -> role -> record`.
pub fn group_by_party_and_role(rows: &[SignatureRecord]) -> GroupedSignatures {
    let mut grouped = GroupedSignatures::new();
    for row in rows {
        grouped
            .entry(row.party)
            .or_default()
            .insert(row.role.clone(), row.clone());
    }
    grouped
}

/// Required roles of `party` without a current signature carrying an image.
pub fn missing_roles(grouped: &GroupedSignatures, party: Party, required: &[String]) -> Vec<String> {
    let signed = grouped.get(&party);
    required
        .iter()
        .filter(|role| {
            !signed
                .and_then(|by_role| by_role.get(role.as_str()))
                .map(|record| !record.image.trim().is_empty())
                .unwrap_or(false)
        })
        .cloned()
        .collect()
}

fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    let head = value.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &value[prefix.len()..])
}

fn strip_suffix_ignore_case<'a>(value: &'a str, suffix: &str) -> Option<&'a str> {
    let split = value.len().checked_sub(suffix.len())?;
    let tail = value.get(split..)?;
    tail.eq_ignore_ascii_case(suffix).then(|| &value[..split])
}
