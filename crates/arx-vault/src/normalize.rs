//! Pure sanitize/normalize/validate functions for the vault document.
//!
//! Sanitization turns arbitrary persisted JSON into a typed vault, dropping
//! entries that are not profile-shaped and coercing missing fields to
//! defaults. Normalization re-establishes the vault invariants (unique ids,
//! at most one active profile) and reports whether anything changed so the
//! caller can drive the conditional self-healing write-back.

use std::collections::HashMap;

use serde_json::Value;

use crate::types::{LlmProfile, ProfileVault, ProviderType, VAULT_VERSION};

const MAX_PROFILE_NAME_CHARS: usize = 100;

/// Converts a raw persisted document into a typed vault.
///
/// Entries without a non-empty string id and a non-blank string name are not
/// profile-shaped and are dropped. Every other field is coerced to a default
/// when missing or mistyped.
pub fn sanitize_vault(raw: &Value) -> ProfileVault {
    let Some(object) = raw.as_object() else {
        return ProfileVault::default();
    };

    let profiles = object
        .get("profiles")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(sanitize_profile)
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    let encryption_available = object
        .get("encryption_available")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let version = object
        .get("version")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(VAULT_VERSION)
        .to_string();

    ProfileVault {
        profiles,
        encryption_available,
        version,
    }
}

fn sanitize_profile(entry: &Value) -> Option<LlmProfile> {
    let object = entry.as_object()?;
    let id = object
        .get("id")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())?
        .to_string();
    let name = object
        .get("name")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())?
        .to_string();

    let provider_type = object
        .get("provider_type")
        .and_then(Value::as_str)
        .and_then(ProviderType::parse)
        .unwrap_or(ProviderType::LlamaCpp);
    let endpoint_url = object
        .get("endpoint_url")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string();
    let api_key = object
        .get("api_key")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let model_id = object
        .get("model_id")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string);
    let is_active = object
        .get("is_active")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let consent_timestamp = object.get("consent_timestamp").and_then(Value::as_u64);
    let created_at = object.get("created_at").and_then(Value::as_u64).unwrap_or(0);
    let modified_at = object
        .get("modified_at")
        .and_then(Value::as_u64)
        .unwrap_or(0)
        .max(created_at);

    Some(LlmProfile {
        id,
        name,
        provider_type,
        endpoint_url,
        api_key,
        model_id,
        is_active,
        consent_timestamp,
        created_at,
        modified_at,
    })
}

/// Re-establishes the vault invariants. Returns the corrected vault and
/// whether it differs from the input.
///
/// Duplicate ids keep the last occurrence (at the first occurrence's
/// position). When more than one profile is active, the one with the
/// greatest `modified_at` stays active, tie-broken by greatest `created_at`;
/// all others are deactivated.
pub fn normalize_vault(vault: &ProfileVault) -> (ProfileVault, bool) {
    let mut deduped: Vec<LlmProfile> = Vec::with_capacity(vault.profiles.len());
    let mut index_by_id: HashMap<String, usize> = HashMap::new();
    for profile in &vault.profiles {
        match index_by_id.get(&profile.id) {
            Some(&index) => deduped[index] = profile.clone(),
            None => {
                index_by_id.insert(profile.id.clone(), deduped.len());
                deduped.push(profile.clone());
            }
        }
    }

    let active_indices: Vec<usize> = deduped
        .iter()
        .enumerate()
        .filter(|(_, profile)| profile.is_active)
        .map(|(index, _)| index)
        .collect();
    if active_indices.len() > 1 {
        let winner = active_indices
            .iter()
            .copied()
            .max_by_key(|&index| (deduped[index].modified_at, deduped[index].created_at))
            .expect("at least two active profiles");
        for index in active_indices {
            if index != winner {
                deduped[index].is_active = false;
            }
        }
    }

    let normalized = ProfileVault {
        profiles: deduped,
        encryption_available: vault.encryption_available,
        version: vault.version.clone(),
    };
    let changed = normalized != *vault;
    (normalized, changed)
}

/// Full-schema validation. Returns the list of violations, empty when the
/// vault is well formed.
pub fn validate_vault(vault: &ProfileVault) -> Vec<String> {
    let mut issues = Vec::new();
    if vault.version.trim().is_empty() {
        issues.push("version must not be empty".to_string());
    }

    let mut seen_ids: HashMap<&str, usize> = HashMap::new();
    let mut active_count = 0usize;
    for profile in &vault.profiles {
        if profile.id.trim().is_empty() {
            issues.push("profile id must not be empty".to_string());
        }
        let trimmed_name = profile.name.trim();
        if trimmed_name.is_empty() || trimmed_name.chars().count() > MAX_PROFILE_NAME_CHARS {
            issues.push(format!(
                "profile '{}' name must be 1-{} characters",
                profile.id, MAX_PROFILE_NAME_CHARS
            ));
        }
        if profile.modified_at < profile.created_at {
            issues.push(format!(
                "profile '{}' modified_at precedes created_at",
                profile.id
            ));
        }
        if profile.is_active {
            active_count += 1;
        }
        *seen_ids.entry(profile.id.as_str()).or_insert(0) += 1;
    }

    for (id, count) in seen_ids {
        if count > 1 {
            issues.push(format!("profile id '{id}' appears {count} times"));
        }
    }
    if active_count > 1 {
        issues.push(format!("{active_count} profiles are active; at most one allowed"));
    }
    issues
}
