//! Business rules for profile create/update/delete/activate/list.

use std::sync::Arc;

use uuid::Uuid;

use arx_core::current_unix_timestamp_ms;
use arx_diagnostics::{record_best_effort, DiagnosticsEvent, DiagnosticsRecorder, NormalizedError};
use arx_keyring::{EncryptionFallbackEvent, EncryptionService};
use arx_vault::{LlmProfile, ProfilePatch, ProfileVault, ProfileVaultService, VaultError};

use crate::error::ProfileError;
use crate::types::{
    ActivateProfileResult, CreateProfilePayload, CreateProfileResult, DeleteProfilePayload,
    DeleteProfileResult, RedactedProfile, UpdateProfilePayload, UpdateProfileResult,
};
use crate::validate::{validate_create, validate_merged_consent, validate_update};

/// Field set diffed between before/after snapshots on update.
const TRACKED_FIELDS: [&str; 7] = [
    "name",
    "provider_type",
    "endpoint_url",
    "api_key",
    "model_id",
    "is_active",
    "consent_timestamp",
];

/// Orchestrates `ProfileVaultService` and `EncryptionService` and emits
/// diagnostics breadcrumbs. Every returned profile is redacted.
pub struct ProfileService {
    vault: Arc<ProfileVaultService>,
    encryption: Arc<EncryptionService>,
    recorder: Arc<dyn DiagnosticsRecorder>,
}

impl ProfileService {
    pub fn new(
        vault: Arc<ProfileVaultService>,
        encryption: Arc<EncryptionService>,
        recorder: Arc<dyn DiagnosticsRecorder>,
    ) -> Self {
        Self {
            vault,
            encryption,
            recorder,
        }
    }

    pub fn list_profiles(&self) -> Result<Vec<RedactedProfile>, ProfileError> {
        let vault = self.vault.load_vault()?;
        Ok(vault
            .profiles
            .iter()
            .map(RedactedProfile::from_profile)
            .collect())
    }

    pub fn create_profile(
        &self,
        payload: CreateProfilePayload,
    ) -> Result<CreateProfileResult, ProfileError> {
        let issues = validate_create(&payload);
        if !issues.is_empty() {
            return Err(ProfileError::validation(issues));
        }

        let vault = self.vault.load_vault()?;
        let should_activate = vault.active_count() == 0;
        let trimmed_name = payload.name.trim().to_string();
        let duplicate_warning = duplicate_name_warning(&vault, &trimmed_name, None);

        let trimmed_key = payload.api_key.trim();
        let (stored_key, encryption_warning) = if trimmed_key.is_empty() {
            (String::new(), None)
        } else {
            let outcome = self.encryption.encrypt(trimmed_key);
            if let Some(fallback) = &outcome.fallback {
                record_best_effort(self.recorder.as_ref(), encryption_fallback_event(fallback));
            }
            (outcome.value, outcome.warning)
        };

        let now = current_unix_timestamp_ms();
        let profile = LlmProfile {
            id: Uuid::new_v4().to_string(),
            name: trimmed_name,
            provider_type: payload.provider_type,
            endpoint_url: payload.endpoint_url.trim().to_string(),
            api_key: stored_key,
            model_id: payload.model_id,
            is_active: should_activate,
            consent_timestamp: payload.consent_timestamp,
            created_at: now,
            modified_at: now,
        };
        let stored = self.vault.add_profile(profile)?;
        self.vault
            .set_encryption_available(self.encryption.is_available())?;

        record_best_effort(
            self.recorder.as_ref(),
            DiagnosticsEvent::LlmProfileCreated {
                profile_id: stored.id.clone(),
                name: stored.name.clone(),
                provider_type: stored.provider_type.as_str().to_string(),
                timestamp_ms: current_unix_timestamp_ms(),
            },
        );

        Ok(CreateProfileResult {
            profile: RedactedProfile::from_profile(&stored),
            warning: combine_warnings(encryption_warning, duplicate_warning),
        })
    }

    pub fn update_profile(
        &self,
        payload: UpdateProfilePayload,
    ) -> Result<UpdateProfileResult, ProfileError> {
        let issues = validate_update(&payload);
        if !issues.is_empty() {
            return Err(ProfileError::validation(issues));
        }

        let vault = self.vault.load_vault()?;
        let Some(before) = vault.find(&payload.id).cloned() else {
            return Err(VaultError::ProfileNotFound(payload.id.clone()).into());
        };

        // Re-encrypt only when the caller supplied a new key.
        let (stored_key, encryption_warning) = match payload.api_key.as_deref().map(str::trim) {
            Some(plaintext) => {
                let outcome = self.encryption.encrypt(plaintext);
                if let Some(fallback) = &outcome.fallback {
                    record_best_effort(self.recorder.as_ref(), encryption_fallback_event(fallback));
                }
                (Some(outcome.value), outcome.warning)
            }
            None => (None, None),
        };

        let mut merged = before.clone();
        if let Some(name) = &payload.name {
            merged.name = name.trim().to_string();
        }
        if let Some(provider_type) = payload.provider_type {
            merged.provider_type = provider_type;
        }
        if let Some(endpoint_url) = &payload.endpoint_url {
            merged.endpoint_url = endpoint_url.trim().to_string();
        }
        if let Some(stored_key) = &stored_key {
            merged.api_key = stored_key.clone();
        }
        if let Some(model_id) = &payload.model_id {
            merged.model_id = model_id.clone();
        }
        if let Some(is_active) = payload.is_active {
            merged.is_active = is_active;
        }
        if let Some(consent_timestamp) = payload.consent_timestamp {
            merged.consent_timestamp = consent_timestamp;
        }
        let consent_issues = validate_merged_consent(&merged);
        if !consent_issues.is_empty() {
            return Err(ProfileError::validation(consent_issues));
        }

        // Activating through update must not leave two active profiles.
        if payload.is_active == Some(true) {
            if let Some(previous) = vault
                .active_profile()
                .filter(|profile| profile.id != payload.id)
            {
                self.vault.update_profile(
                    &previous.id,
                    ProfilePatch {
                        is_active: Some(false),
                        ..Default::default()
                    },
                )?;
            }
        }

        let after = self.vault.update_profile(
            &payload.id,
            ProfilePatch {
                name: payload.name.map(|name| name.trim().to_string()),
                provider_type: payload.provider_type,
                endpoint_url: payload
                    .endpoint_url
                    .map(|endpoint| endpoint.trim().to_string()),
                api_key: stored_key,
                model_id: payload.model_id,
                is_active: payload.is_active,
                consent_timestamp: payload.consent_timestamp,
                ..Default::default()
            },
        )?;

        let changed = changed_fields(&before, &after);
        if !changed.is_empty() {
            record_best_effort(
                self.recorder.as_ref(),
                DiagnosticsEvent::LlmProfileUpdated {
                    profile_id: after.id.clone(),
                    changed_fields: changed,
                    timestamp_ms: current_unix_timestamp_ms(),
                },
            );
        }

        let vault_after = self.vault.load_vault()?;
        let duplicate_warning = duplicate_name_warning(&vault_after, &after.name, Some(&after.id));
        Ok(UpdateProfileResult {
            profile: RedactedProfile::from_profile(&after),
            warning: combine_warnings(encryption_warning, duplicate_warning),
        })
    }

    pub fn delete_profile(
        &self,
        payload: DeleteProfilePayload,
    ) -> Result<DeleteProfileResult, ProfileError> {
        let mut vault = self.vault.load_vault()?;
        let Some(position) = vault
            .profiles
            .iter()
            .position(|profile| profile.id == payload.id)
        else {
            return Err(VaultError::ProfileNotFound(payload.id.clone()).into());
        };
        let target_was_active = vault.profiles[position].is_active;
        vault.profiles.remove(position);

        let mut new_active_profile_id = None;
        let mut requires_user_selection = false;
        if target_was_active {
            match &payload.activate_alternate_id {
                Some(alternate_id) => {
                    let now = current_unix_timestamp_ms();
                    let Some(alternate) = vault
                        .profiles
                        .iter_mut()
                        .find(|profile| &profile.id == alternate_id)
                    else {
                        return Err(ProfileError::AlternateNotFound(alternate_id.clone()));
                    };
                    alternate.is_active = true;
                    alternate.modified_at = now.max(alternate.created_at);
                    new_active_profile_id = Some(alternate_id.clone());
                }
                None => {
                    requires_user_selection = !vault.profiles.is_empty();
                }
            }
        }
        self.vault.save_vault(&vault)?;

        record_best_effort(
            self.recorder.as_ref(),
            DiagnosticsEvent::LlmProfileDeleted {
                profile_id: payload.id.clone(),
                timestamp_ms: current_unix_timestamp_ms(),
            },
        );

        Ok(DeleteProfileResult {
            deleted_profile_id: payload.id,
            new_active_profile_id,
            requires_user_selection,
        })
    }

    pub fn activate_profile(&self, id: &str) -> Result<ActivateProfileResult, ProfileError> {
        let mut vault = self.vault.load_vault()?;
        if vault.find(id).is_none() {
            return Err(VaultError::ProfileNotFound(id.to_string()).into());
        }

        let now = current_unix_timestamp_ms();
        let mut deactivated_profile_id = None;
        let mut activated = None;
        for profile in &mut vault.profiles {
            if profile.id == id {
                if !profile.is_active {
                    profile.is_active = true;
                    profile.modified_at = now.max(profile.created_at);
                }
                activated = Some(profile.clone());
            } else if profile.is_active {
                profile.is_active = false;
                profile.modified_at = now.max(profile.created_at);
                deactivated_profile_id = Some(profile.id.clone());
            }
        }
        self.vault.save_vault(&vault)?;
        let activated = activated.expect("target presence checked above");

        record_best_effort(
            self.recorder.as_ref(),
            DiagnosticsEvent::LlmProfileActivated {
                profile_id: activated.id.clone(),
                deactivated_profile_id: deactivated_profile_id.clone(),
                timestamp_ms: current_unix_timestamp_ms(),
            },
        );

        Ok(ActivateProfileResult {
            profile: RedactedProfile::from_profile(&activated),
            deactivated_profile_id,
        })
    }
}

fn encryption_fallback_event(fallback: &EncryptionFallbackEvent) -> DiagnosticsEvent {
    DiagnosticsEvent::LlmEncryptionUnavailable {
        operation: fallback.operation.as_str().to_string(),
        reason: fallback.reason.as_str().to_string(),
        platform: fallback.platform.clone(),
        message: fallback.message.clone(),
        error: fallback.error.as_ref().map(|error| NormalizedError {
            name: error.name.clone(),
            message: error.message.clone(),
        }),
        timestamp_ms: fallback.timestamp_ms,
    }
}

fn duplicate_name_warning(
    vault: &ProfileVault,
    name: &str,
    exclude_id: Option<&str>,
) -> Option<String> {
    let needle = name.trim().to_lowercase();
    let duplicate = vault.profiles.iter().any(|profile| {
        exclude_id != Some(profile.id.as_str()) && profile.name.trim().to_lowercase() == needle
    });
    duplicate.then(|| format!("A profile named '{}' already exists.", name.trim()))
}

fn combine_warnings(first: Option<String>, second: Option<String>) -> Option<String> {
    let parts: Vec<String> = [first, second].into_iter().flatten().collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" "))
    }
}

fn changed_fields(before: &LlmProfile, after: &LlmProfile) -> Vec<String> {
    TRACKED_FIELDS
        .iter()
        .filter(|field| match **field {
            "name" => before.name != after.name,
            "provider_type" => before.provider_type != after.provider_type,
            "endpoint_url" => before.endpoint_url != after.endpoint_url,
            "api_key" => before.api_key != after.api_key,
            "model_id" => before.model_id != after.model_id,
            "is_active" => before.is_active != after.is_active,
            "consent_timestamp" => before.consent_timestamp != after.consent_timestamp,
            _ => false,
        })
        .map(|field| field.to_string())
        .collect()
}
