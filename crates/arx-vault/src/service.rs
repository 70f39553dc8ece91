//! Vault CRUD primitives with self-healing reads and validated writes.

use std::sync::Arc;

use arx_core::current_unix_timestamp_ms;

use crate::normalize::{normalize_vault, sanitize_vault, validate_vault};
use crate::store::VaultStore;
use crate::types::{LlmProfile, ProfileVault, ProviderType};
use crate::VaultError;

/// Field-level patch applied by [`ProfileVaultService::update_profile`].
///
/// `id` and `created_at` may be present only when they match the stored
/// values; any attempt to change them is a write error. Double-`Option`
/// fields distinguish "leave unchanged" from "set to null".
#[derive(Debug, Clone, Default)]
pub struct ProfilePatch {
    pub id: Option<String>,
    pub name: Option<String>,
    pub provider_type: Option<ProviderType>,
    pub endpoint_url: Option<String>,
    pub api_key: Option<String>,
    pub model_id: Option<Option<String>>,
    pub is_active: Option<bool>,
    pub consent_timestamp: Option<Option<u64>>,
    pub created_at: Option<u64>,
}

/// Exclusive owner of the persisted vault. Callers only ever receive owned
/// clones; mutation happens through full-vault rewrites.
pub struct ProfileVaultService {
    store: Arc<dyn VaultStore>,
}

impl ProfileVaultService {
    pub fn new(store: Arc<dyn VaultStore>) -> Self {
        Self { store }
    }

    /// Reads, sanitizes, and normalizes the vault, persisting the correction
    /// when normalization changed anything (self-healing read).
    pub fn load_vault(&self) -> Result<ProfileVault, VaultError> {
        let raw = self
            .store
            .get()
            .map_err(|error| VaultError::Read(error.to_string()))?;
        let Some(raw) = raw else {
            return Ok(ProfileVault::default());
        };

        let sanitized = sanitize_vault(&raw);
        let (normalized, changed) = normalize_vault(&sanitized);
        let issues = validate_vault(&normalized);
        if !issues.is_empty() {
            return Err(VaultError::Read(issues.join("; ")));
        }
        if changed {
            tracing::info!(
                profiles = normalized.profiles.len(),
                "vault normalization corrected persisted state"
            );
            self.store
                .set(&normalized)
                .map_err(|error| VaultError::Write(error.to_string()))?;
        }
        Ok(normalized)
    }

    /// Validates and persists the vault as a whole-value replace.
    pub fn save_vault(&self, vault: &ProfileVault) -> Result<ProfileVault, VaultError> {
        let issues = validate_vault(vault);
        if !issues.is_empty() {
            return Err(VaultError::Write(issues.join("; ")));
        }
        self.store
            .set(vault)
            .map_err(|error| VaultError::Write(error.to_string()))?;
        Ok(vault.clone())
    }

    pub fn get_profile(&self, id: &str) -> Result<Option<LlmProfile>, VaultError> {
        Ok(self.load_vault()?.find(id).cloned())
    }

    pub fn add_profile(&self, profile: LlmProfile) -> Result<LlmProfile, VaultError> {
        let mut vault = self.load_vault()?;
        if vault.find(&profile.id).is_some() {
            return Err(VaultError::Write(format!(
                "profile id '{}' already exists",
                profile.id
            )));
        }
        vault.profiles.push(profile.clone());
        self.save_vault(&vault)?;
        Ok(profile)
    }

    pub fn update_profile(&self, id: &str, patch: ProfilePatch) -> Result<LlmProfile, VaultError> {
        let mut vault = self.load_vault()?;
        let Some(position) = vault.profiles.iter().position(|profile| profile.id == id) else {
            return Err(VaultError::ProfileNotFound(id.to_string()));
        };
        let profile = &mut vault.profiles[position];

        if let Some(patched_id) = &patch.id {
            if patched_id != &profile.id {
                return Err(VaultError::Write("profile id is immutable".to_string()));
            }
        }
        if let Some(patched_created) = patch.created_at {
            if patched_created != profile.created_at {
                return Err(VaultError::Write(
                    "profile created_at is immutable".to_string(),
                ));
            }
        }

        if let Some(name) = patch.name {
            profile.name = name.trim().to_string();
        }
        if let Some(provider_type) = patch.provider_type {
            profile.provider_type = provider_type;
        }
        if let Some(endpoint_url) = patch.endpoint_url {
            profile.endpoint_url = endpoint_url.trim().to_string();
        }
        if let Some(api_key) = patch.api_key {
            profile.api_key = api_key;
        }
        if let Some(model_id) = patch.model_id {
            profile.model_id = model_id;
        }
        if let Some(is_active) = patch.is_active {
            profile.is_active = is_active;
        }
        if let Some(consent_timestamp) = patch.consent_timestamp {
            profile.consent_timestamp = consent_timestamp;
        }
        profile.modified_at = current_unix_timestamp_ms().max(profile.created_at);

        let updated = profile.clone();
        self.save_vault(&vault)?;
        Ok(updated)
    }

    pub fn delete_profile(&self, id: &str) -> Result<(), VaultError> {
        let mut vault = self.load_vault()?;
        let Some(position) = vault.profiles.iter().position(|profile| profile.id == id) else {
            return Err(VaultError::ProfileNotFound(id.to_string()));
        };
        vault.profiles.remove(position);
        self.save_vault(&vault)?;
        Ok(())
    }

    /// Persists only the encryption availability flag; no-op when unchanged.
    pub fn set_encryption_available(&self, available: bool) -> Result<ProfileVault, VaultError> {
        let mut vault = self.load_vault()?;
        if vault.encryption_available == available {
            return Ok(vault);
        }
        vault.encryption_available = available;
        self.save_vault(&vault)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::store::MemoryVaultStore;

    fn service_with_raw(raw: serde_json::Value) -> (Arc<MemoryVaultStore>, ProfileVaultService) {
        let store = Arc::new(MemoryVaultStore::with_raw(raw));
        let service = ProfileVaultService::new(Arc::clone(&store) as Arc<dyn VaultStore>);
        (store, service)
    }

    fn profile(id: &str, active: bool, modified_at: u64) -> LlmProfile {
        LlmProfile {
            id: id.to_string(),
            name: format!("profile {id}"),
            provider_type: ProviderType::LlamaCpp,
            endpoint_url: "http://localhost:8080".to_string(),
            api_key: String::new(),
            model_id: None,
            is_active: active,
            consent_timestamp: None,
            created_at: 1,
            modified_at,
        }
    }

    #[test]
    fn load_of_missing_vault_returns_default() {
        let store = Arc::new(MemoryVaultStore::new());
        let service = ProfileVaultService::new(store);
        let vault = service.load_vault().expect("load");
        assert!(vault.profiles.is_empty());
        assert!(!vault.encryption_available);
    }

    #[test]
    fn self_healing_read_persists_single_active_correction() {
        let raw = serde_json::to_value(ProfileVault {
            profiles: vec![profile("a", true, 10), profile("b", true, 30)],
            encryption_available: false,
            version: "1.0.0".to_string(),
        })
        .expect("encode");
        let (store, service) = service_with_raw(raw);

        let vault = service.load_vault().expect("load");
        assert_eq!(vault.active_count(), 1);
        assert_eq!(vault.active_profile().expect("active").id, "b");

        // The correction was written back, so a direct read is already clean.
        let persisted: ProfileVault =
            serde_json::from_value(store.raw().expect("raw")).expect("typed");
        assert_eq!(persisted.active_count(), 1);
    }

    #[test]
    fn clean_vault_is_not_rewritten_on_load() {
        let raw = serde_json::to_value(ProfileVault {
            profiles: vec![profile("a", true, 10)],
            encryption_available: true,
            version: "1.0.0".to_string(),
        })
        .expect("encode");
        let (store, service) = service_with_raw(raw.clone());
        service.load_vault().expect("load");
        assert_eq!(store.raw().expect("raw"), raw);
    }

    #[test]
    fn load_fails_when_sanitized_vault_is_still_invalid() {
        let raw = json!({
            "profiles": [{"id": "a", "name": "x".repeat(200)}],
            "version": "1.0.0"
        });
        let (_, service) = service_with_raw(raw);
        let error = service.load_vault().expect_err("invalid name length");
        assert_eq!(error.code(), "VAULT_READ_ERROR");
    }

    #[test]
    fn save_rejects_vault_with_two_active_profiles() {
        let store = Arc::new(MemoryVaultStore::new());
        let service = ProfileVaultService::new(store);
        let vault = ProfileVault {
            profiles: vec![profile("a", true, 10), profile("b", true, 20)],
            encryption_available: false,
            version: "1.0.0".to_string(),
        };
        let error = service.save_vault(&vault).expect_err("two actives");
        assert_eq!(error.code(), "VAULT_WRITE_ERROR");
    }

    #[test]
    fn add_profile_rejects_duplicate_id() {
        let store = Arc::new(MemoryVaultStore::new());
        let service = ProfileVaultService::new(store);
        service.add_profile(profile("a", false, 5)).expect("add");
        let error = service
            .add_profile(profile("a", false, 6))
            .expect_err("duplicate id");
        assert_eq!(error.code(), "VAULT_WRITE_ERROR");
    }

    #[test]
    fn update_profile_rejects_id_and_created_at_changes() {
        let store = Arc::new(MemoryVaultStore::new());
        let service = ProfileVaultService::new(store);
        service.add_profile(profile("a", false, 5)).expect("add");

        let error = service
            .update_profile(
                "a",
                ProfilePatch {
                    id: Some("b".to_string()),
                    ..Default::default()
                },
            )
            .expect_err("id change");
        assert_eq!(error.code(), "VAULT_WRITE_ERROR");

        let error = service
            .update_profile(
                "a",
                ProfilePatch {
                    created_at: Some(999),
                    ..Default::default()
                },
            )
            .expect_err("created_at change");
        assert_eq!(error.code(), "VAULT_WRITE_ERROR");
    }

    #[test]
    fn update_profile_merges_fields_and_bumps_modified_at() {
        let store = Arc::new(MemoryVaultStore::new());
        let service = ProfileVaultService::new(store);
        service.add_profile(profile("a", false, 5)).expect("add");

        let updated = service
            .update_profile(
                "a",
                ProfilePatch {
                    name: Some("  Renamed  ".to_string()),
                    model_id: Some(Some("phi-3".to_string())),
                    consent_timestamp: Some(None),
                    ..Default::default()
                },
            )
            .expect("update");
        assert_eq!(updated.name, "Renamed");
        assert_eq!(updated.model_id.as_deref(), Some("phi-3"));
        assert!(updated.modified_at >= updated.created_at);
        assert_eq!(updated.endpoint_url, "http://localhost:8080");
    }

    #[test]
    fn update_of_unknown_profile_reports_not_found() {
        let store = Arc::new(MemoryVaultStore::new());
        let service = ProfileVaultService::new(store);
        let error = service
            .update_profile("ghost", ProfilePatch::default())
            .expect_err("missing profile");
        assert_eq!(error.code(), "PROFILE_NOT_FOUND");
    }

    #[test]
    fn delete_profile_removes_entry() {
        let store = Arc::new(MemoryVaultStore::new());
        let service = ProfileVaultService::new(store);
        service.add_profile(profile("a", false, 5)).expect("add");
        service.delete_profile("a").expect("delete");
        assert!(service.get_profile("a").expect("get").is_none());
        let error = service.delete_profile("a").expect_err("already gone");
        assert_eq!(error.code(), "PROFILE_NOT_FOUND");
    }

    #[test]
    fn set_encryption_available_skips_write_when_unchanged() {
        let raw = serde_json::to_value(ProfileVault {
            profiles: vec![],
            encryption_available: true,
            version: "1.0.0".to_string(),
        })
        .expect("encode");
        let (store, service) = service_with_raw(raw.clone());

        service.set_encryption_available(true).expect("no-op");
        assert_eq!(store.raw().expect("raw"), raw);

        let vault = service.set_encryption_available(false).expect("flip");
        assert!(!vault.encryption_available);
        let persisted: ProfileVault =
            serde_json::from_value(store.raw().expect("raw")).expect("typed");
        assert!(!persisted.encryption_available);
    }
}
