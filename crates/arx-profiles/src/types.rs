use serde::{Deserialize, Serialize};

use arx_vault::{LlmProfile, ProviderType};

/// Placeholder substituted for `api_key` in every profile returned to a
/// caller. Raw credentials never leave this crate.
pub const REDACTED_API_KEY: &str = "***REDACTED***";

#[derive(Debug, Clone, Serialize, PartialEq)]
/// Caller-facing view of a stored profile with the credential redacted.
pub struct RedactedProfile {
    pub id: String,
    pub name: String,
    pub provider_type: ProviderType,
    pub endpoint_url: String,
    pub api_key: String,
    pub model_id: Option<String>,
    pub is_active: bool,
    pub consent_timestamp: Option<u64>,
    pub created_at: u64,
    pub modified_at: u64,
}

impl RedactedProfile {
    pub fn from_profile(profile: &LlmProfile) -> Self {
        Self {
            id: profile.id.clone(),
            name: profile.name.clone(),
            provider_type: profile.provider_type,
            endpoint_url: profile.endpoint_url.clone(),
            api_key: REDACTED_API_KEY.to_string(),
            model_id: profile.model_id.clone(),
            is_active: profile.is_active,
            consent_timestamp: profile.consent_timestamp,
            created_at: profile.created_at,
            modified_at: profile.modified_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
/// Payload for `create_profile`.
pub struct CreateProfilePayload {
    pub name: String,
    pub provider_type: ProviderType,
    pub endpoint_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub consent_timestamp: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
/// Payload for `update_profile`. Absent fields are left unchanged; the
/// double-`Option` fields distinguish "unchanged" from "set to null".
pub struct UpdateProfilePayload {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub provider_type: Option<ProviderType>,
    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default, with = "serde_double_option")]
    pub model_id: Option<Option<String>>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default, with = "serde_double_option")]
    pub consent_timestamp: Option<Option<u64>>,
}

#[derive(Debug, Clone, Deserialize)]
/// Payload for `delete_profile`.
pub struct DeleteProfilePayload {
    pub id: String,
    #[serde(default)]
    pub activate_alternate_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CreateProfileResult {
    pub profile: RedactedProfile,
    pub warning: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UpdateProfileResult {
    pub profile: RedactedProfile,
    pub warning: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DeleteProfileResult {
    pub deleted_profile_id: String,
    pub new_active_profile_id: Option<String>,
    pub requires_user_selection: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ActivateProfileResult {
    pub profile: RedactedProfile,
    pub deactivated_profile_id: Option<String>,
}

/// Deserializes a nullable-and-omittable field: omitted maps to `None`
/// (unchanged), an explicit `null` maps to `Some(None)` (clear).
mod serde_double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_payload_distinguishes_omitted_from_null() {
        let omitted: UpdateProfilePayload =
            serde_json::from_str(r#"{"id": "p-1"}"#).expect("parse");
        assert_eq!(omitted.model_id, None);

        let cleared: UpdateProfilePayload =
            serde_json::from_str(r#"{"id": "p-1", "model_id": null}"#).expect("parse");
        assert_eq!(cleared.model_id, Some(None));

        let set: UpdateProfilePayload =
            serde_json::from_str(r#"{"id": "p-1", "model_id": "phi-3"}"#).expect("parse");
        assert_eq!(set.model_id, Some(Some("phi-3".to_string())));
    }
}
