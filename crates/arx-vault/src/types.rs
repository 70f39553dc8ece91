use serde::{Deserialize, Serialize};

/// Schema version stamped into newly created vaults.
pub const VAULT_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
/// Enumerates the supported provider connection kinds.
pub enum ProviderType {
    #[serde(rename = "llama.cpp")]
    LlamaCpp,
    #[serde(rename = "azure")]
    Azure,
    #[serde(rename = "custom")]
    Custom,
}

impl ProviderType {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderType::LlamaCpp => "llama.cpp",
            ProviderType::Azure => "azure",
            ProviderType::Custom => "custom",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "llama.cpp" => Some(ProviderType::LlamaCpp),
            "azure" => Some(ProviderType::Azure),
            "custom" => Some(ProviderType::Custom),
            _ => None,
        }
    }

    /// Remote providers require explicit operator consent before a key is
    /// sent off-machine.
    pub fn is_remote(self) -> bool {
        matches!(self, ProviderType::Azure | ProviderType::Custom)
    }
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
/// One stored LLM provider connection profile.
///
/// `api_key` holds base64 ciphertext when encryption was available at write
/// time, otherwise plaintext. `id` and `created_at` are immutable after
/// creation; all timestamps are epoch-ms.
pub struct LlmProfile {
    pub id: String,
    pub name: String,
    pub provider_type: ProviderType,
    #[serde(default)]
    pub endpoint_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub consent_timestamp: Option<u64>,
    #[serde(default)]
    pub created_at: u64,
    #[serde(default)]
    pub modified_at: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
/// The persisted vault document. Invariants: profile ids are unique and at
/// most one profile is active.
pub struct ProfileVault {
    pub profiles: Vec<LlmProfile>,
    pub encryption_available: bool,
    pub version: String,
}

impl Default for ProfileVault {
    fn default() -> Self {
        Self {
            profiles: Vec::new(),
            encryption_available: false,
            version: VAULT_VERSION.to_string(),
        }
    }
}

impl ProfileVault {
    pub fn find(&self, id: &str) -> Option<&LlmProfile> {
        self.profiles.iter().find(|profile| profile.id == id)
    }

    pub fn active_profile(&self) -> Option<&LlmProfile> {
        self.profiles.iter().find(|profile| profile.is_active)
    }

    pub fn active_count(&self) -> usize {
        self.profiles.iter().filter(|profile| profile.is_active).count()
    }
}
