//! Profile vault data model, persistence seam, and vault service.
//!
//! The vault is one JSON document holding every LLM connection profile.
//! [`ProfileVaultService`] owns the persisted state: every read sanitizes
//! unknown input, re-establishes the single-active-profile invariant, and
//! writes the correction back when one was needed; every write validates the
//! full schema first and replaces the whole value atomically.

pub mod normalize;
pub mod service;
pub mod store;
pub mod types;

pub use normalize::{normalize_vault, sanitize_vault, validate_vault};
pub use service::{ProfilePatch, ProfileVaultService};
pub use store::{FileVaultStore, MemoryVaultStore, VaultStore};
pub use types::{LlmProfile, ProfileVault, ProviderType, VAULT_VERSION};

use thiserror::Error;

#[derive(Debug, Error)]
/// Vault-level failure taxonomy with stable machine codes.
pub enum VaultError {
    #[error("vault read failed: {0}")]
    Read(String),
    #[error("vault write failed: {0}")]
    Write(String),
    #[error("profile '{0}' was not found")]
    ProfileNotFound(String),
}

impl VaultError {
    pub fn code(&self) -> &'static str {
        match self {
            VaultError::Read(_) => "VAULT_READ_ERROR",
            VaultError::Write(_) => "VAULT_WRITE_ERROR",
            VaultError::ProfileNotFound(_) => "PROFILE_NOT_FOUND",
        }
    }
}
