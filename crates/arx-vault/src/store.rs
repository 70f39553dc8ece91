//! Key-value persistence seam for the vault document.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use serde_json::Value;

use arx_core::write_text_atomic;

use crate::types::ProfileVault;

/// Whole-document persistence contract. `get` returns the raw JSON value so
/// the service can sanitize unknown input before typing it.
pub trait VaultStore: Send + Sync {
    fn get(&self) -> Result<Option<Value>>;
    fn set(&self, vault: &ProfileVault) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// Stores the vault as one pretty-printed JSON file, replaced atomically.
#[derive(Debug, Clone)]
pub struct FileVaultStore {
    path: PathBuf,
}

impl FileVaultStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl VaultStore for FileVaultStore {
    fn get(&self) -> Result<Option<Value>> {
        if !self.path.exists() {
            return Ok(None);
        }
        tracing::debug!(vault = %self.path.display(), "loading profile vault");
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read vault file {}", self.path.display()))?;
        let value = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse vault file {}", self.path.display()))?;
        Ok(Some(value))
    }

    fn set(&self, vault: &ProfileVault) -> Result<()> {
        tracing::debug!(
            vault = %self.path.display(),
            profiles = vault.profiles.len(),
            "saving profile vault"
        );
        let mut encoded =
            serde_json::to_string_pretty(vault).context("failed to encode vault")?;
        encoded.push('\n');
        write_text_atomic(&self.path, &encoded)
    }

    fn clear(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)
                .with_context(|| format!("failed to remove vault file {}", self.path.display()))?;
        }
        Ok(())
    }
}

/// In-memory store used by tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryVaultStore {
    value: Mutex<Option<Value>>,
}

impl MemoryVaultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the store with an arbitrary raw document, typed or not.
    pub fn with_raw(value: Value) -> Self {
        Self {
            value: Mutex::new(Some(value)),
        }
    }

    pub fn raw(&self) -> Option<Value> {
        self.value.lock().expect("vault store lock poisoned").clone()
    }
}

impl VaultStore for MemoryVaultStore {
    fn get(&self) -> Result<Option<Value>> {
        Ok(self.value.lock().expect("vault store lock poisoned").clone())
    }

    fn set(&self, vault: &ProfileVault) -> Result<()> {
        let encoded = serde_json::to_value(vault).context("failed to encode vault")?;
        *self.value.lock().expect("vault store lock poisoned") = Some(encoded);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.value.lock().expect("vault store lock poisoned") = None;
        Ok(())
    }
}
