//! Plaintext-fallback wrapper around an optional encryption adapter.

use std::sync::{Arc, Mutex};

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use arx_core::current_unix_timestamp_ms;

use crate::adapter::EncryptionAdapter;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
/// Operation that triggered a fallback.
pub enum EncryptionOperation {
    Encrypt,
    Decrypt,
}

impl EncryptionOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            EncryptionOperation::Encrypt => "encrypt",
            EncryptionOperation::Decrypt => "decrypt",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
/// Why an operation degraded to plaintext passthrough.
pub enum FallbackReason {
    Unavailable,
    EncryptError,
    DecryptError,
}

impl FallbackReason {
    pub fn as_str(self) -> &'static str {
        match self {
            FallbackReason::Unavailable => "unavailable",
            FallbackReason::EncryptError => "encrypt-error",
            FallbackReason::DecryptError => "decrypt-error",
        }
    }
}

/// Normalized view of an adapter error embedded in a fallback event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NormalizedAdapterError {
    pub name: String,
    pub message: String,
}

/// Structured audit record produced on every degradation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EncryptionFallbackEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub timestamp_ms: u64,
    pub platform: String,
    pub operation: EncryptionOperation,
    pub reason: FallbackReason,
    pub message: String,
    pub error: Option<NormalizedAdapterError>,
}

/// Per-call result of an encrypt/decrypt attempt. The fallback path is a
/// first-class branch: `value` always holds something usable and `warning`
/// carries the operator-facing explanation when degradation happened.
#[derive(Debug, Clone, PartialEq)]
pub struct EncryptionOutcome {
    pub value: String,
    pub was_encrypted: bool,
    pub was_decrypted: bool,
    pub warning: Option<String>,
    pub fallback: Option<EncryptionFallbackEvent>,
}

/// Current availability plus the most recent fallback, independent of the
/// operation just performed.
#[derive(Debug, Clone, PartialEq)]
pub struct EncryptionStatus {
    pub encryption_available: bool,
    pub last_fallback_event: Option<EncryptionFallbackEvent>,
}

pub type FallbackHook = Arc<dyn Fn(&EncryptionFallbackEvent) + Send + Sync>;

/// Wraps an optional [`EncryptionAdapter`] with the transparent-fallback
/// contract. Never returns an error to callers.
pub struct EncryptionService {
    adapter: Option<Arc<dyn EncryptionAdapter>>,
    last_fallback: Mutex<Option<EncryptionFallbackEvent>>,
    on_fallback: Option<FallbackHook>,
}

impl EncryptionService {
    pub fn new(adapter: Option<Arc<dyn EncryptionAdapter>>) -> Self {
        Self {
            adapter,
            last_fallback: Mutex::new(None),
            on_fallback: None,
        }
    }

    /// Registers a hook invoked on every degradation. This is the only side
    /// channel the service exposes besides the returned outcome.
    pub fn with_fallback_hook(mut self, hook: FallbackHook) -> Self {
        self.on_fallback = Some(hook);
        self
    }

    pub fn encrypt(&self, plaintext: &str) -> EncryptionOutcome {
        let Some(adapter) = self.available_adapter(EncryptionOperation::Encrypt, plaintext) else {
            return self.fallback_outcome(
                EncryptionOperation::Encrypt,
                FallbackReason::Unavailable,
                plaintext,
                None,
            );
        };
        match adapter.encrypt(plaintext) {
            Ok(ciphertext) => EncryptionOutcome {
                value: BASE64_STANDARD.encode(ciphertext),
                was_encrypted: true,
                was_decrypted: false,
                warning: None,
                fallback: None,
            },
            Err(error) => self.fallback_outcome(
                EncryptionOperation::Encrypt,
                FallbackReason::EncryptError,
                plaintext,
                Some(error),
            ),
        }
    }

    pub fn decrypt(&self, stored: &str) -> EncryptionOutcome {
        let Some(adapter) = self.available_adapter(EncryptionOperation::Decrypt, stored) else {
            return self.fallback_outcome(
                EncryptionOperation::Decrypt,
                FallbackReason::Unavailable,
                stored,
                None,
            );
        };
        let decoded = match BASE64_STANDARD.decode(stored) {
            Ok(decoded) => decoded,
            Err(error) => {
                return self.fallback_outcome(
                    EncryptionOperation::Decrypt,
                    FallbackReason::DecryptError,
                    stored,
                    Some(anyhow::Error::from(error)),
                )
            }
        };
        match adapter.decrypt(&decoded) {
            Ok(plaintext) => EncryptionOutcome {
                value: plaintext,
                was_encrypted: false,
                was_decrypted: true,
                warning: None,
                fallback: None,
            },
            Err(error) => self.fallback_outcome(
                EncryptionOperation::Decrypt,
                FallbackReason::DecryptError,
                stored,
                Some(error),
            ),
        }
    }

    pub fn status(&self) -> EncryptionStatus {
        EncryptionStatus {
            encryption_available: self.is_available(),
            last_fallback_event: self
                .last_fallback
                .lock()
                .expect("fallback state lock poisoned")
                .clone(),
        }
    }

    pub fn is_available(&self) -> bool {
        self.adapter
            .as_deref()
            .map(EncryptionAdapter::is_available)
            .unwrap_or(false)
    }

    fn available_adapter(
        &self,
        operation: EncryptionOperation,
        _input: &str,
    ) -> Option<&dyn EncryptionAdapter> {
        let adapter = self.adapter.as_deref()?;
        if adapter.is_available() {
            Some(adapter)
        } else {
            tracing::debug!(
                operation = operation.as_str(),
                "encryption adapter reports unavailable"
            );
            None
        }
    }

    fn fallback_outcome(
        &self,
        operation: EncryptionOperation,
        reason: FallbackReason,
        input: &str,
        error: Option<anyhow::Error>,
    ) -> EncryptionOutcome {
        let message = fallback_warning(operation, reason).to_string();
        let event = EncryptionFallbackEvent {
            event_type: "encryption_fallback".to_string(),
            timestamp_ms: current_unix_timestamp_ms(),
            platform: std::env::consts::OS.to_string(),
            operation,
            reason,
            message: message.clone(),
            error: error.as_ref().map(|error| NormalizedAdapterError {
                name: "EncryptionAdapterError".to_string(),
                message: error.to_string(),
            }),
        };
        tracing::warn!(
            operation = operation.as_str(),
            reason = reason.as_str(),
            "credential encryption degraded to plaintext passthrough"
        );
        *self
            .last_fallback
            .lock()
            .expect("fallback state lock poisoned") = Some(event.clone());
        if let Some(hook) = &self.on_fallback {
            hook(&event);
        }
        EncryptionOutcome {
            value: input.to_string(),
            was_encrypted: false,
            was_decrypted: false,
            warning: Some(message),
            fallback: Some(event),
        }
    }
}

/// Fixed operator-facing warning keyed by `(operation, reason)`.
fn fallback_warning(operation: EncryptionOperation, reason: FallbackReason) -> &'static str {
    match (operation, reason) {
        (EncryptionOperation::Encrypt, FallbackReason::Unavailable) => {
            "OS-level encryption is unavailable; the API key will be stored in plaintext."
        }
        (EncryptionOperation::Encrypt, _) => {
            "Encrypting the API key failed; it will be stored in plaintext."
        }
        (EncryptionOperation::Decrypt, FallbackReason::Unavailable) => {
            "OS-level encryption is unavailable; the stored API key is being used as-is."
        }
        (EncryptionOperation::Decrypt, _) => {
            "Decrypting the stored API key failed; the stored value is being used as-is."
        }
    }
}
