//! Request, result, and error types for test-prompt execution.

use serde::{Deserialize, Serialize};

use arx_vault::{ProviderType, VaultError};

use crate::transcript::{TestTranscript, TranscriptStatus};

const MAX_RESULT_RESPONSE_CHARS: usize = 500;
const MAX_RESULT_MESSAGE_CHARS: usize = 1000;

/// Public struct `TestPromptRequest` selects the profile and overrides for
/// one test-prompt execution. All fields are optional; a missing profile id
/// targets the active profile and missing overrides fall back to the service
/// defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestPromptRequest {
    #[serde(default)]
    pub profile_id: Option<String>,
    #[serde(default)]
    pub prompt_text: Option<String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// Public struct `TestPromptResult` is the uniform outcome of one
/// test-prompt execution, success or failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestPromptResult {
    pub profile_id: String,
    pub profile_name: String,
    pub provider_type: ProviderType,
    pub success: bool,
    pub prompt_text: String,
    #[serde(default)]
    pub response_text: Option<String>,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub latency_ms: Option<u64>,
    pub total_time_ms: u64,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    pub timestamp_ms: u64,
    pub transcript: TestTranscript,
}

impl TestPromptResult {
    /// Internal-consistency check run before a result leaves the service.
    pub fn validate(&self) -> Result<(), String> {
        if self.success {
            if self.error_code.is_some() || self.error_message.is_some() {
                return Err("successful result carries error fields".to_string());
            }
            if self.response_text.is_none() {
                return Err("successful result missing response text".to_string());
            }
            if self.latency_ms.is_none() {
                return Err("successful result missing latency".to_string());
            }
            if self.transcript.status != TranscriptStatus::Success {
                return Err("successful result with non-success transcript".to_string());
            }
        } else {
            if self.error_code.is_none() || self.error_message.is_none() {
                return Err("failed result missing error fields".to_string());
            }
            if self.response_text.is_some() {
                return Err("failed result carries response text".to_string());
            }
            if self.latency_ms.is_some() {
                return Err("failed result carries latency".to_string());
            }
            if !self.transcript.messages.is_empty() {
                return Err("failed result with transcript messages".to_string());
            }
            if self.transcript.latency_ms.is_some() {
                return Err("failed result transcript carries latency".to_string());
            }
        }
        if self.total_time_ms < 1 {
            return Err("total time below one millisecond".to_string());
        }
        if let Some(latency) = self.latency_ms {
            if latency < 1 {
                return Err("latency below one millisecond".to_string());
            }
            if latency > self.total_time_ms {
                return Err("latency exceeds total time".to_string());
            }
        }
        if let Some(response) = &self.response_text {
            if response.chars().count() > MAX_RESULT_RESPONSE_CHARS {
                return Err("response text over length cap".to_string());
            }
        }
        if let Some(message) = &self.error_message {
            if message.chars().count() > MAX_RESULT_MESSAGE_CHARS {
                return Err("error message over length cap".to_string());
            }
        }
        Ok(())
    }
}

/// Thrown failures of test-prompt execution. Provider and transport errors
/// never surface here; those become failed [`TestPromptResult`]s instead.
#[derive(Debug, thiserror::Error)]
pub enum TestPromptError {
    #[error("test prompt aborted after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("no active profile is configured")]
    NoActiveProfile,
    #[error(transparent)]
    Vault(#[from] VaultError),
    #[error("inconsistent test result: {0}")]
    InvalidResult(String),
}

impl TestPromptError {
    pub fn code(&self) -> &'static str {
        match self {
            TestPromptError::Timeout { .. } => "TIMEOUT",
            TestPromptError::NoActiveProfile => "NO_ACTIVE_PROFILE",
            TestPromptError::Vault(err) => err.code(),
            TestPromptError::InvalidResult(_) => "INTERNAL_ERROR",
        }
    }
}
