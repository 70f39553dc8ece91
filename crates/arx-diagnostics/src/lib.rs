//! Diagnostics breadcrumbs for profile and test-prompt operations.
//!
//! Defines the tagged event model and the best-effort recorder sink. The
//! audit trail must never block or fail a user-facing operation, so callers
//! go through [`record_best_effort`], which logs and swallows sink failures.

use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Normalized view of an underlying error carried inside an event payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NormalizedError {
    pub name: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
/// Enumerates the diagnostics events emitted by the profile and test-prompt
/// services. Serialized with an `event` tag so JSONL consumers can filter by
/// event name.
pub enum DiagnosticsEvent {
    LlmProfileCreated {
        profile_id: String,
        name: String,
        provider_type: String,
        timestamp_ms: u64,
    },
    LlmProfileUpdated {
        profile_id: String,
        changed_fields: Vec<String>,
        timestamp_ms: u64,
    },
    LlmProfileDeleted {
        profile_id: String,
        timestamp_ms: u64,
    },
    LlmProfileActivated {
        profile_id: String,
        deactivated_profile_id: Option<String>,
        timestamp_ms: u64,
    },
    LlmTestPrompt {
        profile_id: String,
        provider_type: String,
        success: bool,
        error_code: Option<String>,
        latency_ms: Option<u64>,
        timestamp_ms: u64,
    },
    LlmEncryptionUnavailable {
        operation: String,
        reason: String,
        platform: String,
        message: String,
        error: Option<NormalizedError>,
        timestamp_ms: u64,
    },
}

impl DiagnosticsEvent {
    /// Stable event name, matching the serialized `event` tag.
    pub fn name(&self) -> &'static str {
        match self {
            DiagnosticsEvent::LlmProfileCreated { .. } => "llm_profile_created",
            DiagnosticsEvent::LlmProfileUpdated { .. } => "llm_profile_updated",
            DiagnosticsEvent::LlmProfileDeleted { .. } => "llm_profile_deleted",
            DiagnosticsEvent::LlmProfileActivated { .. } => "llm_profile_activated",
            DiagnosticsEvent::LlmTestPrompt { .. } => "llm_test_prompt",
            DiagnosticsEvent::LlmEncryptionUnavailable { .. } => "llm_encryption_unavailable",
        }
    }
}

/// Sink seam consumed by the profile and test-prompt services.
pub trait DiagnosticsRecorder: Send + Sync {
    fn record(&self, event: DiagnosticsEvent) -> Result<()>;
}

/// Records an event, logging and discarding any sink failure.
pub fn record_best_effort(recorder: &dyn DiagnosticsRecorder, event: DiagnosticsEvent) {
    let name = event.name();
    if let Err(error) = recorder.record(event) {
        tracing::warn!(event = name, %error, "diagnostics recorder failed");
    }
}

/// Appends one JSON line per event to a file.
#[derive(Debug)]
pub struct JsonlDiagnosticsRecorder {
    path: PathBuf,
    file: Mutex<Option<std::fs::File>>,
}

impl JsonlDiagnosticsRecorder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: Mutex::new(None),
        }
    }
}

impl DiagnosticsRecorder for JsonlDiagnosticsRecorder {
    fn record(&self, event: DiagnosticsEvent) -> Result<()> {
        let mut line = serde_json::to_string(&event).context("failed to encode event")?;
        line.push('\n');
        let mut guard = self
            .file
            .lock()
            .map_err(|_| anyhow::anyhow!("diagnostics file lock poisoned"))?;
        if guard.is_none() {
            if let Some(parent) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .with_context(|| {
                    format!("failed to open diagnostics file {}", self.path.display())
                })?;
            *guard = Some(file);
        }
        let file = guard.as_mut().expect("diagnostics file opened above");
        file.write_all(line.as_bytes())
            .with_context(|| format!("failed to append to {}", self.path.display()))?;
        Ok(())
    }
}

/// Captures events in memory for test assertions.
#[derive(Debug, Default)]
pub struct MemoryDiagnosticsRecorder {
    events: Mutex<Vec<DiagnosticsEvent>>,
}

impl MemoryDiagnosticsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DiagnosticsEvent> {
        self.events
            .lock()
            .expect("diagnostics memory lock poisoned")
            .clone()
    }
}

impl DiagnosticsRecorder for MemoryDiagnosticsRecorder {
    fn record(&self, event: DiagnosticsEvent) -> Result<()> {
        self.events
            .lock()
            .map_err(|_| anyhow::anyhow!("diagnostics memory lock poisoned"))?
            .push(event);
        Ok(())
    }
}

/// Drops every event. Default sink when no audit trail is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDiagnosticsRecorder;

impl DiagnosticsRecorder for NullDiagnosticsRecorder {
    fn record(&self, _event: DiagnosticsEvent) -> Result<()> {
        Ok(())
    }
}
