//! Bounded rolling transcript of recent test-prompt exchanges.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// At most three exchanges (user + assistant pairs) are retained per profile.
pub const MAX_TRANSCRIPT_MESSAGES: usize = 6;
const MAX_MESSAGE_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptStatus {
    Success,
    Error,
    Timeout,
}

impl TranscriptStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TranscriptStatus::Success => "success",
            TranscriptStatus::Error => "error",
            TranscriptStatus::Timeout => "timeout",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// One transcript entry, capped at 500 characters with an ellipsis suffix
/// when the source text exceeded the limit.
pub struct TranscriptMessage {
    pub role: TranscriptRole,
    pub text: String,
    pub truncated: bool,
}

impl TranscriptMessage {
    pub fn new(role: TranscriptRole, source: &str) -> Self {
        if source.chars().count() > MAX_MESSAGE_CHARS {
            let mut text: String = source.chars().take(MAX_MESSAGE_CHARS - 1).collect();
            text.push('…');
            Self {
                role,
                text,
                truncated: true,
            }
        } else {
            Self {
                role,
                text: source.to_string(),
                truncated: false,
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
/// Rolling transcript for one profile. `messages` is empty whenever
/// `status` is not `success`.
pub struct TestTranscript {
    pub messages: Vec<TranscriptMessage>,
    pub status: TranscriptStatus,
    pub latency_ms: Option<u64>,
    pub error_code: Option<String>,
    pub remediation: Option<String>,
}

/// Process-lifetime cache of recent exchanges, keyed by profile id.
///
/// Explicitly constructed and shared by callers; capacity is bounded
/// per-profile only. Entries are evicted by `clear`/`clear_all`, never by
/// time.
#[derive(Debug, Default)]
pub struct TestTranscriptStore {
    entries: Mutex<HashMap<String, TestTranscript>>,
}

impl TestTranscriptStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the outcome of one test prompt. A success prepends the new
    /// exchange (newest first) and keeps the most recent
    /// [`MAX_TRANSCRIPT_MESSAGES`]; any other status resets the message list
    /// while recording the failure metadata.
    pub fn update(
        &self,
        profile_id: &str,
        messages: Vec<TranscriptMessage>,
        status: TranscriptStatus,
        latency_ms: Option<u64>,
        error_code: Option<String>,
        remediation: Option<String>,
    ) -> TestTranscript {
        let mut entries = self.entries.lock().expect("transcript lock poisoned");
        let transcript = if status == TranscriptStatus::Success {
            let mut combined = messages;
            if let Some(existing) = entries.get(profile_id) {
                combined.extend(existing.messages.iter().cloned());
            }
            combined.truncate(MAX_TRANSCRIPT_MESSAGES);
            TestTranscript {
                messages: combined,
                status,
                latency_ms,
                error_code,
                remediation,
            }
        } else {
            TestTranscript {
                messages: Vec::new(),
                status,
                latency_ms,
                error_code,
                remediation,
            }
        };
        entries.insert(profile_id.to_string(), transcript.clone());
        transcript
    }

    pub fn get(&self, profile_id: &str) -> Option<TestTranscript> {
        self.entries
            .lock()
            .expect("transcript lock poisoned")
            .get(profile_id)
            .cloned()
    }

    pub fn clear(&self, profile_id: &str) {
        self.entries
            .lock()
            .expect("transcript lock poisoned")
            .remove(profile_id);
    }

    pub fn clear_all(&self) {
        self.entries
            .lock()
            .expect("transcript lock poisoned")
            .clear();
    }

    /// Number of complete exchanges currently retained for a profile.
    pub fn get_history_depth(&self, profile_id: &str) -> usize {
        self.get(profile_id)
            .map(|transcript| transcript.messages.len() / 2)
            .unwrap_or(0)
    }
}
