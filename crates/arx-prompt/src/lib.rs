//! Test-prompt execution against a stored provider profile.
//!
//! [`TestPromptService`] resolves a profile, decrypts its credential, builds
//! the provider-specific request, performs one HTTP exchange under an
//! abortable client-side deadline, and classifies the heterogeneous
//! success/error payload shapes into a uniform [`TestPromptResult`].
//! Successful exchanges feed the bounded [`TestTranscriptStore`]; failures
//! reset it.

pub mod classify;
pub mod extract;
pub mod providers;
pub mod service;
pub mod transcript;
pub mod types;

pub use service::{TestPromptService, DEFAULT_PROMPT_TEXT, DEFAULT_TIMEOUT_MS};
pub use transcript::{
    TestTranscript, TestTranscriptStore, TranscriptMessage, TranscriptRole, TranscriptStatus,
};
pub use types::{TestPromptError, TestPromptRequest, TestPromptResult};
