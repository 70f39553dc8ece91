//! Test-prompt orchestration: profile resolution, one HTTP exchange under a
//! client-side deadline, and uniform result classification.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;

use arx_core::current_unix_timestamp_ms;
use arx_diagnostics::{record_best_effort, DiagnosticsEvent, DiagnosticsRecorder, NormalizedError};
use arx_keyring::{EncryptionFallbackEvent, EncryptionService};
use arx_vault::{LlmProfile, ProfileVaultService, VaultError};

use crate::classify::{classify_transport_error, remediation_hint};
use crate::extract::{
    extract_model_name, extract_response_text, sanitize_response_text, truncate_response_text,
};
use crate::providers::strategy_for;
use crate::transcript::{TestTranscriptStore, TranscriptMessage, TranscriptRole, TranscriptStatus};
use crate::types::{TestPromptError, TestPromptRequest, TestPromptResult};

/// Prompt sent when the request does not supply one.
pub const DEFAULT_PROMPT_TEXT: &str = "Hello, can you respond?";
/// Client-side deadline when the request does not supply one.
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

const MAX_ERROR_MESSAGE_CHARS: usize = 1000;

/// Public struct `TestPromptService` executes one test prompt against a
/// stored profile and folds the outcome into the shared transcript store.
pub struct TestPromptService {
    vault: Arc<ProfileVaultService>,
    encryption: Arc<EncryptionService>,
    transcripts: Arc<TestTranscriptStore>,
    recorder: Arc<dyn DiagnosticsRecorder>,
    client: reqwest::Client,
    default_timeout_ms: u64,
}

impl TestPromptService {
    pub fn new(
        vault: Arc<ProfileVaultService>,
        encryption: Arc<EncryptionService>,
        transcripts: Arc<TestTranscriptStore>,
        recorder: Arc<dyn DiagnosticsRecorder>,
    ) -> Self {
        Self {
            vault,
            encryption,
            transcripts,
            recorder,
            client: reqwest::Client::new(),
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    pub fn with_default_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.default_timeout_ms = timeout_ms;
        self
    }

    pub fn transcripts(&self) -> &TestTranscriptStore {
        &self.transcripts
    }

    /// Runs one test prompt.
    ///
    /// Provider and transport failures come back as a failed
    /// [`TestPromptResult`]; only profile resolution problems and a
    /// client-side deadline abort are thrown. The thrown abort leaves the
    /// transcript untouched.
    pub async fn execute(
        &self,
        request: TestPromptRequest,
    ) -> Result<TestPromptResult, TestPromptError> {
        let prompt_text = request
            .prompt_text
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .unwrap_or(DEFAULT_PROMPT_TEXT)
            .to_string();
        let timeout_ms = request.timeout_ms.unwrap_or(self.default_timeout_ms);

        let profile = self.resolve_profile(request.profile_id.as_deref())?;
        let api_key = if profile.api_key.is_empty() {
            String::new()
        } else {
            let outcome = self.encryption.decrypt(&profile.api_key);
            if let Some(fallback) = &outcome.fallback {
                record_best_effort(self.recorder.as_ref(), encryption_fallback_event(fallback));
            }
            outcome.value
        };

        let strategy = strategy_for(profile.provider_type);
        let provider_request = (strategy.build_request)(&crate::providers::ProviderContext {
            endpoint_url: &profile.endpoint_url,
            api_key: &api_key,
            model_id: profile.model_id.as_deref(),
            prompt_text: &prompt_text,
        });

        let mut builder = self
            .client
            .post(&provider_request.url)
            .json(&provider_request.body);
        for (name, value) in &provider_request.headers {
            builder = builder.header(name, value);
        }

        tracing::debug!(
            profile_id = %profile.id,
            provider_type = %profile.provider_type,
            timeout_ms,
            "sending test prompt"
        );

        let started = Instant::now();
        let sent = tokio::time::timeout(Duration::from_millis(timeout_ms), builder.send()).await;
        let response = match sent {
            Err(_elapsed) => {
                self.emit(&profile, false, Some("TIMEOUT".to_string()), None);
                return Err(TestPromptError::Timeout { timeout_ms });
            }
            Ok(Err(error)) => {
                let classified = classify_transport_error(&error);
                return self.finish_failure(
                    &profile,
                    prompt_text,
                    classified.code.to_string(),
                    classified.message,
                    started,
                );
            }
            Ok(Ok(response)) => response,
        };
        let latency_ms = elapsed_ms(started);
        let status = response.status();

        // Body read runs outside the deadline window; slow bodies are a
        // transport concern, not an abort.
        let body_text = match response.text().await {
            Ok(text) => text,
            Err(error) => {
                let classified = classify_transport_error(&error);
                return self.finish_failure(
                    &profile,
                    prompt_text,
                    classified.code.to_string(),
                    classified.message,
                    started,
                );
            }
        };
        let body: Value = serde_json::from_str(&body_text).unwrap_or(Value::Null);

        if !status.is_success() {
            let mapped = (strategy.map_http_error)(status.as_u16(), &body);
            return self.finish_failure(&profile, prompt_text, mapped.code, mapped.message, started);
        }

        let Some(raw_text) = extract_response_text(&body) else {
            return self.finish_failure(
                &profile,
                prompt_text,
                "EMPTY_RESPONSE".to_string(),
                "The provider returned a response with no extractable text.".to_string(),
                started,
            );
        };
        let sanitized = sanitize_response_text(&raw_text);
        let response_text = truncate_response_text(&sanitized);
        let model_name = extract_model_name(&body).or_else(|| profile.model_id.clone());

        let transcript = self.transcripts.update(
            &profile.id,
            vec![
                TranscriptMessage::new(TranscriptRole::User, &prompt_text),
                TranscriptMessage::new(TranscriptRole::Assistant, &sanitized),
            ],
            TranscriptStatus::Success,
            Some(latency_ms),
            None,
            None,
        );

        let result = TestPromptResult {
            profile_id: profile.id.clone(),
            profile_name: profile.name.clone(),
            provider_type: profile.provider_type,
            success: true,
            prompt_text,
            response_text: Some(response_text),
            model_name,
            latency_ms: Some(latency_ms),
            total_time_ms: elapsed_ms(started).max(latency_ms),
            error_code: None,
            error_message: None,
            timestamp_ms: current_unix_timestamp_ms(),
            transcript,
        };
        result
            .validate()
            .map_err(TestPromptError::InvalidResult)?;
        self.emit(&profile, true, None, result.latency_ms);
        Ok(result)
    }

    fn resolve_profile(&self, profile_id: Option<&str>) -> Result<LlmProfile, TestPromptError> {
        match profile_id {
            Some(id) => self
                .vault
                .get_profile(id)?
                .ok_or_else(|| VaultError::ProfileNotFound(id.to_string()).into()),
            None => self
                .vault
                .load_vault()?
                .active_profile()
                .cloned()
                .ok_or(TestPromptError::NoActiveProfile),
        }
    }

    /// Folds a provider or transport failure into a failed result, resetting
    /// the profile's transcript to the failure metadata. Latency is a
    /// success-only field and is never recorded here.
    fn finish_failure(
        &self,
        profile: &LlmProfile,
        prompt_text: String,
        code: String,
        message: String,
        started: Instant,
    ) -> Result<TestPromptResult, TestPromptError> {
        let status = if code == "TIMEOUT" {
            TranscriptStatus::Timeout
        } else {
            TranscriptStatus::Error
        };
        let remediation = remediation_hint(&code).to_string();
        let message = truncate_chars(&message, MAX_ERROR_MESSAGE_CHARS);

        let transcript = self.transcripts.update(
            &profile.id,
            Vec::new(),
            status,
            None,
            Some(code.clone()),
            Some(remediation),
        );

        let result = TestPromptResult {
            profile_id: profile.id.clone(),
            profile_name: profile.name.clone(),
            provider_type: profile.provider_type,
            success: false,
            prompt_text,
            response_text: None,
            model_name: None,
            latency_ms: None,
            total_time_ms: elapsed_ms(started),
            error_code: Some(code.clone()),
            error_message: Some(message),
            timestamp_ms: current_unix_timestamp_ms(),
            transcript,
        };
        result
            .validate()
            .map_err(TestPromptError::InvalidResult)?;
        self.emit(profile, false, Some(code), None);
        Ok(result)
    }

    fn emit(
        &self,
        profile: &LlmProfile,
        success: bool,
        error_code: Option<String>,
        latency_ms: Option<u64>,
    ) {
        record_best_effort(
            self.recorder.as_ref(),
            DiagnosticsEvent::LlmTestPrompt {
                profile_id: profile.id.clone(),
                provider_type: profile.provider_type.as_str().to_string(),
                success,
                error_code,
                latency_ms,
                timestamp_ms: current_unix_timestamp_ms(),
            },
        );
    }
}

fn encryption_fallback_event(fallback: &EncryptionFallbackEvent) -> DiagnosticsEvent {
    DiagnosticsEvent::LlmEncryptionUnavailable {
        operation: fallback.operation.as_str().to_string(),
        reason: fallback.reason.as_str().to_string(),
        platform: fallback.platform.clone(),
        message: fallback.message.clone(),
        error: fallback.error.as_ref().map(|error| NormalizedError {
            name: error.name.clone(),
            message: error.message.clone(),
        }),
        timestamp_ms: fallback.timestamp_ms,
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    (started.elapsed().as_millis() as u64).max(1)
}

fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        text.to_string()
    } else {
        text.chars().take(limit).collect()
    }
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use serde_json::json;

    use arx_diagnostics::MemoryDiagnosticsRecorder;
    use arx_vault::{MemoryVaultStore, ProfileVault, ProviderType};

    use super::*;

    fn profile(
        id: &str,
        provider_type: ProviderType,
        endpoint_url: &str,
        api_key: &str,
        is_active: bool,
    ) -> LlmProfile {
        LlmProfile {
            id: id.to_string(),
            name: format!("Profile {id}"),
            provider_type,
            endpoint_url: endpoint_url.to_string(),
            api_key: api_key.to_string(),
            model_id: Some("test-model".to_string()),
            is_active,
            consent_timestamp: Some(1_700_000_000_000),
            created_at: 1_700_000_000_000,
            modified_at: 1_700_000_000_000,
        }
    }

    struct Harness {
        service: TestPromptService,
        recorder: Arc<MemoryDiagnosticsRecorder>,
        transcripts: Arc<TestTranscriptStore>,
    }

    fn harness(profiles: Vec<LlmProfile>) -> Harness {
        let vault_service = Arc::new(ProfileVaultService::new(Arc::new(MemoryVaultStore::new())));
        let vault = ProfileVault {
            profiles,
            ..ProfileVault::default()
        };
        vault_service.save_vault(&vault).expect("seed vault");

        let recorder = Arc::new(MemoryDiagnosticsRecorder::new());
        let transcripts = Arc::new(TestTranscriptStore::new());
        let service = TestPromptService::new(
            vault_service,
            Arc::new(EncryptionService::new(None)),
            Arc::clone(&transcripts),
            Arc::clone(&recorder) as Arc<dyn DiagnosticsRecorder>,
        );
        Harness {
            service,
            recorder,
            transcripts,
        }
    }

    #[tokio::test]
    async fn llama_cpp_success_builds_transcript_and_diagnostics() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(200).json_body(json!({
                    "model": "llama-3.1-8b",
                    "choices": [{"message": {"role": "assistant", "content": "Hello back"}}]
                }));
            })
            .await;

        let harness = harness(vec![profile(
            "p-1",
            ProviderType::LlamaCpp,
            &server.base_url(),
            "",
            true,
        )]);
        let result = harness
            .service
            .execute(TestPromptRequest::default())
            .await
            .expect("test prompt succeeds");

        mock.assert_async().await;
        assert!(result.success);
        assert_eq!(result.prompt_text, DEFAULT_PROMPT_TEXT);
        assert_eq!(result.response_text.as_deref(), Some("Hello back"));
        assert_eq!(result.model_name.as_deref(), Some("llama-3.1-8b"));
        assert!(result.latency_ms.expect("latency") >= 1);
        assert!(result.total_time_ms >= result.latency_ms.expect("latency"));
        assert_eq!(result.transcript.messages.len(), 2);
        assert_eq!(result.transcript.messages[0].role, TranscriptRole::User);
        assert_eq!(result.transcript.messages[1].text, "Hello back");

        let events = harness.recorder.events();
        assert_eq!(events.len(), 1);
        match &events[0] {
            DiagnosticsEvent::LlmTestPrompt {
                success,
                error_code,
                ..
            } => {
                assert!(*success);
                assert!(error_code.is_none());
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn llama_cpp_server_error_becomes_failed_result_and_resets_transcript() {
        let server = MockServer::start_async().await;
        let ok_mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/chat/completions")
                    .body_includes("first");
                then.status(200)
                    .json_body(json!({"choices": [{"message": {"content": "fine"}}]}));
            })
            .await;
        let error_mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/chat/completions")
                    .body_includes("second");
                then.status(500)
                    .json_body(json!({"error": {"code": "server_error", "message": "overloaded"}}));
            })
            .await;

        let harness = harness(vec![profile(
            "p-1",
            ProviderType::LlamaCpp,
            &server.base_url(),
            "",
            true,
        )]);
        let first = harness
            .service
            .execute(TestPromptRequest {
                prompt_text: Some("first".to_string()),
                ..TestPromptRequest::default()
            })
            .await
            .expect("first prompt succeeds");
        assert!(first.success);
        assert_eq!(harness.transcripts.get_history_depth("p-1"), 1);

        let second = harness
            .service
            .execute(TestPromptRequest {
                prompt_text: Some("second".to_string()),
                ..TestPromptRequest::default()
            })
            .await
            .expect("provider errors come back as failed results");

        ok_mock.assert_async().await;
        error_mock.assert_async().await;
        assert!(!second.success);
        assert_eq!(second.error_code.as_deref(), Some("server_error"));
        assert!(second
            .error_message
            .as_deref()
            .expect("message")
            .contains("server error"));
        assert!(second.response_text.is_none());
        assert!(second.latency_ms.is_none());
        assert!(second.transcript.messages.is_empty());
        assert!(second.transcript.latency_ms.is_none());
        assert_eq!(second.transcript.status, TranscriptStatus::Error);
        assert_eq!(harness.transcripts.get_history_depth("p-1"), 0);
    }

    #[tokio::test]
    async fn azure_sends_api_key_header_and_maps_401() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/openai/deployments/gpt4/chat/completions")
                    .query_param("api-version", "2024-02-15-preview")
                    .header("api-key", "azure-secret");
                then.status(401).json_body(json!({}));
            })
            .await;

        let harness = harness(vec![profile(
            "p-az",
            ProviderType::Azure,
            &server.url("/openai/deployments/gpt4"),
            "azure-secret",
            true,
        )]);
        let result = harness
            .service
            .execute(TestPromptRequest::default())
            .await
            .expect("auth failures come back as failed results");

        mock.assert_async().await;
        assert!(!result.success);
        assert_eq!(result.error_code.as_deref(), Some("401"));
        assert!(result
            .transcript
            .remediation
            .as_deref()
            .expect("remediation")
            .contains("API key"));
    }

    #[tokio::test]
    async fn custom_provider_sends_bearer_token() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/chat/completions")
                    .header("authorization", "Bearer sk-test");
                then.status(200)
                    .json_body(json!({"choices": [{"message": {"content": "ok"}}]}));
            })
            .await;

        let harness = harness(vec![profile(
            "p-c",
            ProviderType::Custom,
            &server.base_url(),
            "sk-test",
            true,
        )]);
        let result = harness
            .service
            .execute(TestPromptRequest::default())
            .await
            .expect("custom provider succeeds");

        mock.assert_async().await;
        assert!(result.success);
        assert_eq!(result.response_text.as_deref(), Some("ok"));

        // No adapter is configured, so decrypting the stored key degraded
        // to plaintext passthrough and left an audit breadcrumb.
        assert!(harness
            .recorder
            .events()
            .iter()
            .any(|event| event.name() == "llm_encryption_unavailable"));
    }

    #[tokio::test]
    async fn deadline_abort_is_thrown_and_leaves_transcript_untouched() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(200)
                    .delay(Duration::from_millis(500))
                    .json_body(json!({"choices": [{"message": {"content": "late"}}]}));
            })
            .await;

        let harness = harness(vec![profile(
            "p-1",
            ProviderType::LlamaCpp,
            &server.base_url(),
            "",
            true,
        )]);
        let error = harness
            .service
            .execute(TestPromptRequest {
                timeout_ms: Some(50),
                ..TestPromptRequest::default()
            })
            .await
            .expect_err("deadline abort is thrown");

        assert_eq!(error.code(), "TIMEOUT");
        match error {
            TestPromptError::Timeout { timeout_ms } => assert_eq!(timeout_ms, 50),
            other => panic!("unexpected error {other:?}"),
        }
        assert!(harness.transcripts.get("p-1").is_none());
    }

    #[tokio::test]
    async fn repeated_successes_cap_the_transcript_at_three_exchanges() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(200)
                    .json_body(json!({"choices": [{"message": {"content": "reply"}}]}));
            })
            .await;

        let harness = harness(vec![profile(
            "p-1",
            ProviderType::LlamaCpp,
            &server.base_url(),
            "",
            true,
        )]);
        for index in 0..4 {
            let result = harness
                .service
                .execute(TestPromptRequest {
                    prompt_text: Some(format!("prompt {index}")),
                    ..TestPromptRequest::default()
                })
                .await
                .expect("prompt succeeds");
            assert!(result.success);
        }

        let transcript = harness.transcripts.get("p-1").expect("transcript");
        assert_eq!(transcript.messages.len(), 6);
        assert_eq!(transcript.messages[0].text, "prompt 3");
        assert_eq!(harness.transcripts.get_history_depth("p-1"), 3);
    }

    #[tokio::test]
    async fn connection_refused_is_classified_with_remediation() {
        // Nothing listens on this port.
        let harness = harness(vec![profile(
            "p-1",
            ProviderType::LlamaCpp,
            "http://127.0.0.1:9",
            "",
            true,
        )]);
        let result = harness
            .service
            .execute(TestPromptRequest::default())
            .await
            .expect("transport failures come back as failed results");

        assert!(!result.success);
        assert_eq!(result.error_code.as_deref(), Some("ECONNREFUSED"));
        assert!(result
            .transcript
            .remediation
            .as_deref()
            .expect("remediation")
            .contains("endpoint URL"));
    }

    #[tokio::test]
    async fn unknown_profile_and_missing_active_profile_are_thrown() {
        let harness = harness(vec![profile(
            "p-1",
            ProviderType::LlamaCpp,
            "http://localhost:8080",
            "",
            false,
        )]);

        let error = harness
            .service
            .execute(TestPromptRequest {
                profile_id: Some("missing".to_string()),
                ..TestPromptRequest::default()
            })
            .await
            .expect_err("unknown id is thrown");
        assert_eq!(error.code(), "PROFILE_NOT_FOUND");

        let error = harness
            .service
            .execute(TestPromptRequest::default())
            .await
            .expect_err("no active profile is thrown");
        assert_eq!(error.code(), "NO_ACTIVE_PROFILE");
    }
}
