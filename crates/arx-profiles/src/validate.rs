//! Payload validation. Runs before any mutation so schema failures
//! short-circuit with the full per-field issue list.

use arx_vault::{LlmProfile, ProviderType};

use crate::error::FieldIssue;
use crate::types::{CreateProfilePayload, UpdateProfilePayload};

const MAX_NAME_CHARS: usize = 100;

pub fn validate_create(payload: &CreateProfilePayload) -> Vec<FieldIssue> {
    let mut issues = Vec::new();
    check_name(payload.name.trim(), &mut issues);
    check_endpoint_url(payload.endpoint_url.trim(), &mut issues);

    if payload.provider_type.is_remote() {
        if payload.consent_timestamp.is_none() {
            issues.push(FieldIssue::new(
                "consent_timestamp",
                remote_consent_message(payload.provider_type),
            ));
        }
        if payload.api_key.trim().is_empty() {
            issues.push(FieldIssue::new(
                "api_key",
                format!(
                    "an API key is required for {} profiles",
                    payload.provider_type
                ),
            ));
        }
    }
    issues
}

pub fn validate_update(payload: &UpdateProfilePayload) -> Vec<FieldIssue> {
    let mut issues = Vec::new();
    if payload.id.trim().is_empty() {
        issues.push(FieldIssue::new("id", "profile id is required"));
    }
    if let Some(name) = &payload.name {
        check_name(name.trim(), &mut issues);
    }
    if let Some(endpoint_url) = &payload.endpoint_url {
        check_endpoint_url(endpoint_url.trim(), &mut issues);
    }
    if let Some(api_key) = &payload.api_key {
        // Supplying a key means replacing it; blanking a stored credential
        // is not an operation the surface offers.
        if api_key.trim().is_empty() {
            issues.push(FieldIssue::new("api_key", "api_key must not be blank"));
        }
    }
    issues
}

/// Re-checks the remote-provider consent rule against the profile as it
/// would look after the patch is applied.
pub fn validate_merged_consent(merged: &LlmProfile) -> Vec<FieldIssue> {
    let mut issues = Vec::new();
    if merged.provider_type.is_remote()
        && !merged.api_key.trim().is_empty()
        && merged.consent_timestamp.is_none()
    {
        issues.push(FieldIssue::new(
            "consent_timestamp",
            remote_consent_message(merged.provider_type),
        ));
    }
    issues
}

fn remote_consent_message(provider_type: ProviderType) -> String {
    format!(
        "explicit consent is required before sending credentials to a {provider_type} endpoint"
    )
}

fn check_name(name: &str, issues: &mut Vec<FieldIssue>) {
    if name.is_empty() {
        issues.push(FieldIssue::new("name", "name is required"));
    } else if name.chars().count() > MAX_NAME_CHARS {
        issues.push(FieldIssue::new(
            "name",
            format!("name must be at most {MAX_NAME_CHARS} characters"),
        ));
    }
}

fn check_endpoint_url(endpoint_url: &str, issues: &mut Vec<FieldIssue>) {
    if endpoint_url.is_empty() {
        issues.push(FieldIssue::new("endpoint_url", "endpoint URL is required"));
    } else if !endpoint_url.starts_with("http://") && !endpoint_url.starts_with("https://") {
        issues.push(FieldIssue::new(
            "endpoint_url",
            "endpoint URL must start with http:// or https://",
        ));
    }
}
