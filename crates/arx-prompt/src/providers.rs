//! Per-provider request construction and HTTP error mapping.
//!
//! Each [`ProviderType`] maps to a static strategy: how to shape the
//! chat-completion request (URL, auth header, message list) and how to turn
//! a non-2xx response body into a stable error code plus an
//! operator-readable message.

use serde_json::{json, Value};

use arx_vault::ProviderType;

const AZURE_API_VERSION: &str = "2024-02-15-preview";

/// Inputs to request construction for one test prompt.
pub struct ProviderContext<'a> {
    pub endpoint_url: &'a str,
    pub api_key: &'a str,
    pub model_id: Option<&'a str>,
    pub prompt_text: &'a str,
}

/// A fully shaped HTTP request, ready for the client.
pub struct ProviderRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Value,
}

/// Stable error code plus message derived from a provider error response.
pub struct MappedError {
    pub code: String,
    pub message: String,
}

pub struct ProviderStrategy {
    pub build_request: fn(&ProviderContext<'_>) -> ProviderRequest,
    pub map_http_error: fn(u16, &Value) -> MappedError,
}

pub fn strategy_for(provider_type: ProviderType) -> &'static ProviderStrategy {
    match provider_type {
        ProviderType::LlamaCpp => &LLAMA_CPP,
        ProviderType::Azure => &AZURE,
        ProviderType::Custom => &CUSTOM,
    }
}

static LLAMA_CPP: ProviderStrategy = ProviderStrategy {
    build_request: build_llama_cpp_request,
    map_http_error: map_llama_cpp_error,
};

static AZURE: ProviderStrategy = ProviderStrategy {
    build_request: build_azure_request,
    map_http_error: map_azure_error,
};

static CUSTOM: ProviderStrategy = ProviderStrategy {
    build_request: build_custom_request,
    map_http_error: map_generic_error,
};

fn join_endpoint(endpoint_url: &str, path: &str) -> String {
    format!("{}{}", endpoint_url.trim_end_matches('/'), path)
}

fn build_llama_cpp_request(context: &ProviderContext<'_>) -> ProviderRequest {
    let mut body = json!({
        "messages": [
            {"role": "system", "content": "You are a helpful assistant."},
            {"role": "user", "content": context.prompt_text},
        ],
        "stream": false,
    });
    if let Some(model_id) = context.model_id {
        body["model"] = json!(model_id);
    }
    ProviderRequest {
        url: join_endpoint(context.endpoint_url, "/v1/chat/completions"),
        headers: Vec::new(),
        body,
    }
}

fn build_azure_request(context: &ProviderContext<'_>) -> ProviderRequest {
    // The deployment name is part of the endpoint URL, not the body.
    let body = json!({
        "messages": [{"role": "user", "content": context.prompt_text}],
        "stream": false,
    });
    ProviderRequest {
        url: format!(
            "{}?api-version={}",
            join_endpoint(context.endpoint_url, "/chat/completions"),
            AZURE_API_VERSION
        ),
        headers: vec![("api-key".to_string(), context.api_key.to_string())],
        body,
    }
}

fn build_custom_request(context: &ProviderContext<'_>) -> ProviderRequest {
    let mut body = json!({
        "messages": [{"role": "user", "content": context.prompt_text}],
        "stream": false,
    });
    if let Some(model_id) = context.model_id {
        body["model"] = json!(model_id);
    }
    let mut headers = Vec::new();
    if !context.api_key.is_empty() {
        let value = if context.api_key.starts_with("Bearer ") {
            context.api_key.to_string()
        } else {
            format!("Bearer {}", context.api_key)
        };
        headers.push(("Authorization".to_string(), value));
    }
    ProviderRequest {
        url: join_endpoint(context.endpoint_url, "/chat/completions"),
        headers,
        body,
    }
}

fn body_error_field<'a>(body: &'a Value, field: &str) -> Option<&'a str> {
    body.get("error")
        .and_then(|error| error.get(field))
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
}

fn map_llama_cpp_error(status: u16, body: &Value) -> MappedError {
    let code = body_error_field(body, "code");
    let message = body_error_field(body, "message");
    match (code, status) {
        (Some("invalid_request"), _) | (_, 400) => MappedError {
            code: code.unwrap_or("invalid_request").to_string(),
            message: message
                .unwrap_or("The llama.cpp server rejected the request as invalid.")
                .to_string(),
        },
        (Some("server_error"), _) | (_, 500..=599) => MappedError {
            code: code.unwrap_or("server_error").to_string(),
            message: format!(
                "The llama.cpp server reported a server error: {}",
                message.unwrap_or("no detail provided")
            ),
        },
        _ => map_generic_error(status, body),
    }
}

fn map_azure_error(status: u16, body: &Value) -> MappedError {
    let code = body_error_field(body, "code");
    let message = body_error_field(body, "message");
    match status {
        401 => {
            let message = match message {
                Some(text)
                    if text.to_lowercase().contains("subscription key")
                        || text.to_lowercase().contains("credential") =>
                {
                    text.to_string()
                }
                _ => "Azure rejected the API key. Verify the key and endpoint region."
                    .to_string(),
            };
            MappedError {
                code: code.unwrap_or("401").to_string(),
                message,
            }
        }
        404 => MappedError {
            code: code.unwrap_or("DeploymentNotFound").to_string(),
            message: message
                .map(str::to_string)
                .unwrap_or_else(|| {
                    "The Azure deployment was not found. Check the deployment name in the endpoint URL.".to_string()
                }),
        },
        429 => MappedError {
            code: code.unwrap_or("429").to_string(),
            message: message
                .map(str::to_string)
                .unwrap_or_else(|| "Azure rate limit exceeded. Wait and retry.".to_string()),
        },
        503 => MappedError {
            code: code.unwrap_or("503").to_string(),
            message: message
                .map(str::to_string)
                .unwrap_or_else(|| {
                    "The Azure service is temporarily unavailable. Retry shortly.".to_string()
                }),
        },
        500..=599 => MappedError {
            code: code.unwrap_or("InternalServerError").to_string(),
            message: message
                .map(str::to_string)
                .unwrap_or_else(|| "Azure reported an internal server error.".to_string()),
        },
        _ => map_generic_error(status, body),
    }
}

fn map_generic_error(status: u16, body: &Value) -> MappedError {
    let code = body_error_field(body, "code")
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP_{status}"));
    let message = body_error_field(body, "message")
        .map(str::to_string)
        .unwrap_or_else(|| format!("The provider returned HTTP status {status}."));
    MappedError { code, message }
}
