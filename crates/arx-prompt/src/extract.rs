//! Response-payload extraction across heterogeneous provider shapes.
//!
//! Providers answer with OpenAI-style `choices[].message.content`, streaming
//! `choices[].delta.content`, legacy `output_text`/`output[].content`, or
//! llama.cpp `choices[].text`/root `text`. The extractor recurses through
//! string/array/object content nodes and returns the first non-empty joined
//! text.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

/// Response text carried into results and transcripts is capped here.
pub const MAX_RESPONSE_CHARS: usize = 500;
const TRUNCATION_SUFFIX: &str = "...";

pub fn extract_response_text(body: &Value) -> Option<String> {
    if let Some(choices) = body.get("choices").and_then(Value::as_array) {
        for choice in choices {
            for content in [
                choice.get("message").and_then(|message| message.get("content")),
                choice.get("delta").and_then(|delta| delta.get("content")),
                choice.get("text"),
            ]
            .into_iter()
            .flatten()
            {
                if let Some(text) = join_content(content) {
                    return Some(text);
                }
            }
        }
    }

    if let Some(output_text) = body.get("output_text") {
        if let Some(text) = join_content(output_text) {
            return Some(text);
        }
    }
    if let Some(output) = body.get("output").and_then(Value::as_array) {
        for item in output {
            if let Some(content) = item.get("content") {
                if let Some(text) = join_content(content) {
                    return Some(text);
                }
            }
        }
    }
    body.get("text").and_then(join_content)
}

pub fn extract_model_name(body: &Value) -> Option<String> {
    body.get("model")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Joins every text fragment under a content node, skipping `input_text`
/// echo nodes. Returns `None` when nothing non-empty was found.
fn join_content(node: &Value) -> Option<String> {
    let mut fragments = Vec::new();
    collect_fragments(node, &mut fragments);
    let joined = fragments.join("");
    if joined.trim().is_empty() {
        None
    } else {
        Some(joined)
    }
}

fn collect_fragments(node: &Value, fragments: &mut Vec<String>) {
    match node {
        Value::String(text) => {
            if !text.is_empty() {
                fragments.push(text.clone());
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_fragments(item, fragments);
            }
        }
        Value::Object(object) => {
            if object.get("type").and_then(Value::as_str) == Some("input_text") {
                return;
            }
            if let Some(text) = object.get("text") {
                collect_fragments(text, fragments);
            } else if let Some(content) = object.get("content") {
                collect_fragments(content, fragments);
            }
        }
        _ => {}
    }
}

/// Strips ANSI escape sequences and control characters (newlines and tabs
/// survive).
pub fn sanitize_response_text(text: &str) -> String {
    static ANSI_PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = ANSI_PATTERN.get_or_init(|| {
        Regex::new(r"\x1b(?:\[[0-9;?]*[@-~]|[@-Z\\^_])").expect("valid ANSI pattern")
    });
    pattern
        .replace_all(text, "")
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\t'))
        .collect()
}

/// Caps text at [`MAX_RESPONSE_CHARS`], replacing the tail with `...` so the
/// result is exactly the limit when truncation happened.
pub fn truncate_response_text(text: &str) -> String {
    if text.chars().count() <= MAX_RESPONSE_CHARS {
        return text.to_string();
    }
    let mut truncated: String = text
        .chars()
        .take(MAX_RESPONSE_CHARS - TRUNCATION_SUFFIX.len())
        .collect();
    truncated.push_str(TRUNCATION_SUFFIX);
    truncated
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn extracts_openai_chat_message_content() {
        let body = json!({
            "model": "gpt-4o",
            "choices": [{"message": {"role": "assistant", "content": "Hello there"}}]
        });
        assert_eq!(extract_response_text(&body).as_deref(), Some("Hello there"));
        assert_eq!(extract_model_name(&body).as_deref(), Some("gpt-4o"));
    }

    #[test]
    fn extracts_streaming_delta_content() {
        let body = json!({
            "choices": [{"delta": {"content": "partial"}}]
        });
        assert_eq!(extract_response_text(&body).as_deref(), Some("partial"));
    }

    #[test]
    fn extracts_llama_cpp_choice_text_and_root_text() {
        let with_choice = json!({"choices": [{"text": "completion"}]});
        assert_eq!(
            extract_response_text(&with_choice).as_deref(),
            Some("completion")
        );

        let with_root = json!({"text": "root completion"});
        assert_eq!(
            extract_response_text(&with_root).as_deref(),
            Some("root completion")
        );
    }

    #[test]
    fn extracts_legacy_output_shapes_skipping_input_text_nodes() {
        let body = json!({
            "output": [{
                "content": [
                    {"type": "input_text", "text": "echoed prompt"},
                    {"type": "output_text", "text": "actual answer"}
                ]
            }]
        });
        assert_eq!(
            extract_response_text(&body).as_deref(),
            Some("actual answer")
        );

        let output_text = json!({"output_text": ["piece one", " piece two"]});
        assert_eq!(
            extract_response_text(&output_text).as_deref(),
            Some("piece one piece two")
        );
    }

    #[test]
    fn joins_structured_content_arrays() {
        let body = json!({
            "choices": [{"message": {"content": [
                {"type": "text", "text": "first "},
                {"type": "text", "text": "second"}
            ]}}]
        });
        assert_eq!(
            extract_response_text(&body).as_deref(),
            Some("first second")
        );
    }

    #[test]
    fn empty_content_falls_through_to_later_shapes() {
        let body = json!({
            "choices": [{"message": {"content": ""}}],
            "text": "fallback"
        });
        assert_eq!(extract_response_text(&body).as_deref(), Some("fallback"));
    }

    #[test]
    fn nothing_extractable_yields_none() {
        assert!(extract_response_text(&json!({"usage": {"total_tokens": 2}})).is_none());
        assert!(extract_response_text(&serde_json::Value::Null).is_none());
    }

    #[test]
    fn sanitize_strips_ansi_and_control_characters() {
        let dirty = "\u{1b}[31mred\u{1b}[0m\u{0007} text\nline";
        assert_eq!(sanitize_response_text(dirty), "red text\nline");
    }

    #[test]
    fn truncation_boundary_is_exact() {
        let exact = "a".repeat(500);
        assert_eq!(truncate_response_text(&exact), exact);

        let over = "a".repeat(501);
        let truncated = truncate_response_text(&over);
        assert_eq!(truncated.chars().count(), 500);
        assert!(truncated.ends_with("..."));
    }
}
