//! Wire types and payload extraction for the gateway's OpenAI-compatible
//! HTTP surface.
//!
//! Requests carry `{model, messages, stream}`. Responses arrive either
//! buffered (`{choices:[{message:{content}}]}`) or as streamed deltas
//! (`{choices:[{delta:{content}}]}`). The extraction helpers here are
//! deliberately tolerant: gateways differ in how faithfully they implement
//! the shape, so unexpected bodies degrade to usable text instead of errors.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One message in the conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message role: `system`, `user`, or `assistant`.
    pub role: String,
    /// Message text.
    pub content: String,
}

impl ChatMessage {
    /// A `system` message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_owned(),
            content: content.into(),
        }
    }

    /// A `user` message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_owned(),
            content: content.into(),
        }
    }

    /// An `assistant` message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_owned(),
            content: content.into(),
        }
    }
}

/// What one streamed `data:` payload contributes to the reply.
///
/// Valid JSON yields the first choice's non-empty delta content; payloads
/// without content (role announcements, finish chunks) yield `None`. A
/// payload that is not JSON at all is surfaced verbatim so a misbehaving
/// gateway still produces visible output.
pub fn stream_fragment(data: &str) -> Option<String> {
    match serde_json::from_str::<Value>(data) {
        Ok(value) => value["choices"][0]["delta"]["content"]
            .as_str()
            .filter(|s| !s.is_empty())
            .map(str::to_owned),
        Err(_) => {
            let raw = data.trim();
            if raw.is_empty() {
                None
            } else {
                Some(raw.to_owned())
            }
        }
    }
}

/// Extract the assistant text from a buffered completion body.
///
/// Falls back from the standard shape to a bare JSON string body, then to
/// the serialized body itself, and finally to the raw text for non-JSON.
pub fn completion_text(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(value) => {
            if let Some(content) = value["choices"][0]["message"]["content"].as_str() {
                content.to_owned()
            } else if let Some(s) = value.as_str() {
                s.to_owned()
            } else {
                value.to_string()
            }
        }
        Err(_) => body.trim().to_owned(),
    }
}

/// Model identifiers from a models-listing body.
///
/// Accepts both `{"data":[{"id":...}]}` and `{"models":[...]}`, where
/// `models` entries may be bare strings or `{"id":...}` objects.
pub fn model_ids(value: &Value) -> Vec<String> {
    let entries = value
        .get("data")
        .and_then(Value::as_array)
        .or_else(|| value.get("models").and_then(Value::as_array));

    let Some(entries) = entries else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| {
            if let Some(id) = entry.as_str() {
                Some(id.to_owned())
            } else {
                entry["id"].as_str().map(str::to_owned)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use serde_json::json;

    #[test]
    fn message_constructors_set_roles() {
        assert_eq!(ChatMessage::system("s").role, "system");
        assert_eq!(ChatMessage::user("u").role, "user");
        assert_eq!(ChatMessage::assistant("a").role, "assistant");
    }

    #[test]
    fn message_serializes_to_wire_shape() {
        let serialized = serde_json::to_value(ChatMessage::user("hi")).unwrap();
        assert_eq!(serialized, json!({"role": "user", "content": "hi"}));
    }

    #[test]
    fn stream_fragment_extracts_delta_content() {
        let data = r#"{"choices":[{"delta":{"content":"Hel"}}]}"#;
        assert_eq!(stream_fragment(data), Some("Hel".to_owned()));
    }

    #[test]
    fn stream_fragment_role_announcement_is_none() {
        let data = r#"{"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert_eq!(stream_fragment(data), None);
    }

    #[test]
    fn stream_fragment_finish_chunk_is_none() {
        let data = r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#;
        assert_eq!(stream_fragment(data), None);
    }

    #[test]
    fn stream_fragment_empty_content_is_none() {
        let data = r#"{"choices":[{"delta":{"content":""}}]}"#;
        assert_eq!(stream_fragment(data), None);
    }

    #[test]
    fn stream_fragment_non_json_passes_through() {
        assert_eq!(stream_fragment("plain text"), Some("plain text".to_owned()));
    }

    #[test]
    fn stream_fragment_blank_non_json_is_none() {
        assert_eq!(stream_fragment("   "), None);
    }

    #[test]
    fn completion_text_standard_shape() {
        let body = r#"{"choices":[{"message":{"content":"hi"}}]}"#;
        assert_eq!(completion_text(body), "hi");
    }

    #[test]
    fn completion_text_bare_json_string() {
        assert_eq!(completion_text("\"just text\""), "just text");
    }

    #[test]
    fn completion_text_unknown_object_serialized() {
        let body = r#"{"answer":42}"#;
        assert_eq!(completion_text(body), "{\"answer\":42}");
    }

    #[test]
    fn completion_text_non_json_verbatim() {
        assert_eq!(completion_text("  raw body  "), "raw body");
    }

    #[test]
    fn model_ids_data_shape() {
        let body = json!({"data": [{"id": "gpt-4o-mini"}, {"id": "claude-sonnet"}]});
        assert_eq!(model_ids(&body), vec!["gpt-4o-mini", "claude-sonnet"]);
    }

    #[test]
    fn model_ids_models_shape_mixed() {
        let body = json!({"models": ["m1", {"id": "m2"}, 7]});
        assert_eq!(model_ids(&body), vec!["m1", "m2"]);
    }

    #[test]
    fn model_ids_missing_lists() {
        assert!(model_ids(&json!({"status": "ok"})).is_empty());
    }
}
