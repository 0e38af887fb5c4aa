//! Token usage as reported in provider response bodies.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

/// Read token counts from an OpenAI, Anthropic or Gemini response body.
pub fn extract_usage(body: &Value) -> Option<TokenUsage> {
    if let Some(usage) = body.get("usage") {
        // OpenAI and compatible APIs.
        if let Some(prompt) = usage.get("prompt_tokens").and_then(Value::as_u64) {
            return Some(TokenUsage {
                input_tokens: prompt,
                output_tokens: usage
                    .get("completion_tokens")
                    .and_then(Value::as_u64)
                    .unwrap_or(0),
            });
        }
        // Anthropic.
        if let Some(input) = usage.get("input_tokens").and_then(Value::as_u64) {
            return Some(TokenUsage {
                input_tokens: input,
                output_tokens: usage
                    .get("output_tokens")
                    .and_then(Value::as_u64)
                    .unwrap_or(0),
            });
        }
    }

    // Gemini.
    let meta = body.get("usageMetadata")?;
    let prompt = meta.get("promptTokenCount")?.as_u64()?;
    let candidates = meta
        .get("candidatesTokenCount")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    Some(TokenUsage {
        input_tokens: prompt,
        output_tokens: candidates,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn openai_usage() {
        let body = json!({
            "choices": [],
            "usage": {"prompt_tokens": 12, "completion_tokens": 30, "total_tokens": 42}
        });
        let usage = extract_usage(&body).unwrap();
        assert_eq!(usage, TokenUsage { input_tokens: 12, output_tokens: 30 });
        assert_eq!(usage.total(), 42);
    }

    #[test]
    fn anthropic_usage() {
        let body = json!({
            "content": [{"type": "text", "text": "hi"}],
            "usage": {"input_tokens": 7, "output_tokens": 3}
        });
        assert_eq!(extract_usage(&body).unwrap().total(), 10);
    }

    #[test]
    fn gemini_usage_without_candidates() {
        let body = json!({"usageMetadata": {"promptTokenCount": 9}});
        assert_eq!(
            extract_usage(&body),
            Some(TokenUsage { input_tokens: 9, output_tokens: 0 })
        );
    }

    #[test]
    fn missing_usage_is_none() {
        assert_eq!(extract_usage(&json!({"ok": true})), None);
        assert_eq!(extract_usage(&json!({"usage": {}})), None);
        assert_eq!(extract_usage(&Value::Null), None);
    }
}
