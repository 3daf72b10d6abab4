use serde::{Deserialize, Serialize};

use crate::types::Role;

/// A complete, non-streamed response from `chat/completions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletion {
    /// Identifier assigned by the endpoint.
    #[serde(default)]
    pub id: Option<String>,

    /// The model that produced the completion.
    #[serde(default)]
    pub model: Option<String>,

    /// The generated alternatives.  The relay only ever reads the first.
    pub choices: Vec<CompletionChoice>,
}

/// One generated alternative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionChoice {
    /// Position of this choice.
    #[serde(default)]
    pub index: u32,

    /// The generated message.
    pub message: CompletionMessage,

    /// Why generation ended.
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// The assistant message inside a [`CompletionChoice`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionMessage {
    /// Always `assistant` in practice.
    pub role: Role,

    /// Generated text.  Some endpoints send `null` here.
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatCompletion {
    /// Text of the first choice, or `None` when the endpoint returned no choices.
    pub fn first_content(&self) -> Option<&str> {
        self.choices
            .first()
            .map(|choice| choice.message.content.as_deref().unwrap_or(""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_deserialization() {
        let json = serde_json::json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "created": 1700000000,
            "model": "gpt-4o-mini",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "Hello there"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 3, "completion_tokens": 2, "total_tokens": 5}
        });
        let completion: ChatCompletion = serde_json::from_value(json).unwrap();
        assert_eq!(completion.first_content(), Some("Hello there"));
        assert_eq!(completion.choices[0].finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn null_content_is_empty() {
        let json = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": null}}]
        });
        let completion: ChatCompletion = serde_json::from_value(json).unwrap();
        assert_eq!(completion.first_content(), Some(""));
    }

    #[test]
    fn no_choices() {
        let completion: ChatCompletion =
            serde_json::from_value(serde_json::json!({"choices": []})).unwrap();
        assert_eq!(completion.first_content(), None);
    }
}
