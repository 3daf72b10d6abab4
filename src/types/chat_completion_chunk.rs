use serde::{Deserialize, Serialize};

use crate::types::Role;

/// One server-sent event of a streamed `chat/completions` response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    /// Identifier shared by all chunks of one completion.
    #[serde(default)]
    pub id: Option<String>,

    /// The model producing the stream.
    #[serde(default)]
    pub model: Option<String>,

    /// Incremental deltas.  Usage-only chunks carry none.
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

/// The delta for one choice within a chunk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkChoice {
    /// Position of the choice this delta extends.
    #[serde(default)]
    pub index: u32,

    /// The new content.
    #[serde(default)]
    pub delta: ChunkDelta,

    /// Set on the last chunk of a choice.
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// New content carried by a [`ChunkChoice`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkDelta {
    /// Present on the first chunk only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,

    /// The text fragment, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl ChatCompletionChunk {
    /// The text fragment of the first choice; empty when the chunk carries none.
    pub fn fragment(&self) -> &str {
        self.choices
            .first()
            .and_then(|choice| choice.delta.content.as_deref())
            .unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragment_from_delta() {
        let json = serde_json::json!({
            "id": "chatcmpl-1",
            "object": "chat.completion.chunk",
            "choices": [{"index": 0, "delta": {"content": "Hel"}, "finish_reason": null}]
        });
        let chunk: ChatCompletionChunk = serde_json::from_value(json).unwrap();
        assert_eq!(chunk.fragment(), "Hel");
    }

    #[test]
    fn role_only_delta_is_empty() {
        let json = serde_json::json!({
            "choices": [{"index": 0, "delta": {"role": "assistant"}}]
        });
        let chunk: ChatCompletionChunk = serde_json::from_value(json).unwrap();
        assert_eq!(chunk.fragment(), "");
        assert_eq!(chunk.choices[0].delta.role, Some(Role::Assistant));
    }

    #[test]
    fn usage_chunk_without_choices() {
        let json = serde_json::json!({"choices": [], "usage": {"total_tokens": 9}});
        let chunk: ChatCompletionChunk = serde_json::from_value(json).unwrap();
        assert_eq!(chunk.fragment(), "");
    }
}
