use serde::{Deserialize, Serialize};

use crate::types::{Message, SamplingParams};

/// Body of a `POST chat/completions` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionParams {
    /// The conversation so far, oldest first.
    pub messages: Vec<Message>,

    /// Model and sampling parameters, flattened into the top-level object.
    #[serde(flatten)]
    pub sampling: SamplingParams,
}

impl ChatCompletionParams {
    /// Create request parameters from a conversation and the sampling parameters.
    pub fn new(messages: Vec<Message>, sampling: SamplingParams) -> Self {
        Self { messages, sampling }
    }

    /// Returns true if the request asks for a server-sent-event stream.
    pub fn is_streaming(&self) -> bool {
        self.sampling.stream
    }
}
