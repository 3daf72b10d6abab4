//! Logging hook for endpoint traffic.
//!
//! Attach a [`ClientLogger`] to a [`Connection`](crate::Connection) to observe every completion
//! request and what came back.  The hook only ever sees request bodies and responses; the API key
//! travels in a header the logger has no access to.

use crate::types::{ChatCompletion, ChatCompletionChunk, ChatCompletionParams};

/// A trait for logging completion traffic.
pub trait ClientLogger: Send + Sync {
    /// Log an outgoing completion request body.
    fn log_request(&self, params: &ChatCompletionParams);

    /// Log a complete response from a non-streaming request.
    fn log_response(&self, completion: &ChatCompletion);

    /// Log one chunk of a streamed response.
    fn log_stream_chunk(&self, chunk: &ChatCompletionChunk);
}

/// Writes traffic to `tracing` at `TRACE` level.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingLogger;

impl ClientLogger for TracingLogger {
    fn log_request(&self, params: &ChatCompletionParams) {
        tracing::trace!(
            model = %params.sampling.model,
            stream = params.sampling.stream,
            messages = params.messages.len(),
            "completion request"
        );
    }

    fn log_response(&self, completion: &ChatCompletion) {
        tracing::trace!(
            id = completion.id.as_deref().unwrap_or(""),
            choices = completion.choices.len(),
            "completion response"
        );
    }

    fn log_stream_chunk(&self, chunk: &ChatCompletionChunk) {
        tracing::trace!(fragment = chunk.fragment(), "completion chunk");
    }
}
