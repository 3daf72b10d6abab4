// Public modules
pub mod chat_completion;
pub mod chat_completion_chunk;
pub mod chat_completion_params;
pub mod message;
pub mod model_list_response;
pub mod sampling_params;

// Re-exports
pub use chat_completion::{ChatCompletion, CompletionChoice, CompletionMessage};
pub use chat_completion_chunk::{ChatCompletionChunk, ChunkChoice, ChunkDelta};
pub use chat_completion_params::ChatCompletionParams;
pub use message::{Message, Role};
pub use model_list_response::{ModelInfo, ModelListResponse};
pub use sampling_params::SamplingParams;
