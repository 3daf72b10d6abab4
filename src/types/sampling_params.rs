use serde::{Deserialize, Serialize};

/// The part of the session settings that is forwarded to the endpoint with every completion.
///
/// The base URL, proxy and API key select the transport and have no field here, so they never
/// travel in a request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    /// ID of the model to use.
    pub model: String,

    /// Whether to stream back partial progress.
    pub stream: bool,

    /// The maximum number of tokens to generate.
    pub max_tokens: u32,

    /// Sampling temperature.
    pub temperature: f32,

    /// Nucleus sampling probability mass.
    pub top_p: f32,

    /// Penalty for tokens in proportion to how often they already appeared.
    pub frequency_penalty: f32,

    /// Penalty for tokens that already appeared at all.
    pub presence_penalty: f32,

    /// Up to four sequences where generation stops.  Omitted from the request when empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
}
