//! Configuration types for the chat application.
//!
//! This module provides CLI argument parsing via `arrrg` and the resolved
//! configuration the REPL starts from.

use arrrg_derive::CommandLine;

use crate::chat::commands::parse_f32_in_range;
use crate::error::{Error, Result};
use crate::settings::{
    ApiKey, FREQUENCY_PENALTY_RANGE, PRESENCE_PENALTY_RANGE, Settings, TEMPERATURE_RANGE,
    TOP_P_RANGE,
};

/// Environment variables consulted for the API key, in order.
pub const API_KEY_ENV_VARS: &[&str] = &["CHATTERBOX_API_KEY", "OPENAI_API_KEY"];

/// Command-line arguments for the chatterbox tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// Base URL of the endpoint.
    #[arrrg(optional, "Endpoint base URL (default: https://api.openai.com/v1)", "URL")]
    pub base_url: Option<String>,

    /// API key; falls back to the environment.
    #[arrrg(optional, "API key (default: $CHATTERBOX_API_KEY, then $OPENAI_API_KEY)", "KEY")]
    pub api_key: Option<String>,

    /// Forwarding proxy.
    #[arrrg(optional, "Route endpoint traffic through this proxy", "URL")]
    pub proxy: Option<String>,

    /// Accept any certificate through the proxy.
    #[arrrg(flag, "Disable certificate validation on proxied connections")]
    pub insecure: bool,

    /// Model to select once the endpoint's catalog is known.
    #[arrrg(optional, "Model to use (default: first model the endpoint lists)", "MODEL")]
    pub model: Option<String>,

    /// Maximum tokens per response.
    #[arrrg(optional, "Max tokens per response (default: 512)", "TOKENS")]
    pub max_tokens: Option<u32>,

    /// Sampling temperature.
    #[arrrg(optional, "Sampling temperature 0.0-1.0 (default: 0.7)", "VALUE")]
    pub temperature: Option<String>,

    /// Nucleus sampling mass.
    #[arrrg(optional, "Top-p 0.0-1.0 (default: 0.3)", "VALUE")]
    pub top_p: Option<String>,

    /// Frequency penalty.
    #[arrrg(optional, "Frequency penalty 0.0-2.0 (default: 0.7)", "VALUE")]
    pub frequency_penalty: Option<String>,

    /// Presence penalty.
    #[arrrg(optional, "Presence penalty -2.0-2.0 (default: 0.4)", "VALUE")]
    pub presence_penalty: Option<String>,

    /// A stop sequence.
    #[arrrg(optional, "Stop generating at this sequence", "SEQUENCE")]
    pub stop: Option<String>,

    /// Disable streaming.
    #[arrrg(flag, "Wait for the whole response instead of streaming it")]
    pub no_stream: bool,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,
}

/// Configuration for a chat session.
///
/// `settings` is the first settings-change event the REPL applies.  A requested `model` is
/// applied in a second event, after the endpoint's catalog has been resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatConfig {
    /// Settings to reconcile at startup.
    pub settings: Settings,

    /// Model to select after the catalog is known.
    pub model: Option<String>,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,
}

impl ChatConfig {
    /// Creates a new ChatConfig with default settings.
    pub fn new() -> Self {
        Self {
            settings: Settings::new(),
            model: None,
            use_color: true,
        }
    }

    /// Resolve `args`, looking up missing values with `env`.
    pub fn from_args<F>(args: ChatArgs, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Settings::new()
            .with_api_key(resolve_api_key(args.api_key, env))
            .with_proxy(args.proxy)
            .with_insecure(args.insecure)
            .with_stream(!args.no_stream);
        if let Some(base_url) = args.base_url {
            settings = settings.with_base_url(base_url);
        }
        if let Some(max_tokens) = args.max_tokens {
            settings = settings.with_max_tokens(max_tokens);
        }
        if let Some(value) = args.temperature {
            settings = settings.with_temperature(parse_float_arg(
                "temperature",
                &value,
                TEMPERATURE_RANGE,
            )?);
        }
        if let Some(value) = args.top_p {
            settings = settings.with_top_p(parse_float_arg("top_p", &value, TOP_P_RANGE)?);
        }
        if let Some(value) = args.frequency_penalty {
            settings = settings.with_frequency_penalty(parse_float_arg(
                "frequency_penalty",
                &value,
                FREQUENCY_PENALTY_RANGE,
            )?);
        }
        if let Some(value) = args.presence_penalty {
            settings = settings.with_presence_penalty(parse_float_arg(
                "presence_penalty",
                &value,
                PRESENCE_PENALTY_RANGE,
            )?);
        }
        if let Some(stop) = args.stop {
            settings = settings.with_stop(vec![stop]);
        }
        Ok(ChatConfig {
            settings,
            model: args.model,
            use_color: !args.no_color,
        })
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<ChatArgs> for ChatConfig {
    type Error = Error;

    fn try_from(args: ChatArgs) -> Result<Self> {
        Self::from_args(args, |name| std::env::var(name).ok())
    }
}

/// The explicit key, else the first non-empty key variable, else the placeholder.
pub fn resolve_api_key<F>(explicit: Option<String>, env: F) -> ApiKey
where
    F: Fn(&str) -> Option<String>,
{
    explicit
        .or_else(|| {
            API_KEY_ENV_VARS
                .iter()
                .filter_map(|name| env(name))
                .find(|key| !key.trim().is_empty())
        })
        .map(ApiKey::new)
        .unwrap_or_else(ApiKey::placeholder)
}

fn parse_float_arg(
    name: &str,
    value: &str,
    range: std::ops::RangeInclusive<f32>,
) -> Result<f32> {
    parse_f32_in_range(value, range).map_err(|err| {
        Error::validation(
            format!("--{} {err}", name.replace('_', "-")),
            Some(name.to_string()),
        )
    })
}
