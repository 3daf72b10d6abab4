//! Slash command parsing for the chat application.
//!
//! Commands that change a setting produce the complete updated [`Settings`] through
//! [`ChatCommand::apply_to`]; the caller hands that payload to the reconciler exactly like a
//! settings-change event from any other UI.

use std::ops::RangeInclusive;

use crate::settings::{
    ApiKey, FREQUENCY_PENALTY_RANGE, PRESENCE_PENALTY_RANGE, Settings, TEMPERATURE_RANGE,
    TOP_P_RANGE,
};

/// A parsed chat command.
///
/// These commands control the chat session and are not sent to the endpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatCommand {
    /// Point the session at another endpoint.
    BaseUrl(String),

    /// Replace the API key.
    ApiKey(ApiKey),

    /// Set or clear the forwarding proxy.
    Proxy(Option<String>),

    /// Accept any certificate through the proxy.
    Insecure(bool),

    /// Change the model.
    Model(String),

    /// List the selectable models.
    Models,

    /// Enable or disable streaming.
    Stream(bool),

    /// Set the maximum tokens per response.
    MaxTokens(u32),

    /// Set the sampling temperature.
    Temperature(f32),

    /// Set the top-p value.
    TopP(f32),

    /// Set the frequency penalty.
    FrequencyPenalty(f32),

    /// Set the presence penalty.
    PresencePenalty(f32),

    /// Add a stop sequence.
    AddStopSequence(String),

    /// Clear all stop sequences.
    ClearStopSequences,

    /// List stop sequences.
    ListStopSequences,

    /// Start a new conversation.
    Clear,

    /// Show the current configuration.
    ShowConfig,

    /// Show the settings form as JSON.
    Schema,

    /// Display session statistics.
    Stats,

    /// Display help information.
    Help,

    /// Exit the chat application.
    Quit,

    /// Report a parsing error back to the caller.
    Invalid(String),
}

impl ChatCommand {
    /// The settings payload this command asks to commit, or `None` if it changes no setting.
    pub fn apply_to(&self, current: &Settings) -> Option<Settings> {
        let settings = current.clone();
        let updated = match self {
            ChatCommand::BaseUrl(url) => settings.with_base_url(url.clone()),
            ChatCommand::ApiKey(key) => settings.with_api_key(key.clone()),
            ChatCommand::Proxy(proxy) => settings.with_proxy(proxy.clone()),
            ChatCommand::Insecure(insecure) => settings.with_insecure(*insecure),
            ChatCommand::Model(model) => settings.with_model(model.clone()),
            ChatCommand::Stream(stream) => settings.with_stream(*stream),
            ChatCommand::MaxTokens(value) => settings.with_max_tokens(*value),
            ChatCommand::Temperature(value) => settings.with_temperature(*value),
            ChatCommand::TopP(value) => settings.with_top_p(*value),
            ChatCommand::FrequencyPenalty(value) => settings.with_frequency_penalty(*value),
            ChatCommand::PresencePenalty(value) => settings.with_presence_penalty(*value),
            ChatCommand::AddStopSequence(sequence) => {
                let mut stop = settings.stop.clone();
                stop.push(sequence.clone());
                settings.with_stop(stop)
            }
            ChatCommand::ClearStopSequences => settings.with_stop(Vec::new()),
            _ => return None,
        };
        Some(updated)
    }
}

/// Parses user input for slash commands.
///
/// Returns `Some(ChatCommand)` if the input is a valid command,
/// or `None` if it should be treated as a regular message.
///
/// # Examples
///
/// ```
/// # use chatterbox::chat::parse_command;
/// assert!(parse_command("/quit").is_some());
/// assert!(parse_command("/model gpt-4o").is_some());
/// assert!(parse_command("Hello there!").is_none());
/// ```
pub fn parse_command(input: &str) -> Option<ChatCommand> {
    let input = input.trim();
    let rest = input.strip_prefix('/')?;

    let mut parts = rest.splitn(2, ' ');
    let command = parts.next()?.to_lowercase();
    let argument = parts.next().map(|s| s.trim()).filter(|s| !s.is_empty());

    let result = match command.as_str() {
        "base_url" => match argument {
            Some(url) => ChatCommand::BaseUrl(url.to_string()),
            None => ChatCommand::Invalid("/base_url requires a URL".to_string()),
        },
        "api_key" => match argument {
            Some(key) => ChatCommand::ApiKey(ApiKey::new(key)),
            None => ChatCommand::Invalid("/api_key requires a key".to_string()),
        },
        "proxy" => match argument {
            Some(arg) if arg.eq_ignore_ascii_case("clear") => ChatCommand::Proxy(None),
            Some(url) => ChatCommand::Proxy(Some(url.to_string())),
            None => ChatCommand::Invalid("/proxy requires a URL or 'clear'".to_string()),
        },
        "insecure" => match argument.and_then(parse_on_off) {
            Some(value) => ChatCommand::Insecure(value),
            None => ChatCommand::Invalid("/insecure expects 'on' or 'off'".to_string()),
        },
        "model" => match argument {
            Some(model) => ChatCommand::Model(model.to_string()),
            None => ChatCommand::Invalid("/model requires a model name".to_string()),
        },
        "models" => ChatCommand::Models,
        "stream" => match argument.and_then(parse_on_off) {
            Some(value) => ChatCommand::Stream(value),
            None => ChatCommand::Invalid("/stream expects 'on' or 'off'".to_string()),
        },
        "max_tokens" => parse_u32_command(argument, ChatCommand::MaxTokens, "/max_tokens"),
        "temperature" => parse_f32_command(
            argument,
            TEMPERATURE_RANGE,
            ChatCommand::Temperature,
            "/temperature",
        ),
        "top_p" => parse_f32_command(argument, TOP_P_RANGE, ChatCommand::TopP, "/top_p"),
        "frequency_penalty" => parse_f32_command(
            argument,
            FREQUENCY_PENALTY_RANGE,
            ChatCommand::FrequencyPenalty,
            "/frequency_penalty",
        ),
        "presence_penalty" => parse_f32_command(
            argument,
            PRESENCE_PENALTY_RANGE,
            ChatCommand::PresencePenalty,
            "/presence_penalty",
        ),
        "stop" => parse_stop_command(argument),
        "clear" => ChatCommand::Clear,
        "config" => ChatCommand::ShowConfig,
        "schema" => ChatCommand::Schema,
        "stats" | "status" => ChatCommand::Stats,
        "help" | "?" => ChatCommand::Help,
        "quit" | "exit" | "q" => ChatCommand::Quit,
        _ => ChatCommand::Invalid(format!("Unknown command: /{}", command)),
    };

    Some(result)
}

fn parse_stop_command(argument: Option<&str>) -> ChatCommand {
    let Some(arg) = argument else {
        return ChatCommand::Invalid(
            "/stop requires 'add <sequence>', 'clear', or 'list'".to_string(),
        );
    };

    let mut parts = arg.splitn(2, ' ');
    let action = parts.next().unwrap_or_default();
    match action.to_lowercase().as_str() {
        "add" => {
            let Some(sequence) = parts.next().map(|s| s.trim()).filter(|s| !s.is_empty()) else {
                return ChatCommand::Invalid("/stop add requires a sequence".to_string());
            };
            ChatCommand::AddStopSequence(sequence.to_string())
        }
        "clear" => ChatCommand::ClearStopSequences,
        "list" => ChatCommand::ListStopSequences,
        _ => {
            ChatCommand::Invalid("Unrecognized /stop action (use add, clear, or list)".to_string())
        }
    }
}

fn parse_u32_command<F>(argument: Option<&str>, constructor: F, name: &str) -> ChatCommand
where
    F: Fn(u32) -> ChatCommand,
{
    match argument {
        Some(arg) => match arg.parse::<u32>() {
            Ok(value) => constructor(value),
            Err(_) => ChatCommand::Invalid(format!("{} expects a positive integer", name)),
        },
        None => ChatCommand::Invalid(format!("{} requires a value", name)),
    }
}

fn parse_f32_command<F>(
    argument: Option<&str>,
    range: RangeInclusive<f32>,
    constructor: F,
    name: &str,
) -> ChatCommand
where
    F: Fn(f32) -> ChatCommand,
{
    match argument {
        Some(arg) => match parse_f32_in_range(arg, range) {
            Ok(value) => constructor(value),
            Err(err) => ChatCommand::Invalid(format!("{name} {err}")),
        },
        None => ChatCommand::Invalid(format!("{} requires a value", name)),
    }
}

/// Parses `value` as a float inside `range`.
pub(crate) fn parse_f32_in_range(value: &str, range: RangeInclusive<f32>) -> Result<f32, String> {
    let (min, max) = (*range.start(), *range.end());
    let parsed: f32 = value
        .parse()
        .map_err(|_| format!("expects a value between {min} and {max}"))?;
    if parsed.is_finite() && range.contains(&parsed) {
        Ok(parsed)
    } else {
        Err(format!("expects a value between {min} and {max}"))
    }
}

fn parse_on_off(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "on" | "true" | "yes" => Some(true),
        "off" | "false" | "no" => Some(false),
        _ => None,
    }
}

/// Returns help text describing available commands.
pub fn help_text() -> &'static str {
    r#"Available commands:
  /base_url <url>            Point at another endpoint (refreshes the model list)
  /api_key <key>             Replace the API key
  /proxy <url>|clear         Route traffic through a proxy, or stop doing so
  /insecure on|off           Accept any certificate through the proxy
  /model <name>              Change the model (must be in /models)
  /models                    List the selectable models
  /stream on|off             Stream responses token by token
  /max_tokens <n>            Set maximum response tokens (64-131072)
  /temperature <v>           Set temperature 0.0-1.0
  /top_p <v>                 Set top-p 0.0-1.0
  /frequency_penalty <v>     Set frequency penalty 0.0-2.0
  /presence_penalty <v>      Set presence penalty -2.0-2.0
  /stop add <seq>            Add a stop sequence (at most 4)
  /stop clear                Clear all stop sequences
  /stop list                 List current stop sequences
  /clear                     Start a new conversation
  /config                    Show current configuration
  /schema                    Show the settings form as JSON
  /stats                     Show session statistics
  /help                      Show this help message
  /quit                      Exit the chat"#
}
