//! Interactive terminal front-end for a chat session.
//!
//! This module provides the pieces the `chatterbox` REPL is built from:
//!
//! - [`config`]: CLI argument parsing and the startup configuration
//! - [`commands`]: Slash command parsing; settings commands become full settings payloads
//!
//! The session itself lives in [`crate::Session`]; settings commands go through
//! [`crate::Reconciler`] and messages through [`crate::Relay`].

mod commands;
mod config;

pub use crate::render::{OutputSink, PlainTextSink};
pub use commands::{ChatCommand, help_text, parse_command};
pub use config::{API_KEY_ENV_VARS, ChatArgs, ChatConfig, resolve_api_key};
