//! Per-conversation state.
//!
//! A [`Session`] owns exactly one [`History`], one committed [`Settings`] and the [`Catalog`]
//! that settings were validated against.  Sessions share nothing; every operation takes the
//! session it acts on explicitly.

use serde::Serialize;

use crate::catalog::Catalog;
use crate::error::Result;
use crate::schema::SettingsSchema;
use crate::settings::Settings;
use crate::types::Message;

/// The ordered messages of one conversation.
///
/// History only grows while a session lives; it is emptied by [`Session::restart`] and nothing
/// else.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct History {
    messages: Vec<Message>,
}

impl History {
    /// The messages, oldest first.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns true if nothing has been said yet.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The most recent message.
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub(crate) fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    fn clear(&mut self) {
        self.messages.clear();
    }
}

/// Snapshot of a session for display.  The key is redacted.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    /// Messages in the history.
    pub message_count: usize,
    /// Committed base URL.
    pub base_url: String,
    /// Committed proxy.
    pub proxy: Option<String>,
    /// The key as shown to humans: `<placeholder>` or `<redacted>`.
    pub api_key: String,
    /// Certificate validation disabled on proxied connections.
    pub insecure: bool,
    /// Committed model.
    pub model: String,
    /// Streaming enabled.
    pub stream: bool,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
    /// Nucleus sampling mass.
    pub top_p: f32,
    /// Frequency penalty.
    pub frequency_penalty: f32,
    /// Presence penalty.
    pub presence_penalty: f32,
    /// Stop sequences.
    pub stop: Vec<String>,
    /// Number of selectable models.
    pub catalog_size: usize,
}

/// One user's conversation.
#[derive(Debug, Clone)]
pub struct Session {
    history: History,
    settings: Settings,
    catalog: Catalog,
}

impl Session {
    /// Start a conversation with default settings, the fallback catalog and no messages.
    pub fn start() -> Self {
        Self {
            history: History::default(),
            settings: Settings::new(),
            catalog: Catalog::fallback(),
        }
    }

    /// Start a conversation with `settings` already committed against `catalog`.
    pub fn with_settings(settings: Settings, catalog: Catalog) -> Result<Self> {
        settings.validate(&catalog)?;
        Ok(Self {
            history: History::default(),
            settings,
            catalog,
        })
    }

    /// Begin a new conversation in this session, keeping the settings and catalog.
    pub fn restart(&mut self) {
        self.history.clear();
    }

    /// The conversation so far.
    pub fn history(&self) -> &History {
        &self.history
    }

    /// The committed settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The models the committed settings may select.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Record an inbound user message.
    pub fn push_user(&mut self, content: impl Into<String>) {
        self.history.push(Message::user(content));
    }

    /// The settings form for the committed settings and catalog.
    pub fn schema(&self) -> SettingsSchema {
        self.settings.schema(&self.catalog)
    }

    /// Summarize the session without revealing the key.
    pub fn stats(&self) -> SessionStats {
        let s = &self.settings;
        SessionStats {
            message_count: self.history.len(),
            base_url: s.base_url.clone(),
            proxy: s.proxy.clone(),
            api_key: s.api_key.to_string(),
            insecure: s.insecure,
            model: s.model.clone(),
            stream: s.stream,
            max_tokens: s.max_tokens,
            temperature: s.temperature,
            top_p: s.top_p,
            frequency_penalty: s.frequency_penalty,
            presence_penalty: s.presence_penalty,
            stop: s.stop.clone(),
            catalog_size: self.catalog.len(),
        }
    }

    pub(crate) fn record_assistant(&mut self, content: impl Into<String>) {
        self.history.push(Message::assistant(content));
    }

    /// Replace the settings.  The caller has validated them against the current catalog.
    pub(crate) fn commit(&mut self, settings: Settings) {
        self.settings = settings;
    }

    /// Replace settings and catalog together.
    pub(crate) fn commit_with_catalog(&mut self, settings: Settings, catalog: Catalog) {
        self.settings = settings;
        self.catalog = catalog;
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::start()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::ApiKey;
    use crate::types::Role;

    #[test]
    fn new_session_has_defaults() {
        let session = Session::start();
        assert!(session.history().is_empty());
        assert_eq!(session.settings(), &Settings::new());
        assert_eq!(session.catalog(), &Catalog::fallback());
        assert!(session.settings().stream);
        assert_eq!(session.settings().max_tokens, 512);
        assert_eq!(session.settings().temperature, 0.7);
    }

    #[test]
    fn history_grows_in_order() {
        let mut session = Session::start();
        session.push_user("hi");
        session.record_assistant("hello");
        session.push_user("again");
        let roles: Vec<Role> = session
            .history()
            .messages()
            .iter()
            .map(|m| m.role)
            .collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User]);
        assert_eq!(session.history().last().unwrap().content, "again");
    }

    #[test]
    fn restart_keeps_settings() {
        let mut session = Session::start();
        let settings = Settings::new().with_temperature(0.2);
        session.commit(settings.clone());
        session.push_user("hi");
        session.restart();
        assert!(session.history().is_empty());
        assert_eq!(session.settings(), &settings);
        assert_eq!(session.catalog(), &Catalog::fallback());
    }

    #[test]
    fn with_settings_validates_model() {
        let catalog = Catalog::new(vec!["modelA".to_string()]);
        let err = Session::with_settings(Settings::new(), catalog.clone()).unwrap_err();
        assert!(err.is_validation());
        let session =
            Session::with_settings(Settings::new().with_model("modelA"), catalog).unwrap();
        assert_eq!(session.settings().model, "modelA");
    }

    #[test]
    fn stats_redact_key() {
        let mut session = Session::start();
        session.commit(Settings::new().with_api_key(ApiKey::new("sk-secret")));
        session.push_user("hi");
        let stats = session.stats();
        assert_eq!(stats.message_count, 1);
        assert_eq!(stats.api_key, "<redacted>");
        assert_eq!(stats.catalog_size, Catalog::fallback().len());
        let json = serde_json::to_string(&stats).unwrap();
        assert!(!json.contains("sk-secret"));
    }
}
