//! Relaying a conversation to the endpoint and the answer to the user.

use std::time::Instant;

use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::backend::CompletionBackend;
use crate::error::{Error, Result};
use crate::observability::{
    RELAY_DURATION, RELAY_EMPTY_FRAGMENTS, RELAY_ERRORS, RELAY_FRAGMENTS, RELAY_REQUESTS,
};
use crate::render::OutputSink;
use crate::session::Session;
use crate::types::ChatCompletionParams;

/// Sends a session's history to a [`CompletionBackend`] and delivers the reply to an
/// [`OutputSink`].
pub struct Relay<B> {
    backend: B,
}

impl<B: CompletionBackend> Relay<B> {
    /// A relay that completes with `backend`.
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// The backend in use.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Answer the conversation in `session`.
    ///
    /// On success exactly one assistant message, equal to what the sink received, is appended to
    /// the history.  On failure nothing is appended, the error text is shown through
    /// [`OutputSink::print_error`], and fragments already delivered stay delivered.
    pub async fn respond(&self, session: &mut Session, sink: &mut dyn OutputSink) -> Result<()> {
        RELAY_REQUESTS.click();
        let start = Instant::now();
        let settings = session.settings();
        let params = ChatCompletionParams::new(
            session.history().messages().to_vec(),
            settings.sampling(),
        );
        info!(
            model = %settings.model,
            stream = settings.stream,
            messages = params.messages.len(),
            "relaying conversation"
        );

        let result = if settings.stream {
            self.stream(session, params, sink).await
        } else {
            self.complete(session, params, sink).await
        };
        RELAY_DURATION.add(start.elapsed().as_secs_f64());

        match result {
            Ok(content) => {
                debug!(chars = content.len(), "assistant turn committed");
                session.record_assistant(content);
                Ok(())
            }
            Err(err) => {
                RELAY_ERRORS.click();
                warn!(category = ?err.category(), "relay failed: {err}");
                if err.is_abort() {
                    sink.print_interrupted();
                } else {
                    sink.print_error(&err.to_string());
                }
                Err(err)
            }
        }
    }

    async fn stream(
        &self,
        session: &Session,
        params: ChatCompletionParams,
        sink: &mut dyn OutputSink,
    ) -> Result<String> {
        sink.open_message()?;
        let mut fragments = self.backend.stream(session.settings(), params).await?;
        let mut content = String::new();
        while let Some(fragment) = fragments.next().await {
            if sink.should_interrupt() {
                return Err(Error::abort("stream interrupted"));
            }
            let fragment = fragment?;
            if fragment.is_empty() {
                RELAY_EMPTY_FRAGMENTS.click();
                continue;
            }
            RELAY_FRAGMENTS.click();
            sink.append_token(&fragment)?;
            content.push_str(&fragment);
        }
        sink.finalize(&content)?;
        Ok(content)
    }

    async fn complete(
        &self,
        session: &Session,
        params: ChatCompletionParams,
        sink: &mut dyn OutputSink,
    ) -> Result<String> {
        let content = self.backend.complete(session.settings(), params).await?;
        sink.send_message(&content)?;
        sink.finalize(&content)?;
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use futures::stream;

    use super::*;
    use crate::backend::FragmentStream;
    use crate::settings::Settings;
    use crate::types::{Message, Role};

    /// Answers from a script and remembers every request.
    struct ScriptedBackend {
        fragments: Vec<Result<String>>,
        refusal: Option<Error>,
        requests: Mutex<Vec<ChatCompletionParams>>,
    }

    impl ScriptedBackend {
        fn new(fragments: Vec<Result<String>>) -> Self {
            Self {
                fragments,
                refusal: None,
                requests: Mutex::new(Vec::new()),
            }
        }

        fn refusing(err: Error) -> Self {
            Self {
                refusal: Some(err),
                ..Self::new(Vec::new())
            }
        }

        fn ok(fragments: &[&str]) -> Self {
            Self::new(fragments.iter().map(|f| Ok(f.to_string())).collect())
        }
    }

    #[async_trait]
    impl CompletionBackend for ScriptedBackend {
        async fn complete(
            &self,
            _: &Settings,
            params: ChatCompletionParams,
        ) -> Result<String> {
            self.requests.lock().unwrap().push(params);
            self.fragments.iter().cloned().collect()
        }

        async fn stream(
            &self,
            _: &Settings,
            params: ChatCompletionParams,
        ) -> Result<FragmentStream> {
            self.requests.lock().unwrap().push(params);
            if let Some(err) = &self.refusal {
                return Err(err.clone());
            }
            Ok(Box::pin(stream::iter(self.fragments.clone())))
        }
    }

    #[derive(Debug, PartialEq)]
    enum Call {
        Open,
        Append(String),
        Finalize(String),
        Send(String),
        Error(String),
        Interrupted,
    }

    #[derive(Default)]
    struct RecordingSink {
        calls: Vec<Call>,
        interrupt_after: Option<usize>,
        fail_appends: bool,
    }

    impl OutputSink for RecordingSink {
        fn open_message(&mut self) -> Result<()> {
            self.calls.push(Call::Open);
            Ok(())
        }

        fn append_token(&mut self, token: &str) -> Result<()> {
            if self.fail_appends {
                return Err(Error::abort("sink closed"));
            }
            self.calls.push(Call::Append(token.to_string()));
            Ok(())
        }

        fn finalize(&mut self, content: &str) -> Result<()> {
            self.calls.push(Call::Finalize(content.to_string()));
            Ok(())
        }

        fn send_message(&mut self, content: &str) -> Result<()> {
            self.calls.push(Call::Send(content.to_string()));
            Ok(())
        }

        fn print_error(&mut self, error: &str) {
            self.calls.push(Call::Error(error.to_string()));
        }

        fn print_info(&mut self, _: &str) {}

        fn print_interrupted(&mut self) {
            self.calls.push(Call::Interrupted);
        }

        fn should_interrupt(&self) -> bool {
            let appended = self
                .calls
                .iter()
                .filter(|c| matches!(c, Call::Append(_)))
                .count();
            self.interrupt_after.is_some_and(|n| appended >= n)
        }
    }

    fn session(stream: bool) -> Session {
        let mut session = Session::start();
        session.commit(Settings::new().with_stream(stream));
        session.push_user("hi");
        session
    }

    #[tokio::test]
    async fn streaming_skips_empty_fragments() {
        let relay = Relay::new(ScriptedBackend::ok(&["Hel", "", "lo"]));
        let mut session = session(true);
        let mut sink = RecordingSink::default();
        relay.respond(&mut session, &mut sink).await.unwrap();
        assert_eq!(
            sink.calls,
            vec![
                Call::Open,
                Call::Append("Hel".to_string()),
                Call::Append("lo".to_string()),
                Call::Finalize("Hello".to_string()),
            ]
        );
        assert_eq!(session.history().len(), 2);
        assert_eq!(
            session.history().last(),
            Some(&Message::assistant("Hello"))
        );
    }

    #[tokio::test]
    async fn non_streaming_sends_once() {
        let relay = Relay::new(ScriptedBackend::ok(&["Hello there"]));
        let mut session = session(false);
        let mut sink = RecordingSink::default();
        relay.respond(&mut session, &mut sink).await.unwrap();
        assert_eq!(
            sink.calls,
            vec![
                Call::Send("Hello there".to_string()),
                Call::Finalize("Hello there".to_string()),
            ]
        );
        assert_eq!(
            session.history().last(),
            Some(&Message::assistant("Hello there"))
        );
    }

    #[tokio::test]
    async fn request_carries_history_and_sampling_only() {
        let relay = Relay::new(ScriptedBackend::ok(&["ok"]));
        let mut session = session(true);
        let mut sink = RecordingSink::default();
        relay.respond(&mut session, &mut sink).await.unwrap();
        let requests = relay.backend().requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].messages, vec![Message::user("hi")]);
        assert_eq!(requests[0].sampling, session.settings().sampling());
        let body = serde_json::to_value(&requests[0]).unwrap();
        assert!(body.get("api_key").is_none());
        assert!(body.get("base_url").is_none());
    }

    #[tokio::test]
    async fn stream_error_commits_nothing() {
        let relay = Relay::new(ScriptedBackend::new(vec![
            Ok("partial".to_string()),
            Err(Error::streaming("connection reset", None)),
            Ok("never".to_string()),
        ]));
        let mut session = session(true);
        let mut sink = RecordingSink::default();
        let err = relay.respond(&mut session, &mut sink).await.unwrap_err();
        assert!(err.to_string().contains("connection reset"));
        assert_eq!(sink.calls[..2], [Call::Open, Call::Append("partial".to_string())]);
        assert!(matches!(sink.calls.last(), Some(Call::Error(_))));
        assert!(!sink.calls.iter().any(|c| matches!(c, Call::Finalize(_))));
        assert_eq!(session.history().len(), 1);
        assert_eq!(session.history().last().unwrap().role, Role::User);
    }

    #[tokio::test]
    async fn endpoint_error_before_stream_commits_nothing() {
        let relay = Relay::new(ScriptedBackend::new(vec![Err(Error::authentication(
            "bad key",
        ))]));
        let mut session = session(false);
        let mut sink = RecordingSink::default();
        relay.respond(&mut session, &mut sink).await.unwrap_err();
        assert_eq!(sink.calls.len(), 1);
        assert!(matches!(&sink.calls[0], Call::Error(e) if e.contains("bad key")));
        assert_eq!(session.history().len(), 1);
    }

    #[tokio::test]
    async fn stream_refused_leaves_empty_message() {
        let relay = Relay::new(ScriptedBackend::refusing(Error::authentication("bad key")));
        let mut session = session(true);
        let mut sink = RecordingSink::default();
        relay.respond(&mut session, &mut sink).await.unwrap_err();
        assert_eq!(sink.calls.len(), 2);
        assert_eq!(sink.calls[0], Call::Open);
        assert!(matches!(&sink.calls[1], Call::Error(e) if e.contains("bad key")));
        assert_eq!(session.history().len(), 1);
    }

    #[tokio::test]
    async fn interrupt_aborts_without_commit() {
        let relay = Relay::new(ScriptedBackend::ok(&["a", "b", "c"]));
        let mut session = session(true);
        let mut sink = RecordingSink {
            interrupt_after: Some(1),
            ..RecordingSink::default()
        };
        let err = relay.respond(&mut session, &mut sink).await.unwrap_err();
        assert!(err.is_abort());
        assert_eq!(
            sink.calls,
            vec![Call::Open, Call::Append("a".to_string()), Call::Interrupted]
        );
        assert_eq!(session.history().len(), 1);
    }

    #[tokio::test]
    async fn closed_sink_aborts_without_commit() {
        let relay = Relay::new(ScriptedBackend::ok(&["a", "b"]));
        let mut session = session(true);
        let mut sink = RecordingSink {
            fail_appends: true,
            ..RecordingSink::default()
        };
        relay.respond(&mut session, &mut sink).await.unwrap_err();
        assert_eq!(session.history().len(), 1);
    }

    #[tokio::test]
    async fn empty_stream_commits_empty_message() {
        let relay = Relay::new(ScriptedBackend::ok(&["", ""]));
        let mut session = session(true);
        let mut sink = RecordingSink::default();
        relay.respond(&mut session, &mut sink).await.unwrap();
        assert_eq!(
            sink.calls,
            vec![Call::Open, Call::Finalize(String::new())]
        );
        assert_eq!(session.history().last(), Some(&Message::assistant("")));
    }
}
