//! The network seams of the session core.
//!
//! [`Reconciler`](crate::Reconciler) asks a [`CatalogResolver`] for models and
//! [`Relay`](crate::Relay) asks a [`CompletionBackend`] for text.  [`HttpBackend`] implements both
//! against a live endpoint; tests substitute scripted implementations.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};

use crate::catalog::Catalog;
use crate::client::Connection;
use crate::client_logger::ClientLogger;
use crate::error::{Error, Result};
use crate::settings::Settings;
use crate::types::ChatCompletionParams;

/// Text fragments of a streamed completion, in arrival order.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Resolves the model catalog an endpoint serves.
#[async_trait]
pub trait CatalogResolver: Send + Sync {
    /// Resolve the catalog of the endpoint `settings` points at.
    async fn resolve(&self, settings: &Settings) -> Result<Catalog>;
}

/// Produces completions for a conversation.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Run a non-streaming completion and return the assistant's text.
    async fn complete(&self, settings: &Settings, params: ChatCompletionParams) -> Result<String>;

    /// Run a streaming completion and return its fragments.
    async fn stream(
        &self,
        settings: &Settings,
        params: ChatCompletionParams,
    ) -> Result<FragmentStream>;
}

#[async_trait]
impl<T: CatalogResolver + ?Sized> CatalogResolver for Arc<T> {
    async fn resolve(&self, settings: &Settings) -> Result<Catalog> {
        (**self).resolve(settings).await
    }
}

#[async_trait]
impl<T: CompletionBackend + ?Sized> CompletionBackend for Arc<T> {
    async fn complete(&self, settings: &Settings, params: ChatCompletionParams) -> Result<String> {
        (**self).complete(settings, params).await
    }

    async fn stream(
        &self,
        settings: &Settings,
        params: ChatCompletionParams,
    ) -> Result<FragmentStream> {
        (**self).stream(settings, params).await
    }
}

/// Talks to the endpoint named by the settings of each call.
///
/// A fresh [`Connection`] is built per call from the settings passed in, so a committed change of
/// `base_url`, `proxy`, `api_key` or `insecure` takes effect on the very next request.
#[derive(Clone, Default)]
pub struct HttpBackend {
    timeout: Option<Duration>,
    logger: Option<Arc<dyn ClientLogger>>,
}

impl HttpBackend {
    /// A backend without a total request timeout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound every request, streams included, by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Attach a traffic logger to every connection.
    pub fn with_logger(mut self, logger: Arc<dyn ClientLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    fn connection(&self, settings: &Settings) -> Result<Connection> {
        let conn = Connection::from_settings(settings, self.timeout)?;
        Ok(match &self.logger {
            Some(logger) => conn.with_logger(Arc::clone(logger)),
            None => conn,
        })
    }
}

#[async_trait]
impl CatalogResolver for HttpBackend {
    async fn resolve(&self, settings: &Settings) -> Result<Catalog> {
        let models = self.connection(settings)?.list_models().await?;
        if models.is_empty() {
            return Err(Error::catalog_unavailable(
                format!("{} reported no models", settings.base_url),
                None,
            ));
        }
        Ok(Catalog::new(models))
    }
}

#[async_trait]
impl CompletionBackend for HttpBackend {
    async fn complete(&self, settings: &Settings, params: ChatCompletionParams) -> Result<String> {
        let completion = self.connection(settings)?.send(params).await?;
        completion
            .first_content()
            .map(str::to_string)
            .ok_or_else(|| Error::api(200, None, "completion response contained no choices"))
    }

    async fn stream(
        &self,
        settings: &Settings,
        params: ChatCompletionParams,
    ) -> Result<FragmentStream> {
        let chunks = self.connection(settings)?.stream(params).await?;
        let fragments = chunks.map(|chunk| chunk.map(|c| c.fragment().to_string()));
        Ok(Box::pin(fragments))
    }
}
