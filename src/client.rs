use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use futures::stream::StreamExt;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Response};
use serde::Deserialize;
use tracing::warn;
use url::Url;

use crate::client_logger::ClientLogger;
use crate::error::{Error, Result};
use crate::observability::{
    CLIENT_CONNECTIONS, CLIENT_INSECURE_CONNECTIONS, CLIENT_REQUEST_ERRORS, CLIENT_REQUESTS,
};
use crate::settings::{ApiKey, Settings, parse_http_url};
use crate::sse::process_sse;
use crate::types::{ChatCompletion, ChatCompletionChunk, ChatCompletionParams, ModelListResponse};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// A forwarding proxy for endpoint traffic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProxyConfig {
    url: String,
    accept_invalid_certs: bool,
}

impl ProxyConfig {
    /// Route all traffic through `url`, validating certificates as usual.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            accept_invalid_certs: false,
        }
    }

    /// Opt in to accepting any certificate on connections through this proxy.
    pub fn insecure(mut self, accept_invalid_certs: bool) -> Self {
        self.accept_invalid_certs = accept_invalid_certs;
        self
    }

    /// The proxy URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns true if certificate validation is disabled.
    pub fn accepts_invalid_certs(&self) -> bool {
        self.accept_invalid_certs
    }
}

/// A connection to an OpenAI-compatible endpoint.
///
/// A `Connection` is a pure function of its base URL, key, proxy and timeout: two connections
/// built from the same inputs compare equal and behave identically.  Nothing is cached between
/// calls to [`Connection::connect`].
#[derive(Clone)]
pub struct Connection {
    client: ReqwestClient,
    base_url: Url,
    api_key: ApiKey,
    proxy: Option<ProxyConfig>,
    timeout: Option<Duration>,
    logger: Option<Arc<dyn ClientLogger>>,
}

impl Connection {
    /// Build a connection to `base_url`.
    ///
    /// There is no total request timeout, so long streams are never cut short; see
    /// [`Connection::with_options`].
    pub fn connect(base_url: &str, api_key: &ApiKey, proxy: Option<ProxyConfig>) -> Result<Self> {
        Self::with_options(base_url, api_key, proxy, None)
    }

    /// Build a connection with an optional total request timeout.
    pub fn with_options(
        base_url: &str,
        api_key: &ApiKey,
        proxy: Option<ProxyConfig>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let base_url = normalize_base_url(base_url)?;

        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        let mut authorization = HeaderValue::from_str(&format!("Bearer {}", api_key.expose()))
            .map_err(|_| {
                Error::transport_config(
                    "API key contains characters that cannot be sent in a header",
                    Some("api_key".to_string()),
                )
            })?;
        authorization.set_sensitive(true);
        headers.insert(header::AUTHORIZATION, authorization);

        let mut builder = ReqwestClient::builder()
            .default_headers(headers)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(proxy) = &proxy {
            let proxy_url = parse_http_url(&proxy.url, "proxy")?;
            let transport = reqwest::Proxy::all(proxy_url.as_str()).map_err(|e| {
                Error::transport_config(format!("invalid proxy: {e}"), Some("proxy".to_string()))
            })?;
            builder = builder.proxy(transport);
            if proxy.accept_invalid_certs {
                CLIENT_INSECURE_CONNECTIONS.click();
                warn!(
                    proxy_host = proxy_url.host_str().unwrap_or(""),
                    endpoint = %base_url,
                    "TLS CERTIFICATE VALIDATION IS DISABLED for traffic through this proxy"
                );
                builder = builder.danger_accept_invalid_certs(true);
            }
        }
        let client = builder.build().map_err(|e| {
            Error::http_client(
                format!("Failed to build HTTP client: {}", e),
                Some(Box::new(e)),
            )
        })?;
        CLIENT_CONNECTIONS.click();

        Ok(Self {
            client,
            base_url,
            api_key: api_key.clone(),
            proxy,
            timeout,
            logger: None,
        })
    }

    /// Build the connection described by the transport fields of `settings`.
    pub fn from_settings(settings: &Settings, timeout: Option<Duration>) -> Result<Self> {
        let proxy = settings
            .proxy
            .as_ref()
            .map(|url| ProxyConfig::new(url.clone()).insecure(settings.insecure));
        if settings.insecure && proxy.is_none() {
            warn!("insecure is set but no proxy is configured; certificates are still validated");
        }
        Self::with_options(&settings.base_url, &settings.api_key, proxy, timeout)
    }

    /// Attach a logger that observes every request and response.
    pub fn with_logger(mut self, logger: Arc<dyn ClientLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// The normalized base URL; always ends in `/`.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The configured proxy.
    pub fn proxy(&self) -> Option<&ProxyConfig> {
        self.proxy.as_ref()
    }

    /// The total request timeout, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    fn map_send_error(&self, e: reqwest::Error) -> Error {
        CLIENT_REQUEST_ERRORS.click();
        if e.is_timeout() {
            Error::timeout(
                format!("Request timed out: {}", e),
                self.timeout.map(|t| t.as_secs_f64()),
            )
        } else if e.is_connect() {
            Error::connection(format!("Connection error: {}", e), Some(Box::new(e)))
        } else {
            Error::http_client(format!("Request failed: {}", e), Some(Box::new(e)))
        }
    }

    /// Process API response errors and convert to our Error type
    async fn process_error_response(response: Response) -> Error {
        CLIENT_REQUEST_ERRORS.click();
        let status_code = response.status().as_u16();

        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|val| val.to_str().ok())
            .and_then(|val| val.parse::<u64>().ok());

        #[derive(Deserialize)]
        struct ErrorResponse {
            error: Option<ErrorDetail>,
        }

        #[derive(Deserialize)]
        struct ErrorDetail {
            #[serde(rename = "type")]
            error_type: Option<String>,
            message: Option<String>,
            param: Option<String>,
        }

        let error_body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return Error::http_client(
                    format!("Failed to read error response: {}", e),
                    Some(Box::new(e)),
                );
            }
        };

        let detail = serde_json::from_str::<ErrorResponse>(&error_body)
            .ok()
            .and_then(|parsed| parsed.error);
        let error_type = detail.as_ref().and_then(|d| d.error_type.clone());
        let error_param = detail.as_ref().and_then(|d| d.param.clone());
        let error_message = detail
            .and_then(|d| d.message)
            .unwrap_or_else(|| error_body.clone());

        match status_code {
            400 => Error::bad_request(error_message, error_param),
            401 => Error::authentication(error_message),
            403 => Error::permission(error_message),
            404 => Error::not_found(error_message),
            408 => Error::timeout(error_message, None),
            429 => Error::rate_limit(error_message, retry_after),
            500 => Error::internal_server(error_message),
            502..=504 => Error::service_unavailable(error_message, retry_after),
            _ => Error::api(status_code, error_type, error_message),
        }
    }

    /// List the model identifiers the endpoint serves, in the endpoint's order.
    ///
    /// Any failure, from an unreachable host to a body without a `data` array, is reported as
    /// [`Error::CatalogUnavailable`] wrapping the cause.
    pub async fn list_models(&self) -> Result<Vec<String>> {
        self.fetch_models().await.map(|r| r.ids()).map_err(|e| {
            Error::catalog_unavailable(format!("could not list models at {}", self.base_url), Some(e))
        })
    }

    async fn fetch_models(&self) -> Result<ModelListResponse> {
        CLIENT_REQUESTS.click();
        let response = self
            .client
            .get(self.endpoint("models")?)
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        if !response.status().is_success() {
            return Err(Self::process_error_response(response).await);
        }

        response.json::<ModelListResponse>().await.map_err(|e| {
            Error::serialization(
                format!("Failed to parse model list: {}", e),
                Some(Box::new(e)),
            )
        })
    }

    /// Send a completion request and wait for the whole response.
    pub async fn send(&self, mut params: ChatCompletionParams) -> Result<ChatCompletion> {
        params.sampling.stream = false;
        if let Some(logger) = &self.logger {
            logger.log_request(&params);
        }

        CLIENT_REQUESTS.click();
        let response = self
            .client
            .post(self.endpoint("chat/completions")?)
            .header(header::ACCEPT, "application/json")
            .json(&params)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        if !response.status().is_success() {
            return Err(Self::process_error_response(response).await);
        }

        let completion = response.json::<ChatCompletion>().await.map_err(|e| {
            Error::serialization(
                format!("Failed to parse response: {}", e),
                Some(Box::new(e)),
            )
        })?;
        if let Some(logger) = &self.logger {
            logger.log_response(&completion);
        }
        Ok(completion)
    }

    /// Send a completion request and stream the response.
    ///
    /// Returns a stream of chunks that ends at the endpoint's `[DONE]` sentinel.
    pub async fn stream(
        &self,
        mut params: ChatCompletionParams,
    ) -> Result<impl Stream<Item = Result<ChatCompletionChunk>> + Send + 'static> {
        params.sampling.stream = true;
        if let Some(logger) = &self.logger {
            logger.log_request(&params);
        }

        CLIENT_REQUESTS.click();
        let response = self
            .client
            .post(self.endpoint("chat/completions")?)
            .header(header::ACCEPT, "text/event-stream")
            .json(&params)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        if !response.status().is_success() {
            return Err(Self::process_error_response(response).await);
        }

        let logger = self.logger.clone();
        let chunks = process_sse(Box::pin(response.bytes_stream())).inspect(move |chunk| {
            if let (Some(logger), Ok(chunk)) = (&logger, chunk) {
                logger.log_stream_chunk(chunk);
            }
        });
        Ok(chunks)
    }
}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        self.base_url == other.base_url
            && self.api_key == other.api_key
            && self.proxy == other.proxy
            && self.timeout == other.timeout
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &self.api_key)
            .field("proxy", &self.proxy)
            .field("timeout", &self.timeout)
            .field("logger", &self.logger.is_some())
            .finish()
    }
}

/// Parse `base_url` and make sure it ends in `/` so relative joins keep the last segment.
fn normalize_base_url(base_url: &str) -> Result<Url> {
    let mut url = parse_http_url(base_url, "base_url")?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_creation() {
        let key = ApiKey::new("sk-test");
        let conn = Connection::connect("https://api.openai.com/v1", &key, None).unwrap();
        assert_eq!(conn.base_url().as_str(), "https://api.openai.com/v1/");
        assert_eq!(conn.proxy(), None);
        assert_eq!(conn.timeout(), None);

        let conn = Connection::with_options(
            "https://local/v1/",
            &key,
            Some(ProxyConfig::new("http://127.0.0.1:3128")),
            Some(Duration::from_secs(30)),
        )
        .unwrap();
        assert_eq!(conn.base_url().as_str(), "https://local/v1/");
        assert_eq!(conn.proxy().unwrap().url(), "http://127.0.0.1:3128");
        assert!(!conn.proxy().unwrap().accepts_invalid_certs());
        assert_eq!(conn.timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn identical_inputs_give_equivalent_connections() {
        let key = ApiKey::new("sk-test");
        let proxy = ProxyConfig::new("http://proxy.internal:8080").insecure(true);
        let a = Connection::connect("https://local/v1", &key, Some(proxy.clone())).unwrap();
        let b = Connection::connect("https://local/v1", &key, Some(proxy)).unwrap();
        assert_eq!(a, b);
        assert_eq!(format!("{a:?}"), format!("{b:?}"));

        let c = Connection::connect("https://local/v1", &ApiKey::new("sk-other"), None).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn endpoints_keep_base_path() {
        let conn = Connection::connect("https://local/v1", &ApiKey::new("k"), None).unwrap();
        assert_eq!(
            conn.endpoint("chat/completions").unwrap().as_str(),
            "https://local/v1/chat/completions"
        );
        assert_eq!(
            conn.endpoint("models").unwrap().as_str(),
            "https://local/v1/models"
        );
    }

    #[test]
    fn bad_transport_inputs() {
        let key = ApiKey::new("k");
        let err = Connection::connect("ftp://local/v1", &key, None).unwrap_err();
        assert!(err.is_transport_config());
        let err =
            Connection::connect("https://local/v1", &key, Some(ProxyConfig::new("::::"))).unwrap_err();
        assert!(err.is_transport_config());
        let err = Connection::connect("https://local/v1", &ApiKey::new("bad\nkey"), None)
            .unwrap_err();
        assert!(err.is_transport_config());
    }

    #[test]
    fn from_settings_maps_insecure_onto_proxy() {
        let settings = Settings::new()
            .with_proxy(Some("http://proxy.internal:8080".to_string()))
            .with_insecure(true);
        let conn = Connection::from_settings(&settings, None).unwrap();
        assert!(conn.proxy().unwrap().accepts_invalid_certs());

        let conn = Connection::from_settings(&Settings::new().with_insecure(true), None).unwrap();
        assert!(conn.proxy().is_none());
    }

    #[test]
    fn debug_hides_key() {
        let conn =
            Connection::connect("https://local/v1", &ApiKey::new("sk-very-secret"), None).unwrap();
        assert!(!format!("{conn:?}").contains("sk-very-secret"));
    }
}
