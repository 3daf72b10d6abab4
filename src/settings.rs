//! Per-session connection and sampling settings.
//!
//! [`Settings`] is the closed, typed form of the settings payload the UI sends on every change.
//! Three of its fields (`base_url`, `proxy`, `api_key`) plus the `insecure` opt-in select the
//! transport; everything else is handed to the endpoint through [`Settings::sampling`].

use std::fmt;
use std::ops::RangeInclusive;

use serde::{Deserialize, Deserializer};
use url::Url;

use crate::catalog::Catalog;
use crate::error::{Error, Result};
use crate::schema::SettingsSchema;
use crate::types::SamplingParams;

/// The public OpenAI endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Key used until the operator supplies a real one.
pub const PLACEHOLDER_API_KEY: &str = "sk-xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx";

const DEFAULT_MAX_TOKENS: u32 = 512;
const DEFAULT_TEMPERATURE: f32 = 0.7;
const DEFAULT_TOP_P: f32 = 0.3;
const DEFAULT_FREQUENCY_PENALTY: f32 = 0.7;
const DEFAULT_PRESENCE_PENALTY: f32 = 0.4;

/// Allowed values for `max_tokens`.
pub const MAX_TOKENS_RANGE: RangeInclusive<u32> = 64..=131_072;
/// Allowed values for `temperature`.
pub const TEMPERATURE_RANGE: RangeInclusive<f32> = 0.0..=1.0;
/// Allowed values for `top_p`.
pub const TOP_P_RANGE: RangeInclusive<f32> = 0.0..=1.0;
/// Allowed values for `frequency_penalty`.
pub const FREQUENCY_PENALTY_RANGE: RangeInclusive<f32> = 0.0..=2.0;
/// Allowed values for `presence_penalty`.
pub const PRESENCE_PENALTY_RANGE: RangeInclusive<f32> = -2.0..=2.0;
/// Maximum number of stop sequences.
pub const MAX_STOP_SEQUENCES: usize = 4;

//////////////////////////////////////////// ApiKey ////////////////////////////////////////////

/// The endpoint credential.
///
/// `Debug` and `Display` never show the key and there is no `Serialize` impl, so the key cannot
/// leak through logs or a request body.  Use [`ApiKey::expose`] at the single point where the
/// `Authorization` header is built.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wraps a key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The placeholder key of fresh sessions.
    pub fn placeholder() -> Self {
        Self::new(PLACEHOLDER_API_KEY)
    }

    /// Returns the raw key.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Returns true if this is still the placeholder.
    pub fn is_placeholder(&self) -> bool {
        self.0 == PLACEHOLDER_API_KEY
    }

    /// Returns true if the key can travel in an HTTP header value.
    pub fn is_header_safe(&self) -> bool {
        self.0
            .bytes()
            .all(|b| b == b'\t' || (b >= 0x20 && b != 0x7f))
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

impl fmt::Display for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_placeholder() {
            f.write_str("<placeholder>")
        } else {
            f.write_str("<redacted>")
        }
    }
}

/////////////////////////////////////////// Settings ///////////////////////////////////////////

/// Everything a session needs to reach an endpoint and sample from it.
///
/// Deserialization expects the complete payload: unknown fields and missing fields (including
/// `proxy`, which must be present even when `null`) are rejected.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Base URL of the OpenAI-compatible API, e.g. `https://api.openai.com/v1`.
    pub base_url: String,

    /// Forwarding proxy for all endpoint traffic.
    #[serde(deserialize_with = "present_option")]
    pub proxy: Option<String>,

    /// Endpoint credential.
    pub api_key: ApiKey,

    /// Accept any certificate on proxied connections.  Ignored without a proxy.
    pub insecure: bool,

    /// Selected model; must be in the session's catalog.
    pub model: String,

    /// Stream the response fragment by fragment.
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

    /// Stop sequences, at most four.
    pub stop: Vec<String>,
}

fn present_option<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer)
}

impl Settings {
    /// The settings of a brand-new session.
    pub fn new() -> Self {
        let model = Catalog::fallback()
            .first()
            .map(str::to_string)
            .unwrap_or_default();
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            proxy: None,
            api_key: ApiKey::placeholder(),
            insecure: false,
            model,
            stream: true,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            top_p: DEFAULT_TOP_P,
            frequency_penalty: DEFAULT_FREQUENCY_PENALTY,
            presence_penalty: DEFAULT_PRESENCE_PENALTY,
            stop: Vec::new(),
        }
    }

    /// Parses a complete settings payload.
    pub fn from_json(payload: serde_json::Value) -> Result<Self> {
        serde_json::from_value(payload).map_err(|err| {
            Error::validation(format!("malformed settings payload: {err}"), None)
        })
    }

    /// Sets the base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets or clears the proxy.
    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    /// Sets the API key.
    pub fn with_api_key(mut self, api_key: ApiKey) -> Self {
        self.api_key = api_key;
        self
    }

    /// Opts in or out of certificate validation on proxied connections.
    pub fn with_insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    /// Sets the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Enables or disables streaming.
    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Sets `max_tokens`.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Sets the temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Sets `top_p`.
    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = top_p;
        self
    }

    /// Sets the frequency penalty.
    pub fn with_frequency_penalty(mut self, frequency_penalty: f32) -> Self {
        self.frequency_penalty = frequency_penalty;
        self
    }

    /// Sets the presence penalty.
    pub fn with_presence_penalty(mut self, presence_penalty: f32) -> Self {
        self.presence_penalty = presence_penalty;
        self
    }

    /// Sets the stop sequences.
    pub fn with_stop(mut self, stop: Vec<String>) -> Self {
        self.stop = stop;
        self
    }

    /// Returns true if `other` points at the same endpoint.
    ///
    /// Only `base_url` is compared; a new key or proxy alone does not count as a new endpoint.
    pub fn same_endpoint(&self, other: &Settings) -> bool {
        self.base_url == other.base_url
    }

    /// The parameters forwarded with every completion request.
    pub fn sampling(&self) -> SamplingParams {
        SamplingParams {
            model: self.model.clone(),
            stream: self.stream,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
            frequency_penalty: self.frequency_penalty,
            presence_penalty: self.presence_penalty,
            stop: self.stop.clone(),
        }
    }

    /// Checks every field, including that `model` is selectable in `catalog`.
    pub fn validate(&self, catalog: &Catalog) -> Result<()> {
        self.validate_fields()?;
        if !catalog.contains(&self.model) {
            return Err(Error::validation(
                format!("model {:?} is not offered by the endpoint", self.model),
                Some("model".to_string()),
            ));
        }
        Ok(())
    }

    /// Checks every field except `model`.
    pub fn validate_fields(&self) -> Result<()> {
        parse_http_url(&self.base_url, "base_url")?;
        if let Some(proxy) = &self.proxy {
            parse_http_url(proxy, "proxy")?;
        }
        if !self.api_key.is_header_safe() {
            return Err(Error::transport_config(
                "API key contains characters that cannot be sent in a header",
                Some("api_key".to_string()),
            ));
        }
        if !MAX_TOKENS_RANGE.contains(&self.max_tokens) {
            return Err(Error::validation(
                format!(
                    "must be between {} and {}, got {}",
                    MAX_TOKENS_RANGE.start(),
                    MAX_TOKENS_RANGE.end(),
                    self.max_tokens
                ),
                Some("max_tokens".to_string()),
            ));
        }
        check_range("temperature", self.temperature, TEMPERATURE_RANGE)?;
        check_range("top_p", self.top_p, TOP_P_RANGE)?;
        check_range(
            "frequency_penalty",
            self.frequency_penalty,
            FREQUENCY_PENALTY_RANGE,
        )?;
        check_range(
            "presence_penalty",
            self.presence_penalty,
            PRESENCE_PENALTY_RANGE,
        )?;
        if self.stop.len() > MAX_STOP_SEQUENCES {
            return Err(Error::validation(
                format!(
                    "at most {MAX_STOP_SEQUENCES} stop sequences are allowed, got {}",
                    self.stop.len()
                ),
                Some("stop".to_string()),
            ));
        }
        Ok(())
    }

    /// The declarative form description for rendering these settings against `catalog`.
    pub fn schema(&self, catalog: &Catalog) -> SettingsSchema {
        SettingsSchema::describe(self, catalog)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses `value` as an absolute http(s) URL, attributing failures to `field`.
pub(crate) fn parse_http_url(value: &str, field: &str) -> Result<Url> {
    let url = Url::parse(value).map_err(|err| {
        Error::transport_config(format!("invalid URL {value:?}: {err}"), Some(field.to_string()))
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(Error::transport_config(
            format!("unsupported URL scheme {scheme:?}"),
            Some(field.to_string()),
        )),
    }
}

fn check_range(field: &str, value: f32, range: RangeInclusive<f32>) -> Result<()> {
    if value.is_finite() && range.contains(&value) {
        Ok(())
    } else {
        Err(Error::validation(
            format!(
                "must be between {} and {}, got {value}",
                range.start(),
                range.end()
            ),
            Some(field.to_string()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;

    fn payload() -> serde_json::Value {
        serde_json::json!({
            "base_url": "https://api.openai.com/v1",
            "proxy": null,
            "api_key": "sk-test",
            "insecure": false,
            "model": "gpt-4o",
            "stream": false,
            "max_tokens": 1024,
            "temperature": 0.5,
            "top_p": 0.25,
            "frequency_penalty": 1.0,
            "presence_penalty": -1.0,
            "stop": ["END"]
        })
    }

    #[test]
    fn defaults() {
        let settings = Settings::new();
        assert_eq!(settings.base_url, "https://api.openai.com/v1");
        assert_eq!(settings.proxy, None);
        assert!(settings.api_key.is_placeholder());
        assert!(!settings.insecure);
        assert_eq!(settings.model, "o1-preview");
        assert!(settings.stream);
        assert_eq!(settings.max_tokens, 512);
        assert_eq!(settings.temperature, 0.7);
        assert_eq!(settings.top_p, 0.3);
        assert_eq!(settings.frequency_penalty, 0.7);
        assert_eq!(settings.presence_penalty, 0.4);
        assert!(settings.stop.is_empty());
        settings.validate(&Catalog::fallback()).unwrap();
    }

    #[test]
    fn parse_full_payload() {
        let settings = Settings::from_json(payload()).unwrap();
        assert_eq!(settings.model, "gpt-4o");
        assert_eq!(settings.api_key.expose(), "sk-test");
        assert_eq!(settings.stop, vec!["END".to_string()]);
        assert!(!settings.stream);
    }

    #[test]
    fn unknown_field_rejected() {
        let mut payload = payload();
        payload["http_proxy"] = serde_json::json!("http://proxy:3128");
        let err = Settings::from_json(payload).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn missing_field_rejected() {
        for field in ["proxy", "temperature", "api_key", "stop"] {
            let mut payload = payload();
            payload.as_object_mut().unwrap().remove(field);
            let err = Settings::from_json(payload).unwrap_err();
            assert!(err.is_validation(), "{field}: {err}");
        }
    }

    #[test]
    fn key_never_printed() {
        let settings = Settings::new().with_api_key(ApiKey::new("sk-secret-value"));
        let debug = format!("{settings:?}");
        assert!(!debug.contains("sk-secret-value"));
        assert!(debug.contains("<redacted>"));
        assert_eq!(settings.api_key.to_string(), "<redacted>");
    }

    #[test]
    fn sampling_excludes_transport() {
        let settings = Settings::from_json(payload())
            .unwrap()
            .with_proxy(Some("http://proxy:3128".to_string()));
        let json = serde_json::to_value(settings.sampling()).unwrap();
        let object = json.as_object().unwrap();
        for field in ["base_url", "proxy", "api_key", "insecure"] {
            assert!(!object.contains_key(field), "{field} leaked");
        }
        assert_eq!(object["model"], "gpt-4o");
        assert_eq!(object["max_tokens"], 1024);
    }

    #[test]
    fn ranges_enforced() {
        let catalog = Catalog::fallback();
        let cases = [
            ("max_tokens", Settings::new().with_max_tokens(63)),
            ("max_tokens", Settings::new().with_max_tokens(131_073)),
            ("temperature", Settings::new().with_temperature(1.01)),
            ("temperature", Settings::new().with_temperature(f32::NAN)),
            ("top_p", Settings::new().with_top_p(-0.1)),
            ("frequency_penalty", Settings::new().with_frequency_penalty(2.5)),
            ("presence_penalty", Settings::new().with_presence_penalty(-2.1)),
        ];
        for (field, settings) in cases {
            match settings.validate(&catalog) {
                Err(Error::Validation { param, .. }) => {
                    assert_eq!(param.as_deref(), Some(field))
                }
                other => panic!("{field}: expected validation error, got {other:?}"),
            }
        }
        Settings::new()
            .with_max_tokens(131_072)
            .with_presence_penalty(-2.0)
            .with_frequency_penalty(2.0)
            .validate(&catalog)
            .unwrap();
    }

    #[test]
    fn too_many_stop_sequences() {
        let stop = (0..5).map(|i| format!("s{i}")).collect();
        let err = Settings::new()
            .with_stop(stop)
            .validate(&Catalog::fallback())
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn model_must_be_in_catalog() {
        let err = Settings::new()
            .with_model("modelA")
            .validate(&Catalog::fallback())
            .unwrap_err();
        assert!(err.to_string().contains("modelA"));
        Settings::new()
            .with_model("modelA")
            .validate(&Catalog::new(vec!["modelA".to_string()]))
            .unwrap();
    }

    #[test]
    fn malformed_urls_are_transport_errors() {
        let err = Settings::new()
            .with_base_url("not a url")
            .validate_fields()
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::TransportConfig);
        let err = Settings::new()
            .with_proxy(Some("socks9://proxy".to_string()))
            .validate_fields()
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::TransportConfig);
    }

    #[test]
    fn unsendable_key_rejected() {
        let err = Settings::new()
            .with_api_key(ApiKey::new("sk-abc\nX-Injected: 1"))
            .validate_fields()
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::TransportConfig);
        assert!(!err.to_string().contains("sk-abc"));
        assert!(ApiKey::new("sk-abc\tdef").is_header_safe());
    }

    #[test]
    fn endpoint_comparison_ignores_key() {
        let a = Settings::new();
        let b = Settings::new().with_api_key(ApiKey::new("sk-other"));
        assert!(a.same_endpoint(&b));
        let c = Settings::new().with_base_url("https://local/v1");
        assert!(!a.same_endpoint(&c));
    }
}
