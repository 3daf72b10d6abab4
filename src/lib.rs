// Public modules
pub mod backend;
pub mod catalog;
pub mod chat;
pub mod client;
pub mod client_logger;
pub mod error;
pub mod observability;
pub mod reconcile;
pub mod relay;
pub mod render;
pub mod schema;
pub mod session;
pub mod settings;
pub mod sse;
pub mod types;

// Re-exports
pub use backend::{CatalogResolver, CompletionBackend, FragmentStream, HttpBackend};
pub use catalog::{Catalog, FALLBACK_MODELS};
pub use client::{Connection, ProxyConfig};
pub use client_logger::{ClientLogger, TracingLogger};
pub use error::{Error, ErrorCategory, Result};
pub use observability::register_biometrics;
pub use reconcile::{ReconcileState, Reconciler, Reconciliation};
pub use relay::Relay;
pub use render::{OutputSink, PlainTextSink};
pub use schema::{FieldSpec, SettingsSchema, Widget};
pub use session::{History, Session, SessionStats};
pub use settings::{ApiKey, DEFAULT_BASE_URL, PLACEHOLDER_API_KEY, Settings};
pub use types::*;
