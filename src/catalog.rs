//! The set of models a session may select.

use serde::Serialize;

/// Models offered before any endpoint has been queried.
pub const FALLBACK_MODELS: &[&str] = &[
    "o1-preview",
    "o1-mini",
    "gpt-4o-mini",
    "gpt-4o",
    "gpt-4",
    "gpt-4-turbo",
    "gpt-3.5-turbo",
];

/// An ordered list of model identifiers.
///
/// A catalog is replaced wholesale whenever the endpoint changes; entries are never merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Catalog {
    models: Vec<String>,
}

impl Catalog {
    /// Creates a catalog from model identifiers in the order given.
    pub fn new(models: Vec<String>) -> Self {
        Self { models }
    }

    /// The built-in catalog used until an endpoint reports its own.
    pub fn fallback() -> Self {
        Self::new(FALLBACK_MODELS.iter().map(|m| m.to_string()).collect())
    }

    /// The default selection: the first model, if any.
    pub fn first(&self) -> Option<&str> {
        self.models.first().map(String::as_str)
    }

    /// Returns true if `model` is selectable.
    pub fn contains(&self, model: &str) -> bool {
        self.models.iter().any(|m| m == model)
    }

    /// Position of `model` in the catalog.
    pub fn position(&self, model: &str) -> Option<usize> {
        self.models.iter().position(|m| m == model)
    }

    /// The model identifiers, in order.
    pub fn models(&self) -> &[String] {
        &self.models
    }

    /// Number of models.
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Returns true if no model is selectable.
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::fallback()
    }
}

impl From<Vec<String>> for Catalog {
    fn from(models: Vec<String>) -> Self {
        Self::new(models)
    }
}
