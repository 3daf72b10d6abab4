//! Applying settings-change events to a session.
//!
//! The UI sends the complete settings payload whenever any input changes.  [`Reconciler::apply`]
//! diffs it against the session's committed copy:
//!
//! ```text
//! Idle -> Comparing -> Idle                                  (base_url unchanged)
//! Idle -> Comparing -> Resolving -> Recommitting -> Idle     (base_url changed)
//! ```
//!
//! Only `base_url` is compared.  On an endpoint change the incoming `model` is discarded and the
//! first model of the new catalog is selected.  Any failure leaves the session exactly as it was.

use tracing::{debug, error, info};

use crate::backend::CatalogResolver;
use crate::error::{Error, ErrorCategory, Result};
use crate::observability::{CATALOG_FAILURES, CATALOG_RESOLUTIONS, RECONCILIATIONS};
use crate::schema::SettingsSchema;
use crate::session::Session;
use crate::settings::Settings;

/// Where a reconciliation is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconcileState {
    /// Waiting for a settings-change event.
    Idle,
    /// Diffing the incoming payload against the committed settings.
    Comparing,
    /// Fetching the catalog of a new endpoint.
    Resolving,
    /// Committing settings and catalog for a new endpoint.
    Recommitting,
}

/// What a successful reconciliation did.
#[derive(Clone, Debug, PartialEq)]
pub enum Reconciliation {
    /// The endpoint was unchanged; the payload was committed as given.
    Committed,
    /// The endpoint changed; a new catalog was resolved and its first model selected.
    Recatalogued {
        /// The settings form rebuilt over the new catalog.
        schema: SettingsSchema,
    },
}

/// Commits settings-change events into a [`Session`].
pub struct Reconciler<R> {
    resolver: R,
    state: ReconcileState,
}

impl<R: CatalogResolver> Reconciler<R> {
    /// A reconciler that resolves catalogs with `resolver`.
    pub fn new(resolver: R) -> Self {
        Self {
            resolver,
            state: ReconcileState::Idle,
        }
    }

    /// The current state; `Idle` whenever no `apply` is in progress.
    pub fn state(&self) -> ReconcileState {
        self.state
    }

    /// The resolver in use.
    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    /// Reconcile `incoming` against the settings committed in `session`.
    ///
    /// Errors are logged to the operator channel and returned; the session keeps its prior
    /// settings and catalog.
    pub async fn apply(
        &mut self,
        session: &mut Session,
        incoming: Settings,
    ) -> Result<Reconciliation> {
        RECONCILIATIONS.click();
        let result = self.reconcile(session, incoming).await;
        self.transition(ReconcileState::Idle);
        if let Err(err) = &result {
            error!(
                category = ?err.category(),
                base_url = %session.settings().base_url,
                "settings change rejected: {err}"
            );
        }
        result
    }

    async fn reconcile(
        &mut self,
        session: &mut Session,
        mut incoming: Settings,
    ) -> Result<Reconciliation> {
        self.transition(ReconcileState::Comparing);
        incoming.validate_fields()?;
        if session.settings().same_endpoint(&incoming) {
            incoming.validate(session.catalog())?;
            session.commit(incoming);
            debug!("settings committed");
            return Ok(Reconciliation::Committed);
        }

        self.transition(ReconcileState::Resolving);
        info!(
            from = %session.settings().base_url,
            to = %incoming.base_url,
            "endpoint changed; resolving models"
        );
        CATALOG_RESOLUTIONS.click();
        let catalog = match self.resolver.resolve(&incoming).await {
            Ok(catalog) => catalog,
            Err(err) => {
                CATALOG_FAILURES.click();
                return Err(match err.category() {
                    ErrorCategory::CatalogUnavailable
                    | ErrorCategory::TransportConfig
                    | ErrorCategory::Validation => err,
                    ErrorCategory::Completion => Error::catalog_unavailable(
                        format!("could not list models at {}", incoming.base_url),
                        Some(err),
                    ),
                });
            }
        };
        let Some(model) = catalog.first().map(str::to_string) else {
            CATALOG_FAILURES.click();
            return Err(Error::catalog_unavailable(
                format!("{} reported no models", incoming.base_url),
                None,
            ));
        };

        self.transition(ReconcileState::Recommitting);
        incoming.model = model;
        let schema = incoming.schema(&catalog);
        info!(
            model = %incoming.model,
            models = catalog.len(),
            "endpoint catalog committed"
        );
        session.commit_with_catalog(incoming, catalog);
        Ok(Reconciliation::Recatalogued { schema })
    }

    fn transition(&mut self, next: ReconcileState) {
        debug!(from = ?self.state, to = ?next, "reconciler transition");
        self.state = next;
    }
}
