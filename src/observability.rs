use biometrics::{Collector, Counter, Moments};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("chatterbox.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter =
    Counter::new("chatterbox.client.request_errors");
pub(crate) static CLIENT_CONNECTIONS: Counter = Counter::new("chatterbox.client.connections");
pub(crate) static CLIENT_INSECURE_CONNECTIONS: Counter =
    Counter::new("chatterbox.client.insecure_connections");

pub(crate) static STREAM_EVENTS: Counter = Counter::new("chatterbox.stream.events");
pub(crate) static STREAM_ERRORS: Counter = Counter::new("chatterbox.stream.errors");
pub(crate) static STREAM_BYTES: Counter = Counter::new("chatterbox.stream.bytes");

pub(crate) static RELAY_REQUESTS: Counter = Counter::new("chatterbox.relay.requests");
pub(crate) static RELAY_ERRORS: Counter = Counter::new("chatterbox.relay.errors");
pub(crate) static RELAY_FRAGMENTS: Counter = Counter::new("chatterbox.relay.fragments");
pub(crate) static RELAY_EMPTY_FRAGMENTS: Counter =
    Counter::new("chatterbox.relay.empty_fragments");
pub(crate) static RELAY_DURATION: Moments = Moments::new("chatterbox.relay.duration_seconds");

pub(crate) static RECONCILIATIONS: Counter = Counter::new("chatterbox.reconcile.changes");
pub(crate) static CATALOG_RESOLUTIONS: Counter =
    Counter::new("chatterbox.reconcile.catalog_resolutions");
pub(crate) static CATALOG_FAILURES: Counter =
    Counter::new("chatterbox.reconcile.catalog_failures");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);
    collector.register_counter(&CLIENT_CONNECTIONS);
    collector.register_counter(&CLIENT_INSECURE_CONNECTIONS);

    collector.register_counter(&STREAM_EVENTS);
    collector.register_counter(&STREAM_ERRORS);
    collector.register_counter(&STREAM_BYTES);

    collector.register_counter(&RELAY_REQUESTS);
    collector.register_counter(&RELAY_ERRORS);
    collector.register_counter(&RELAY_FRAGMENTS);
    collector.register_counter(&RELAY_EMPTY_FRAGMENTS);
    collector.register_moments(&RELAY_DURATION);

    collector.register_counter(&RECONCILIATIONS);
    collector.register_counter(&CATALOG_RESOLUTIONS);
    collector.register_counter(&CATALOG_FAILURES);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_all() {
        register_biometrics(Collector::new());
    }
}
