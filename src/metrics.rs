//! Aggregates the per-crate metrics bags into one handle the facade can hand
//! to `RelayContext::new`. The gauges/counters themselves live next to the
//! code that moves them (`relay_outbox::OutboxMetrics`, `relay_inbox::InboxMetrics`,
//! `relay_router::RouterMetrics`); this module just registers all three into
//! whichever `Registry` the caller passes to `RelayContext::new` under a
//! shared `service` const label. `RelayContext::connect` passes
//! `prometheus::default_registry()` since it owns the whole process; an
//! embedder with its own registry calls `new` directly.

use std::sync::Arc;

use prometheus::Registry;
use relay_inbox::InboxMetrics;
use relay_outbox::OutboxMetrics;
use relay_router::RouterMetrics;

pub struct RelayMetrics {
    pub outbox: Arc<OutboxMetrics>,
    pub inbox: Arc<InboxMetrics>,
    pub router: Arc<RouterMetrics>,
}

impl RelayMetrics {
    pub fn register(registry: &Registry, service: &str) -> prometheus::Result<Self> {
        let outbox = Arc::new(OutboxMetrics::register(registry, service)?);
        let inbox = Arc::new(InboxMetrics::register(registry, service)?);
        let router = Arc::new(RouterMetrics::register(registry, service)?);
        Ok(Self { outbox, inbox, router })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_every_crate_bag_without_name_collisions() {
        let registry = Registry::new();
        let metrics = RelayMetrics::register(&registry, "shop").unwrap();
        metrics.outbox.published_total.inc();
        assert_eq!(metrics.outbox.published_total.get(), 1);
        assert!(!registry.gather().is_empty());
    }
}
