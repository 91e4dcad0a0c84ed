use prometheus::{IntCounter, Opts, Registry};

/// Inbox counters, same construction shape as `relay_outbox::OutboxMetrics`:
/// one `service` const label per metric, registered into the caller's
/// registry.
#[derive(Clone)]
pub struct InboxMetrics {
    pub processed_total: IntCounter,
    pub duplicate_total: IntCounter,
}

impl InboxMetrics {
    pub fn register(registry: &Registry, service: &str) -> prometheus::Result<Self> {
        let processed_total = IntCounter::with_opts(
            Opts::new("relay_inbox_processed_total", "Inbox events processed for the first time").const_label("service", service.to_string()),
        )?;
        let duplicate_total = IntCounter::with_opts(
            Opts::new("relay_inbox_duplicate_total", "Inbox deliveries short-circuited as already processed").const_label("service", service.to_string()),
        )?;

        registry.register(Box::new(processed_total.clone()))?;
        registry.register(Box::new(duplicate_total.clone()))?;

        Ok(Self { processed_total, duplicate_total })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processed_and_duplicate_counters_increment_independently() {
        let registry = Registry::new();
        let metrics = InboxMetrics::register(&registry, "shop").unwrap();
        metrics.processed_total.inc();
        metrics.duplicate_total.inc();
        metrics.duplicate_total.inc();
        assert_eq!(metrics.processed_total.get(), 1);
        assert_eq!(metrics.duplicate_total.get(), 2);
    }
}
