use prometheus::{IntCounter, IntGauge, Opts, Registry};

/// Outbox gauges/counters, grounded on the teacher's `OutboxMetrics`
/// construction pattern: one `service` const label per metric, registered
/// into the registry the caller supplies.
#[derive(Clone)]
pub struct OutboxMetrics {
    pub pending: IntGauge,
    pub oldest_pending_age_seconds: IntGauge,
    pub published_total: IntCounter,
    pub failed_total: IntCounter,
}

impl OutboxMetrics {
    pub fn register(registry: &Registry, service: &str) -> prometheus::Result<Self> {
        let pending = IntGauge::with_opts(
            Opts::new("relay_outbox_pending", "Outbox rows currently pending publish").const_label("service", service.to_string()),
        )?;
        let oldest_pending_age_seconds = IntGauge::with_opts(
            Opts::new("relay_outbox_oldest_pending_age_seconds", "Age in seconds of the oldest pending outbox row")
                .const_label("service", service.to_string()),
        )?;
        let published_total = IntCounter::with_opts(
            Opts::new("relay_outbox_published_total", "Outbox events published successfully").const_label("service", service.to_string()),
        )?;
        let failed_total = IntCounter::with_opts(
            Opts::new("relay_outbox_failed_total", "Outbox events that exhausted retries").const_label("service", service.to_string()),
        )?;

        registry.register(Box::new(pending.clone()))?;
        registry.register(Box::new(oldest_pending_age_seconds.clone()))?;
        registry.register(Box::new(published_total.clone()))?;
        registry.register(Box::new(failed_total.clone()))?;

        Ok(Self { pending, oldest_pending_age_seconds, published_total, failed_total })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn published_and_failed_counters_increment_independently() {
        let registry = Registry::new();
        let metrics = OutboxMetrics::register(&registry, "shop").unwrap();
        metrics.published_total.inc();
        metrics.published_total.inc();
        metrics.failed_total.inc();
        assert_eq!(metrics.published_total.get(), 2);
        assert_eq!(metrics.failed_total.get(), 1);
    }
}
