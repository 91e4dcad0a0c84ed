use prometheus::{GaugeVec, IntCounter, Opts, Registry};

/// Router counters/gauges, same construction shape as the other crates'
/// metrics modules: `service` const label, registered into the caller's
/// registry. `idle_backoff_ms` is labeled by `durable` since every worker
/// in a pool runs its own idle backoff independently.
#[derive(Clone)]
pub struct RouterMetrics {
    pub dlq_published_total: IntCounter,
    pub idle_backoff_ms: GaugeVec,
}

impl RouterMetrics {
    pub fn register(registry: &Registry, service: &str) -> prometheus::Result<Self> {
        let dlq_published_total = IntCounter::with_opts(
            Opts::new("relay_router_dlq_published_total", "Messages published to the dead-letter subject").const_label("service", service.to_string()),
        )?;
        let idle_backoff_ms = GaugeVec::new(
            Opts::new("relay_router_idle_backoff_ms", "Current idle backoff of a worker in milliseconds").const_label("service", service.to_string()),
            &["durable"],
        )?;

        registry.register(Box::new(dlq_published_total.clone()))?;
        registry.register(Box::new(idle_backoff_ms.clone()))?;

        Ok(Self { dlq_published_total, idle_backoff_ms })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_backoff_is_tracked_per_durable_consumer() {
        let registry = Registry::new();
        let metrics = RouterMetrics::register(&registry, "shop").unwrap();
        metrics.idle_backoff_ms.with_label_values(&["orders"]).set(50.0);
        metrics.idle_backoff_ms.with_label_values(&["payments"]).set(400.0);
        metrics.dlq_published_total.inc();
        assert_eq!(metrics.idle_backoff_ms.with_label_values(&["orders"]).get(), 50.0);
        assert_eq!(metrics.dlq_published_total.get(), 1);
    }
}
