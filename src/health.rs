//! JSON-serializable health snapshot (§6 Health surface): broker
//! reachability, declared-vs-live consumer topology, and outbox/inbox row
//! counts by status, with a "stale publishing rows present" degraded signal.

use std::collections::HashMap;

use serde::Serialize;

use relay_broker::BrokerAdmin;
use relay_config::RelayConfig;
use relay_store::{InboxStore, OutboxStore};

#[derive(Debug, Clone, Serialize)]
pub struct ConsumerHealth {
    pub pattern: String,
    pub durable: String,
    pub present: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PoolSettings {
    pub concurrency: u32,
    pub max_deliver: u32,
    pub use_outbox: bool,
    pub use_inbox: bool,
    pub use_dlq: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub broker_connected: bool,
    pub streams_present: bool,
    pub consumers: Vec<ConsumerHealth>,
    pub outbox_counts: HashMap<String, i64>,
    pub inbox_counts: HashMap<String, i64>,
    pub stale_publishing_count: usize,
    pub pool: PoolSettings,
    pub degraded: bool,
}

impl HealthReport {
    /// `patterns` are the subscription patterns this process declares;
    /// `stream_name` is the JetStream stream they're all consumers on.
    pub async fn collect<B: BrokerAdmin, SOut: OutboxStore, SIn: InboxStore>(
        config: &RelayConfig,
        broker: &B,
        outbox_store: &SOut,
        inbox_store: &SIn,
        patterns: &[String],
    ) -> Self {
        let stream_name = config.stream_name();

        let mut consumers = Vec::with_capacity(patterns.len());
        let mut broker_connected = true;
        let mut streams_present = true;
        for pattern in patterns {
            let durable = relay_topology::durable_name_for_pattern(pattern);
            match broker.consumer_info(&stream_name, &durable).await {
                Ok(info) => {
                    if info.is_none() {
                        streams_present = false;
                    }
                    consumers.push(ConsumerHealth { pattern: pattern.clone(), durable, present: info.is_some() });
                }
                Err(_) => {
                    broker_connected = false;
                    consumers.push(ConsumerHealth { pattern: pattern.clone(), durable, present: false });
                }
            }
        }

        let outbox_counts = outbox_store.counts_by_status().await.unwrap_or_default();
        let inbox_counts = inbox_store.counts_by_status().await.unwrap_or_default();
        let stale_publishing_count = outbox_store
            .find_stale_publishing(config.staleness_window)
            .await
            .map(|rows| rows.len())
            .unwrap_or(0);

        let degraded = !broker_connected || !streams_present || stale_publishing_count > 0;

        Self {
            broker_connected,
            streams_present,
            consumers,
            outbox_counts,
            inbox_counts,
            stale_publishing_count,
            pool: PoolSettings {
                concurrency: config.concurrency,
                max_deliver: config.max_deliver,
                use_outbox: config.use_outbox,
                use_inbox: config.use_inbox,
                use_dlq: config.use_dlq,
            },
            degraded,
        }
    }
}
