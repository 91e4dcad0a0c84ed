use std::sync::Arc;
use tracing::{info, warn};

use relay_broker::{AckPolicy, BrokerAdmin, BrokerError, ConsumerConfig, DeliverPolicy, StreamConfig};

use crate::durable_name::durable_name_for_pattern;

#[derive(Debug, Clone)]
pub struct DeclaredConsumer {
    pub pattern: String,
    pub max_deliver: i64,
    pub ack_wait_ms: i64,
    pub backoff_ms: Vec<i64>,
}

#[derive(Debug, thiserror::Error)]
pub enum TopologyError {
    #[error(transparent)]
    Broker(#[from] BrokerError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    Kept,
    Created,
    Recreated,
}

#[derive(Debug, Clone)]
pub struct ReconcileReport {
    pub touched: Vec<(String, ReconcileAction)>,
}

impl ReconcileReport {
    pub fn count(&self, action: ReconcileAction) -> usize {
        self.touched.iter().filter(|(_, a)| *a == action).count()
    }
}

/// Owns stream/consumer lifecycle against the broker's management surface.
pub struct TopologyManager<B: BrokerAdmin> {
    admin: Arc<B>,
    stream: StreamConfig,
    dlq_stream: Option<StreamConfig>,
}

impl<B: BrokerAdmin> TopologyManager<B> {
    pub fn new(admin: Arc<B>, stream: StreamConfig, dlq_stream: Option<StreamConfig>) -> Self {
        Self { admin, stream, dlq_stream }
    }

    pub async fn ensure_streams(&self) -> Result<(), TopologyError> {
        self.admin.ensure_stream(&self.stream).await?;
        if let Some(dlq) = &self.dlq_stream {
            self.admin.ensure_stream(dlq).await?;
        }
        Ok(())
    }

    /// Re-ensures topology and returns normally; callers that caught a
    /// recoverable broker error (§4.E step 5) call this before re-subscribing.
    pub async fn recover(&self) -> Result<(), TopologyError> {
        self.ensure_streams().await
    }

    pub async fn reconcile(&self, declared: &[DeclaredConsumer]) -> Result<ReconcileReport, TopologyError> {
        let mut touched = Vec::with_capacity(declared.len());

        for d in declared {
            let durable = durable_name_for_pattern(&d.pattern);
            let desired = ConsumerConfig {
                durable_name: durable.clone(),
                filter_subject: d.pattern.clone(),
                ack_policy: AckPolicy::Explicit,
                deliver_policy: DeliverPolicy::All,
                max_deliver: d.max_deliver,
                ack_wait_ms: d.ack_wait_ms,
                backoff_ms: d.backoff_ms.clone(),
            };

            let live = self.admin.consumer_info(&self.stream.name, &durable).await?;
            let action = match live {
                None => {
                    self.admin.add_consumer(&self.stream.name, &desired).await?;
                    ReconcileAction::Created
                }
                Some(info) if info.config.canonical() == desired.canonical() => ReconcileAction::Kept,
                Some(_) => {
                    self.admin.delete_consumer(&self.stream.name, &durable).await?;
                    self.admin.add_consumer(&self.stream.name, &desired).await?;
                    ReconcileAction::Recreated
                }
            };

            match action {
                ReconcileAction::Created => info!(durable, "created durable consumer"),
                ReconcileAction::Recreated => warn!(durable, "live config drifted, recreated durable consumer"),
                ReconcileAction::Kept => {}
            }
            touched.push((durable, action));
        }

        Ok(ReconcileReport { touched })
    }
}

/// §4.E step 5's recoverable class: consumer/stream missing during fetch.
pub fn is_recoverable(err: &BrokerError) -> bool {
    err.is_recoverable_topology_error()
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_broker::FakeBroker;

    fn declared(pattern: &str) -> DeclaredConsumer {
        DeclaredConsumer { pattern: pattern.to_string(), max_deliver: 5, ack_wait_ms: 30_000, backoff_ms: vec![1_000, 5_000] }
    }

    #[tokio::test]
    async fn creates_missing_consumers() {
        let broker = Arc::new(FakeBroker::new());
        let manager = TopologyManager::new(broker.clone(), StreamConfig::for_environment("dev", "app"), None);
        manager.ensure_streams().await.unwrap();

        let report = manager.reconcile(&[declared("dev.app.orders.>")]).await.unwrap();
        assert_eq!(report.count(ReconcileAction::Created), 1);
    }

    #[tokio::test]
    async fn reconcile_is_idempotent_once_created() {
        let broker = Arc::new(FakeBroker::new());
        let manager = TopologyManager::new(broker.clone(), StreamConfig::for_environment("dev", "app"), None);
        manager.ensure_streams().await.unwrap();

        manager.reconcile(&[declared("dev.app.orders.>")]).await.unwrap();
        let second = manager.reconcile(&[declared("dev.app.orders.>")]).await.unwrap();
        assert_eq!(second.count(ReconcileAction::Kept), 1);
        assert_eq!(second.count(ReconcileAction::Created), 0);
    }

    #[tokio::test]
    async fn drifted_config_is_recreated() {
        let broker = Arc::new(FakeBroker::new());
        let manager = TopologyManager::new(broker.clone(), StreamConfig::for_environment("dev", "app"), None);
        manager.ensure_streams().await.unwrap();

        manager.reconcile(&[declared("dev.app.orders.>")]).await.unwrap();
        let mut drifted = declared("dev.app.orders.>");
        drifted.max_deliver = 9;
        let report = manager.reconcile(&[drifted]).await.unwrap();
        assert_eq!(report.count(ReconcileAction::Recreated), 1);
    }
}
