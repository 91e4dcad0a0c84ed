//! Wires every crate into one `RelayContext`, replacing the module-global
//! configuration style the standalone crates deliberately avoid: one context
//! built once per process and threaded through explicitly.

pub mod health;
pub mod metrics;

use std::sync::Arc;
use std::time::Duration;

use prometheus::Registry;
use relay_broker::{Broker, BrokerAdmin, NatsBroker, StreamConfig};
pub use relay_broker::BrokerError;
pub use relay_config::ConfigError;
use relay_config::RelayConfig;
pub use relay_envelope::{build_event_envelope, build_topic_envelope, Envelope, EnvelopeOpts, Subject, SubjectError};
use relay_inbox::InboxProcessor;
pub use relay_outbox::{BatchItem, BatchItemResult, BatchResult, FailureReason, PublishResult};
use relay_outbox::{publish_batch, OutboxPublisher, OutboxPublisherConfig, RecoverySweep};
use relay_retry::CircuitBreakerConfig;
pub use relay_router::{MessageContext, ShutdownHandle, Subscriber, SubscriberError, SubscriberHandle, SubscriberRegistration};
use relay_router::{ConsumerPool, ConsumerPoolConfig};
use relay_store::{InboxStore, OutboxStore, SqlxInboxStore, SqlxOutboxStore};
pub use relay_topology::TopologyError;
use relay_topology::TopologyManager;

pub use metrics::RelayMetrics;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Broker(#[from] BrokerError),
    #[error(transparent)]
    Topology(#[from] TopologyError),
    #[error("database connection failed: {0}")]
    Database(String),
}

/// Everything one process needs to publish through the outbox and consume
/// through the router. Construct one per process; never a process-global.
pub struct RelayContext<B: Broker + BrokerAdmin, SOut: OutboxStore, SIn: InboxStore> {
    pub config: RelayConfig,
    pub broker: Arc<B>,
    pub outbox_store: Arc<SOut>,
    pub inbox_store: Arc<SIn>,
    pub topology: Arc<TopologyManager<B>>,
    pub outbox_publisher: Arc<OutboxPublisher<SOut, B>>,
    pub inbox_processor: Arc<InboxProcessor<SIn>>,
    pub recovery_sweep: Arc<RecoverySweep<SOut>>,
    pub metrics: Arc<RelayMetrics>,
}

impl<B, SOut, SIn> RelayContext<B, SOut, SIn>
where
    B: Broker + BrokerAdmin + 'static,
    SOut: OutboxStore + 'static,
    SIn: InboxStore + 'static,
{
    /// Registers every crate's metrics bag into `registry` under the
    /// `service` label `config.app_name` and wires them into the publisher,
    /// inbox processor and recovery sweep before returning the context.
    pub fn new(config: RelayConfig, broker: Arc<B>, outbox_store: Arc<SOut>, inbox_store: Arc<SIn>, registry: &Registry) -> Self {
        let stream = StreamConfig::for_environment(&config.env, &config.app_name);
        let dlq_stream =
            config.use_dlq.then(|| StreamConfig::for_dlq(&config.env, &config.app_name, &config.dlq_stream_suffix));
        let topology = Arc::new(TopologyManager::new(broker.clone(), stream, dlq_stream));

        let metrics = Arc::new(
            RelayMetrics::register(registry, &config.app_name).expect("metric names are fixed and registered once per registry"),
        );

        let publisher_config = OutboxPublisherConfig {
            max_attempts: config.max_deliver,
            circuit_breaker: CircuitBreakerConfig::default(),
            ..OutboxPublisherConfig::default()
        };
        let outbox_publisher = Arc::new(
            OutboxPublisher::new(outbox_store.clone(), broker.clone(), publisher_config).with_metrics(metrics.outbox.clone()),
        );
        let inbox_processor = Arc::new(InboxProcessor::new(inbox_store.clone()).with_metrics(metrics.inbox.clone()));
        let recovery_sweep = Arc::new(
            RecoverySweep::new(outbox_store.clone(), config.staleness_window).with_metrics(metrics.outbox.clone()),
        );

        Self { config, broker, outbox_store, inbox_store, topology, outbox_publisher, inbox_processor, recovery_sweep, metrics }
    }

    /// Publishes a topic-form event through the outbox (§4.A/§4.B).
    pub async fn publish(&self, topic: &str, message: serde_json::Value, opts: EnvelopeOpts) -> PublishResult {
        let subject = match Subject::from_topic(&self.config.env, &self.config.app_name, topic) {
            Ok(s) => s,
            Err(e) => {
                return PublishResult::Failure {
                    reason: FailureReason::ValidationError,
                    details: "topic did not form a valid subject".to_string(),
                    error: Some(e.to_string()),
                }
            }
        };
        let envelope = build_topic_envelope(self.config.app_name.clone(), topic, message, opts);
        self.outbox_publisher.publish(&subject, &envelope).await
    }

    pub async fn publish_batch(&self, items: Vec<BatchItem>) -> BatchResult {
        publish_batch(&self.outbox_publisher, &self.config.env, &self.config.app_name, &self.config.app_name, items).await
    }

    /// Ensures topology, reconciles every declared pattern's durable
    /// consumer, and spawns one worker per pattern.
    pub async fn start_pool(&self, registrations: Vec<SubscriberRegistration>) -> Result<ShutdownHandle, RelayError> {
        let pool_config = ConsumerPoolConfig {
            stream_name: self.config.stream_name(),
            fetch_timeout: self.config.fetch_timeout,
            idle_floor: Duration::from_millis(50),
            idle_ceiling: Duration::from_secs(1),
            use_inbox: self.config.use_inbox,
            dlq_subject: self.config.use_dlq.then(|| self.config.dlq_subject()),
        };
        let inbox = self.config.use_inbox.then(|| self.inbox_processor.clone());
        let pool = ConsumerPool::new(self.broker.clone(), self.topology.clone(), inbox, registrations, pool_config)
            .with_metrics(self.metrics.router.clone());
        Ok(pool.start().await?)
    }

    /// Spawns the background recovery sweep; returns its join handle so the
    /// caller can await it alongside the pool's shutdown.
    pub fn spawn_recovery_sweep(&self, shutdown: tokio::sync::watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
        let sweep = self.recovery_sweep.clone();
        let interval = self.config.outbox_poll_interval;
        tokio::spawn(async move { sweep.run(interval, shutdown).await })
    }
}

impl RelayContext<NatsBroker, SqlxOutboxStore, SqlxInboxStore> {
    /// Production wiring: connects to NATS and Postgres per `config`, and
    /// registers metrics into `prometheus::default_registry()` so they show
    /// up alongside whatever else the embedding process exposes on `/metrics`.
    pub async fn connect(config: RelayConfig) -> Result<Self, RelayError> {
        let broker = Arc::new(NatsBroker::connect(&config.nats_urls).await?);

        let database_url =
            config.database_url.clone().ok_or_else(|| RelayError::Database("DATABASE_URL is required".to_string()))?;
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.connection_pool_size)
            .acquire_timeout(config.connection_pool_timeout)
            .connect(&database_url)
            .await
            .map_err(|e| RelayError::Database(e.to_string()))?;

        let outbox_store = Arc::new(SqlxOutboxStore::new(pool.clone(), config.outbox_table.clone()));
        let inbox_store = Arc::new(SqlxInboxStore::new(pool, config.inbox_table.clone()));

        let registry = prometheus::default_registry();
        Ok(Self::new(config, broker, outbox_store, inbox_store, registry))
    }
}
