use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use relay_broker::{Broker, BrokerAdmin};
use relay_inbox::InboxProcessor;
use relay_store::InboxStore;
use relay_topology::{DeclaredConsumer, TopologyError, TopologyManager};

use crate::metrics::RouterMetrics;
use crate::subscriber::SubscriberRegistration;
use crate::worker::{Worker, WorkerConfig};

#[derive(Debug, Clone)]
pub struct ConsumerPoolConfig {
    pub stream_name: String,
    pub fetch_timeout: Duration,
    pub idle_floor: Duration,
    pub idle_ceiling: Duration,
    pub use_inbox: bool,
    pub dlq_subject: Option<String>,
}

impl Default for ConsumerPoolConfig {
    fn default() -> Self {
        Self {
            stream_name: "relay".to_string(),
            fetch_timeout: Duration::from_secs(5),
            idle_floor: Duration::from_millis(50),
            idle_ceiling: Duration::from_secs(1),
            use_inbox: true,
            dlq_subject: None,
        }
    }
}

/// Owns one worker per declared subscription pattern, reconciling stream
/// and consumer topology before handing off to the workers' pull loops
/// (§4.D, §4.E).
pub struct ConsumerPool<B: Broker + BrokerAdmin, S: InboxStore> {
    broker: Arc<B>,
    topology: Arc<TopologyManager<B>>,
    inbox: Option<Arc<InboxProcessor<S>>>,
    registrations: Vec<SubscriberRegistration>,
    config: ConsumerPoolConfig,
    metrics: Option<Arc<RouterMetrics>>,
}

/// Returned by [`ConsumerPool::start`]. Dropping this without calling
/// `stop` leaves the workers running; `stop` is the only way to observe
/// every worker finish its in-flight message and exit.
pub struct ShutdownHandle {
    signal: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl ShutdownHandle {
    pub async fn stop(self) {
        let _ = self.signal.send(true);
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

impl<B: Broker + BrokerAdmin + 'static, S: InboxStore + 'static> ConsumerPool<B, S> {
    pub fn new(
        broker: Arc<B>,
        topology: Arc<TopologyManager<B>>,
        inbox: Option<Arc<InboxProcessor<S>>>,
        registrations: Vec<SubscriberRegistration>,
        config: ConsumerPoolConfig,
    ) -> Self {
        Self { broker, topology, inbox, registrations, config, metrics: None }
    }

    pub fn with_metrics(mut self, metrics: Arc<RouterMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Ensures streams exist, reconciles each declared pattern's durable
    /// consumer against what the broker actually has, then spawns one
    /// worker task per pattern.
    pub async fn start(self) -> Result<ShutdownHandle, TopologyError> {
        self.topology.ensure_streams().await?;

        let declared: Vec<DeclaredConsumer> = self
            .registrations
            .iter()
            .map(|r| DeclaredConsumer {
                pattern: r.pattern.clone(),
                max_deliver: r.max_deliver,
                ack_wait_ms: r.ack_wait_ms,
                backoff_ms: r.backoff_ms.clone(),
            })
            .collect();
        let report = self.topology.reconcile(&declared).await?;
        info!(touched = report.touched.len(), "topology reconciled");

        let (tx, rx) = watch::channel(false);
        let mut handles = Vec::with_capacity(self.registrations.len());

        for registration in self.registrations {
            let durable = relay_topology::durable_name_for_pattern(&registration.pattern);
            let worker_config = WorkerConfig {
                fetch_timeout: self.config.fetch_timeout,
                idle_floor: self.config.idle_floor,
                idle_ceiling: self.config.idle_ceiling,
                use_inbox: self.config.use_inbox,
                dlq_subject: self.config.dlq_subject.clone(),
            };
            let worker = Arc::new(Worker::new(
                self.broker.clone(),
                self.config.stream_name.clone(),
                durable,
                registration,
                self.topology.clone(),
                self.inbox.clone(),
                worker_config,
                self.metrics.clone(),
            ));
            let rx = rx.clone();
            handles.push(tokio::spawn(worker.run(rx)));
        }

        Ok(ShutdownHandle { signal: tx, handles })
    }
}
