use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use relay_broker::{Broker, BrokerAdmin, BrokerMessage, PullSubscription};
use relay_envelope::{Envelope, Subject};
use relay_inbox::InboxProcessor;
use relay_retry::{backoff_for_attempt, classify, Decision, DlqEnvelope, DlqError, ErrorContext};
use relay_store::InboxStore;
use relay_topology::{is_recoverable, TopologyManager};

use crate::context::MessageContext;
use crate::metrics::RouterMetrics;
use crate::subscriber::{SubscriberError, SubscriberHandle, SubscriberRegistration};

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub fetch_timeout: Duration,
    pub idle_floor: Duration,
    pub idle_ceiling: Duration,
    pub use_inbox: bool,
    pub dlq_subject: Option<String>,
}

/// One worker owns one durable consumer and drives a blocking pull loop
/// (§4.E). Multiple subscribers registered on the same pattern share a
/// worker and are dispatched to as a unit: all must succeed for the
/// message to ack.
pub struct Worker<B: Broker + BrokerAdmin, S: InboxStore> {
    broker: Arc<B>,
    stream_name: String,
    durable: String,
    registration: SubscriberRegistration,
    pattern_subject: Subject,
    topology: Arc<TopologyManager<B>>,
    inbox: Option<Arc<InboxProcessor<S>>>,
    config: WorkerConfig,
    metrics: Option<Arc<RouterMetrics>>,
}

impl<B: Broker + BrokerAdmin, S: InboxStore> Worker<B, S> {
    pub fn new(
        broker: Arc<B>,
        stream_name: String,
        durable: String,
        registration: SubscriberRegistration,
        topology: Arc<TopologyManager<B>>,
        inbox: Option<Arc<InboxProcessor<S>>>,
        config: WorkerConfig,
        metrics: Option<Arc<RouterMetrics>>,
    ) -> Self {
        let pattern_subject = Subject::parse(&registration.pattern).expect("declared pattern must already be a valid subject");
        Self { broker, stream_name, durable, registration, pattern_subject, topology, inbox, config, metrics }
    }

    async fn subscribe(&self) -> Result<Box<dyn PullSubscription>, relay_broker::BrokerError> {
        self.broker.pull_subscribe(&self.registration.pattern, &self.durable, &self.stream_name).await
    }

    fn record_idle_backoff(&self, backoff: Duration) {
        if let Some(metrics) = &self.metrics {
            metrics.idle_backoff_ms.with_label_values(&[&self.durable]).set(backoff.as_millis() as f64);
        }
    }

    /// Runs until `shutdown` is set to `true`. Observes the signal between
    /// fetches and between messages within a fetched batch — an in-flight
    /// message always reaches ack/nak/term before this returns, but the rest
    /// of a batch is abandoned once shutdown is requested.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut subscription = match self.subscribe().await {
            Ok(s) => s,
            Err(e) => {
                warn!(durable = %self.durable, error = %e, "worker could not subscribe, exiting");
                return;
            }
        };
        let mut idle_backoff = self.config.idle_floor;
        self.record_idle_backoff(idle_backoff);

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                fetched = subscription.fetch(self.registration.batch_size, self.config.fetch_timeout) => {
                    match fetched {
                        Ok(messages) if messages.is_empty() => {
                            tokio::time::sleep(idle_backoff).await;
                            idle_backoff = next_idle_backoff(idle_backoff, self.config.idle_ceiling);
                            self.record_idle_backoff(idle_backoff);
                        }
                        Ok(messages) => {
                            idle_backoff = self.config.idle_floor;
                            self.record_idle_backoff(idle_backoff);
                            for message in messages {
                                self.handle_message(message.as_ref()).await;
                                if *shutdown.borrow() {
                                    break;
                                }
                            }
                        }
                        Err(e) if is_recoverable(&e) => {
                            warn!(durable = %self.durable, error = %e, "recoverable broker error, re-ensuring topology");
                            let _ = self.topology.recover().await;
                            if let Ok(s) = self.subscribe().await {
                                subscription = s;
                            }
                            tokio::time::sleep(idle_backoff).await;
                        }
                        Err(e) => {
                            warn!(durable = %self.durable, error = %e, "fetch failed");
                            tokio::time::sleep(idle_backoff).await;
                            idle_backoff = next_idle_backoff(idle_backoff, self.config.idle_ceiling);
                            self.record_idle_backoff(idle_backoff);
                        }
                    }
                }
            }
        }

        info!(durable = %self.durable, "worker stopped");
    }

    async fn handle_message(&self, message: &dyn BrokerMessage) {
        let envelope: Envelope = match serde_json::from_slice(message.payload()) {
            Ok(e) => e,
            Err(e) => {
                debug!(error = %e, "malformed envelope payload, discarding");
                let _ = message.ack().await;
                return;
            }
        };
        if let Err(e) = envelope.validate() {
            debug!(error = %e, "envelope failed validation, discarding");
            let _ = message.ack().await;
            return;
        }

        let subject_str = message.subject().to_string();
        let concrete_subject = match Subject::parse(&subject_str) {
            Ok(s) => s,
            Err(e) => {
                debug!(error = %e, "unparseable subject, discarding");
                let _ = message.ack().await;
                return;
            }
        };
        if !Subject::matches(&self.pattern_subject, &concrete_subject) {
            debug!(subject = %subject_str, pattern = %self.registration.pattern, "subject no longer matches declared pattern, discarding");
            let _ = message.ack().await;
            return;
        }

        let deliveries = message.delivery_count();
        let ctx = MessageContext::from_envelope(&envelope, &subject_str, deliveries, message.stream(), message.stream_seq());

        let failure = self.dispatch(&envelope, &ctx, message, deliveries as i32).await;

        match failure {
            None => {
                let _ = message.ack().await;
            }
            Some((subscriber, error)) => {
                let error_ctx = ErrorContext {
                    error: error.message().to_string(),
                    message: message.payload().to_vec(),
                    context: envelope.clone(),
                    subject: subject_str.clone(),
                    attempt_number: deliveries,
                    max_attempts: self.registration.max_deliver.max(0) as u64,
                };
                let decision = subscriber
                    .error_policy(&error, &error_ctx)
                    .unwrap_or_else(|| classify(error.classification(), &error_ctx));

                self.apply_decision(decision, message, &subject_str, &envelope, &error, deliveries).await;
            }
        }
    }

    /// Invokes every matching subscriber sequentially (wrapped by the inbox
    /// dedup check when enabled) and returns the first failure, if any.
    async fn dispatch(
        &self,
        envelope: &Envelope,
        ctx: &MessageContext,
        message: &dyn BrokerMessage,
        deliveries: i32,
    ) -> Option<(SubscriberHandle, SubscriberError)> {
        let subscribers = &self.registration.subscribers;

        if let Some(inbox) = &self.inbox {
            if !self.config.use_inbox {
                return Self::dispatch_all(subscribers, envelope, ctx).await;
            }
            let key = relay_inbox::key_for(Some(envelope.event_id), message.stream(), message.stream_seq() as i64);
            let mut captured = None;
            let outcome = inbox
                .process_if_new(key, &ctx.subject, deliveries, || async {
                    match Self::dispatch_all(subscribers, envelope, ctx).await {
                        None => Ok(()),
                        Some((sub, err)) => {
                            let message = err.message().to_string();
                            captured = Some((sub, err));
                            Err(message)
                        }
                    }
                })
                .await;
            match outcome {
                Ok(relay_inbox::Outcome::Processed) | Ok(relay_inbox::Outcome::AlreadyProcessed) => None,
                Ok(relay_inbox::Outcome::Failed(_)) => captured,
                Err(e) => {
                    warn!(error = %e, "inbox store error, leaving message unacked for redelivery");
                    Some((subscribers[0].clone(), SubscriberError::Transient(e.to_string())))
                }
            }
        } else {
            Self::dispatch_all(subscribers, envelope, ctx).await
        }
    }

    async fn dispatch_all(subscribers: &[SubscriberHandle], envelope: &Envelope, ctx: &MessageContext) -> Option<(SubscriberHandle, SubscriberError)> {
        for subscriber in subscribers {
            if let Err(e) = subscriber.handle(envelope, ctx).await {
                return Some((subscriber.clone(), e));
            }
        }
        None
    }

    async fn apply_decision(&self, decision: Decision, message: &dyn BrokerMessage, subject: &str, envelope: &Envelope, error: &SubscriberError, deliveries: u64) {
        match decision {
            Decision::Retry => {
                let delay = backoff_for_attempt(&self.schedule(), deliveries);
                let _ = message.nak(delay).await;
            }
            Decision::Discard => {
                let _ = message.ack().await;
            }
            Decision::Dlq => {
                self.publish_to_dlq(subject, envelope, error, deliveries).await;
                let _ = message.term().await;
            }
        }
    }

    fn schedule(&self) -> Vec<Duration> {
        self.registration.backoff_ms.iter().map(|ms| Duration::from_millis((*ms).max(0) as u64)).collect()
    }

    async fn publish_to_dlq(&self, subject: &str, envelope: &Envelope, error: &SubscriberError, deliveries: u64) {
        let Some(dlq_subject) = &self.config.dlq_subject else {
            warn!(subject = %subject, "DLQ disabled, dropping terminally failed message");
            return;
        };
        let payload = serde_json::to_value(envelope).unwrap_or(serde_json::Value::Null);
        let dlq_envelope = DlqEnvelope {
            original_subject: subject.to_string(),
            payload,
            headers: HashMap::new(),
            error: DlqError::new(error.classification(), error.message(), deliveries),
        };
        let bytes = match serde_json::to_vec(&dlq_envelope) {
            Ok(b) => b,
            Err(e) => {
                warn!(error = %e, "failed to encode DLQ envelope");
                return;
            }
        };
        match self.broker.publish(dlq_subject, bytes, HashMap::new()).await {
            Ok(_) => {
                if let Some(metrics) = &self.metrics {
                    metrics.dlq_published_total.inc();
                }
            }
            Err(e) => warn!(error = %e, "failed to publish to DLQ"),
        }
    }
}

fn next_idle_backoff(current: Duration, ceiling: Duration) -> Duration {
    let doubled = current.saturating_mul(2).min(ceiling);
    let mut rng = rand::thread_rng();
    let jitter_ms: i64 = rng.gen_range(-20..=20);
    let base_ms = doubled.as_millis() as i64;
    Duration::from_millis((base_ms + jitter_ms).max(0) as u64)
}
