use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use uuid::Uuid;

use relay_broker::{Broker, BrokerError};
use relay_envelope::{Envelope, Subject};
use relay_retry::{CircuitBreaker, CircuitBreakerConfig};
use relay_store::{OutboxStatus, OutboxStore};

use crate::backoff::exponential_with_jitter;
use crate::metrics::OutboxMetrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    ValidationError,
    IoError,
    Timeout,
    PublishError,
    Exception,
}

#[derive(Debug, Clone)]
pub enum PublishResult {
    Success { event_id: Uuid, subject: String },
    Failure { reason: FailureReason, details: String, error: Option<String> },
}

#[derive(Debug, Clone)]
pub struct OutboxPublisherConfig {
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for OutboxPublisherConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(5),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

/// Publishes envelopes via the store-then-emit algorithm. One instance is
/// shared by every caller that publishes through this process; the circuit
/// breaker it owns is therefore a single connection-level gate, not a
/// per-caller one.
pub struct OutboxPublisher<S: OutboxStore, B: Broker> {
    store: Arc<S>,
    broker: Arc<B>,
    circuit_breaker: CircuitBreaker,
    config: OutboxPublisherConfig,
    metrics: Option<Arc<OutboxMetrics>>,
}

impl<S: OutboxStore, B: Broker> OutboxPublisher<S, B> {
    pub fn new(store: Arc<S>, broker: Arc<B>, config: OutboxPublisherConfig) -> Self {
        let circuit_breaker = CircuitBreaker::new(config.circuit_breaker.clone());
        Self { store, broker, circuit_breaker, config, metrics: None }
    }

    pub fn with_metrics(mut self, metrics: Arc<OutboxMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub async fn publish(&self, subject: &Subject, envelope: &Envelope) -> PublishResult {
        if let Err(e) = envelope.validate() {
            return PublishResult::Failure {
                reason: FailureReason::ValidationError,
                details: "envelope failed validation".to_string(),
                error: Some(e.to_string()),
            };
        }

        let event_id = envelope.event_id;
        let payload = match serde_json::to_value(envelope) {
            Ok(v) => v,
            Err(e) => {
                return PublishResult::Failure {
                    reason: FailureReason::ValidationError,
                    details: "envelope did not serialize".to_string(),
                    error: Some(e.to_string()),
                }
            }
        };

        let existing = match self.store.find_or_create_by_event_id(event_id, subject.as_str(), payload.clone(), serde_json::json!({})).await {
            Ok(row) => row,
            Err(e) => {
                return PublishResult::Failure {
                    reason: FailureReason::IoError,
                    details: "outbox store unavailable".to_string(),
                    error: Some(e.to_string()),
                }
            }
        };

        if existing.status == OutboxStatus::Sent {
            return PublishResult::Success { event_id, subject: subject.as_str().to_string() };
        }

        if let Err(e) = self.store.mark_publishing(event_id).await {
            return PublishResult::Failure {
                reason: FailureReason::IoError,
                details: "failed to persist publishing pre-state".to_string(),
                error: Some(e.to_string()),
            };
        }

        let payload_bytes = match serde_json::to_vec(&payload) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.store.mark_failed(event_id, &e.to_string()).await.ok();
                return PublishResult::Failure {
                    reason: FailureReason::Exception,
                    details: "envelope payload did not encode".to_string(),
                    error: Some(e.to_string()),
                };
            }
        };

        let mut headers = HashMap::new();
        headers.insert("nats-msg-id".to_string(), event_id.to_string());

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.emit_once(subject.as_str(), payload_bytes.clone(), headers.clone()).await {
                Ok(_ack) => {
                    if let Err(e) = self.store.mark_sent(event_id).await {
                        warn!(%event_id, error = %e, "broker accepted publish but marking sent failed");
                    }
                    info!(%event_id, subject = subject.as_str(), attempt, "event published");
                    if let Some(metrics) = &self.metrics {
                        metrics.published_total.inc();
                    }
                    return PublishResult::Success { event_id, subject: subject.as_str().to_string() };
                }
                Err(e) if e.is_retryable_transport() && attempt < self.config.max_attempts => {
                    let delay = exponential_with_jitter(self.config.base_backoff, self.config.max_backoff, attempt);
                    warn!(%event_id, attempt, ?delay, error = %e, "retrying publish after transport error");
                    tokio::time::sleep(delay).await;
                    continue;
                }
                Err(e) => {
                    let reason = if e.is_retryable_transport() { FailureReason::Timeout } else { FailureReason::PublishError };
                    self.store.mark_failed(event_id, &e.to_string()).await.ok();
                    if let Some(metrics) = &self.metrics {
                        metrics.failed_total.inc();
                    }
                    return PublishResult::Failure {
                        reason,
                        details: "broker publish did not succeed".to_string(),
                        error: Some(e.to_string()),
                    };
                }
            }
        }
    }

    async fn emit_once(&self, subject: &str, payload: Vec<u8>, headers: HashMap<String, String>) -> Result<relay_broker::BrokerAck, BrokerError> {
        if self.circuit_breaker.should_reject() {
            return Err(BrokerError::Connection("circuit breaker open".to_string()));
        }
        match self.broker.publish(subject, payload, headers).await {
            Ok(ack) => {
                self.circuit_breaker.record_success();
                Ok(ack)
            }
            Err(e) => {
                self.circuit_breaker.record_failure();
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_broker::FakeBroker;
    use relay_envelope::{build_topic_envelope, EnvelopeOpts};
    use relay_store::InMemoryOutboxStore;

    fn publisher() -> OutboxPublisher<InMemoryOutboxStore, FakeBroker> {
        OutboxPublisher::new(Arc::new(InMemoryOutboxStore::default()), Arc::new(FakeBroker::new()), OutboxPublisherConfig::default())
    }

    #[tokio::test]
    async fn publish_without_a_live_consumer_still_succeeds() {
        let publisher = publisher();
        let subject = Subject::from_topic("test", "shop", "order.created").unwrap();
        let envelope = build_topic_envelope("shop", "order.created", serde_json::json!({"id": 1}), EnvelopeOpts::default());

        let result = publisher.publish(&subject, &envelope).await;
        assert!(matches!(result, PublishResult::Success { .. }));
    }

    #[tokio::test]
    async fn republishing_the_same_event_id_is_idempotent() {
        let publisher = publisher();
        let subject = Subject::from_topic("test", "shop", "order.created").unwrap();
        let event_id = Uuid::new_v4();
        let envelope = build_topic_envelope(
            "shop",
            "order.created",
            serde_json::json!({"id": 1}),
            EnvelopeOpts { event_id: Some(event_id), ..Default::default() },
        );

        let first = publisher.publish(&subject, &envelope).await;
        let second = publisher.publish(&subject, &envelope).await;
        assert!(matches!(first, PublishResult::Success { .. }));
        assert!(matches!(second, PublishResult::Success { .. }));
    }

    #[tokio::test]
    async fn invalid_envelope_fails_validation_before_touching_the_store() {
        let publisher = publisher();
        let subject = Subject::from_topic("test", "shop", "order.created").unwrap();
        let mut envelope = build_topic_envelope("shop", "order.created", serde_json::json!({}), EnvelopeOpts::default());
        envelope.message = None;

        let result = publisher.publish(&subject, &envelope).await;
        assert!(matches!(result, PublishResult::Failure { reason: FailureReason::ValidationError, .. }));
    }
}
