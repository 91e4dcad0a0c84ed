use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::config::{ConsumerConfig, ConsumerInfo, StreamConfig};
use crate::error::BrokerError;
use crate::{Broker, BrokerAck, BrokerAdmin, BrokerMessage, Headers, PullSubscription};

#[derive(Clone)]
struct QueuedMessage {
    subject: String,
    payload: Vec<u8>,
    headers: Headers,
    stream: String,
    stream_seq: u64,
    delivery_count: u64,
}

type Queue = Arc<Mutex<VecDeque<QueuedMessage>>>;

struct ConsumerEntry {
    config: ConsumerConfig,
    queue: Queue,
}

#[derive(Default)]
struct Inner {
    streams: HashMap<String, StreamConfig>,
    seqs: HashMap<String, u64>,
    consumers: HashMap<(String, String), ConsumerEntry>,
}

/// In-process broker standing in for a live JetStream server. Every
/// `publish` fans out into the queue of each durable whose filter subject
/// matches, so tests can exercise routing and ack/nak/term behavior without
/// a running NATS instance.
#[derive(Clone, Default)]
pub struct FakeBroker {
    inner: Arc<Mutex<Inner>>,
}

impl FakeBroker {
    pub fn new() -> Self {
        Self::default()
    }
}

fn subject_matches(filter: &str, subject: &str) -> bool {
    let pattern: Vec<&str> = filter.split('.').collect();
    let concrete: Vec<&str> = subject.split('.').collect();
    fn go(pattern: &[&str], concrete: &[&str]) -> bool {
        match pattern.first() {
            None => concrete.is_empty(),
            Some(&">") => !concrete.is_empty(),
            Some(&"*") => !concrete.is_empty() && go(&pattern[1..], &concrete[1..]),
            Some(tok) => concrete.first() == Some(tok) && go(&pattern[1..], &concrete[1..]),
        }
    }
    go(&pattern, &concrete)
}

#[async_trait]
impl Broker for FakeBroker {
    async fn publish(&self, subject: &str, payload: Vec<u8>, headers: Headers) -> Result<BrokerAck, BrokerError> {
        let mut inner = self.inner.lock().await;
        let mut delivered_to_any = false;
        let matching: Vec<(String, Queue)> = inner
            .consumers
            .iter()
            .filter(|(_, entry)| subject_matches(&entry.config.filter_subject, subject))
            .map(|((stream, _), entry)| (stream.clone(), entry.queue.clone()))
            .collect();

        for (stream, queue) in matching {
            let seq = inner.seqs.entry(stream.clone()).or_insert(0);
            *seq += 1;
            let message = QueuedMessage {
                subject: subject.to_string(),
                payload: payload.clone(),
                headers: headers.clone(),
                stream,
                stream_seq: *seq,
                delivery_count: 1,
            };
            queue.lock().await.push_back(message);
            delivered_to_any = true;
        }
        let _ = delivered_to_any;
        Ok(BrokerAck { duplicate: false })
    }

    async fn pull_subscribe(
        &self,
        _filter_subject: &str,
        durable: &str,
        stream: &str,
    ) -> Result<Box<dyn PullSubscription>, BrokerError> {
        let inner = self.inner.lock().await;
        let entry = inner
            .consumers
            .get(&(stream.to_string(), durable.to_string()))
            .ok_or_else(|| BrokerError::NotFound(format!("consumer {durable} on stream {stream}")))?;
        Ok(Box::new(FakePullSubscription { queue: entry.queue.clone() }))
    }
}

#[async_trait]
impl BrokerAdmin for FakeBroker {
    async fn ensure_stream(&self, config: &StreamConfig) -> Result<(), BrokerError> {
        let mut inner = self.inner.lock().await;
        inner.streams.entry(config.name.clone()).or_insert_with(|| config.clone());
        Ok(())
    }

    async fn consumer_info(&self, stream: &str, durable: &str) -> Result<Option<ConsumerInfo>, BrokerError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .consumers
            .get(&(stream.to_string(), durable.to_string()))
            .map(|entry| ConsumerInfo { durable_name: durable.to_string(), config: entry.config.clone() }))
    }

    async fn add_consumer(&self, stream: &str, config: &ConsumerConfig) -> Result<(), BrokerError> {
        let mut inner = self.inner.lock().await;
        inner.consumers.insert(
            (stream.to_string(), config.durable_name.clone()),
            ConsumerEntry { config: config.clone(), queue: Arc::new(Mutex::new(VecDeque::new())) },
        );
        Ok(())
    }

    async fn delete_consumer(&self, stream: &str, durable: &str) -> Result<(), BrokerError> {
        let mut inner = self.inner.lock().await;
        inner.consumers.remove(&(stream.to_string(), durable.to_string()));
        Ok(())
    }
}

struct FakePullSubscription {
    queue: Queue,
}

#[async_trait]
impl PullSubscription for FakePullSubscription {
    async fn fetch(&self, batch: usize, _timeout: Duration) -> Result<Vec<Box<dyn BrokerMessage>>, BrokerError> {
        let mut queue = self.queue.lock().await;
        let mut out = Vec::with_capacity(batch.min(queue.len()));
        for _ in 0..batch {
            match queue.pop_front() {
                Some(message) => out.push(Box::new(FakeMessage { message, requeue: self.queue.clone() }) as Box<dyn BrokerMessage>),
                None => break,
            }
        }
        Ok(out)
    }
}

struct FakeMessage {
    message: QueuedMessage,
    requeue: Queue,
}

#[async_trait]
impl BrokerMessage for FakeMessage {
    fn subject(&self) -> &str {
        &self.message.subject
    }

    fn payload(&self) -> &[u8] {
        &self.message.payload
    }

    fn headers(&self) -> &Headers {
        &self.message.headers
    }

    fn stream(&self) -> &str {
        &self.message.stream
    }

    fn stream_seq(&self) -> u64 {
        self.message.stream_seq
    }

    fn delivery_count(&self) -> u64 {
        self.message.delivery_count
    }

    async fn ack(&self) -> Result<(), BrokerError> {
        Ok(())
    }

    async fn nak(&self, _delay: Duration) -> Result<(), BrokerError> {
        let mut redelivered = self.message.clone();
        redelivered.delivery_count += 1;
        self.requeue.lock().await.push_back(redelivered);
        Ok(())
    }

    async fn term(&self) -> Result<(), BrokerError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn consumer_config(filter: &str) -> ConsumerConfig {
        ConsumerConfig {
            durable_name: "worker-1".to_string(),
            filter_subject: filter.to_string(),
            ack_policy: crate::config::AckPolicy::Explicit,
            deliver_policy: crate::config::DeliverPolicy::All,
            max_deliver: 5,
            ack_wait_ms: 30_000,
            backoff_ms: vec![1_000, 5_000],
        }
    }

    #[tokio::test]
    async fn publish_then_fetch_round_trips() {
        let broker = FakeBroker::new();
        broker.ensure_stream(&StreamConfig::for_environment("dev", "app")).await.unwrap();
        broker.add_consumer("dev_app", &consumer_config("dev.app.>")).await.unwrap();

        broker.publish("dev.app.orders.created", b"payload".to_vec(), HashMap::new()).await.unwrap();

        let sub = broker.pull_subscribe("dev.app.>", "worker-1", "dev_app").await.unwrap();
        let messages = sub.fetch(10, Duration::from_millis(100)).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].payload(), b"payload");
    }

    #[tokio::test]
    async fn nak_requeues_with_incremented_delivery_count() {
        let broker = FakeBroker::new();
        broker.ensure_stream(&StreamConfig::for_environment("dev", "app")).await.unwrap();
        broker.add_consumer("dev_app", &consumer_config("dev.app.>")).await.unwrap();
        broker.publish("dev.app.orders.created", b"payload".to_vec(), HashMap::new()).await.unwrap();

        let sub = broker.pull_subscribe("dev.app.>", "worker-1", "dev_app").await.unwrap();
        let first = sub.fetch(1, Duration::from_millis(100)).await.unwrap();
        first[0].nak(Duration::from_millis(0)).await.unwrap();

        let second = sub.fetch(1, Duration::from_millis(100)).await.unwrap();
        assert_eq!(second[0].delivery_count(), 2);
    }

    #[tokio::test]
    async fn non_matching_subject_is_not_delivered() {
        let broker = FakeBroker::new();
        broker.ensure_stream(&StreamConfig::for_environment("dev", "app")).await.unwrap();
        broker.add_consumer("dev_app", &consumer_config("dev.app.orders.>")).await.unwrap();
        broker.publish("dev.app.billing.created", b"payload".to_vec(), HashMap::new()).await.unwrap();

        let sub = broker.pull_subscribe("dev.app.orders.>", "worker-1", "dev_app").await.unwrap();
        let messages = sub.fetch(10, Duration::from_millis(50)).await.unwrap();
        assert!(messages.is_empty());
    }
}
