use async_nats::jetstream::{self, consumer::pull, stream};
use async_nats::HeaderMap as NatsHeaderMap;
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashMap;
use std::time::Duration;

use crate::config::{AckPolicy, ConsumerConfig, ConsumerInfo, DeliverPolicy, RetentionPolicy, StorageType, StreamConfig};
use crate::error::BrokerError;
use crate::{Broker, BrokerAck, BrokerAdmin, BrokerMessage, Headers, PullSubscription};

/// Concrete broker backed by `async-nats`'s JetStream client. Connection is
/// established once at construction and shared by every publisher and
/// worker that holds a clone of this struct, matching §5's "single broker
/// connection, lazily established under a mutex" model — the mutex here is
/// the one-time `connect` call itself; `async_nats::Client` is internally
/// cloneable and already serializes reconnection.
#[derive(Clone)]
pub struct NatsBroker {
    jetstream: jetstream::Context,
}

impl NatsBroker {
    pub async fn connect(urls: &[String]) -> Result<Self, BrokerError> {
        let joined = urls.join(",");
        let client = async_nats::connect(&joined)
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;
        Ok(Self { jetstream: jetstream::new(client) })
    }

    fn to_nats_headers(headers: &Headers) -> NatsHeaderMap {
        let mut out = NatsHeaderMap::new();
        for (k, v) in headers {
            out.insert(k.as_str(), v.as_str());
        }
        out
    }
}

#[async_trait]
impl Broker for NatsBroker {
    async fn publish(&self, subject: &str, payload: Vec<u8>, headers: Headers) -> Result<BrokerAck, BrokerError> {
        let nats_headers = Self::to_nats_headers(&headers);
        let ack_future = self
            .jetstream
            .publish_with_headers(subject.to_string(), nats_headers, payload.into())
            .await
            .map_err(|e| BrokerError::PublishFailed(e.to_string()))?;
        let ack = ack_future.await.map_err(|e| BrokerError::PublishFailed(e.to_string()))?;
        Ok(BrokerAck { duplicate: ack.duplicate })
    }

    async fn pull_subscribe(
        &self,
        filter_subject: &str,
        durable: &str,
        stream_name: &str,
    ) -> Result<Box<dyn PullSubscription>, BrokerError> {
        let stream = self
            .jetstream
            .get_stream(stream_name)
            .await
            .map_err(|e| BrokerError::NotFound(e.to_string()))?;
        let consumer = stream
            .get_consumer::<pull::Config>(durable)
            .await
            .map_err(|e| BrokerError::NotFound(e.to_string()))?;
        let _ = filter_subject;
        Ok(Box::new(NatsPullSubscription { consumer }))
    }
}

#[async_trait]
impl BrokerAdmin for NatsBroker {
    async fn ensure_stream(&self, config: &StreamConfig) -> Result<(), BrokerError> {
        let nats_config = stream::Config {
            name: config.name.clone(),
            subjects: config.subjects.clone(),
            retention: match config.retention {
                RetentionPolicy::Limits => stream::RetentionPolicy::Limits,
                RetentionPolicy::WorkQueue => stream::RetentionPolicy::WorkQueue,
                RetentionPolicy::Interest => stream::RetentionPolicy::Interest,
            },
            storage: match config.storage {
                StorageType::File => stream::StorageType::File,
                StorageType::Memory => stream::StorageType::Memory,
            },
            max_age: config.max_age_seconds.map(Duration::from_secs).unwrap_or_default(),
            max_messages_per_subject: config.max_msgs_per_subject.unwrap_or(-1),
            duplicate_window: config
                .duplicate_window_ms
                .map(|ms| Duration::from_millis(ms as u64))
                .unwrap_or_default(),
            ..Default::default()
        };
        self.jetstream
            .get_or_create_stream(nats_config)
            .await
            .map_err(|e| BrokerError::Other(e.to_string()))?;
        Ok(())
    }

    async fn consumer_info(&self, stream_name: &str, durable: &str) -> Result<Option<ConsumerInfo>, BrokerError> {
        let stream = match self.jetstream.get_stream(stream_name).await {
            Ok(s) => s,
            Err(_) => return Ok(None),
        };
        let mut consumer = match stream.get_consumer::<pull::Config>(durable).await {
            Ok(c) => c,
            Err(_) => return Ok(None),
        };
        let info = consumer.info().await.map_err(|e| BrokerError::Other(e.to_string()))?;
        Ok(Some(ConsumerInfo {
            durable_name: durable.to_string(),
            config: ConsumerConfig {
                durable_name: durable.to_string(),
                filter_subject: info.config.filter_subject.clone(),
                ack_policy: match info.config.ack_policy {
                    jetstream::consumer::AckPolicy::None => AckPolicy::None,
                    jetstream::consumer::AckPolicy::All => AckPolicy::All,
                    jetstream::consumer::AckPolicy::Explicit => AckPolicy::Explicit,
                },
                deliver_policy: match info.config.deliver_policy {
                    jetstream::consumer::DeliverPolicy::All => DeliverPolicy::All,
                    _ => DeliverPolicy::New,
                },
                max_deliver: info.config.max_deliver,
                ack_wait_ms: info.config.ack_wait.as_millis() as i64,
                backoff_ms: info.config.backoff.iter().map(|d| d.as_millis() as i64).collect(),
            },
        }))
    }

    async fn add_consumer(&self, stream_name: &str, config: &ConsumerConfig) -> Result<(), BrokerError> {
        let stream = self
            .jetstream
            .get_stream(stream_name)
            .await
            .map_err(|e| BrokerError::NotFound(e.to_string()))?;
        let nats_config = pull::Config {
            durable_name: Some(config.durable_name.clone()),
            filter_subject: config.filter_subject.clone(),
            ack_policy: match config.ack_policy {
                AckPolicy::None => jetstream::consumer::AckPolicy::None,
                AckPolicy::All => jetstream::consumer::AckPolicy::All,
                AckPolicy::Explicit => jetstream::consumer::AckPolicy::Explicit,
            },
            deliver_policy: match config.deliver_policy {
                DeliverPolicy::All => jetstream::consumer::DeliverPolicy::All,
                DeliverPolicy::New => jetstream::consumer::DeliverPolicy::New,
            },
            max_deliver: config.max_deliver,
            ack_wait: Duration::from_millis(config.ack_wait_ms as u64),
            backoff: config.backoff_ms.iter().map(|ms| Duration::from_millis(*ms as u64)).collect(),
            ..Default::default()
        };
        stream.create_consumer(nats_config).await.map_err(|e| BrokerError::Other(e.to_string()))?;
        Ok(())
    }

    async fn delete_consumer(&self, stream_name: &str, durable: &str) -> Result<(), BrokerError> {
        let stream = self
            .jetstream
            .get_stream(stream_name)
            .await
            .map_err(|e| BrokerError::NotFound(e.to_string()))?;
        stream.delete_consumer(durable).await.map_err(|e| BrokerError::Other(e.to_string()))?;
        Ok(())
    }
}

struct NatsPullSubscription {
    consumer: jetstream::consumer::Consumer<pull::Config>,
}

#[async_trait]
impl PullSubscription for NatsPullSubscription {
    async fn fetch(&self, batch: usize, timeout: Duration) -> Result<Vec<Box<dyn BrokerMessage>>, BrokerError> {
        let mut batch_stream = self
            .consumer
            .fetch()
            .max_messages(batch)
            .expires(timeout)
            .messages()
            .await
            .map_err(|e| BrokerError::Other(e.to_string()))?;

        let mut out = Vec::with_capacity(batch);
        while let Some(message) = batch_stream.next().await {
            let message = message.map_err(|e| BrokerError::Other(e.to_string()))?;
            let info = message.info().map_err(|e| BrokerError::Other(e.to_string()))?;
            let headers = message
                .headers
                .as_ref()
                .map(|h| {
                    h.iter()
                        .map(|(name, values)| (name.to_string(), values.iter().next().map(|v| v.to_string()).unwrap_or_default()))
                        .collect::<HashMap<_, _>>()
                })
                .unwrap_or_default();
            out.push(Box::new(NatsMessage {
                subject: message.subject.to_string(),
                payload: message.payload.to_vec(),
                headers,
                stream: info.stream.to_string(),
                stream_seq: info.stream_sequence,
                delivery_count: info.delivered,
                message,
            }) as Box<dyn BrokerMessage>);
        }
        Ok(out)
    }
}

struct NatsMessage {
    subject: String,
    payload: Vec<u8>,
    headers: Headers,
    stream: String,
    stream_seq: u64,
    delivery_count: u64,
    message: jetstream::Message,
}

#[async_trait]
impl BrokerMessage for NatsMessage {
    fn subject(&self) -> &str {
        &self.subject
    }

    fn payload(&self) -> &[u8] {
        &self.payload
    }

    fn headers(&self) -> &Headers {
        &self.headers
    }

    fn stream(&self) -> &str {
        &self.stream
    }

    fn stream_seq(&self) -> u64 {
        self.stream_seq
    }

    fn delivery_count(&self) -> u64 {
        self.delivery_count
    }

    async fn ack(&self) -> Result<(), BrokerError> {
        self.message.ack().await.map_err(|e| BrokerError::Other(e.to_string()))
    }

    async fn nak(&self, delay: Duration) -> Result<(), BrokerError> {
        self.message
            .ack_with(jetstream::AckKind::Nak(Some(delay)))
            .await
            .map_err(|e| BrokerError::Other(e.to_string()))
    }

    async fn term(&self) -> Result<(), BrokerError> {
        self.message
            .ack_with(jetstream::AckKind::Term)
            .await
            .map_err(|e| BrokerError::Other(e.to_string()))
    }
}
