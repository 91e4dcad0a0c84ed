//! The broker contract (§6) and a concrete async NATS JetStream client.
//!
//! The spec names the broker an external collaborator the system merely
//! assumes: durable streams, pull consumers, ack/nak/term, and a
//! message-id-based dedup window. This crate makes that collaborator
//! concrete behind a small trait so the outbox, inbox, topology manager and
//! router never touch `async_nats` directly.

mod config;
mod error;
mod fake;
mod nats_broker;

pub use config::{AckPolicy, ConsumerConfig, ConsumerInfo, DeliverPolicy, RetentionPolicy, StorageType, StreamConfig};
pub use error::BrokerError;
pub use fake::FakeBroker;
pub use nats_broker::NatsBroker;

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

pub type Headers = HashMap<String, String>;

#[derive(Debug, Clone)]
pub struct BrokerAck {
    pub duplicate: bool,
}

/// A single fetched message. Implementations own their own ack/nak/term
/// wiring (e.g. the NATS implementation calls through to the underlying
/// `async_nats::jetstream::Message`).
#[async_trait]
pub trait BrokerMessage: Send + Sync {
    fn subject(&self) -> &str;
    fn payload(&self) -> &[u8];
    fn headers(&self) -> &Headers;
    fn stream(&self) -> &str;
    fn stream_seq(&self) -> u64;
    /// The broker's delivery count for this message; 1 on first delivery.
    fn delivery_count(&self) -> u64;

    async fn ack(&self) -> Result<(), BrokerError>;
    async fn nak(&self, delay: Duration) -> Result<(), BrokerError>;
    async fn term(&self) -> Result<(), BrokerError>;
}

#[async_trait]
pub trait PullSubscription: Send + Sync {
    async fn fetch(&self, batch: usize, timeout: Duration) -> Result<Vec<Box<dyn BrokerMessage>>, BrokerError>;
}

#[async_trait]
pub trait Broker: Send + Sync {
    async fn publish(&self, subject: &str, payload: Vec<u8>, headers: Headers) -> Result<BrokerAck, BrokerError>;

    async fn pull_subscribe(
        &self,
        filter_subject: &str,
        durable: &str,
        stream: &str,
    ) -> Result<Box<dyn PullSubscription>, BrokerError>;
}

#[async_trait]
pub trait BrokerAdmin: Send + Sync {
    async fn ensure_stream(&self, config: &StreamConfig) -> Result<(), BrokerError>;
    async fn consumer_info(&self, stream: &str, durable: &str) -> Result<Option<ConsumerInfo>, BrokerError>;
    async fn add_consumer(&self, stream: &str, config: &ConsumerConfig) -> Result<(), BrokerError>;
    async fn delete_consumer(&self, stream: &str, durable: &str) -> Result<(), BrokerError>;
}
