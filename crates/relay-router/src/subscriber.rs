use std::sync::Arc;

use async_trait::async_trait;
use relay_envelope::Envelope;
use relay_retry::Classification;

use crate::context::MessageContext;

/// An error a subscriber raises from `handle`, pre-classified into one of
/// the three buckets the default policy understands (§4.F).
#[derive(Debug, Clone)]
pub enum SubscriberError {
    Malformed(String),
    Unrecoverable(String),
    Transient(String),
}

impl SubscriberError {
    pub fn classification(&self) -> Classification {
        match self {
            SubscriberError::Malformed(_) => Classification::Malformed,
            SubscriberError::Unrecoverable(_) => Classification::Unrecoverable,
            SubscriberError::Transient(_) => Classification::Transient,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            SubscriberError::Malformed(m) | SubscriberError::Unrecoverable(m) | SubscriberError::Transient(m) => m,
        }
    }
}

#[async_trait]
pub trait Subscriber: Send + Sync {
    fn name(&self) -> &str;

    async fn handle(&self, envelope: &Envelope, ctx: &MessageContext) -> Result<(), SubscriberError>;

    /// Optional per-subscriber override of the default classification→decision
    /// policy. A return of `None` defers to `relay_retry::classify`.
    fn error_policy(&self, _error: &SubscriberError, _ctx: &relay_retry::ErrorContext) -> Option<relay_retry::Decision> {
        None
    }
}

pub type SubscriberHandle = Arc<dyn Subscriber>;

/// A declared subscription: which subscribers listen on which pattern, and
/// the per-subscriber consumer overrides the topology manager uses to build
/// the durable's desired config.
#[derive(Clone)]
pub struct SubscriberRegistration {
    pub pattern: String,
    pub subscribers: Vec<SubscriberHandle>,
    pub max_deliver: i64,
    pub ack_wait_ms: i64,
    pub backoff_ms: Vec<i64>,
    pub batch_size: usize,
}
