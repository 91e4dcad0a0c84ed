use chrono::{DateTime, Utc};
use relay_envelope::Envelope;
use uuid::Uuid;

/// Immutable value passed to every subscriber invocation (§6).
#[derive(Debug, Clone)]
pub struct MessageContext {
    pub event_id: Uuid,
    pub subject: String,
    pub topic: Option<String>,
    pub trace_id: Option<String>,
    pub correlation_id: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub deliveries: u64,
    pub stream: String,
    pub stream_seq: u64,
    pub producer: String,
    pub domain: Option<String>,
    pub resource: Option<String>,
    pub action: Option<String>,
}

impl MessageContext {
    pub fn from_envelope(envelope: &Envelope, subject: &str, deliveries: u64, stream: &str, stream_seq: u64) -> Self {
        Self {
            event_id: envelope.event_id,
            subject: subject.to_string(),
            topic: envelope.topic.clone(),
            trace_id: envelope.trace_id.clone(),
            correlation_id: envelope.trace_id.clone(),
            occurred_at: envelope.occurred_at,
            deliveries,
            stream: stream.to_string(),
            stream_seq,
            producer: envelope.producer.clone(),
            domain: envelope.domain.clone(),
            resource: envelope.resource.clone(),
            action: envelope.action.clone(),
        }
    }
}
