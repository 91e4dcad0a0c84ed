use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::SCHEMA_VERSION;

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("envelope must carry either a topic+message pair or a domain/resource/action+payload triple")]
    Ambiguous,
    #[error("topic envelope is missing its message payload")]
    MissingMessage,
    #[error("event envelope is missing its payload")]
    MissingPayload,
}

/// Options accepted by the envelope builders. All fields are optional;
/// unset ones are filled in with generated defaults (see [`build_topic_envelope`]).
#[derive(Debug, Clone, Default)]
pub struct EnvelopeOpts {
    pub event_id: Option<Uuid>,
    pub trace_id: Option<String>,
    pub occurred_at: Option<DateTime<Utc>>,
    pub message_type: Option<String>,
}

/// Canonical wire/storage envelope. Both the topic form and the legacy
/// domain/resource/action form are modeled as optional fields on one struct
/// rather than as a Rust enum, because the wire format tolerates unknown keys
/// and a caller inspecting JSON off the broker should not need to know which
/// variant produced it. [`Envelope::validate`] rejects the case where neither
/// form is populated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub event_id: Uuid,
    pub schema_version: u32,
    pub producer: String,
    pub occurred_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_type: Option<String>,
}

impl Envelope {
    /// True when this envelope carries the topic/message shape.
    pub fn is_topic_form(&self) -> bool {
        self.topic.is_some()
    }

    /// True when this envelope carries the legacy domain/resource/action shape.
    pub fn is_event_form(&self) -> bool {
        self.domain.is_some() || self.resource.is_some() || self.action.is_some()
    }

    pub fn validate(&self) -> Result<(), EnvelopeError> {
        match (self.is_topic_form(), self.is_event_form()) {
            (false, false) => Err(EnvelopeError::Ambiguous),
            (true, _) if self.message.is_none() => Err(EnvelopeError::MissingMessage),
            (_, true) if self.payload.is_none() => Err(EnvelopeError::MissingPayload),
            _ => Ok(()),
        }
    }
}

fn resolve_common(opts: &EnvelopeOpts, producer: impl Into<String>) -> (Uuid, DateTime<Utc>, String, Option<String>) {
    let event_id = opts.event_id.unwrap_or_else(Uuid::new_v4);
    let occurred_at = opts.occurred_at.unwrap_or_else(Utc::now);
    let trace_id = opts
        .trace_id
        .clone()
        .or_else(|| Some(Uuid::new_v4().to_string()));
    (event_id, occurred_at, producer.into(), trace_id)
}

/// Build a topic-form envelope. `event_id` and `trace_id` are generated when
/// not supplied via `opts`; `occurred_at` defaults to now (UTC).
pub fn build_topic_envelope(
    producer: impl Into<String>,
    topic: impl Into<String>,
    message: serde_json::Value,
    opts: EnvelopeOpts,
) -> Envelope {
    let message_type = opts.message_type.clone();
    let (event_id, occurred_at, producer, trace_id) = resolve_common(&opts, producer);
    Envelope {
        event_id,
        schema_version: SCHEMA_VERSION,
        producer,
        occurred_at,
        trace_id,
        topic: Some(topic.into()),
        message: Some(message),
        domain: None,
        resource: None,
        action: None,
        payload: None,
        message_type,
    }
}

/// Build a legacy-form envelope (domain/resource/action).
pub fn build_event_envelope(
    producer: impl Into<String>,
    domain: impl Into<String>,
    resource: impl Into<String>,
    action: impl Into<String>,
    payload: serde_json::Value,
    opts: EnvelopeOpts,
) -> Envelope {
    let message_type = opts.message_type.clone();
    let (event_id, occurred_at, producer, trace_id) = resolve_common(&opts, producer);
    Envelope {
        event_id,
        schema_version: SCHEMA_VERSION,
        producer,
        occurred_at,
        trace_id,
        topic: None,
        message: None,
        domain: Some(domain.into()),
        resource: Some(resource.into()),
        action: Some(action.into()),
        payload: Some(payload),
        message_type,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_envelope_generates_id_and_trace() {
        let env = build_topic_envelope(
            "shop",
            "order.created",
            serde_json::json!({"order_id": "1"}),
            EnvelopeOpts::default(),
        );
        assert_eq!(env.schema_version, SCHEMA_VERSION);
        assert_eq!(env.topic.as_deref(), Some("order.created"));
        assert!(env.trace_id.is_some());
        assert!(env.validate().is_ok());
    }

    #[test]
    fn event_envelope_requires_payload() {
        let mut env = build_event_envelope(
            "shop",
            "order",
            "order",
            "created",
            serde_json::json!({}),
            EnvelopeOpts::default(),
        );
        assert!(env.validate().is_ok());
        env.payload = None;
        assert!(matches!(env.validate(), Err(EnvelopeError::MissingPayload)));
    }

    #[test]
    fn bare_envelope_is_ambiguous() {
        let env = Envelope {
            event_id: Uuid::new_v4(),
            schema_version: SCHEMA_VERSION,
            producer: "shop".into(),
            occurred_at: Utc::now(),
            trace_id: None,
            topic: None,
            message: None,
            domain: None,
            resource: None,
            action: None,
            payload: None,
            message_type: None,
        };
        assert!(matches!(env.validate(), Err(EnvelopeError::Ambiguous)));
    }

    #[test]
    fn explicit_event_id_is_honored() {
        let id = Uuid::new_v4();
        let env = build_topic_envelope(
            "shop",
            "order.created",
            serde_json::json!({}),
            EnvelopeOpts {
                event_id: Some(id),
                ..Default::default()
            },
        );
        assert_eq!(env.event_id, id);
    }
}
