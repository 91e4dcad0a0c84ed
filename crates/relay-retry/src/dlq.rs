use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::classify::Classification;

/// Error annotation carried alongside a dead-lettered message. The original
/// payload is carried unredacted; callers that need redaction apply their
/// own hook before this crosses a trust boundary, this type does not
/// attempt it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqError {
    pub classification: String,
    pub message: String,
    pub attempt_number: u64,
    pub classified_at: DateTime<Utc>,
}

impl DlqError {
    pub fn new(classification: Classification, message: impl Into<String>, attempt_number: u64) -> Self {
        let classification = match classification {
            Classification::Malformed => "malformed",
            Classification::Unrecoverable => "unrecoverable",
            Classification::Transient => "transient",
        };
        Self { classification: classification.to_string(), message: message.into(), attempt_number, classified_at: Utc::now() }
    }
}

/// What gets published to the DLQ subject: the original subject, payload
/// and headers, plus the error annotation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqEnvelope {
    pub original_subject: String,
    pub payload: serde_json::Value,
    pub headers: HashMap<String, String>,
    pub error: DlqError,
}
