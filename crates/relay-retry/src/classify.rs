/// The three failure buckets a handler error is sorted into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Decode errors, schema violations. Acked and dropped.
    Malformed,
    /// Programmer errors: bad argument/type/name. Terminated and sent to the DLQ.
    Unrecoverable,
    /// Timeouts, IO, broker IO. Nak'd with the next backoff step.
    Transient,
}

/// What the router should do with the current delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Retry,
    Discard,
    Dlq,
}

/// Carries everything a subscriber's `error_policy` hook needs to decide a
/// disposition (§4.F): the classified error text, the raw broker payload,
/// the decoded envelope, and attempt accounting. `context` is the decoded
/// [`relay_envelope::Envelope`] rather than the router's richer
/// `MessageContext` — this crate sits below `relay-router` in the
/// dependency graph and cannot depend back on it.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub error: String,
    pub message: Vec<u8>,
    pub context: relay_envelope::Envelope,
    pub subject: String,
    pub attempt_number: u64,
    pub max_attempts: u64,
}

/// Default classification policy (§4.F). A subscriber's own error-policy
/// hook may override this per `ErrorContext`; a hook return value outside
/// `{Retry, Discard, Dlq}` is logged and replaced by this function's result.
pub fn classify(classification: Classification, ctx: &ErrorContext) -> Decision {
    match classification {
        Classification::Malformed => Decision::Discard,
        Classification::Unrecoverable => Decision::Dlq,
        Classification::Transient => {
            if ctx.attempt_number >= ctx.max_attempts {
                Decision::Dlq
            } else {
                Decision::Retry
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(attempt: u64, max: u64) -> ErrorContext {
        let context = relay_envelope::build_topic_envelope(
            "test",
            "orders.created",
            serde_json::json!({}),
            relay_envelope::EnvelopeOpts::default(),
        );
        ErrorContext {
            error: "boom".into(),
            message: Vec::new(),
            context,
            subject: "dev.app.orders.created".into(),
            attempt_number: attempt,
            max_attempts: max,
        }
    }

    #[test]
    fn malformed_is_always_discarded() {
        assert_eq!(classify(Classification::Malformed, &ctx(1, 5)), Decision::Discard);
        assert_eq!(classify(Classification::Malformed, &ctx(5, 5)), Decision::Discard);
    }

    #[test]
    fn unrecoverable_is_always_dlq() {
        assert_eq!(classify(Classification::Unrecoverable, &ctx(1, 5)), Decision::Dlq);
    }

    #[test]
    fn transient_retries_until_attempt_cap_then_dlq() {
        assert_eq!(classify(Classification::Transient, &ctx(1, 3)), Decision::Retry);
        assert_eq!(classify(Classification::Transient, &ctx(2, 3)), Decision::Retry);
        assert_eq!(classify(Classification::Transient, &ctx(3, 3)), Decision::Dlq);
        assert_eq!(classify(Classification::Transient, &ctx(4, 3)), Decision::Dlq);
    }
}
