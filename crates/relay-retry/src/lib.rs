//! Error classification, backoff, circuit breaking and DLQ envelopes (§4.F).
//!
//! A handler failure is classified into one of three buckets — malformed,
//! unrecoverable, transient — which the router maps to a disposition:
//! discard, DLQ, or retry. The circuit breaker is a separate, connection-
//! level mechanism: it protects the broker connection the outbox publisher
//! holds, and has no say over per-message disposition.

mod backoff;
mod circuit_breaker;
mod classify;
mod dlq;

pub use backoff::backoff_for_attempt;
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState};
pub use classify::{classify, Classification, Decision, ErrorContext};
pub use dlq::{DlqEnvelope, DlqError};
