//! Store-then-emit outbox publisher (§4.B): persist pre-state, emit to the
//! broker under a connection-level circuit breaker, persist post-state.

mod backoff;
mod batch;
mod metrics;
mod publisher;
mod sweep;

pub use batch::{BatchItem, BatchItemResult, BatchResult};
pub use metrics::OutboxMetrics;
pub use publisher::{FailureReason, OutboxPublisher, OutboxPublisherConfig, PublishResult};
pub use sweep::{RecoverySweep, SweepReport};
