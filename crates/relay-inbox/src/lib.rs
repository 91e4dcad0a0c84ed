//! Dedup-then-invoke inbox processing (§4.C): at most one subscriber
//! invocation per logical event, re-deliveries observed as already
//! `processed` short-circuit without calling the handler again.

use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

use relay_store::{InboxKey, InboxStatus, InboxStore, StoreError};

mod metrics;
pub use metrics::InboxMetrics;

/// `event_id` when the envelope decoded cleanly; the `(stream, stream_seq)`
/// broker-delivery-metadata pair otherwise.
pub fn key_for(event_id: Option<Uuid>, stream: &str, stream_seq: i64) -> InboxKey {
    match event_id {
        Some(id) => InboxKey::EventId(id),
        None => InboxKey::StreamSeq(stream.to_string(), stream_seq),
    }
}

#[derive(Debug, Clone)]
pub enum Outcome {
    /// The handler ran and succeeded; caller should ack the broker message.
    Processed,
    /// A prior delivery already completed this key; caller should ack
    /// without invoking the handler again.
    AlreadyProcessed,
    /// The handler returned an error; caller propagates it to the
    /// retry/DLQ layer. The row is left `status = failed`.
    Failed(String),
}

/// Wraps subscriber invocation with the find-or-create / dedup-check /
/// mark-processing / invoke / mark-terminal sequence. Does not itself talk
/// to the broker — the router acks/naks/terms based on the returned
/// [`Outcome`].
pub struct InboxProcessor<S: InboxStore> {
    store: Arc<S>,
    metrics: Option<Arc<InboxMetrics>>,
}

impl<S: InboxStore> InboxProcessor<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store, metrics: None }
    }

    pub fn with_metrics(mut self, metrics: Arc<InboxMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub async fn process_if_new<F, Fut>(&self, key: InboxKey, subject: &str, deliveries: i32, handler: F) -> Result<Outcome, StoreError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), String>>,
    {
        let (row, _created) = self.store.find_or_create(key.clone(), subject).await?;
        if row.status == InboxStatus::Processed {
            if let Some(metrics) = &self.metrics {
                metrics.duplicate_total.inc();
            }
            return Ok(Outcome::AlreadyProcessed);
        }

        self.store.mark_processing(&key, deliveries).await?;

        match handler().await {
            Ok(()) => {
                // A redelivery racing us to this point will observe
                // `processed` on its own find_or_create and short-circuit;
                // an ack failure after this point self-heals the same way.
                self.store.mark_processed(&key).await?;
                if let Some(metrics) = &self.metrics {
                    metrics.processed_total.inc();
                }
                Ok(Outcome::Processed)
            }
            Err(e) => {
                self.store.mark_failed(&key, &e).await?;
                Ok(Outcome::Failed(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_store::InMemoryInboxStore;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn second_delivery_of_a_processed_event_short_circuits() {
        let processor = InboxProcessor::new(Arc::new(InMemoryInboxStore::default()));
        let key = InboxKey::EventId(Uuid::new_v4());
        let calls = Arc::new(AtomicU32::new(0));

        let c = calls.clone();
        let first = processor
            .process_if_new(key.clone(), "test.shop.order.created", 1, || async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap();
        assert!(matches!(first, Outcome::Processed));

        let c = calls.clone();
        let second = processor
            .process_if_new(key, "test.shop.order.created", 2, || async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap();
        assert!(matches!(second, Outcome::AlreadyProcessed));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn handler_failure_leaves_the_row_failed_and_propagates() {
        let processor = InboxProcessor::new(Arc::new(InMemoryInboxStore::default()));
        let key = InboxKey::EventId(Uuid::new_v4());

        let outcome = processor
            .process_if_new(key, "test.shop.order.created", 1, || async move { Err("boom".to_string()) })
            .await
            .unwrap();
        assert!(matches!(outcome, Outcome::Failed(ref msg) if msg == "boom"));
    }

    #[tokio::test]
    async fn falls_back_to_stream_sequence_when_event_id_is_absent() {
        let key = key_for(None, "dev_app", 42);
        assert_eq!(key, InboxKey::StreamSeq("dev_app".to_string(), 42));
    }
}
