use std::time::{Duration, Instant};

use futures::future::join_all;
use relay_broker::Broker;
use relay_envelope::{build_topic_envelope, Envelope, EnvelopeOpts, Subject, SubjectError};
use relay_store::OutboxStore;

use crate::publisher::{OutboxPublisher, PublishResult};

/// One item of a batch publish: a topic-form tuple, matching the per-item
/// shape the batch API accepts.
pub struct BatchItem {
    pub topic: String,
    pub message: serde_json::Value,
    pub opts: EnvelopeOpts,
}

pub struct BatchItemResult {
    pub topic: String,
    pub result: Result<PublishResult, SubjectError>,
}

pub struct BatchResult {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub per_item: Vec<BatchItemResult>,
    pub duration: Duration,
}

/// Fans out to per-item publishes concurrently and reports partial failure
/// rather than raising it.
pub async fn publish_batch<S: OutboxStore, B: Broker>(
    publisher: &OutboxPublisher<S, B>,
    env: &str,
    app: &str,
    producer: &str,
    items: Vec<BatchItem>,
) -> BatchResult {
    let started = Instant::now();
    let total = items.len();

    let futures = items.into_iter().map(|item| async move {
        let subject = match Subject::from_topic(env, app, &item.topic) {
            Ok(s) => s,
            Err(e) => return BatchItemResult { topic: item.topic, result: Err(e) },
        };
        let envelope: Envelope = build_topic_envelope(producer, item.topic.clone(), item.message, item.opts);
        let result = publisher.publish(&subject, &envelope).await;
        BatchItemResult { topic: item.topic, result: Ok(result) }
    });

    let per_item: Vec<BatchItemResult> = join_all(futures).await;

    let succeeded = per_item
        .iter()
        .filter(|r| matches!(&r.result, Ok(PublishResult::Success { .. })))
        .count();
    let failed = total - succeeded;

    BatchResult { total, succeeded, failed, per_item, duration: started.elapsed() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_broker::FakeBroker;
    use relay_store::InMemoryOutboxStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn batch_reports_partial_failure_without_raising() {
        let publisher = OutboxPublisher::new(
            Arc::new(InMemoryOutboxStore::default()),
            Arc::new(FakeBroker::new()),
            crate::publisher::OutboxPublisherConfig::default(),
        );

        let items = vec![
            BatchItem { topic: "order.created".into(), message: serde_json::json!({}), opts: EnvelopeOpts::default() },
            BatchItem { topic: "order.shipped".into(), message: serde_json::json!({}), opts: EnvelopeOpts::default() },
        ];

        let result = publish_batch(&publisher, "test", "shop", "shop", items).await;
        assert_eq!(result.total, 2);
        assert_eq!(result.succeeded, 2);
        assert_eq!(result.failed, 0);
    }
}
