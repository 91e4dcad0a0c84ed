use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

use relay_store::OutboxStore;

use crate::metrics::OutboxMetrics;

#[derive(Debug, Clone, Copy, Default)]
pub struct SweepReport {
    pub reset_count: usize,
}

/// Resets rows stuck in `publishing` past the staleness window back to
/// `pending`, so the next publish attempt bumps `attempts` instead of the
/// row sitting in limbo forever (§4.B "Recovery").
pub struct RecoverySweep<S: OutboxStore> {
    store: Arc<S>,
    staleness_window: Duration,
    metrics: Option<Arc<OutboxMetrics>>,
}

impl<S: OutboxStore> RecoverySweep<S> {
    pub fn new(store: Arc<S>, staleness_window: Duration) -> Self {
        Self { store, staleness_window, metrics: None }
    }

    pub fn with_metrics(mut self, metrics: Arc<OutboxMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// One foreground pass, used by the `outbox sweep` CLI subcommand. Also
    /// the place the pending gauges get refreshed, since this is the only
    /// code path that already polls the store on a fixed interval.
    pub async fn run_once(&self) -> Result<SweepReport, relay_store::StoreError> {
        let stale = self.store.find_stale_publishing(self.staleness_window).await?;
        for row in &stale {
            self.store.reset_to_pending(row.event_id).await?;
        }
        if !stale.is_empty() {
            warn!(count = stale.len(), "reset stale publishing rows back to pending");
        }

        if let Some(metrics) = &self.metrics {
            if let Ok(counts) = self.store.counts_by_status().await {
                metrics.pending.set(*counts.get("pending").unwrap_or(&0));
            }
            if let Ok(Some(age)) = self.store.oldest_pending_age_seconds().await {
                metrics.oldest_pending_age_seconds.set(age);
            } else {
                metrics.oldest_pending_age_seconds.set(0);
            }
        }

        Ok(SweepReport { reset_count: stale.len() })
    }

    /// Background task form: sweeps on `interval` until `shutdown` fires.
    pub async fn run(self: Arc<Self>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = interval.as_secs(), "recovery sweep starting");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    if let Err(e) = self.run_once().await {
                        warn!(error = %e, "recovery sweep pass failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("recovery sweep stopping");
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_store::InMemoryOutboxStore;

    #[tokio::test]
    async fn sweep_resets_nothing_when_no_rows_are_stale() {
        let sweep = RecoverySweep::new(Arc::new(InMemoryOutboxStore::default()), Duration::from_secs(300));
        let report = sweep.run_once().await.unwrap();
        assert_eq!(report.reset_count, 0);
    }
}
