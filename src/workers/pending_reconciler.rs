use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::WorkerConfig;
use crate::database::{LedgerStore, TransactionStatus};
use crate::services::purchase::{PurchaseService, PURCHASE_KINDS};

/// Provider requeries in flight at once during a cycle.
const REQUERY_CONCURRENCY: usize = 4;

#[derive(Debug, Clone)]
pub struct PendingReconcilerConfig {
    /// How often the worker wakes up.
    pub poll_interval: Duration,
    /// Purchases younger than this are left alone; the provider may still answer.
    pub grace_period: Duration,
    pub batch_size: i64,
}

impl Default for PendingReconcilerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            grace_period: Duration::from_secs(300),
            batch_size: 50,
        }
    }
}

impl From<&WorkerConfig> for PendingReconcilerConfig {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            poll_interval: Duration::from_secs(config.pending_reconciler_interval),
            grace_period: Duration::from_secs(config.pending_grace_period),
            batch_size: config.pending_batch_size,
        }
    }
}

/// Counts from one pass, for logs and tests.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub examined: usize,
    pub settled: usize,
    pub still_pending: usize,
    pub errors: usize,
}

/// Re-queries providers for purchases stuck in `pending` and settles the
/// ones that now have a definite answer.
pub struct PendingReconcilerWorker {
    ledger: Arc<dyn LedgerStore>,
    purchases: Arc<PurchaseService>,
    config: PendingReconcilerConfig,
}

impl PendingReconcilerWorker {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        purchases: Arc<PurchaseService>,
        config: PendingReconcilerConfig,
    ) -> Self {
        Self {
            ledger,
            purchases,
            config,
        }
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            grace_period_secs = self.config.grace_period.as_secs(),
            batch_size = self.config.batch_size,
            "pending reconciler worker started"
        );

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("pending reconciler worker stopping");
                        break;
                    }
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {
                    let report = self.run_cycle().await;
                    if report.examined > 0 {
                        info!(
                            examined = report.examined,
                            settled = report.settled,
                            still_pending = report.still_pending,
                            errors = report.errors,
                            "pending reconciliation cycle complete"
                        );
                    }
                }
            }
        }

        info!("pending reconciler worker stopped");
    }

    pub async fn run_cycle(&self) -> CycleReport {
        let mut report = CycleReport::default();
        let grace = chrono::Duration::from_std(self.config.grace_period)
            .unwrap_or_else(|_| chrono::Duration::minutes(5));
        let older_than = Utc::now() - grace;

        let stale = match self
            .ledger
            .find_stale_pending(&PURCHASE_KINDS, older_than, self.config.batch_size)
            .await
        {
            Ok(stale) => stale,
            Err(e) => {
                warn!(error = %e, "could not list pending purchases");
                report.errors += 1;
                return report;
            }
        };

        report.examined = stale.len();
        let outcomes: Vec<_> = stream::iter(stale)
            .map(|tx| async move {
                let outcome = self.purchases.requery(&tx.reference).await;
                (tx.reference, outcome)
            })
            .buffer_unordered(REQUERY_CONCURRENCY)
            .collect()
            .await;

        for (reference, outcome) in outcomes {
            match outcome {
                Ok(updated) if updated.status == TransactionStatus::Pending => {
                    report.still_pending += 1;
                }
                Ok(updated) => {
                    info!(reference = %reference, status = %updated.status, "stale purchase settled");
                    report.settled += 1;
                }
                Err(e) => {
                    error!(reference = %reference, error = %e, "requery failed");
                    report.errors += 1;
                }
            }
        }

        report
    }
}
