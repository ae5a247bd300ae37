//! Periodic subscription expiry.

use chrono::Utc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::credits::{LedgerManager, SweepReport};
use crate::error::Result;

/// Default pause between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

/// Runs [`LedgerManager::sweep_expired`] on a fixed interval.
pub struct ExpirySweeper {
    ledger: LedgerManager,
    interval: Duration,
}

impl ExpirySweeper {
    #[must_use]
    pub fn new(ledger: LedgerManager, interval: Duration) -> Self {
        Self {
            ledger,
            interval: interval.max(Duration::from_secs(1)),
        }
    }

    /// Run a single sweep now.
    pub async fn run_once(&self) -> Result<SweepReport> {
        self.ledger.sweep_expired(Utc::now()).await
    }

    /// Start sweeping on a background task. The first sweep runs immediately.
    #[must_use]
    pub fn spawn(self) -> SweeperHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let task = tokio::spawn(async move {
            self.start(shutdown_rx).await;
        });
        SweeperHandle { shutdown_tx, task }
    }

    async fn start(self, mut shutdown_rx: mpsc::Receiver<()>) {
        tracing::info!(interval_secs = self.interval.as_secs(), "Expiry sweeper started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Shutdown signal received, stopping expiry sweeper");
                    break;
                }
                _ = ticker.tick() => {
                    match self.run_once().await {
                        Ok(report) => {
                            tracing::debug!(
                                scanned = report.scanned,
                                expired = report.expired,
                                "Expiry sweep complete"
                            );
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Expiry sweep failed");
                        }
                    }
                }
            }
        }

        tracing::info!("Expiry sweeper stopped");
    }
}

/// Handle to a running sweeper.
pub struct SweeperHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop the sweeper and wait for an in-progress sweep to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Expiry sweeper task ended abnormally");
        }
    }
}
