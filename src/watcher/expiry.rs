use std::time::Duration;

use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::invoice::store::SharedInvoiceStore;

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Periodically expires PENDING invoices whose deadline has passed.
#[derive(Clone)]
pub struct ExpirySweeper {
    store: SharedInvoiceStore,
    interval: Duration,
}

impl ExpirySweeper {
    pub fn new(store: SharedInvoiceStore, interval: Duration) -> Self {
        Self { store, interval }
    }

    pub fn sweep_once(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut store = self.store.lock().expect("store mutex poisoned");
        store.expire_overdue(now).context("expire overdue invoices")
    }

    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match tokio::task::spawn_blocking({
                let sweeper = self.clone();
                move || sweeper.sweep_once(Utc::now())
            })
            .await
            {
                Ok(Ok(0)) => {}
                Ok(Ok(expired)) => {
                    tracing::info!(expired, "expired overdue invoices");
                }
                Ok(Err(err)) => {
                    tracing::warn!(error = %format!("{err:#}"), "expiry sweep failed");
                }
                Err(err) => {
                    tracing::warn!(error = %err, "expiry sweep join error");
                }
            }
        }

        tracing::info!("expiry sweeper stopped");
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }
}
