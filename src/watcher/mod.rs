//! Checkpointed log scanner for the invoice manager contract.
//!
//! Each tick scans at most `max_block_range` blocks ending no later than
//! `head - reorg_margin`, applies every decodable event, and only then advances the
//! persisted checkpoint. A crash mid-batch re-scans the same range on the next run.

pub mod expiry;
pub mod handlers;

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use anyhow::{Context as _, Result};
use alloy::rpc::types::Log;
use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::ethereum::ChainClient;
use crate::ethereum::contract::{ContractEvent, invoice_events_filter};
use crate::invoice::store::SharedInvoiceStore;

pub const DEFAULT_REORG_MARGIN: u64 = 2;
pub const DEFAULT_MAX_BLOCK_RANGE: u64 = 1000;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct WatcherConfig {
    pub contract_address: Address,
    pub poll_interval: Duration,
    pub reorg_margin: u64,
    /// Upper bound on blocks per `eth_getLogs` request.
    pub max_block_range: u64,
}

impl WatcherConfig {
    pub fn new(contract_address: Address) -> Self {
        Self {
            contract_address,
            poll_interval: DEFAULT_POLL_INTERVAL,
            reorg_margin: DEFAULT_REORG_MARGIN,
            max_block_range: DEFAULT_MAX_BLOCK_RANGE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    UpToDate {
        last_processed_block: u64,
        safe_head: u64,
    },
    Scanned {
        from_block: u64,
        to_block: u64,
        logs: usize,
        applied: usize,
        skipped: usize,
    },
}

pub struct ChainWatcher<C> {
    cfg: WatcherConfig,
    client: Arc<C>,
    store: SharedInvoiceStore,
}

impl<C> ChainWatcher<C>
where
    C: ChainClient + 'static,
{
    pub fn new(cfg: WatcherConfig, client: Arc<C>, store: SharedInvoiceStore) -> Self {
        Self { cfg, client, store }
    }

    /// Runs one tick. Errors leave the checkpoint where it was.
    pub async fn scan_once(&self) -> Result<ScanOutcome> {
        let head = self
            .client
            .block_number()
            .await
            .context("get chain head")?;
        let last = tokio::task::spawn_blocking({
            let store = self.store.clone();
            move || load_or_init_checkpoint(&store, head)
        })
        .await
        .context("join checkpoint load")??;

        let safe_head = head.saturating_sub(self.cfg.reorg_margin);
        if last >= safe_head {
            return Ok(ScanOutcome::UpToDate {
                last_processed_block: last,
                safe_head,
            });
        }

        let from_block = last + 1;
        let to_block = safe_head.min(last.saturating_add(self.cfg.max_block_range.max(1)));
        tracing::info!(from_block, to_block, "scanning invoice contract logs");

        let filter = invoice_events_filter(self.cfg.contract_address, from_block, to_block);
        let logs = self
            .client
            .get_logs(&filter)
            .await
            .with_context(|| format!("get logs {from_block}..={to_block}"))?;

        let log_count = logs.len();
        let (applied, skipped) = tokio::task::spawn_blocking({
            let store = self.store.clone();
            let contract = self.cfg.contract_address;
            move || apply_batch(&store, contract, &logs, to_block, Utc::now())
        })
        .await
        .context("join scan batch")??;

        Ok(ScanOutcome::Scanned {
            from_block,
            to_block,
            logs: log_count,
            applied,
            skipped,
        })
    }

    /// Ticks on a fixed interval until `cancel` fires. An in-flight scan is allowed to
    /// finish before the loop exits.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.cfg.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.scan_once().await {
                Ok(ScanOutcome::Scanned {
                    from_block,
                    to_block,
                    logs,
                    applied,
                    skipped,
                }) => {
                    tracing::info!(from_block, to_block, logs, applied, skipped, "scan complete");
                }
                Ok(ScanOutcome::UpToDate { .. }) => {}
                Err(err) => {
                    tracing::warn!(error = %format!("{err:#}"), "watcher tick failed");
                }
            }
        }

        tracing::info!("chain watcher stopped");
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

}

fn load_or_init_checkpoint(store: &SharedInvoiceStore, head: u64) -> Result<u64> {
    let mut store = store.lock().expect("store mutex poisoned");
    if let Some(block) = store.load_checkpoint()? {
        return Ok(block);
    }

    let block = store.init_checkpoint(head.saturating_sub(1))?;
    tracing::info!(block, head, "initialized scan checkpoint");
    Ok(block)
}

/// Applies one scanned range under a single store lock and advances the checkpoint
/// to `to_block`. Returns `(applied, skipped)`.
fn apply_batch(
    store: &SharedInvoiceStore,
    contract: Address,
    logs: &[Log],
    to_block: u64,
    now: DateTime<Utc>,
) -> Result<(usize, usize)> {
    let mut applied = 0;
    let mut skipped = 0;

    let mut store = store.lock().expect("store mutex poisoned");

    for log in logs {
        let event = match ContractEvent::decode(log, contract) {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    tx_hash = ?log.transaction_hash,
                    block_number = ?log.block_number,
                    "skipping undecodable log"
                );
                skipped += 1;
                continue;
            }
        };

        let outcome = handlers::apply_event(&mut store, &event, now)
            .with_context(|| format!("apply event from tx {}", event.tx_hash()))?;
        if outcome.changed_state() {
            applied += 1;
        }
    }

    store
        .advance_checkpoint(to_block)
        .context("advance scan checkpoint")?;
    Ok((applied, skipped))
}
