use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use anyhow::{Context as _, Result};
use clap::Parser as _;
use eth_invoice::ethereum::rpc::RpcChainClient;
use eth_invoice::invoice::service::{DEFAULT_GAS_LIMIT, InvoiceService, InvoiceServiceConfig};
use eth_invoice::invoice::store::SqliteInvoiceStore;
use eth_invoice::watcher::expiry::ExpirySweeper;
use eth_invoice::watcher::{
    ChainWatcher, DEFAULT_MAX_BLOCK_RANGE, DEFAULT_REORG_MARGIN, WatcherConfig,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

#[derive(Debug, clap::Parser)]
struct Args {
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    listen_addr: String,

    #[arg(long, env = "ETHEREUM_RPC")]
    rpc_url: String,

    #[arg(long, env = "CONTRACT_ADDRESS")]
    contract_address: String,

    #[arg(long, env = "DEPLOYER_PRIVATE_KEY", hide_env_values = true)]
    signing_key: Option<String>,

    /// Merchant used when a create request omits one.
    #[arg(long, env = "PAYMENT_ADDRESS")]
    payment_address: Option<String>,

    #[arg(long, env = "STORE_PATH")]
    store_path: PathBuf,

    #[arg(long, default_value_t = 10)]
    poll_interval_secs: u64,

    #[arg(long, default_value_t = 60)]
    expiry_sweep_interval_secs: u64,

    #[arg(long, default_value_t = DEFAULT_GAS_LIMIT)]
    gas_limit: u64,

    #[arg(long, default_value_t = DEFAULT_REORG_MARGIN)]
    reorg_margin: u64,

    #[arg(long, default_value_t = DEFAULT_MAX_BLOCK_RANGE)]
    max_block_range: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    eth_invoice::logging::init().ok();

    let args = Args::parse();
    let listen_addr: SocketAddr = args.listen_addr.parse().context("parse listen_addr")?;
    let contract_address: Address = args
        .contract_address
        .trim()
        .parse()
        .context("parse contract_address")?;

    let payment_address = args
        .payment_address
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<Address>().context("parse payment_address"))
        .transpose()?;

    let store = SqliteInvoiceStore::open(args.store_path)
        .context("open sqlite store")?
        .into_shared();
    let client = Arc::new(RpcChainClient::connect_http(&args.rpc_url)?);

    let mut service_cfg = InvoiceServiceConfig::new(contract_address);
    service_cfg.default_merchant_address = payment_address.map(|a| a.to_checksum(None));
    service_cfg.gas_limit = args.gas_limit;

    let service = InvoiceService::new(
        service_cfg,
        args.signing_key.as_deref(),
        client.clone(),
        store.clone(),
    )
    .context("init invoice service")?;
    tracing::info!(
        signer = %service.signer_address(),
        %contract_address,
        "invoice service ready"
    );

    let cancel = CancellationToken::new();

    let mut watcher_cfg = WatcherConfig::new(contract_address);
    watcher_cfg.poll_interval = Duration::from_secs(args.poll_interval_secs.max(1));
    watcher_cfg.reorg_margin = args.reorg_margin;
    watcher_cfg.max_block_range = args.max_block_range;
    let watcher = ChainWatcher::new(watcher_cfg, client, store.clone()).spawn(cancel.clone());

    let sweeper = ExpirySweeper::new(
        store,
        Duration::from_secs(args.expiry_sweep_interval_secs.max(1)),
    )
    .spawn(cancel.clone());

    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => tracing::info!("shutdown signal received"),
                Err(err) => tracing::warn!(error = %err, "listen for shutdown signal"),
            }
            cancel.cancel();
        }
    });

    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("bind {listen_addr}"))?;
    tracing::info!(%listen_addr, "starting invoice http server");

    let served = eth_invoice::http::serve(
        listener,
        eth_invoice::http::router(Arc::new(service)),
        cancel.clone(),
    )
    .await;

    cancel.cancel();
    for (name, handle) in [("watcher", watcher), ("sweeper", sweeper)] {
        if let Err(err) = handle.await {
            tracing::warn!(task = name, error = %err, "background task join error");
        }
    }

    served
}
