use alloy::primitives::{Address, B256, Bytes};
use alloy::providers::{Provider, RootProvider};
use alloy::rpc::types::{Filter, Log};
use alloy::transports::http::reqwest::Url;
use anyhow::{Context as _, Result};
use async_trait::async_trait;

use super::ChainClient;

/// [`ChainClient`] backed by a plain HTTP JSON-RPC provider, without fillers.
#[derive(Clone)]
pub struct RpcChainClient {
    provider: RootProvider,
}

impl RpcChainClient {
    pub fn connect_http(rpc_url: &str) -> Result<Self> {
        let url: Url = rpc_url
            .parse()
            .with_context(|| format!("parse rpc url {rpc_url}"))?;
        Ok(Self {
            provider: RootProvider::new_http(url),
        })
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn block_number(&self) -> Result<u64> {
        self.provider
            .get_block_number()
            .await
            .context("eth_blockNumber")
    }

    async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>> {
        self.provider.get_logs(filter).await.context("eth_getLogs")
    }

    async fn pending_nonce(&self, address: Address) -> Result<u64> {
        self.provider
            .get_transaction_count(address)
            .pending()
            .await
            .with_context(|| format!("eth_getTransactionCount {address}"))
    }

    async fn gas_price(&self) -> Result<u128> {
        self.provider.get_gas_price().await.context("eth_gasPrice")
    }

    async fn chain_id(&self) -> Result<u64> {
        self.provider.get_chain_id().await.context("eth_chainId")
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<B256> {
        let pending = self
            .provider
            .send_raw_transaction(&raw)
            .await
            .context("eth_sendRawTransaction")?;
        Ok(*pending.tx_hash())
    }
}
