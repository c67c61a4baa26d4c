pub mod contract;
pub mod keys;
pub mod rpc;

use alloy::primitives::{Address, B256, Bytes};
use alloy::rpc::types::{Filter, Log};
use anyhow::Result;
use async_trait::async_trait;

/// The subset of the JSON-RPC surface the invoice engine relies on.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn block_number(&self) -> Result<u64>;

    async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>>;

    /// Nonce including transactions still in the mempool.
    async fn pending_nonce(&self, address: Address) -> Result<u64>;

    async fn gas_price(&self) -> Result<u128>;

    async fn chain_id(&self) -> Result<u64>;

    /// Broadcasts an EIP-2718 encoded signed transaction and returns its hash.
    async fn send_raw_transaction(&self, raw: Bytes) -> Result<B256>;
}

/// Canonical textual form used to persist and look up transaction hashes.
pub fn hash_key(hash: &B256) -> String {
    format!("{hash:#x}")
}
