use std::sync::Mutex;

use alloy::primitives::{Address, B256, Bytes, keccak256};
use alloy::rpc::types::{Filter, Log};
use anyhow::Result;
use async_trait::async_trait;

use eth_invoice::ethereum::ChainClient;

pub const TEST_CHAIN_ID: u64 = 31337;
pub const TEST_GAS_PRICE: u128 = 1_000_000_000;

/// In-memory chain node. Logs are served by block range only, so foreign or malformed
/// logs reach the decoder.
pub struct MockChainClient {
    state: Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    head: u64,
    logs: Vec<Log>,
    nonce: u64,
    fail_block_number: bool,
    fail_get_logs: bool,
    fail_nonce: bool,
    fail_send: bool,
    tx_hash_override: Option<B256>,
    log_requests: Vec<(u64, u64)>,
    sent: Vec<Bytes>,
}

impl MockChainClient {
    pub fn new(head: u64) -> Self {
        Self {
            state: Mutex::new(MockState {
                head,
                ..Default::default()
            }),
        }
    }

    pub fn set_head(&self, head: u64) {
        self.state.lock().expect("mock mutex poisoned").head = head;
    }

    pub fn set_nonce(&self, nonce: u64) {
        self.state.lock().expect("mock mutex poisoned").nonce = nonce;
    }

    pub fn push_log(&self, log: Log) {
        self.state.lock().expect("mock mutex poisoned").logs.push(log);
    }

    pub fn fail_block_number(&self, fail: bool) {
        self.state.lock().expect("mock mutex poisoned").fail_block_number = fail;
    }

    pub fn fail_get_logs(&self, fail: bool) {
        self.state.lock().expect("mock mutex poisoned").fail_get_logs = fail;
    }

    pub fn fail_nonce(&self, fail: bool) {
        self.state.lock().expect("mock mutex poisoned").fail_nonce = fail;
    }

    pub fn fail_send(&self, fail: bool) {
        self.state.lock().expect("mock mutex poisoned").fail_send = fail;
    }

    /// Makes `send_raw_transaction` report `hash` instead of the keccak of the payload.
    pub fn override_tx_hash(&self, hash: B256) {
        self.state.lock().expect("mock mutex poisoned").tx_hash_override = Some(hash);
    }

    pub fn log_requests(&self) -> Vec<(u64, u64)> {
        self.state
            .lock()
            .expect("mock mutex poisoned")
            .log_requests
            .clone()
    }

    pub fn sent_transactions(&self) -> Vec<Bytes> {
        self.state.lock().expect("mock mutex poisoned").sent.clone()
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn block_number(&self) -> Result<u64> {
        let state = self.state.lock().expect("mock mutex poisoned");
        anyhow::ensure!(!state.fail_block_number, "connection refused");
        Ok(state.head)
    }

    async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>> {
        let mut state = self.state.lock().expect("mock mutex poisoned");
        anyhow::ensure!(!state.fail_get_logs, "query returned more than 10000 results");

        let from = filter.get_from_block().unwrap_or(0);
        let to = filter.get_to_block().unwrap_or(u64::MAX);
        state.log_requests.push((from, to));

        Ok(state
            .logs
            .iter()
            .filter(|log| {
                log.block_number
                    .is_some_and(|block| block >= from && block <= to)
            })
            .cloned()
            .collect())
    }

    async fn pending_nonce(&self, _address: Address) -> Result<u64> {
        let state = self.state.lock().expect("mock mutex poisoned");
        anyhow::ensure!(!state.fail_nonce, "connection refused");
        Ok(state.nonce)
    }

    async fn gas_price(&self) -> Result<u128> {
        Ok(TEST_GAS_PRICE)
    }

    async fn chain_id(&self) -> Result<u64> {
        Ok(TEST_CHAIN_ID)
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<B256> {
        let mut state = self.state.lock().expect("mock mutex poisoned");
        anyhow::ensure!(!state.fail_send, "nonce too low");

        let hash = state.tx_hash_override.unwrap_or_else(|| keccak256(&raw));
        state.sent.push(raw);
        state.nonce += 1;
        Ok(hash)
    }
}
