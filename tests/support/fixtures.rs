use alloy::primitives::{Address, B256, Bytes, LogData, U256, address, keccak256};
use alloy::rpc::types::Log;
use anyhow::{Context as _, Result};
use chrono::{DateTime, Duration, Utc};
use tempfile::TempDir;

use eth_invoice::ethereum::hash_key;
use eth_invoice::invoice::store::{SharedInvoiceStore, SqliteInvoiceStore};
use eth_invoice::invoice::{Invoice, InvoiceStatus};

/// First dev account of a local anvil/hardhat node.
pub const TEST_SIGNING_KEY: &str =
    "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const TEST_SIGNER: Address = address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266");

pub const CONTRACT: Address = address!("5FbDB2315678afecb367f032d93F642f64180aa3");
pub const MERCHANT: Address = address!("70997970C51812dc3A010C7d01b50e0d17dc79C8");
pub const PAYER: Address = address!("AAAaAAAaAAAaAAAaAAAaAAAaAAAaAAAaAAAaAAAa");

pub fn open_store(dir: &TempDir) -> Result<SharedInvoiceStore> {
    let store = SqliteInvoiceStore::open(dir.path().join("invoices.sqlite3"))
        .context("open sqlite store")?;
    Ok(store.into_shared())
}

pub fn tx_hash(n: u64) -> B256 {
    keccak256(format!("tx-{n}"))
}

/// Current time at the millisecond precision the store keeps.
pub fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

pub fn sample_invoice(id: &str, submission_tx: B256, amount_wei: U256) -> Invoice {
    let now = now_millis();
    Invoice {
        id: id.to_string(),
        onchain_invoice_id: None,
        merchant_address: MERCHANT.to_checksum(None),
        amount_wei,
        status: InvoiceStatus::Pending,
        expires_at: now + Duration::minutes(5),
        contract_address: CONTRACT.to_checksum(None),
        tx_hash: hash_key(&submission_tx),
        payer_address: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn invoice_created_log(
    block: u64,
    tx: B256,
    invoice_id: u64,
    merchant: Address,
    amount_wei: U256,
    expires_at: DateTime<Utc>,
) -> Log {
    let expires_at = U256::from(u64::try_from(expires_at.timestamp()).unwrap_or_default());
    let mut data = B256::left_padding_from(merchant.as_slice()).to_vec();
    data.extend_from_slice(&amount_wei.to_be_bytes_vec());
    data.extend_from_slice(&expires_at.to_be_bytes_vec());

    contract_log(
        CONTRACT,
        block,
        tx,
        vec![
            keccak256("InvoiceCreated(uint256,address,uint256,uint256)"),
            B256::from(U256::from(invoice_id)),
        ],
        data,
    )
}

pub fn invoice_paid_log(
    block: u64,
    tx: B256,
    invoice_id: u64,
    payer: Address,
    amount_wei: U256,
) -> Log {
    contract_log(
        CONTRACT,
        block,
        tx,
        vec![
            keccak256("InvoicePaid(uint256,address,uint256)"),
            B256::from(U256::from(invoice_id)),
            B256::left_padding_from(payer.as_slice()),
        ],
        amount_wei.to_be_bytes_vec(),
    )
}

pub fn contract_log(
    emitter: Address,
    block: u64,
    tx: B256,
    topics: Vec<B256>,
    data: Vec<u8>,
) -> Log {
    Log {
        inner: alloy::primitives::Log {
            address: emitter,
            data: LogData::new_unchecked(topics, Bytes::from(data)),
        },
        block_hash: Some(keccak256(block.to_be_bytes())),
        block_number: Some(block),
        block_timestamp: None,
        transaction_hash: Some(tx),
        transaction_index: Some(0),
        log_index: Some(0),
        removed: false,
    }
}

pub fn eth(n: u64) -> U256 {
    U256::from(n) * U256::from(10u64).pow(U256::from(18u64))
}
