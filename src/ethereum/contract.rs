//! ABI surface of the invoice manager contract.
//!
//! Only the creation entry point and the two lifecycle events are declared. Logs are
//! decoded once into [`ContractEvent`] and dispatched by `match` downstream.

use alloy::primitives::{Address, B256, Bytes, U256};
use alloy::rpc::types::{Filter, Log};
use alloy::sol;
use alloy::sol_types::{SolCall as _, SolEvent as _};
use thiserror::Error;

use crate::error::InvoiceError;

sol! {
    #[allow(missing_docs)]
    #[derive(Debug)]
    interface IInvoiceManager {
        event InvoiceCreated(
            uint256 indexed invoiceId,
            address merchant,
            uint256 amountWei,
            uint256 expiresAt
        );
        event InvoicePaid(uint256 indexed invoiceId, address indexed payer, uint256 amountWei);

        function createInvoice(address merchant, uint256 amountWei, uint256 expiresAt)
            external
            returns (uint256 invoiceId);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceCreated {
    pub invoice_id: U256,
    pub merchant: Address,
    pub amount_wei: U256,
    pub expires_at: U256,
    pub tx_hash: B256,
    pub block_number: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoicePaid {
    pub invoice_id: U256,
    pub payer: Address,
    pub amount_wei: U256,
    pub tx_hash: B256,
    pub block_number: Option<u64>,
}

/// Every contract event the watcher reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractEvent {
    InvoiceCreated(InvoiceCreated),
    InvoicePaid(InvoicePaid),
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("log emitted by foreign contract {0}")]
    ForeignContract(Address),

    #[error("unknown event topic {0:?}")]
    UnknownEvent(Option<B256>),

    #[error("log has no transaction hash")]
    MissingTxHash,

    #[error("abi decode: {0}")]
    Abi(#[from] alloy::sol_types::Error),
}

impl ContractEvent {
    pub fn decode(log: &Log, contract: Address) -> Result<Self, DecodeError> {
        if log.inner.address != contract {
            return Err(DecodeError::ForeignContract(log.inner.address));
        }

        let topic0 = log.inner.data.topics().first().copied();
        let tx_hash = log.transaction_hash.ok_or(DecodeError::MissingTxHash)?;
        let block_number = log.block_number;

        if topic0 == Some(IInvoiceManager::InvoiceCreated::SIGNATURE_HASH) {
            let event = log
                .log_decode::<IInvoiceManager::InvoiceCreated>()?
                .inner
                .data;
            Ok(Self::InvoiceCreated(InvoiceCreated {
                invoice_id: event.invoiceId,
                merchant: event.merchant,
                amount_wei: event.amountWei,
                expires_at: event.expiresAt,
                tx_hash,
                block_number,
            }))
        } else if topic0 == Some(IInvoiceManager::InvoicePaid::SIGNATURE_HASH) {
            let event = log
                .log_decode::<IInvoiceManager::InvoicePaid>()?
                .inner
                .data;
            Ok(Self::InvoicePaid(InvoicePaid {
                invoice_id: event.invoiceId,
                payer: event.payer,
                amount_wei: event.amountWei,
                tx_hash,
                block_number,
            }))
        } else {
            Err(DecodeError::UnknownEvent(topic0))
        }
    }

    pub fn tx_hash(&self) -> B256 {
        match self {
            Self::InvoiceCreated(e) => e.tx_hash,
            Self::InvoicePaid(e) => e.tx_hash,
        }
    }
}

/// Log filter for the lifecycle events of `contract` in the inclusive block range.
pub fn invoice_events_filter(contract: Address, from_block: u64, to_block: u64) -> Filter {
    Filter::new()
        .address(contract)
        .event_signature(vec![
            IInvoiceManager::InvoiceCreated::SIGNATURE_HASH,
            IInvoiceManager::InvoicePaid::SIGNATURE_HASH,
        ])
        .from_block(from_block)
        .to_block(to_block)
}

/// Packs the `createInvoice` call data.
pub fn encode_create_invoice(
    merchant: &str,
    amount_wei: U256,
    expires_at_unix: i64,
) -> Result<Bytes, InvoiceError> {
    let merchant: Address = merchant
        .trim()
        .parse()
        .map_err(|e| InvoiceError::Encoding(format!("merchant address {merchant:?}: {e}")))?;
    if amount_wei.is_zero() {
        return Err(InvoiceError::Encoding(
            "amountWei must be greater than zero".to_string(),
        ));
    }
    let expires_at = u64::try_from(expires_at_unix).map_err(|_| {
        InvoiceError::Encoding(format!("expiresAt {expires_at_unix} is before the epoch"))
    })?;

    let call = IInvoiceManager::createInvoiceCall {
        merchant,
        amountWei: amount_wei,
        expiresAt: U256::from(expires_at),
    };
    Ok(call.abi_encode().into())
}
