use std::sync::Arc;

use alloy::consensus::{SignableTransaction as _, TxEnvelope, TxLegacy};
use alloy::eips::eip2718::Encodable2718 as _;
use alloy::network::TxSignerSync as _;
use alloy::primitives::{Address, B256, Bytes, TxKind, U256};
use alloy::signers::local::PrivateKeySigner;
use chrono::{Duration, Utc};
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use crate::error::InvoiceError;
use crate::ethereum::contract::encode_create_invoice;
use crate::ethereum::keys::signer_from_hex;
use crate::ethereum::{ChainClient, hash_key};
use crate::invoice::amount::eth_to_wei;
use crate::invoice::store::SharedInvoiceStore;
use crate::invoice::{Invoice, InvoiceStatus};

pub const DEFAULT_GAS_LIMIT: u64 = 300_000;

#[derive(Debug, Clone)]
pub struct InvoiceServiceConfig {
    pub contract_address: Address,
    /// Merchant used when a request does not name one.
    pub default_merchant_address: Option<String>,
    pub gas_limit: u64,
}

impl InvoiceServiceConfig {
    pub fn new(contract_address: Address) -> Self {
        Self {
            contract_address,
            default_merchant_address: None,
            gas_limit: DEFAULT_GAS_LIMIT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateInvoiceRequest {
    pub merchant_address: Option<String>,
    /// Decimal ETH amount, kept as text so no precision is lost before scaling.
    pub amount_eth: String,
    pub expiry_minutes: i64,
}

pub struct InvoiceService<C> {
    cfg: InvoiceServiceConfig,
    client: Arc<C>,
    signer: PrivateKeySigner,
    store: SharedInvoiceStore,
    // held from nonce query to broadcast
    submit_lock: AsyncMutex<()>,
}

impl<C> InvoiceService<C>
where
    C: ChainClient,
{
    /// Fails on a missing signing key or an unparsable default merchant. The default
    /// merchant is stored in checksum form.
    pub fn new(
        mut cfg: InvoiceServiceConfig,
        signing_key: Option<&str>,
        client: Arc<C>,
        store: SharedInvoiceStore,
    ) -> Result<Self, InvoiceError> {
        let signer = signer_from_hex(signing_key)?;
        cfg.default_merchant_address = match cfg
            .default_merchant_address
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            Some(addr) => {
                let parsed: Address = addr.parse().map_err(|e| {
                    InvoiceError::Encoding(format!("default merchant address {addr:?}: {e}"))
                })?;
                Some(parsed.to_checksum(None))
            }
            None => None,
        };
        Ok(Self {
            cfg,
            client,
            signer,
            store,
            submit_lock: AsyncMutex::new(()),
        })
    }

    pub fn config(&self) -> &InvoiceServiceConfig {
        &self.cfg
    }

    pub fn signer_address(&self) -> Address {
        self.signer.address()
    }

    /// Broadcasts a `createInvoice` transaction and records a PENDING invoice keyed by
    /// its hash. Not idempotent: every successful call submits one transaction.
    pub async fn create_invoice(&self, req: CreateInvoiceRequest) -> Result<Invoice, InvoiceError> {
        let amount_wei = eth_to_wei(&req.amount_eth)?;
        if amount_wei.is_zero() {
            return Err(InvoiceError::Validation(
                "amountEth must be greater than zero".to_string(),
            ));
        }
        if req.expiry_minutes <= 0 {
            return Err(InvoiceError::Validation(
                "expiryMinutes must be greater than zero".to_string(),
            ));
        }

        let merchant_address = self.resolve_merchant(req.merchant_address.as_deref())?;

        let now = Utc::now();
        let expires_at = Duration::try_minutes(req.expiry_minutes)
            .and_then(|d| now.checked_add_signed(d))
            .ok_or_else(|| InvoiceError::Validation("expiryMinutes out of range".to_string()))?;

        let calldata = encode_create_invoice(&merchant_address, amount_wei, expires_at.timestamp())?;
        let tx_hash = hash_key(&self.submit(calldata).await?);

        let invoice = Invoice {
            id: Uuid::new_v4().to_string(),
            onchain_invoice_id: None,
            merchant_address,
            amount_wei,
            status: InvoiceStatus::Pending,
            expires_at,
            contract_address: self.cfg.contract_address.to_checksum(None),
            tx_hash: tx_hash.clone(),
            payer_address: None,
            created_at: now,
            updated_at: now,
        };

        let persisted = tokio::task::spawn_blocking({
            let store = self.store.clone();
            let invoice = invoice.clone();
            move || {
                store
                    .lock()
                    .expect("store mutex poisoned")
                    .insert_invoice(&invoice)
            }
        })
        .await
        .map_err(anyhow::Error::from)
        .and_then(|inserted| inserted);
        if let Err(reason) = persisted {
            tracing::error!(
                %tx_hash,
                invoice_id = %invoice.id,
                error = %format!("{reason:#}"),
                "invoice transaction broadcast but not persisted"
            );
            return Err(InvoiceError::OrphanedTransaction { tx_hash, reason });
        }

        tracing::info!(
            invoice_id = %invoice.id,
            %tx_hash,
            amount_wei = %invoice.amount_wei,
            expires_at = %invoice.expires_at,
            "invoice submitted"
        );
        Ok(invoice)
    }

    pub async fn get_invoice(&self, id: &str) -> Result<Invoice, InvoiceError> {
        let found = tokio::task::spawn_blocking({
            let store = self.store.clone();
            let id = id.to_string();
            move || store.lock().expect("store mutex poisoned").get_invoice(&id)
        })
        .await
        .map_err(|e| InvoiceError::Store(e.into()))?
        .map_err(InvoiceError::Store)?;
        found.ok_or_else(|| InvoiceError::NotFound(format!("invoice {id}")))
    }

    fn resolve_merchant(&self, requested: Option<&str>) -> Result<String, InvoiceError> {
        match requested.map(str::trim).filter(|s| !s.is_empty()) {
            Some(addr) => {
                let parsed: Address = addr.parse().map_err(|e| {
                    InvoiceError::Validation(format!("invalid merchantAddress {addr:?}: {e}"))
                })?;
                Ok(parsed.to_checksum(None))
            }
            None => self
                .cfg
                .default_merchant_address
                .clone()
                .ok_or_else(|| {
                    InvoiceError::Validation(
                        "merchantAddress is required when no payment address is configured"
                            .to_string(),
                    )
                }),
        }
    }

    async fn submit(&self, calldata: Bytes) -> Result<B256, InvoiceError> {
        let _guard = self.submit_lock.lock().await;

        let from = self.signer.address();
        let nonce = self
            .client
            .pending_nonce(from)
            .await
            .map_err(InvoiceError::ChainUnavailable)?;
        let gas_price = self
            .client
            .gas_price()
            .await
            .map_err(InvoiceError::ChainUnavailable)?;
        let chain_id = self
            .client
            .chain_id()
            .await
            .map_err(InvoiceError::ChainUnavailable)?;

        let mut tx = TxLegacy {
            chain_id: Some(chain_id),
            nonce,
            gas_price,
            gas_limit: self.cfg.gas_limit,
            to: TxKind::Call(self.cfg.contract_address),
            value: U256::ZERO,
            input: calldata,
        };
        let signature = self
            .signer
            .sign_transaction_sync(&mut tx)
            .map_err(|e| InvoiceError::Encoding(format!("sign transaction: {e}")))?;
        let envelope = TxEnvelope::from(tx.into_signed(signature));
        let local_hash = *envelope.tx_hash();

        let tx_hash = self
            .client
            .send_raw_transaction(envelope.encoded_2718().into())
            .await
            .map_err(InvoiceError::ChainUnavailable)?;
        if tx_hash != local_hash {
            tracing::warn!(%local_hash, node_hash = %tx_hash, "node reported a different tx hash");
        }

        tracing::debug!(%from, nonce, gas_price, chain_id, %tx_hash, "createInvoice broadcast");
        Ok(tx_hash)
    }
}
