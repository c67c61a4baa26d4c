pub mod amount;
pub mod service;
pub mod store;

use alloy::primitives::U256;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    Pending,
    Paid,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoice {
    pub id: String,
    pub onchain_invoice_id: Option<U256>,
    pub merchant_address: String,
    pub amount_wei: U256,
    pub status: InvoiceStatus,
    pub expires_at: DateTime<Utc>,
    pub contract_address: String,

    /// Submission tx hash until the invoice is paid, then the payment tx hash.
    pub tx_hash: String,
    pub payer_address: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
