use thiserror::Error;

pub type Result<T> = std::result::Result<T, InvoiceError>;

/// Errors surfaced by the invoice lifecycle engine.
#[derive(Debug, Error)]
pub enum InvoiceError {
    /// bad request shape, maps to 400
    #[error("validation error: {0}")]
    Validation(String),

    /// an RPC call to the chain node failed
    #[error("chain unavailable: {0:#}")]
    ChainUnavailable(anyhow::Error),

    /// the signing key is absent or malformed
    #[error("missing credential: {0}")]
    MissingCredential(String),

    /// the contract interface rejected the call arguments
    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// the transaction was broadcast but the local invoice row could not be written
    #[error("transaction {tx_hash} was broadcast but the invoice was not persisted: {reason:#}")]
    OrphanedTransaction {
        tx_hash: String,
        reason: anyhow::Error,
    },

    #[error("store error: {0:#}")]
    Store(anyhow::Error),
}

impl InvoiceError {
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::NotFound(_))
    }
}
