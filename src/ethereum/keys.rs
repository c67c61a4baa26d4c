use alloy::signers::local::PrivateKeySigner;

use crate::error::InvoiceError;

/// Parses the hex-encoded secp256k1 key that signs invoice-creation transactions.
///
/// An absent, empty or malformed key is a [`InvoiceError::MissingCredential`].
pub fn signer_from_hex(raw: Option<&str>) -> Result<PrivateKeySigner, InvoiceError> {
    let raw = raw.map(str::trim).unwrap_or_default();
    let raw = raw.strip_prefix("0x").unwrap_or(raw);
    if raw.is_empty() {
        return Err(InvoiceError::MissingCredential(
            "signing key is not configured".to_string(),
        ));
    }

    let bytes = hex::decode(raw)
        .map_err(|e| InvoiceError::MissingCredential(format!("signing key is not hex: {e}")))?;
    if bytes.len() != 32 {
        return Err(InvoiceError::MissingCredential(format!(
            "signing key must be 32 bytes, got {}",
            bytes.len()
        )));
    }

    PrivateKeySigner::from_slice(&bytes)
        .map_err(|e| InvoiceError::MissingCredential(format!("invalid signing key: {e}")))
}
