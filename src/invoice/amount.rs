//! Exact conversion between decimal ETH amounts and integer wei.
//!
//! Amounts are handled as decimal text and scaled with 256-bit integer arithmetic, so
//! `0.1` becomes exactly `100000000000000000` wei. Digits below one wei are truncated
//! toward zero.

use alloy::primitives::U256;

use crate::error::InvoiceError;

pub const ETH_DECIMALS: u32 = 18;
pub const DISPLAY_DECIMALS: u32 = 6;

/// Parses a non-negative decimal (`"1.5"`, `"0.01"`, `"1e-7"`) into wei.
pub fn eth_to_wei(amount: &str) -> Result<U256, InvoiceError> {
    let invalid = |why: &str| InvoiceError::Validation(format!("invalid amount {amount:?}: {why}"));

    let s = amount.trim();
    let s = s.strip_prefix('+').unwrap_or(s);
    if s.starts_with('-') {
        return Err(invalid("must not be negative"));
    }

    let (mantissa, exponent) = match s.find(['e', 'E']) {
        Some(pos) => {
            let exp: i64 = s[pos + 1..]
                .parse()
                .map_err(|_| invalid("malformed exponent"))?;
            (&s[..pos], exp)
        }
        None => (s, 0),
    };

    let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(invalid("no digits"));
    }
    if !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit()) {
        return Err(invalid("not a decimal number"));
    }

    let digits = format!("{int_part}{frac_part}");
    let frac_len = i64::try_from(frac_part.len()).map_err(|_| invalid("too many digits"))?;
    let shift = i64::from(ETH_DECIMALS)
        .checked_sub(frac_len)
        .and_then(|v| v.checked_add(exponent))
        .ok_or_else(|| invalid("exponent out of range"))?;

    let kept = if shift >= 0 {
        digits.as_str()
    } else {
        let drop = usize::try_from(shift.unsigned_abs()).unwrap_or(usize::MAX);
        &digits[..digits.len().saturating_sub(drop)]
    };
    let kept = kept.trim_start_matches('0');
    if kept.is_empty() {
        return Ok(U256::ZERO);
    }

    let base = U256::from_str_radix(kept, 10).map_err(|_| invalid("amount too large"))?;
    if shift <= 0 {
        return Ok(base);
    }

    U256::from(10u8)
        .checked_pow(U256::from(shift))
        .and_then(|scale| base.checked_mul(scale))
        .ok_or_else(|| invalid("amount too large"))
}

/// Renders wei as ETH with [`DISPLAY_DECIMALS`] places, rounding half up.
pub fn wei_to_eth_display(wei: U256) -> String {
    let unit = U256::from(10u8).pow(U256::from(ETH_DECIMALS - DISPLAY_DECIMALS));
    let scaled = wei.saturating_add(unit / U256::from(2u8)) / unit;

    let display_scale = U256::from(10u8).pow(U256::from(DISPLAY_DECIMALS));
    let whole = scaled / display_scale;
    let frac = (scaled % display_scale).to::<u64>();
    format!("{whole}.{frac:0width$}", width = DISPLAY_DECIMALS as usize)
}
