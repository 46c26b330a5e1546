//! Conversion between decimal ETH strings and wei.
//!
//! Amounts cross the UI boundary as decimal strings (`"1.5"`) and the
//! contract boundary as wei (`U256`). Floating point is never involved.

use ethers::types::U256;
use ethers::utils::{format_units, parse_ether as ethers_parse_ether};
use serde::Serializer;

use crate::errors::{GatewayError, Result};

/// Number of fractional digits in one ether.
pub const ETHER_DECIMALS: usize = 18;

/// Parse a non-negative decimal ETH amount into wei.
///
/// Accepts `"1"`, `"1.5"`, `"0.000000000000000001"`. Rejects signs,
/// exponents, separators and more than [`ETHER_DECIMALS`] fractional digits
/// (ethers would silently truncate those).
pub fn parse_ether(amount: &str) -> Result<U256> {
    let amount = amount.trim();
    let (whole, fraction) = match amount.split_once('.') {
        Some((w, f)) => (w, Some(f)),
        None => (amount, None),
    };

    let digits_only = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    let valid = !whole.is_empty()
        && digits_only(whole)
        && fraction.map_or(true, |f| !f.is_empty() && digits_only(f));
    if !valid {
        return Err(GatewayError::InvalidInput(format!(
            "'{amount}' is not a decimal ETH amount"
        )));
    }
    if fraction.map_or(0, str::len) > ETHER_DECIMALS {
        return Err(GatewayError::InvalidInput(format!(
            "'{amount}' has more than {ETHER_DECIMALS} fractional digits"
        )));
    }

    ethers_parse_ether(amount)
        .map_err(|e| GatewayError::InvalidInput(format!("'{amount}' is out of range: {e}")))
}

/// Format wei as the shortest exact decimal ETH string (`"1.5"`, `"2"`).
pub fn format_ether(wei: U256) -> String {
    // 18 decimals is always a valid unit, so formatting cannot fail.
    let padded = format_units(wei, ETHER_DECIMALS as u32).unwrap_or_else(|_| wei.to_string());
    match padded.split_once('.') {
        Some((whole, fraction)) => {
            let fraction = fraction.trim_end_matches('0');
            if fraction.is_empty() {
                whole.to_string()
            } else {
                format!("{whole}.{fraction}")
            }
        }
        None => padded,
    }
}

/// Serialize a `U256` as a plain decimal string instead of ethers' hex form.
pub fn serialize_decimal<S: Serializer>(value: &U256, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.to_string())
}
