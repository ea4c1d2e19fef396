//! Wallet address helpers.
//!
//! Addresses travel through the API as strings. They are compared
//! case-insensitively and stored lowercased, so mixed-case (EIP-55)
//! input from wallets matches what the contracts emit.

use crate::error::AddressError;

/// Validate a `0x`-prefixed 20-byte hex address and return it lowercased.
pub fn normalize_address(input: &str) -> Result<String, AddressError> {
    let trimmed = input.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .ok_or(AddressError::MissingPrefix)?;

    if digits.len() != 40 {
        return Err(AddressError::InvalidLength(digits.len()));
    }
    if hex::decode(digits).is_err() {
        return Err(AddressError::InvalidHex);
    }

    Ok(format!("0x{}", digits.to_ascii_lowercase()))
}

/// Case-insensitive address comparison, ignoring surrounding whitespace.
pub fn same_address(a: &str, b: &str) -> bool {
    let (a, b) = (a.trim(), b.trim());
    !a.is_empty() && a.eq_ignore_ascii_case(b)
}
