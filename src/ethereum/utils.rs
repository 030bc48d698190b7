use alloy::primitives::Address;
use std::str::FromStr;

use super::abi::FetchError;

/// Chain used when a request omits `chain_id` or sends zero.
pub const DEFAULT_CHAIN_ID: u64 = 1;

/// Validates the `0x` + 40 hex character address shape and parses it.
pub fn validate_address(address: &str) -> Result<Address, FetchError> {
    let address = address.trim();

    if address.is_empty() {
        return Err(FetchError::InvalidAddress(
            "Address cannot be empty".to_string(),
        ));
    }

    if !address.starts_with("0x") && !address.starts_with("0X") {
        return Err(FetchError::InvalidAddress(format!(
            "Invalid address format: '{}'. Ethereum addresses must start with '0x'",
            address
        )));
    }

    if address.len() != 42 {
        return Err(FetchError::InvalidAddress(format!(
            "Invalid address length: '{}'. Ethereum addresses must be exactly 42 characters (0x + 40 hex characters)",
            address
        )));
    }

    let hex_part = &address[2..];
    if !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(FetchError::InvalidAddress(format!(
            "Invalid address format: '{}'. Contains non-hexadecimal characters",
            address
        )));
    }

    // Mixed-case input is accepted without enforcing the EIP-55 checksum.
    Address::from_str(hex_part).map_err(|e| {
        FetchError::InvalidAddress(format!("Invalid Ethereum address: '{}'. Error: {}", address, e))
    })
}

pub fn resolve_chain_id(chain_id: Option<u64>) -> u64 {
    match chain_id {
        Some(0) | None => DEFAULT_CHAIN_ID,
        Some(id) => id,
    }
}
