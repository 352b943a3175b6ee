//! Hex helpers for JSON-RPC quantities and byte strings.

use crate::error::ProviderError;

/// Encode bytes as a `0x`-prefixed hex string.
pub fn to_hex_bytes(data: &[u8]) -> String {
    format!("0x{}", hex::encode(data))
}

/// Decode a `0x`-prefixed hex byte string. `"0x"` is the empty string.
pub fn parse_hex_bytes(value: &str) -> Result<Vec<u8>, ProviderError> {
    let s = value.trim();
    let digits = s.strip_prefix("0x").unwrap_or(s);
    if digits.is_empty() {
        return Ok(Vec::new());
    }
    hex::decode(digits)
        .map_err(|e| ProviderError::InvalidResponse(format!("invalid hex bytes: {e}")))
}

/// Encode a quantity the way JSON-RPC expects it (`0x0`, `0x1a`).
pub fn to_quantity(n: u64) -> String {
    format!("{n:#x}")
}

/// Decode a JSON-RPC quantity.
pub fn parse_quantity(value: &str) -> Result<u64, ProviderError> {
    let s = value.trim();
    let digits = s.strip_prefix("0x").unwrap_or(s);
    if digits.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(digits, 16)
        .map_err(|e| ProviderError::InvalidResponse(format!("invalid quantity {s:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantity() {
        assert_eq!(to_quantity(0), "0x0");
        assert_eq!(to_quantity(26), "0x1a");
        assert_eq!(parse_quantity("0x1a").unwrap(), 26);
        assert_eq!(parse_quantity("0x").unwrap(), 0);
        assert!(parse_quantity("0xzz").is_err());
    }

    #[test]
    fn test_hex_bytes() {
        assert_eq!(to_hex_bytes(&[0xde, 0xad]), "0xdead");
        assert_eq!(parse_hex_bytes("0xdead").unwrap(), vec![0xde, 0xad]);
        assert!(parse_hex_bytes("0x").unwrap().is_empty());
        assert!(parse_hex_bytes("0xabc").is_err());
    }
}
