//! Token amounts.
//!
//! The token contract works in 18-decimal fixed-point integers. Human-readable
//! decimal strings only exist at the edges (input parsing and display); every
//! comparison happens on the integer unit.

use std::fmt;
use std::str::FromStr;

use alloy_primitives::utils::{format_units, parse_units};
use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{FAUCET_GRANT, MESSAGE_FEE, TOKEN_DECIMALS};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UnitsError {
    #[error("Invalid token amount {input:?}: {reason}")]
    Invalid { input: String, reason: String },

    #[error("Token amount must be greater than zero")]
    Zero,
}

/// An amount of CHAT tokens in base units (wei-like, 18 decimals).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TokenAmount(pub U256);

impl TokenAmount {
    pub const ZERO: Self = Self(U256::ZERO);

    pub fn from_base_units(raw: U256) -> Self {
        Self(raw)
    }

    pub fn base_units(&self) -> U256 {
        self.0
    }

    /// Parse a human decimal string such as `"0.01"` or `"10"`.
    pub fn parse(input: &str) -> Result<Self, UnitsError> {
        let trimmed = input.trim();
        let parsed = parse_units(trimmed, TOKEN_DECIMALS).map_err(|e| UnitsError::Invalid {
            input: input.to_string(),
            reason: e.to_string(),
        })?;
        if parsed.is_negative() {
            return Err(UnitsError::Invalid {
                input: input.to_string(),
                reason: "negative amount".into(),
            });
        }
        Ok(Self(parsed.get_absolute()))
    }

    /// Parse a user-supplied transfer amount, rejecting zero.
    pub fn parse_positive(input: &str) -> Result<Self, UnitsError> {
        let amount = Self::parse(input)?;
        if amount.is_zero() {
            return Err(UnitsError::Zero);
        }
        Ok(amount)
    }

    /// Fee charged by the chat contract for one message.
    pub fn message_fee() -> Self {
        Self::parse(MESSAGE_FEE).unwrap_or(Self::ZERO)
    }

    /// Amount granted by one faucet claim.
    pub fn faucet_grant() -> Self {
        Self::parse(FAUCET_GRANT).unwrap_or(Self::ZERO)
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Human decimal string with trailing zeros trimmed (`"10.0"`, `"0.005"`).
    pub fn to_decimal_string(&self) -> String {
        let full = match format_units(self.0, TOKEN_DECIMALS) {
            Ok(s) => s,
            Err(_) => return self.0.to_string(),
        };
        match full.split_once('.') {
            Some((int, frac)) => {
                let frac = frac.trim_end_matches('0');
                if frac.is_empty() {
                    format!("{int}.0")
                } else {
                    format!("{int}.{frac}")
                }
            }
            None => format!("{full}.0"),
        }
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_decimal_string())
    }
}

impl FromStr for TokenAmount {
    type Err = UnitsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<U256> for TokenAmount {
    fn from(raw: U256) -> Self {
        Self(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fee_is_one_hundredth() {
        let fee = TokenAmount::message_fee();
        assert_eq!(fee.base_units(), U256::from(10_000_000_000_000_000u64));
    }

    #[test]
    fn test_comparison_uses_integer_units() {
        let balance = TokenAmount::parse("0.005").unwrap();
        assert!(balance < TokenAmount::message_fee());

        let allowance = TokenAmount::parse("0.02").unwrap();
        assert!(allowance >= TokenAmount::message_fee());

        // 0.1 + 0.2 style float drift cannot happen on integers
        let a = TokenAmount::parse("0.1").unwrap();
        let b = TokenAmount::parse("0.2").unwrap();
        let c = TokenAmount::parse("0.3").unwrap();
        assert_eq!(TokenAmount(a.0 + b.0), c);
    }

    #[test]
    fn test_display_trims_zeros() {
        assert_eq!(TokenAmount::faucet_grant().to_string(), "10.0");
        assert_eq!(TokenAmount::parse("0.005").unwrap().to_string(), "0.005");
        assert_eq!(TokenAmount::ZERO.to_string(), "0.0");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(TokenAmount::parse("abc").is_err());
        assert!(TokenAmount::parse("").is_err());
        assert_eq!(TokenAmount::parse_positive("0"), Err(UnitsError::Zero));
    }
}
