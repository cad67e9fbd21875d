//! Core types shared across the wallet-pnl crate.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tiny_keccak::{Hasher, Keccak};

use crate::portfolio::error::PortfolioError;

/// A validated 20-byte Ethereum account address.
///
/// Stored in canonical lower-case form with the `0x` prefix so that two
/// addresses compare equal regardless of the casing they were entered with.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    /// Parse and validate an address.
    ///
    /// Accepts `0x` followed by 40 hex digits. All-lower and all-upper inputs
    /// are accepted as-is; mixed-case inputs must carry a valid EIP-55 checksum.
    pub fn parse(input: &str) -> Result<Self, PortfolioError> {
        let trimmed = input.trim();
        let hex = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or_else(|| PortfolioError::InvalidInput(format!("address {input:?} is missing 0x prefix")))?;

        if hex.len() != 40 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(PortfolioError::InvalidInput(format!(
                "address {input:?} is not 40 hex digits"
            )));
        }

        let has_lower = hex.chars().any(|c| c.is_ascii_lowercase());
        let has_upper = hex.chars().any(|c| c.is_ascii_uppercase());
        if has_lower && has_upper && checksum_encode(hex) != hex {
            return Err(PortfolioError::InvalidInput(format!(
                "address {input:?} has an invalid checksum"
            )));
        }

        Ok(Self(format!("0x{}", hex.to_ascii_lowercase())))
    }

    /// Returns true if `input` would parse as an address.
    pub fn is_valid(input: &str) -> bool {
        Self::parse(input).is_ok()
    }

    /// Canonical lower-case form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// EIP-55 mixed-case form.
    pub fn to_checksum(&self) -> String {
        format!("0x{}", checksum_encode(&self.0[2..]))
    }

    /// Short display form, e.g. `0x1234...abcd`.
    pub fn short(&self) -> String {
        format!("{}...{}", &self.0[..6], &self.0[self.0.len() - 4..])
    }

    /// Case-insensitive comparison against a raw address string from the explorer.
    pub fn matches(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other.trim())
    }
}

/// Applies EIP-55 casing to 40 hex digits (no prefix).
fn checksum_encode(hex: &str) -> String {
    let lower = hex.to_ascii_lowercase();
    let mut hasher = Keccak::v256();
    let mut digest = [0u8; 32];
    hasher.update(lower.as_bytes());
    hasher.finalize(&mut digest);

    lower
        .chars()
        .enumerate()
        .map(|(i, c)| {
            let byte = digest[i / 2];
            let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0f };
            if c.is_ascii_alphabetic() && nibble >= 8 {
                c.to_ascii_uppercase()
            } else {
                c
            }
        })
        .collect()
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Address {
    type Err = PortfolioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = PortfolioError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}

/// Direction of a transfer relative to the queried address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    /// Inbound if `to` is the queried address, outbound otherwise
    /// (including contract creations with an empty `to`).
    pub fn relative_to(owner: &Address, to: &str) -> Self {
        if owner.matches(to) {
            Direction::In
        } else {
            Direction::Out
        }
    }

    /// Applies the direction's sign to an amount.
    pub fn signed(self, amount: f64) -> f64 {
        match self {
            Direction::In => amount,
            Direction::Out => -amount,
        }
    }
}
