//! 32-byte field element

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A 32-byte big-endian value.
///
/// Ordering follows the numeric value, which is what indexed trees use to keep
/// their leaves sorted. The zero value doubles as the "empty" marker for keys
/// and leaves.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Fr(pub [u8; 32]);

impl Fr {
    pub const SIZE: usize = 32;
    pub const ZERO: Fr = Fr([0u8; 32]);

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| anyhow!("expected 32 bytes, got {}", bytes.len()))?;
        Ok(Fr(array))
    }

    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let trimmed = hex_str.strip_prefix("0x").unwrap_or(hex_str);
        Self::from_slice(&hex::decode(trimmed)?)
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Low 8 bytes interpreted as a big-endian integer.
    pub fn low_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.0[24..]);
        u64::from_be_bytes(bytes)
    }
}

impl From<u64> for Fr {
    fn from(value: u64) -> Self {
        let mut bytes = [0u8; 32];
        bytes[24..].copy_from_slice(&value.to_be_bytes());
        Fr(bytes)
    }
}

impl From<[u8; 32]> for Fr {
    fn from(bytes: [u8; 32]) -> Self {
        Fr(bytes)
    }
}

impl fmt::Display for Fr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Fr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Small values come up constantly in keys; print them as integers.
        if self.0[..24].iter().all(|b| *b == 0) {
            write!(f, "Fr({})", self.low_u64())
        } else {
            write!(f, "Fr({})", self.to_hex())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_is_numeric() {
        let small = Fr::from(10);
        let large = Fr::from(300);
        assert!(small < large);
        assert!(Fr::ZERO < small);
        assert_eq!(large.low_u64(), 300);
    }

    #[test]
    fn test_hex_parsing() {
        let value = Fr::from(0xabcd);
        let parsed = Fr::from_hex(&value.to_hex()).unwrap();
        assert_eq!(parsed, value);
        assert!(Fr::from_hex("0x1234").is_err());
    }
}
