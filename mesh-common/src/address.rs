//! address.rs
//!
//! Fixed-width hardware address of a radio module.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::MeshError;

/// 64-bit hardware address, written as 16 hex digits (`0013A20041F5B73D`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HwAddress(pub u64);

impl HwAddress {
    /// Parses a 16 hex digit address. Case is ignored.
    pub fn from_hex(s: &str) -> Result<Self, MeshError> {
        let trimmed = s.trim();
        if trimmed.len() != 16 {
            return Err(MeshError::Address(format!(
                "expected 16 hex digits, got {} in '{}'",
                trimmed.len(),
                trimmed
            )));
        }
        let bytes = hex::decode(trimmed)
            .map_err(|e| MeshError::Address(format!("'{}': {}", trimmed, e)))?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&bytes);
        Ok(HwAddress(u64::from_be_bytes(raw)))
    }

    pub fn to_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for HwAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016X}", self.0)
    }
}

impl FromStr for HwAddress {
    type Err = MeshError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HwAddress::from_hex(s)
    }
}

impl Serialize for HwAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for HwAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        HwAddress::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
