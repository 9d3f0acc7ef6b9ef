//! Vite address validation
//!
//! The coordinator identifies a worker by the Vite address its payouts go
//! to. The address is passed as a query parameter on connect and must match
//! the fixed shape `vite_` + 50 lowercase hex digits. Validation happens at
//! startup, before any connection attempt.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Length of the hex payload following the `vite_` prefix
const ADDRESS_HEX_LEN: usize = 50;

/// A format-validated Vite address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ViteAddress(String);

impl ViteAddress {
    /// Parse and validate an address string
    pub fn parse(s: &str) -> Result<Self> {
        let payload = s
            .strip_prefix("vite_")
            .ok_or_else(|| Error::InvalidAddress { address: s.to_string() })?;

        let valid = payload.len() == ADDRESS_HEX_LEN
            && payload.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));

        if !valid {
            return Err(Error::InvalidAddress { address: s.to_string() });
        }

        Ok(Self(s.to_string()))
    }

    /// The address as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ViteAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ViteAddress {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<ViteAddress> for String {
    fn from(addr: ViteAddress) -> String {
        addr.0
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
