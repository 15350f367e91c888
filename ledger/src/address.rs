//! # Account Addresses
//!
//! Every principal on the ledger (people, tokens and escrows alike) is named
//! by a 32-byte [`Address`]. Addresses are opaque: the ledger never inspects the
//! bytes, it only compares them and uses them as map keys.
//!
//! Two derivations exist:
//!
//! - [`Address::from_label`] hashes a human-readable label. Handy for test
//!   accounts ("alice", "bob") and anything that needs a stable, memorable
//!   identity without key material.
//! - [`Address::contract`] hashes the deployer's address and its deployment
//!   nonce, so contract addresses are deterministic and never collide for the
//!   same deployer.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::config::{ADDRESS_PREFIX, CONTRACT_ADDRESS_DOMAIN, LABEL_ADDRESS_DOMAIN};

/// A 32-byte account identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; 32]);

impl Address {
    /// The all-zero address. Never a valid transfer destination.
    pub const ZERO: Address = Address([0u8; 32]);

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Derives an address from a human-readable label.
    pub fn from_label(label: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(LABEL_ADDRESS_DOMAIN);
        hasher.update(label.as_bytes());
        Self(*hasher.finalize().as_bytes())
    }

    /// Derives the address of the `nonce`-th contract deployed by `deployer`.
    pub fn contract(deployer: &Address, nonce: u64) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(CONTRACT_ADDRESS_DOMAIN);
        hasher.update(deployer.as_bytes());
        hasher.update(&nonce.to_le_bytes());
        Self(*hasher.finalize().as_bytes())
    }

    /// Returns `true` for [`Address::ZERO`].
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Returns the hex form without the `0x` prefix.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", ADDRESS_PREFIX, self.to_hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Eight bytes are plenty to tell accounts apart in logs.
        write!(f, "Address({}{}..)", ADDRESS_PREFIX, &self.to_hex()[..16])
    }
}

impl FromStr for Address {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let stripped = s.strip_prefix(ADDRESS_PREFIX).unwrap_or(s);
        let bytes = hex::decode(stripped)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(Self(arr))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_string())
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            s.parse().map_err(serde::de::Error::custom)
        } else {
            <[u8; 32]>::deserialize(deserializer).map(Self)
        }
    }
}
