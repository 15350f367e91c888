//! # Contract Storage
//!
//! Contracts keep their persistent state in the host, not in Rust values
//! they own. That way a rolled-back atomic frame rolls back contract state
//! together with balances, and a reentrant call always observes the latest
//! committed-so-far state instead of a stale copy.
//!
//! Values are encoded with `bincode` under a `(contract, key)` pair.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;

use crate::address::Address;
use crate::error::HostError;

/// Per-contract key/value storage.
#[derive(Debug, Clone, Default)]
pub struct ContractStorage {
    slots: HashMap<(Address, String), Vec<u8>>,
}

impl ContractStorage {
    /// Creates empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads and decodes the value under `(contract, key)`.
    pub fn get<T: DeserializeOwned>(&self, contract: &Address, key: &str) -> Result<Option<T>, HostError> {
        match self.slots.get(&(*contract, key.to_string())) {
            Some(bytes) => bincode::deserialize(bytes)
                .map(Some)
                .map_err(|e| HostError::Storage(format!("decode {}/{}: {}", contract, key, e))),
            None => Ok(None),
        }
    }

    /// Encodes and writes `value` under `(contract, key)`.
    pub fn set<T: Serialize>(&mut self, contract: &Address, key: &str, value: &T) -> Result<(), HostError> {
        let bytes = bincode::serialize(value)
            .map_err(|e| HostError::Storage(format!("encode {}/{}: {}", contract, key, e)))?;
        self.slots.insert((*contract, key.to_string()), bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Slot {
        owner: Address,
        amount: u64,
    }

    #[test]
    fn set_then_get() {
        let mut storage = ContractStorage::new();
        let contract = Address::from_label("contract");
        let slot = Slot {
            owner: Address::from_label("owner"),
            amount: 42,
        };
        storage.set(&contract, "slot", &slot).unwrap();
        assert_eq!(storage.get::<Slot>(&contract, "slot").unwrap(), Some(slot));
    }

    #[test]
    fn missing_key_is_none() {
        let storage = ContractStorage::new();
        let contract = Address::from_label("contract");
        assert_eq!(storage.get::<u64>(&contract, "nothing").unwrap(), None);
    }

    #[test]
    fn contracts_are_isolated() {
        let mut storage = ContractStorage::new();
        let a = Address::from_label("a");
        let b = Address::from_label("b");
        storage.set(&a, "k", &1u64).unwrap();
        assert_eq!(storage.get::<u64>(&b, "k").unwrap(), None);
    }

    #[test]
    fn type_mismatch_is_storage_error() {
        let mut storage = ContractStorage::new();
        let contract = Address::from_label("contract");
        storage.set(&contract, "k", &1u8).unwrap();
        let err = storage.get::<Slot>(&contract, "k").unwrap_err();
        assert!(matches!(err, HostError::Storage(_)));
    }
}
