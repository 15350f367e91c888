//! # Event Records
//!
//! Events are the audit trail external monitors rely on. Each record names
//! its emitter, a topic, and a JSON payload whose schema belongs to the
//! emitter (the token ledgers use [`TransferPayload`] / [`ApprovalPayload`];
//! contracts define their own).
//!
//! Records are append-only. The host discards records emitted inside a
//! failed atomic frame together with the rest of that frame's effects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::address::Address;

/// One emitted event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Unique record identifier.
    pub id: Uuid,
    /// The contract or ledger that emitted the event.
    pub emitter: Address,
    /// Event name, e.g. `"Transfer"`.
    pub topic: String,
    /// Emitter-defined payload.
    pub payload: serde_json::Value,
    /// Wall-clock time of emission.
    pub emitted_at: DateTime<Utc>,
}

impl EventRecord {
    /// Builds a record stamped with a fresh id and the current time.
    pub fn new(emitter: Address, topic: &str, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            emitter,
            topic: topic.to_string(),
            payload,
            emitted_at: Utc::now(),
        }
    }

    /// Decodes the payload into a concrete type.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

/// Payload of `Transfer` records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferPayload {
    pub from: Address,
    pub to: Address,
    pub amount: u64,
}

/// Payload of `Approval` records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalPayload {
    pub owner: Address,
    pub spender: Address,
    pub amount: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_decodes_to_its_type() {
        let payload = TransferPayload {
            from: Address::from_label("a"),
            to: Address::from_label("b"),
            amount: 9,
        };
        let record = EventRecord::new(
            Address::from_label("token"),
            "Transfer",
            serde_json::to_value(&payload).unwrap(),
        );
        assert_eq!(record.decode::<TransferPayload>().unwrap(), payload);
        assert!(record.decode::<ApprovalPayload>().is_err());
    }

    #[test]
    fn records_get_distinct_ids() {
        let a = EventRecord::new(Address::ZERO, "X", serde_json::Value::Null);
        let b = EventRecord::new(Address::ZERO, "X", serde_json::Value::Null);
        assert_ne!(a.id, b.id);
    }
}
