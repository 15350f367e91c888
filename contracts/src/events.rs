//! # Escrow Events
//!
//! Every state change of a [`crate::token_escrow::TokenEscrow`] is
//! announced through an [`EscrowEvent`] recorded on the host. Monitors
//! reconstruct an escrow's history from these records alone:
//!
//! - `Funded` — a deposit arrived (the creator's at setup, or any later one).
//! - `Settled` — the swap happened; terminal.
//! - `Cancelled` — the creator unwound the trade; terminal.

use serde::{Deserialize, Serialize};
use swap_ledger::{Address, AssetKind, Context, ContractKey, EventRecord, HostError};

/// Notifications emitted by the escrow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EscrowEvent {
    /// A deposit was credited to the escrow.
    Funded {
        /// Whose balance was debited.
        depositor: Address,
        /// Which side of the trade it funds.
        asset: AssetKind,
        /// Amount credited.
        amount: u64,
    },

    /// Both sides were swapped.
    Settled {
        /// Native currency paid out under the agreement.
        ether: u64,
        /// Tokens paid out under the agreement.
        tokens: u64,
        /// Native currency held beyond the agreement, refunded to its depositor.
        excess_ether: u64,
        /// Tokens held beyond the agreement, refunded to their depositor.
        excess_tokens: u64,
    },

    /// The trade was unwound by its creator.
    Cancelled {
        /// Native currency returned.
        ether_returned: u64,
        /// Tokens returned.
        tokens_returned: u64,
    },
}

impl EscrowEvent {
    /// Topic under which the event is recorded.
    pub fn topic(&self) -> &'static str {
        match self {
            EscrowEvent::Funded { .. } => "Funded",
            EscrowEvent::Settled { .. } => "Settled",
            EscrowEvent::Cancelled { .. } => "Cancelled",
        }
    }

    /// Records the event with the escrow `key` controls as emitter.
    pub fn emit(&self, ctx: &mut Context<'_>, key: &ContractKey) -> Result<(), HostError> {
        ctx.emit(key, self.topic(), self)
    }

    /// Decodes a host record. `None` for records that are not escrow events.
    pub fn from_record(record: &EventRecord) -> Option<Self> {
        record
            .decode::<EscrowEvent>()
            .ok()
            .filter(|event| event.topic() == record.topic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swap_ledger::{Host, TokenMetadata};

    struct Recorder;

    #[test]
    fn emitted_event_decodes_back() {
        let mut host = Host::default();
        let mut ctx = host.call_as(Address::from_label("deployer"));
        let key = ctx.deploy_contract::<Recorder>().unwrap();
        let event = EscrowEvent::Cancelled {
            ether_returned: 100,
            tokens_returned: 0,
        };
        event.emit(&mut ctx, &key).unwrap();

        let escrow = key.address();
        let record = host.events_from(&escrow).next().unwrap();
        assert_eq!(record.topic, "Cancelled");
        assert_eq!(EscrowEvent::from_record(record), Some(event));
    }

    #[test]
    fn foreign_records_are_ignored() {
        let mut host = Host::default();
        let issuer = Address::from_label("issuer");
        let token = host.issue_token(&issuer, TokenMetadata::new("T", "T", 0), 10);
        host.token_transfer(&token, &issuer, &Address::from_label("holder"), 1)
            .unwrap();

        let record = host.events_from(&token).next().unwrap();
        assert_eq!(record.topic, "Transfer");
        assert_eq!(EscrowEvent::from_record(record), None);
    }
}
