// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Swap Contracts
//!
//! On-chain logic that runs on the [`swap_ledger`] host. One contract lives
//! here today:
//!
//! - **Token Escrow** — a two-party atomic swap of a fungible token for
//!   native currency, without a trusted intermediary.
//!
//! ## Design Principles
//!
//! 1. Contracts never keep their own tally of held funds. Balances are read
//!    live from the ledgers that own them and only ever compared.
//! 2. State transitions are explicit: enum variants, not boolean flags.
//! 3. Contract state lives in host storage, so a failed call rolls it back
//!    together with the balances it touched.
//! 4. Every state change emits an event. No event, no state change.

pub mod events;
pub mod token_escrow;

pub use events::EscrowEvent;
pub use token_escrow::{Agreement, AssetSide, EscrowError, EscrowState, EscrowTerms, TokenEscrow};
