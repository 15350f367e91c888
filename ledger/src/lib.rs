// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Swap Ledger — Host Execution Environment
//!
//! The ledger is everything an escrow contract runs *on top of* but does not
//! own: account addresses, the native-currency bank, external fungible-token
//! ledgers, contract storage, and the audit log of emitted events.
//!
//! ## Architecture
//!
//! - **address** — 32-byte account identifiers, derived with BLAKE3.
//! - **native** — The native-currency bank. Balances attached to addresses.
//! - **token** — The `TokenLedger` capability and an in-memory ERC-20 style
//!   implementation.
//! - **storage** — Per-contract key/value storage, bincode encoded.
//! - **events** — Append-only event records emitted by tokens and contracts.
//! - **host** — Ties it together: transfers, receive hooks, atomic frames.
//! - **context** — Per-account call contexts and the contract keys that
//!   gate every action on a contract account.
//! - **config** — Constants and the `HostConfig` loader.
//! - **logging** — `tracing` subscriber setup.
//!
//! ## Execution Model
//!
//! 1. Every call runs to completion. There are no suspension points.
//! 2. A credit to an address with a registered [`host::Receiver`] runs that
//!    receiver synchronously. This is where foreign code can re-enter a
//!    contract, and contracts must be written with that in mind.
//! 3. A contract account is only ever acted on through its
//!    [`context::ContractKey`]. Hooks act as the account they run for.
//! 4. [`host::Host::atomic`] gives a call all-or-nothing semantics: if the
//!    closure fails, balances, storage, events, nonces and deployments are
//!    restored.

pub mod address;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod host;
pub mod logging;
pub mod native;
pub mod storage;
pub mod token;

pub use address::Address;
pub use context::{Context, ContractKey};
pub use error::{HostError, LedgerError};
pub use events::EventRecord;
pub use host::{AssetKind, Host, Receipt, Receiver};
pub use native::NativeBank;
pub use token::{FungibleToken, TokenLedger, TokenMetadata};
