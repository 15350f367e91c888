//! Error types for the host ledger.
//!
//! [`LedgerError`] covers the accounting failures of a single balance book
//! (the native bank or one token ledger). [`HostError`] is what the
//! [`crate::host::Host`] surfaces to contracts, wrapping ledger failures
//! together with storage, hook and configuration faults.

use thiserror::Error;

use crate::address::Address;

/// Accounting failures of a balance book.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// The debited account does not hold enough.
    #[error("insufficient balance: {account} has {available}, requested {requested}")]
    InsufficientBalance {
        /// The account being debited.
        account: Address,
        /// Its current balance.
        available: u64,
        /// The amount requested.
        requested: u64,
    },

    /// `transfer_from` exceeds what the owner approved for the spender.
    #[error(
        "insufficient allowance: {spender} may move {available} of {owner}'s tokens, requested {requested}"
    )]
    InsufficientAllowance {
        /// The token owner.
        owner: Address,
        /// The account spending on the owner's behalf.
        spender: Address,
        /// The remaining allowance.
        available: u64,
        /// The amount requested.
        requested: u64,
    },

    /// A credit would exceed `u64::MAX`.
    #[error("amount overflow")]
    Overflow,

    /// The zero address cannot receive funds.
    #[error("transfer to the zero address")]
    ZeroAddress,
}

/// Errors surfaced by the host to contracts and callers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    /// A balance book refused the operation.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// No token ledger is deployed at this address.
    #[error("unknown token ledger: {0}")]
    UnknownToken(Address),

    /// The receiving account's hook refused the credit.
    #[error("transfer rejected by {account}: {reason}")]
    Rejected {
        /// The account whose hook refused.
        account: Address,
        /// Human-readable reason supplied by the hook.
        reason: String,
    },

    /// The account is a contract and the call did not carry its key.
    #[error("unauthorized: {account} can only be debited by its own contract code")]
    Unauthorized {
        /// The contract account that was acted on.
        account: Address,
    },

    /// Contract storage could not be encoded or decoded.
    #[error("storage error: {0}")]
    Storage(String),

    /// Invalid configuration input.
    #[error("configuration error: {0}")]
    Config(String),
}
