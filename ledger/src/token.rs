//! # Fungible Token Ledgers
//!
//! A token ledger is an external balance book with its own accounting: the
//! escrow never stores token amounts itself, it only asks the ledger what
//! its own address holds and instructs the ledger to move tokens.
//!
//! [`TokenLedger`] is the capability contracts program against. It mirrors
//! the ERC-20 surface (`balanceOf`, `transfer`, `approve`, `transferFrom`)
//! so alternative ledgers, including test doubles that fail on demand,
//! can be deployed on the same [`crate::host::Host`].
//!
//! [`FungibleToken`] is the reference implementation: a plain in-memory
//! ledger whose whole initial supply is credited to its issuer.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::address::Address;
use crate::error::LedgerError;

// ---------------------------------------------------------------------------
// TokenMetadata
// ---------------------------------------------------------------------------

/// Descriptive metadata of a token. Display only; the ledger never divides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMetadata {
    /// Human-readable name, e.g. "TEST TOKEN".
    pub name: String,
    /// Ticker, e.g. "TT".
    pub symbol: String,
    /// Display decimals. `decimals = 2` renders 12345 as 123.45.
    pub decimals: u8,
}

impl TokenMetadata {
    /// Convenience constructor.
    pub fn new(name: &str, symbol: &str, decimals: u8) -> Self {
        Self {
            name: name.to_string(),
            symbol: symbol.to_string(),
            decimals,
        }
    }
}

// ---------------------------------------------------------------------------
// TokenLedger
// ---------------------------------------------------------------------------

/// The capability a fungible-token ledger exposes to the host.
///
/// `caller`, `owner` and `spender` are supplied by the host and are the
/// authenticated principals of the call; implementations must not trust any
/// other notion of identity.
pub trait TokenLedger: Send + std::fmt::Debug {
    /// Name, symbol and decimals.
    fn metadata(&self) -> &TokenMetadata;

    /// Total tokens in existence.
    fn total_supply(&self) -> u64;

    /// Balance held by `account`.
    fn balance_of(&self, account: &Address) -> u64;

    /// Remaining amount `spender` may move out of `owner`'s balance.
    fn allowance(&self, owner: &Address, spender: &Address) -> u64;

    /// Moves `amount` of the caller's own tokens to `to`.
    fn transfer(&mut self, caller: &Address, to: &Address, amount: u64) -> Result<(), LedgerError>;

    /// Sets the allowance of `spender` over `owner`'s tokens to `amount`.
    fn approve(&mut self, owner: &Address, spender: &Address, amount: u64) -> Result<(), LedgerError>;

    /// Moves `amount` from `from` to `to` on behalf of `spender`, consuming
    /// allowance.
    fn transfer_from(
        &mut self,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: u64,
    ) -> Result<(), LedgerError>;

    /// Clones the ledger behind a fresh box. Used by the host to snapshot
    /// state for atomic frames.
    fn clone_box(&self) -> Box<dyn TokenLedger>;
}

impl Clone for Box<dyn TokenLedger> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

// ---------------------------------------------------------------------------
// FungibleToken
// ---------------------------------------------------------------------------

/// In-memory ERC-20 style token ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FungibleToken {
    metadata: TokenMetadata,
    total_supply: u64,
    balances: HashMap<Address, u64>,
    /// `owner -> (spender -> remaining)`.
    allowances: HashMap<Address, HashMap<Address, u64>>,
}

impl FungibleToken {
    /// Creates a token and credits `initial_supply` to `issuer`.
    pub fn new(issuer: &Address, metadata: TokenMetadata, initial_supply: u64) -> Self {
        let mut balances = HashMap::new();
        if initial_supply > 0 {
            balances.insert(*issuer, initial_supply);
        }
        Self {
            metadata,
            total_supply: initial_supply,
            balances,
            allowances: HashMap::new(),
        }
    }

    fn move_balance(&mut self, from: &Address, to: &Address, amount: u64) -> Result<(), LedgerError> {
        if to.is_zero() {
            return Err(LedgerError::ZeroAddress);
        }

        let available = self.balance_of(from);
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                account: *from,
                available,
                requested: amount,
            });
        }
        if amount == 0 || from == to {
            return Ok(());
        }

        let credited = self
            .balance_of(to)
            .checked_add(amount)
            .ok_or(LedgerError::Overflow)?;
        self.balances.insert(*from, available - amount);
        self.balances.insert(*to, credited);
        Ok(())
    }
}

impl TokenLedger for FungibleToken {
    fn metadata(&self) -> &TokenMetadata {
        &self.metadata
    }

    fn total_supply(&self) -> u64 {
        self.total_supply
    }

    fn balance_of(&self, account: &Address) -> u64 {
        self.balances.get(account).copied().unwrap_or(0)
    }

    fn allowance(&self, owner: &Address, spender: &Address) -> u64 {
        self.allowances
            .get(owner)
            .and_then(|spenders| spenders.get(spender))
            .copied()
            .unwrap_or(0)
    }

    fn transfer(&mut self, caller: &Address, to: &Address, amount: u64) -> Result<(), LedgerError> {
        self.move_balance(caller, to, amount)
    }

    fn approve(&mut self, owner: &Address, spender: &Address, amount: u64) -> Result<(), LedgerError> {
        if spender.is_zero() {
            return Err(LedgerError::ZeroAddress);
        }
        self.allowances
            .entry(*owner)
            .or_default()
            .insert(*spender, amount);
        Ok(())
    }

    fn transfer_from(
        &mut self,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: u64,
    ) -> Result<(), LedgerError> {
        let available = self.allowance(from, spender);
        if available < amount {
            return Err(LedgerError::InsufficientAllowance {
                owner: *from,
                spender: *spender,
                available,
                requested: amount,
            });
        }

        self.move_balance(from, to, amount)?;

        // Only consume allowance once the move went through.
        if amount > 0 {
            self.allowances
                .entry(*from)
                .or_default()
                .insert(*spender, available - amount);
        }
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn TokenLedger> {
        Box::new(self.clone())
    }
}
