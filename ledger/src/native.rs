//! # Native Currency Bank
//!
//! The bank holds the host's base unit of value: the balance attached to each
//! [`Address`]. A contract's "vault" is simply its own entry in this map:
//! anything transferred to the contract's address is held by the contract.
//!
//! All amounts are `u64` in the smallest unit. Every credit is overflow
//! checked and every debit is balance checked; a failed operation leaves the
//! bank untouched.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::address::Address;
use crate::error::LedgerError;

/// Native-currency balances keyed by address.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NativeBank {
    balances: HashMap<Address, u64>,
    total_supply: u64,
}

impl NativeBank {
    /// Creates an empty bank.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the balance of `account` (zero if it was never credited).
    pub fn balance_of(&self, account: &Address) -> u64 {
        self.balances.get(account).copied().unwrap_or(0)
    }

    /// Total amount of native currency in existence.
    pub fn total_supply(&self) -> u64 {
        self.total_supply
    }

    /// Creates `amount` out of thin air and credits it to `to`.
    ///
    /// This is the genesis / faucet path; nothing in a contract should call it.
    pub fn mint(&mut self, to: &Address, amount: u64) -> Result<u64, LedgerError> {
        let supply = self
            .total_supply
            .checked_add(amount)
            .ok_or(LedgerError::Overflow)?;
        let balance = self
            .balance_of(to)
            .checked_add(amount)
            .ok_or(LedgerError::Overflow)?;

        self.total_supply = supply;
        self.balances.insert(*to, balance);
        Ok(balance)
    }

    /// Moves `amount` from `from` to `to`.
    ///
    /// A zero amount succeeds without touching anything.
    ///
    /// # Errors
    ///
    /// [`LedgerError::ZeroAddress`] if `to` is the zero address,
    /// [`LedgerError::InsufficientBalance`] if `from` holds less than `amount`,
    /// [`LedgerError::Overflow`] if the credit overflows.
    pub fn transfer(&mut self, from: &Address, to: &Address, amount: u64) -> Result<(), LedgerError> {
        if to.is_zero() {
            return Err(LedgerError::ZeroAddress);
        }
        if amount == 0 || from == to {
            return self.check_available(from, amount);
        }

        self.check_available(from, amount)?;
        let credited = self
            .balance_of(to)
            .checked_add(amount)
            .ok_or(LedgerError::Overflow)?;
        let debited = self.balance_of(from) - amount;

        self.balances.insert(*from, debited);
        self.balances.insert(*to, credited);
        Ok(())
    }

    fn check_available(&self, account: &Address, amount: u64) -> Result<(), LedgerError> {
        let available = self.balance_of(account);
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                account: *account,
                available,
                requested: amount,
            });
        }
        Ok(())
    }
}
