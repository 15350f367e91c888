//! # Call Contexts & Contract Keys
//!
//! A [`Context`] is the host as seen by one account: every spending call
//! made through it debits [`Context::caller`] and nobody else. Contracts
//! receive a context when they are called, and receive hooks receive one
//! whose caller is the credited account.
//!
//! A [`ContractKey`] is what lets contract code act for its own address:
//! pay out of it, pull approved tokens into it, write its storage, emit
//! its events and install its receive hook. Keys cannot be built or cloned
//! outside this crate. Code obtains one by deploying a contract
//! ([`Context::deploy_contract`]) or by presenting the code type the
//! contract was deployed as ([`crate::host::Host::contract_key`]).

use serde::Serialize;

use crate::address::Address;
use crate::error::HostError;
use crate::host::{Host, Receiver};

/// Proof that the holder is the code of the contract at [`address`](Self::address).
#[derive(Debug, PartialEq, Eq)]
pub struct ContractKey {
    address: Address,
}

impl ContractKey {
    pub(crate) fn new(address: Address) -> Self {
        Self { address }
    }

    /// The contract account this key controls.
    pub fn address(&self) -> Address {
        self.address
    }
}

/// The host, acting as one account.
pub struct Context<'a> {
    host: &'a mut Host,
    caller: Address,
}

impl<'a> Context<'a> {
    pub(crate) fn new(host: &'a mut Host, caller: Address) -> Self {
        Self { host, caller }
    }

    /// The account this context acts for.
    pub fn caller(&self) -> Address {
        self.caller
    }

    /// Read-only view of the world.
    pub fn host(&self) -> &Host {
        &*self.host
    }

    /// [`Host::atomic`] for the same caller.
    pub fn atomic<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Context<'_>) -> Result<T, E>,
    {
        let caller = self.caller;
        self.host.atomic(|host| f(&mut Context::new(host, caller)))
    }

    // -----------------------------------------------------------------------
    // Spending as the caller
    // -----------------------------------------------------------------------

    /// Sends native currency from the caller.
    pub fn transfer_native(&mut self, to: &Address, amount: u64) -> Result<(), HostError> {
        let caller = self.caller;
        self.host.transfer_native(&caller, to, amount)
    }

    /// Sends tokens from the caller.
    pub fn token_transfer(&mut self, token: &Address, to: &Address, amount: u64) -> Result<(), HostError> {
        let caller = self.caller;
        self.host.token_transfer(token, &caller, to, amount)
    }

    /// Lets `spender` move up to `amount` of the caller's tokens.
    pub fn token_approve(&mut self, token: &Address, spender: &Address, amount: u64) -> Result<(), HostError> {
        let caller = self.caller;
        self.host.token_approve(token, &caller, spender, amount)
    }

    /// Spends an allowance `from` granted to the caller.
    pub fn token_transfer_from(
        &mut self,
        token: &Address,
        from: &Address,
        to: &Address,
        amount: u64,
    ) -> Result<(), HostError> {
        let caller = self.caller;
        self.host.token_transfer_from(token, &caller, from, to, amount)
    }

    // -----------------------------------------------------------------------
    // Contracts
    // -----------------------------------------------------------------------

    /// Deploys a contract of code type `C` at the caller's next contract
    /// address and returns its key.
    pub fn deploy_contract<C: 'static>(&mut self) -> Result<ContractKey, HostError> {
        let caller = self.caller;
        self.host.authorize(&caller)?;
        Ok(self.host.deploy_contract::<C>(&caller))
    }

    /// See [`Host::contract_key`].
    pub fn contract_key<C: 'static>(&self, address: &Address) -> Result<ContractKey, HostError> {
        self.host.contract_key::<C>(address)
    }

    /// Pays native currency out of the contract.
    pub fn pay_native(&mut self, key: &ContractKey, to: &Address, amount: u64) -> Result<(), HostError> {
        self.host.check_key(key)?;
        self.host.move_native(&key.address(), to, amount)
    }

    /// Pays tokens out of the contract.
    pub fn pay_tokens(&mut self, key: &ContractKey, token: &Address, to: &Address, amount: u64) -> Result<(), HostError> {
        self.host.check_key(key)?;
        self.host.move_tokens(token, &key.address(), to, amount)
    }

    /// Pulls `amount` tokens that `from` approved for the contract into the
    /// contract.
    pub fn collect_tokens(&mut self, key: &ContractKey, token: &Address, from: &Address, amount: u64) -> Result<(), HostError> {
        self.host.check_key(key)?;
        let contract = key.address();
        self.host.move_tokens_from(token, &contract, from, &contract, amount)
    }

    /// Writes one of the contract's storage slots.
    pub fn storage_set<T: Serialize>(&mut self, key: &ContractKey, slot: &str, value: &T) -> Result<(), HostError> {
        self.host.storage_set(key, slot, value)
    }

    /// Records an event emitted by the contract.
    pub fn emit<P: Serialize>(&mut self, key: &ContractKey, topic: &str, payload: &P) -> Result<(), HostError> {
        self.host.emit(key, topic, payload)
    }

    /// Installs the contract's receive hook.
    pub fn register_contract_receiver(&mut self, key: &ContractKey, receiver: Box<dyn Receiver>) -> Result<(), HostError> {
        self.host.register_contract_receiver(key, receiver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenMetadata;

    struct Jar;

    #[test]
    fn caller_spends_only_its_own_funds() {
        let mut host = Host::default();
        let alice = Address::from_label("alice");
        let bob = Address::from_label("bob");
        host.mint_native(&alice, 50).unwrap();
        host.mint_native(&bob, 50).unwrap();

        let mut ctx = host.call_as(alice);
        assert_eq!(ctx.caller(), alice);
        ctx.transfer_native(&bob, 20).unwrap();
        assert_eq!(ctx.host().native_balance(&bob), 70);

        assert_eq!(host.native_balance(&alice), 30);
    }

    #[test]
    fn contract_collects_approved_tokens() {
        let mut host = Host::default();
        let alice = Address::from_label("alice");
        let token = host.issue_token(&alice, TokenMetadata::new("T", "T", 0), 100);

        let mut ctx = host.call_as(alice);
        let key = ctx.deploy_contract::<Jar>().unwrap();
        ctx.token_approve(&token, &key.address(), 30).unwrap();
        ctx.collect_tokens(&key, &token, &alice, 30).unwrap();

        assert_eq!(host.token_balance(&token, &key.address()).unwrap(), 30);
        assert_eq!(host.token_allowance(&token, &alice, &key.address()).unwrap(), 0);
    }

    #[test]
    fn contracts_cannot_deploy_without_a_key() {
        let mut host = Host::default();
        let key = host.call_as(Address::from_label("alice")).deploy_contract::<Jar>().unwrap();
        let err = host.call_as(key.address()).deploy_contract::<Jar>().unwrap_err();
        assert_eq!(err, HostError::Unauthorized { account: key.address() });
        assert_eq!(host.deployment_nonce(&key.address()), 0);
    }

    #[test]
    fn nested_frame_keeps_the_caller() {
        let mut host = Host::default();
        let alice = Address::from_label("alice");
        let seen = host
            .call_as(alice)
            .atomic(|ctx| -> Result<Address, HostError> { Ok(ctx.caller()) })
            .unwrap();
        assert_eq!(seen, alice);
    }
}
