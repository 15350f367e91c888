//! # Host Execution Environment
//!
//! [`Host`] is the world a contract executes in. It owns every balance book
//! (the native bank and each deployed token ledger), contract storage, the
//! event log, and per-deployer nonces. Contracts never hold value
//! themselves: they ask the host what their address holds and tell the host
//! to move it.
//!
//! ## Identities
//!
//! There are two kinds of account:
//!
//! - **Externally owned** accounts belong to people. Whoever holds
//!   `&mut Host` signs for them, so the `Host` methods that take a `from`,
//!   `caller`, `owner` or `spender` act for that account.
//! - **Contract** accounts are deployed through
//!   [`Context::deploy_contract`] or [`Host::deploy_token`]. Only the
//!   [`ContractKey`] of a contract account can debit it, approve a spender
//!   for it, write its storage, emit events as it, or install its hook.
//!   [`Host::contract_key`] hands a key only to the code type that
//!   deployed the contract. A contract whose code type is private to its
//!   module therefore cannot be impersonated.
//!
//! ## Receive Hooks
//!
//! Any address may have a [`Receiver`]. After each non-zero credit to that
//! address, native or token, the host runs the receiver. The receiver gets
//! a [`Context`] whose caller is the credited account, never the host
//! itself. It can spend what that account owns and call contracts in that
//! account's name. It can refuse the credit (the transfer then fails) or
//! call back into the contract that is paying it. Every contract on this
//! host must defend against that re-entry.
//!
//! ## Atomic Frames
//!
//! [`Host::atomic`] runs a closure against a snapshot of the world. If the
//! closure returns `Err`, every balance, storage slot, event, nonce and
//! contract registration is restored. Frames nest; each transfer runs in
//! its own frame so that a refusing receiver undoes the credit it refused.
//! Registered receivers are not part of the snapshot.

use serde::{Deserialize, Serialize};
use std::any::TypeId;
use std::collections::HashMap;
use tracing::{debug, info, trace};

use crate::address::Address;
use crate::config::{HostConfig, NATIVE_SYMBOL, TOPIC_APPROVAL, TOPIC_TRANSFER};
use crate::context::{Context, ContractKey};
use crate::error::HostError;
use crate::events::{ApprovalPayload, EventRecord, TransferPayload};
use crate::native::NativeBank;
use crate::storage::ContractStorage;
use crate::token::{FungibleToken, TokenLedger, TokenMetadata};

// ---------------------------------------------------------------------------
// Receipts & Receivers
// ---------------------------------------------------------------------------

/// The two kinds of asset the host moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetKind {
    /// The host's native currency.
    Native,
    /// A balance in a deployed token ledger.
    Token,
}

impl std::fmt::Display for AssetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssetKind::Native => write!(f, "Native"),
            AssetKind::Token => write!(f, "Token"),
        }
    }
}

/// Description of a completed credit, handed to the recipient's hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    /// Which asset moved.
    pub asset: AssetKind,
    /// The token ledger, for [`AssetKind::Token`].
    pub token: Option<Address>,
    /// Whose balance was debited.
    pub from: Address,
    /// Whose balance was credited (the hook's owner).
    pub to: Address,
    /// Amount credited.
    pub amount: u64,
}

/// Code that runs when an address receives funds.
///
/// `ctx.caller()` is the credited account. Returning `Err(reason)` refuses
/// the credit and fails the transfer.
pub trait Receiver: Send {
    fn on_receive(&mut self, ctx: &mut Context<'_>, receipt: &Receipt) -> Result<(), String>;
}

impl<F> Receiver for F
where
    F: FnMut(&mut Context<'_>, &Receipt) -> Result<(), String> + Send,
{
    fn on_receive(&mut self, ctx: &mut Context<'_>, receipt: &Receipt) -> Result<(), String> {
        self(ctx, receipt)
    }
}

/// Code type of token ledger accounts. Private, so nobody can obtain the
/// key of a token address.
struct TokenCode;

// ---------------------------------------------------------------------------
// World State
// ---------------------------------------------------------------------------

/// Everything an atomic frame snapshots.
#[derive(Debug, Clone, Default)]
struct WorldState {
    bank: NativeBank,
    tokens: HashMap<Address, Box<dyn TokenLedger>>,
    /// Contract account -> code type that deployed it.
    contracts: HashMap<Address, TypeId>,
    storage: ContractStorage,
    events: Vec<EventRecord>,
    nonces: HashMap<Address, u64>,
}

// ---------------------------------------------------------------------------
// Host
// ---------------------------------------------------------------------------

/// The host execution environment.
pub struct Host {
    config: HostConfig,
    world: WorldState,
    receivers: HashMap<Address, Box<dyn Receiver>>,
    depth: usize,
}

impl Default for Host {
    fn default() -> Self {
        Self::new(HostConfig::default())
    }
}

impl Host {
    /// Creates an empty world.
    pub fn new(config: HostConfig) -> Self {
        debug!(network = %config.network, native = NATIVE_SYMBOL, "host created");
        Self {
            config,
            world: WorldState::default(),
            receivers: HashMap::new(),
            depth: 0,
        }
    }

    /// The configuration this host was built with.
    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// Current atomic frame nesting depth. Zero outside any frame.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// A call context acting as `caller`.
    ///
    /// A context whose caller is a contract can read the world and call
    /// other contracts, but it cannot spend for that contract. Spending
    /// takes the contract's key.
    pub fn call_as(&mut self, caller: Address) -> Context<'_> {
        Context::new(self, caller)
    }

    // -----------------------------------------------------------------------
    // Atomic frames
    // -----------------------------------------------------------------------

    /// Runs `f` with all-or-nothing semantics.
    ///
    /// On `Err`, the world is restored to exactly what it was before `f` ran
    /// and the error is passed through.
    pub fn atomic<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Host) -> Result<T, E>,
    {
        let snapshot = self.world.clone();
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;

        if result.is_err() {
            self.world = snapshot;
            trace!(depth = self.depth, "atomic frame rolled back");
        }
        result
    }

    // -----------------------------------------------------------------------
    // Deployment & Identities
    // -----------------------------------------------------------------------

    /// Returns the next contract address for `deployer` and bumps its nonce.
    pub(crate) fn next_contract_address(&mut self, deployer: &Address) -> Address {
        let nonce = self.world.nonces.entry(*deployer).or_insert(0);
        let address = Address::contract(deployer, *nonce);
        *nonce += 1;
        address
    }

    /// Number of contracts `deployer` has deployed so far.
    pub fn deployment_nonce(&self, deployer: &Address) -> u64 {
        self.world.nonces.get(deployer).copied().unwrap_or(0)
    }

    /// Returns `true` if `account` is a contract account.
    pub fn is_contract(&self, account: &Address) -> bool {
        self.world.contracts.contains_key(account)
    }

    /// Issues the key of `address` to code of type `C`.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::Unauthorized`] unless `address` is a contract
    /// that was deployed as `C`.
    pub fn contract_key<C: 'static>(&self, address: &Address) -> Result<ContractKey, HostError> {
        match self.world.contracts.get(address) {
            Some(code) if *code == TypeId::of::<C>() => Ok(ContractKey::new(*address)),
            _ => Err(HostError::Unauthorized { account: *address }),
        }
    }

    pub(crate) fn deploy_contract<C: 'static>(&mut self, deployer: &Address) -> ContractKey {
        let address = self.next_contract_address(deployer);
        self.world.contracts.insert(address, TypeId::of::<C>());
        // Whatever was registered at the predicted address is not the contract.
        self.receivers.remove(&address);
        debug!(contract = %address, %deployer, "contract deployed");
        ContractKey::new(address)
    }

    /// Deploys an arbitrary token ledger and returns its address.
    pub fn deploy_token(&mut self, deployer: &Address, ledger: Box<dyn TokenLedger>) -> Address {
        let address = self.deploy_contract::<TokenCode>(deployer).address();
        info!(
            token = %address,
            symbol = %ledger.metadata().symbol,
            supply = ledger.total_supply(),
            "token ledger deployed"
        );
        self.world.tokens.insert(address, ledger);
        address
    }

    /// Deploys a [`FungibleToken`] whose whole supply belongs to `issuer`.
    pub fn issue_token(&mut self, issuer: &Address, metadata: TokenMetadata, supply: u64) -> Address {
        self.deploy_token(issuer, Box::new(FungibleToken::new(issuer, metadata, supply)))
    }

    /// Installs the receive hook of the externally owned `address`,
    /// replacing any previous one.
    pub fn register_receiver(&mut self, address: Address, receiver: Box<dyn Receiver>) -> Result<(), HostError> {
        self.authorize(&address)?;
        self.install_receiver(address, receiver);
        Ok(())
    }

    /// Installs the receive hook of the contract `key` stands for.
    pub fn register_contract_receiver(&mut self, key: &ContractKey, receiver: Box<dyn Receiver>) -> Result<(), HostError> {
        self.check_key(key)?;
        self.install_receiver(key.address(), receiver);
        Ok(())
    }

    /// Returns `true` if `address` has a receive hook.
    pub fn has_receiver(&self, address: &Address) -> bool {
        self.receivers.contains_key(address)
    }

    fn install_receiver(&mut self, address: Address, receiver: Box<dyn Receiver>) {
        debug!(account = %address, replaced = self.has_receiver(&address), "receiver registered");
        self.receivers.insert(address, receiver);
    }

    /// Externally owned accounts only.
    pub(crate) fn authorize(&self, account: &Address) -> Result<(), HostError> {
        if self.is_contract(account) {
            return Err(HostError::Unauthorized { account: *account });
        }
        Ok(())
    }

    /// A key minted inside a rolled-back frame is dead.
    pub(crate) fn check_key(&self, key: &ContractKey) -> Result<(), HostError> {
        if !self.is_contract(&key.address()) {
            return Err(HostError::Unauthorized { account: key.address() });
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Native currency
    // -----------------------------------------------------------------------

    /// Native balance of `account`.
    pub fn native_balance(&self, account: &Address) -> u64 {
        self.world.bank.balance_of(account)
    }

    /// Faucet: creates native currency for an externally owned account.
    /// Does not run hooks.
    pub fn mint_native(&mut self, to: &Address, amount: u64) -> Result<u64, HostError> {
        self.authorize(to)?;
        Ok(self.world.bank.mint(to, amount)?)
    }

    /// Moves native currency out of the externally owned `from`.
    pub fn transfer_native(&mut self, from: &Address, to: &Address, amount: u64) -> Result<(), HostError> {
        self.authorize(from)?;
        self.move_native(from, to, amount)
    }

    pub(crate) fn move_native(&mut self, from: &Address, to: &Address, amount: u64) -> Result<(), HostError> {
        self.atomic(|host| -> Result<(), HostError> {
            host.world.bank.transfer(from, to, amount)?;
            debug!(%from, %to, amount, "native transfer");
            host.notify(Receipt {
                asset: AssetKind::Native,
                token: None,
                from: *from,
                to: *to,
                amount,
            })
        })
    }

    // -----------------------------------------------------------------------
    // Tokens
    // -----------------------------------------------------------------------

    /// Read access to the token ledger at `token`.
    pub fn token(&self, token: &Address) -> Result<&dyn TokenLedger, HostError> {
        self.world
            .tokens
            .get(token)
            .map(|ledger| ledger.as_ref())
            .ok_or(HostError::UnknownToken(*token))
    }

    /// Token balance of `account`, always read live from the ledger.
    pub fn token_balance(&self, token: &Address, account: &Address) -> Result<u64, HostError> {
        Ok(self.token(token)?.balance_of(account))
    }

    /// Remaining allowance of `spender` over `owner`'s tokens.
    pub fn token_allowance(&self, token: &Address, owner: &Address, spender: &Address) -> Result<u64, HostError> {
        Ok(self.token(token)?.allowance(owner, spender))
    }

    /// `transfer` on the token ledger, signed by the externally owned
    /// `caller`.
    pub fn token_transfer(
        &mut self,
        token: &Address,
        caller: &Address,
        to: &Address,
        amount: u64,
    ) -> Result<(), HostError> {
        self.authorize(caller)?;
        self.move_tokens(token, caller, to, amount)
    }

    /// `transferFrom` on the token ledger, signed by the externally owned
    /// `spender`.
    pub fn token_transfer_from(
        &mut self,
        token: &Address,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: u64,
    ) -> Result<(), HostError> {
        self.authorize(spender)?;
        self.move_tokens_from(token, spender, from, to, amount)
    }

    /// `approve` on the token ledger, signed by the externally owned `owner`.
    pub fn token_approve(
        &mut self,
        token: &Address,
        owner: &Address,
        spender: &Address,
        amount: u64,
    ) -> Result<(), HostError> {
        self.authorize(owner)?;
        self.token_mut(token)?.approve(owner, spender, amount)?;
        if self.config.record_token_events {
            let payload = ApprovalPayload {
                owner: *owner,
                spender: *spender,
                amount,
            };
            self.record(*token, TOPIC_APPROVAL, &payload)?;
        }
        Ok(())
    }

    pub(crate) fn move_tokens(&mut self, token: &Address, caller: &Address, to: &Address, amount: u64) -> Result<(), HostError> {
        self.atomic(|host| -> Result<(), HostError> {
            host.token_mut(token)?.transfer(caller, to, amount)?;
            host.after_token_move(token, caller, to, amount)
        })
    }

    pub(crate) fn move_tokens_from(
        &mut self,
        token: &Address,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: u64,
    ) -> Result<(), HostError> {
        self.atomic(|host| -> Result<(), HostError> {
            host.token_mut(token)?.transfer_from(spender, from, to, amount)?;
            host.after_token_move(token, from, to, amount)
        })
    }

    fn token_mut(&mut self, token: &Address) -> Result<&mut Box<dyn TokenLedger>, HostError> {
        self.world
            .tokens
            .get_mut(token)
            .ok_or(HostError::UnknownToken(*token))
    }

    fn after_token_move(&mut self, token: &Address, from: &Address, to: &Address, amount: u64) -> Result<(), HostError> {
        debug!(%token, %from, %to, amount, "token transfer");
        if self.config.record_token_events {
            let payload = TransferPayload {
                from: *from,
                to: *to,
                amount,
            };
            self.record(*token, TOPIC_TRANSFER, &payload)?;
        }
        self.notify(Receipt {
            asset: AssetKind::Token,
            token: Some(*token),
            from: *from,
            to: *to,
            amount,
        })
    }

    /// Runs the hook of `receipt.to`, if any, acting as `receipt.to`.
    ///
    /// The hook is taken out of the registry while it runs, so a credit to
    /// the same address from inside its own hook does not recurse.
    fn notify(&mut self, receipt: Receipt) -> Result<(), HostError> {
        if receipt.amount == 0 {
            return Ok(());
        }
        let Some(mut receiver) = self.receivers.remove(&receipt.to) else {
            return Ok(());
        };

        trace!(account = %receipt.to, asset = %receipt.asset, "running receive hook");
        let outcome = receiver.on_receive(&mut Context::new(self, receipt.to), &receipt);
        self.receivers.entry(receipt.to).or_insert(receiver);

        outcome.map_err(|reason| {
            debug!(account = %receipt.to, %reason, "credit refused by receiver");
            HostError::Rejected {
                account: receipt.to,
                reason,
            }
        })
    }

    // -----------------------------------------------------------------------
    // Storage
    // -----------------------------------------------------------------------

    /// Reads a contract storage slot. Storage is public.
    pub fn storage_get<T: serde::de::DeserializeOwned>(&self, contract: &Address, key: &str) -> Result<Option<T>, HostError> {
        self.world.storage.get(contract, key)
    }

    pub(crate) fn storage_set<T: Serialize>(&mut self, contract: &ContractKey, key: &str, value: &T) -> Result<(), HostError> {
        self.check_key(contract)?;
        self.world.storage.set(&contract.address(), key, value)
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    /// Appends a record emitted by the contract `key` stands for. Contract
    /// records are always kept, whatever the configuration says.
    pub(crate) fn emit<P: Serialize>(&mut self, key: &ContractKey, topic: &str, payload: &P) -> Result<(), HostError> {
        self.check_key(key)?;
        self.record(key.address(), topic, payload)
    }

    fn record<P: Serialize>(&mut self, emitter: Address, topic: &str, payload: &P) -> Result<(), HostError> {
        let value = serde_json::to_value(payload)
            .map_err(|e| HostError::Storage(format!("encode {} event: {}", topic, e)))?;
        self.world.events.push(EventRecord::new(emitter, topic, value));
        Ok(())
    }

    /// Every record, oldest first.
    pub fn events(&self) -> &[EventRecord] {
        &self.world.events
    }

    /// Records emitted by `emitter`, oldest first.
    pub fn events_from<'a>(&'a self, emitter: &'a Address) -> impl Iterator<Item = &'a EventRecord> + 'a {
        self.world.events.iter().filter(move |record| &record.emitter == emitter)
    }
}
