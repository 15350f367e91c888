//! # Token Swap Escrow Contract
//!
//! Mediates a trade of a fungible token for native currency between two
//! parties who do not trust each other. The lifecycle is:
//!
//! 1. **Create** — the creator names the token ledger, the agreed amounts of
//!    both assets and the trade partner, and deposits exactly their own side
//!    (native currency *or* tokens) into the new escrow.
//! 2. **Fund** — the trade partner, or anyone acting for them, transfers the
//!    other side to the escrow's address. Any number of partial deposits is
//!    fine; nothing is counted, balances are compared at settlement.
//! 3. **Settle** — anyone may trigger the swap once the escrow holds at least
//!    both agreed amounts. Each party receives the other's deposit.
//! 4. **Cancel** — until settlement, the creator may unwind the trade. Every
//!    held balance goes back to the party that funds that side.
//!
//! `Settled` and `Cancelled` are terminal. An escrow in a terminal state
//! holds nothing and refuses further deposits.
//!
//! ## Custody
//!
//! The escrow keeps no amounts of its own. What it holds is whatever the
//! host's native bank and the token ledger report for its address, read
//! fresh on every check.
//!
//! ## Identity
//!
//! Escrow accounts are deployed with a code type private to this module,
//! so only this module can obtain an escrow's
//! [`ContractKey`](swap_ledger::ContractKey) and move what it holds. Every
//! caller, including a receive hook being paid by the escrow, reaches it
//! through a [`Context`] that acts as that caller and nobody else.
//!
//! ## Re-entrancy
//!
//! Paying a party runs that party's receive hook, which may call straight
//! back into `cancel` or `settle`. Both operations therefore persist their
//! terminal state *before* the first transfer, so any nested call finds the
//! escrow finalized. Both run inside a host atomic frame: if any transfer
//! fails, the terminal state is rolled back with the balances and the escrow
//! is `Open` again, untouched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use swap_ledger::{Address, AssetKind, Context, ContractKey, Host, HostError, Receipt, Receiver};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::events::EscrowEvent;

/// Storage key of the escrow record.
pub const RECORD_KEY: &str = "escrow";

/// Code type every escrow account is deployed as.
struct EscrowCode;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during escrow operations.
#[derive(Debug, Error)]
pub enum EscrowError {
    /// The agreement itself is unacceptable (zero amounts, self-trade, ...).
    #[error("invalid agreement: {reason}")]
    InvalidAgreement {
        /// What is wrong with it.
        reason: String,
    },

    /// The creator's deposit did not match the agreed amount of its side, or
    /// could not be collected.
    #[error("insufficient funding: {side} deposit of {supplied} does not meet the agreed {required}")]
    InsufficientFunding {
        /// The side the creator tried to fund.
        side: AssetKind,
        /// The agreed amount for that side.
        required: u64,
        /// The amount supplied.
        supplied: u64,
        /// Why the ledger refused to collect it, if it was asked to.
        #[source]
        source: Option<HostError>,
    },

    /// Only the creator may cancel.
    #[error("unauthorized: {caller} is not the escrow creator")]
    Unauthorized {
        /// The rejected caller.
        caller: Address,
    },

    /// Settlement attempted before both sides were deposited in full.
    #[error(
        "under-funded: holding {held_ether}/{agreed_ether} native and {held_tokens}/{agreed_tokens} tokens"
    )]
    UnderFunded {
        /// Native currency currently held.
        held_ether: u64,
        /// Native currency required.
        agreed_ether: u64,
        /// Tokens currently held.
        held_tokens: u64,
        /// Tokens required.
        agreed_tokens: u64,
    },

    /// The escrow already reached a terminal state.
    #[error("escrow already finalized: {state}")]
    AlreadyFinalized {
        /// The terminal state it is in.
        state: EscrowState,
    },

    /// The ledger or a recipient refused a payout. Nothing was changed.
    #[error("external transfer failed: {0}")]
    ExternalTransferFailed(#[source] HostError),

    /// No escrow record exists at this address.
    #[error("no escrow deployed at {0}")]
    NotFound(Address),

    /// A host fault unrelated to value movement (storage, events).
    #[error("host error: {0}")]
    Host(#[from] HostError),
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Lifecycle state of an escrow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EscrowState {
    /// Accepting deposits; may be settled or cancelled.
    Open,
    /// The swap happened.
    Settled,
    /// The creator unwound the trade.
    Cancelled,
}

impl EscrowState {
    /// `Settled` and `Cancelled` never change again.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, EscrowState::Open)
    }
}

impl std::fmt::Display for EscrowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EscrowState::Open => write!(f, "Open"),
            EscrowState::Settled => write!(f, "Settled"),
            EscrowState::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// One side of the trade together with an amount.
///
/// Used for the creator's initial deposit, which is exactly one of the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetSide {
    /// Native currency attached to the creation call.
    Native(u64),
    /// Tokens pulled from the creator via `transferFrom`.
    Token(u64),
}

impl AssetSide {
    /// Which asset this side is.
    pub fn kind(&self) -> AssetKind {
        match self {
            AssetSide::Native(_) => AssetKind::Native,
            AssetSide::Token(_) => AssetKind::Token,
        }
    }

    /// The amount on this side.
    pub fn amount(&self) -> u64 {
        match self {
            AssetSide::Native(amount) | AssetSide::Token(amount) => *amount,
        }
    }
}

/// What the creator proposes: the token, both amounts, the counterpart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agreement {
    /// Ledger of the traded token.
    pub traded_token: Address,
    /// Native currency the trade requires. Must be positive.
    pub agreed_ether: u64,
    /// Tokens the trade requires. Must be positive.
    pub agreed_tokens: u64,
    /// The counterpart.
    pub trade_partner: Address,
}

/// The immutable terms of a deployed escrow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowTerms {
    /// Who deployed the escrow.
    pub creator: Address,
    /// The counterpart.
    pub trade_partner: Address,
    /// Ledger of the traded token.
    pub traded_token: Address,
    /// Native currency the trade requires.
    pub agreed_ether: u64,
    /// Tokens the trade requires.
    pub agreed_tokens: u64,
    /// The side the creator funded at setup. The trade partner funds the other.
    pub creator_side: AssetKind,
}

impl EscrowTerms {
    /// The agreed amount of `asset`.
    pub fn agreed(&self, asset: AssetKind) -> u64 {
        match asset {
            AssetKind::Native => self.agreed_ether,
            AssetKind::Token => self.agreed_tokens,
        }
    }

    /// The party that funds `asset`, and gets it back on cancellation.
    pub fn depositor_of(&self, asset: AssetKind) -> Address {
        if asset == self.creator_side {
            self.creator
        } else {
            self.trade_partner
        }
    }

    /// The party that receives `asset` on settlement.
    pub fn recipient_of(&self, asset: AssetKind) -> Address {
        if asset == self.creator_side {
            self.trade_partner
        } else {
            self.creator
        }
    }
}

/// What is persisted in host storage under [`RECORD_KEY`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EscrowRecord {
    terms: EscrowTerms,
    state: EscrowState,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl EscrowRecord {
    fn ensure_open(&self) -> Result<(), EscrowError> {
        if self.state.is_terminal() {
            return Err(EscrowError::AlreadyFinalized { state: self.state });
        }
        Ok(())
    }

    fn finalize(&mut self, state: EscrowState) {
        self.state = state;
        self.updated_at = Utc::now();
    }
}

// ---------------------------------------------------------------------------
// TokenEscrow
// ---------------------------------------------------------------------------

/// Handle to a deployed escrow.
///
/// The handle caches the immutable terms; the mutable state lives in host
/// storage and is read on every call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenEscrow {
    address: Address,
    terms: EscrowTerms,
}

impl TokenEscrow {
    /// Deploys a new escrow funded with the creator's side of the trade.
    ///
    /// A native deposit must equal `agreed_ether` exactly and is taken from
    /// the creator's native balance. A token deposit must equal
    /// `agreed_tokens` exactly and is pulled with `transferFrom`, so the
    /// creator must have approved the escrow's future address first (see
    /// [`TokenEscrow::predict_address`]).
    ///
    /// The caller of `ctx` is the creator. Creation is all-or-nothing: on
    /// error no escrow exists and no funds moved.
    ///
    /// # Errors
    ///
    /// Returns [`EscrowError::InvalidAgreement`] for a zero amount, a
    /// self-trade, a trade with the escrow's own address, a zero trade
    /// partner or an unknown token ledger.
    /// Returns [`EscrowError::InsufficientFunding`] if the deposit does not
    /// match its agreed amount or the ledger refuses to collect it.
    pub fn create(ctx: &mut Context<'_>, agreement: Agreement, deposit: AssetSide) -> Result<Self, EscrowError> {
        let creator = ctx.caller();
        validate(ctx.host(), &creator, &agreement)?;

        let terms = EscrowTerms {
            creator,
            trade_partner: agreement.trade_partner,
            traded_token: agreement.traded_token,
            agreed_ether: agreement.agreed_ether,
            agreed_tokens: agreement.agreed_tokens,
            creator_side: deposit.kind(),
        };

        let required = terms.agreed(deposit.kind());
        if deposit.amount() != required {
            return Err(EscrowError::InsufficientFunding {
                side: deposit.kind(),
                required,
                supplied: deposit.amount(),
                source: None,
            });
        }

        let (escrow, key) = ctx.atomic(|ctx| -> Result<(Self, ContractKey), EscrowError> {
            let key = ctx.deploy_contract::<EscrowCode>()?;
            let address = key.address();

            let collected = match deposit {
                AssetSide::Native(amount) => ctx.transfer_native(&address, amount),
                AssetSide::Token(amount) => ctx.collect_tokens(&key, &terms.traded_token, &creator, amount),
            };
            collected.map_err(|e| EscrowError::InsufficientFunding {
                side: deposit.kind(),
                required,
                supplied: deposit.amount(),
                source: Some(e),
            })?;

            let now = Utc::now();
            let record = EscrowRecord {
                terms: terms.clone(),
                state: EscrowState::Open,
                created_at: now,
                updated_at: now,
            };
            ctx.storage_set(&key, RECORD_KEY, &record)?;

            EscrowEvent::Funded {
                depositor: creator,
                asset: deposit.kind(),
                amount: deposit.amount(),
            }
            .emit(ctx, &key)?;

            Ok((Self { address, terms }, key))
        })?;

        ctx.register_contract_receiver(&key, Box::new(DepositWatcher::new(escrow.address)))?;

        info!(
            escrow = %escrow.address,
            creator = %escrow.terms.creator,
            trade_partner = %escrow.terms.trade_partner,
            agreed_ether = escrow.terms.agreed_ether,
            agreed_tokens = escrow.terms.agreed_tokens,
            side = %escrow.terms.creator_side,
            "escrow created"
        );
        Ok(escrow)
    }

    /// The address the next escrow deployed by `creator` will live at.
    ///
    /// Creators funding the token side approve this address before calling
    /// [`create`](Self::create).
    pub fn predict_address(host: &Host, creator: &Address) -> Address {
        Address::contract(creator, host.deployment_nonce(creator))
    }

    /// Reattaches to an escrow previously deployed at `address`.
    ///
    /// # Errors
    ///
    /// Returns [`EscrowError::NotFound`] unless `address` is an escrow
    /// account with a stored record.
    pub fn at(host: &Host, address: Address) -> Result<Self, EscrowError> {
        if host.contract_key::<EscrowCode>(&address).is_err() {
            return Err(EscrowError::NotFound(address));
        }
        let record = load(host, &address)?;
        Ok(Self {
            address,
            terms: record.terms,
        })
    }

    /// Swaps custody: the creator's side goes to the trade partner and the
    /// partner's side goes to the creator.
    ///
    /// Anyone may call this. For an escrow the creator funded with native
    /// currency, the native side goes to the trade partner and the tokens to
    /// the creator; a token-funded escrow pays native currency to the
    /// creator and tokens to the trade partner. Balances beyond the agreed amounts are refunded
    /// to the party that funds that side, so the escrow ends up empty.
    ///
    /// # Errors
    ///
    /// Returns [`EscrowError::AlreadyFinalized`] if the escrow is terminal.
    /// Returns [`EscrowError::UnderFunded`] if either agreed amount is not
    /// held yet. Returns [`EscrowError::ExternalTransferFailed`] if a payout
    /// is refused; the escrow then stays `Open` with balances unchanged.
    pub fn settle(&self, ctx: &mut Context<'_>) -> Result<(), EscrowError> {
        let caller = ctx.caller();
        let outcome = ctx.atomic(|ctx| -> Result<EscrowEvent, EscrowError> {
            let mut record = load(ctx.host(), &self.address)?;
            record.ensure_open()?;
            let key = self.key(ctx.host())?;

            let held_ether = self.held_ether(ctx.host());
            let held_tokens = self.held_tokens(ctx.host())?;
            if held_ether < self.terms.agreed_ether || held_tokens < self.terms.agreed_tokens {
                return Err(EscrowError::UnderFunded {
                    held_ether,
                    agreed_ether: self.terms.agreed_ether,
                    held_tokens,
                    agreed_tokens: self.terms.agreed_tokens,
                });
            }

            // Terminal before any value leaves.
            record.finalize(EscrowState::Settled);
            ctx.storage_set(&key, RECORD_KEY, &record)?;

            for asset in [self.terms.creator_side, other(self.terms.creator_side)] {
                self.pay(ctx, &key, asset, self.terms.recipient_of(asset), self.terms.agreed(asset))?;
            }

            let excess_ether = self.held_ether(ctx.host());
            let excess_tokens = self.held_tokens(ctx.host())?;
            self.pay(ctx, &key, AssetKind::Native, self.terms.depositor_of(AssetKind::Native), excess_ether)?;
            self.pay(ctx, &key, AssetKind::Token, self.terms.depositor_of(AssetKind::Token), excess_tokens)?;

            let event = EscrowEvent::Settled {
                ether: self.terms.agreed_ether,
                tokens: self.terms.agreed_tokens,
                excess_ether,
                excess_tokens,
            };
            event.emit(ctx, &key)?;
            Ok(event)
        });

        match outcome {
            Ok(event) => {
                info!(escrow = %self.address, %caller, ?event, "escrow settled");
                Ok(())
            }
            Err(e) => {
                self.log_failure("settle", &caller, &e);
                Err(e)
            }
        }
    }

    /// Unwinds the trade. Only a `ctx` acting as the creator may call this.
    ///
    /// Every held balance is returned to the party that funds that side: for
    /// an escrow the creator funded with native currency, the native balance
    /// goes back to the creator and the token balance to the trade partner.
    /// Zero balances are simply skipped.
    ///
    /// # Errors
    ///
    /// Returns [`EscrowError::AlreadyFinalized`] if the escrow is terminal.
    /// Returns [`EscrowError::Unauthorized`] if the caller is not the creator.
    /// Returns [`EscrowError::ExternalTransferFailed`] if a refund is refused;
    /// the escrow then stays `Open` with balances unchanged.
    pub fn cancel(&self, ctx: &mut Context<'_>) -> Result<(), EscrowError> {
        let caller = ctx.caller();
        let outcome = ctx.atomic(|ctx| -> Result<EscrowEvent, EscrowError> {
            let mut record = load(ctx.host(), &self.address)?;
            record.ensure_open()?;

            if caller != self.terms.creator {
                return Err(EscrowError::Unauthorized { caller });
            }
            let key = self.key(ctx.host())?;

            let ether_returned = self.held_ether(ctx.host());
            let tokens_returned = self.held_tokens(ctx.host())?;

            // Terminal before any value leaves.
            record.finalize(EscrowState::Cancelled);
            ctx.storage_set(&key, RECORD_KEY, &record)?;

            self.pay(ctx, &key, AssetKind::Native, self.terms.depositor_of(AssetKind::Native), ether_returned)?;
            self.pay(ctx, &key, AssetKind::Token, self.terms.depositor_of(AssetKind::Token), tokens_returned)?;

            let event = EscrowEvent::Cancelled {
                ether_returned,
                tokens_returned,
            };
            event.emit(ctx, &key)?;
            Ok(event)
        });

        match outcome {
            Ok(event) => {
                info!(escrow = %self.address, ?event, "escrow cancelled");
                Ok(())
            }
            Err(e) => {
                self.log_failure("cancel", &caller, &e);
                Err(e)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// The escrow's own address.
    pub fn address(&self) -> Address {
        self.address
    }

    /// All immutable terms.
    pub fn terms(&self) -> &EscrowTerms {
        &self.terms
    }

    /// Who deployed the escrow.
    pub fn creator(&self) -> Address {
        self.terms.creator
    }

    /// The counterpart named at creation.
    pub fn trade_partner(&self) -> Address {
        self.terms.trade_partner
    }

    /// Ledger of the traded token.
    pub fn traded_token(&self) -> Address {
        self.terms.traded_token
    }

    /// Native currency the trade requires.
    pub fn agreed_ether(&self) -> u64 {
        self.terms.agreed_ether
    }

    /// Tokens the trade requires.
    pub fn agreed_tokens(&self) -> u64 {
        self.terms.agreed_tokens
    }

    /// Current lifecycle state, read from host storage.
    pub fn state(&self, host: &Host) -> Result<EscrowState, EscrowError> {
        Ok(load(host, &self.address)?.state)
    }

    /// Native currency currently held.
    pub fn held_ether(&self, host: &Host) -> u64 {
        host.native_balance(&self.address)
    }

    /// Tokens currently held, per the token ledger.
    pub fn held_tokens(&self, host: &Host) -> Result<u64, EscrowError> {
        Ok(host.token_balance(&self.terms.traded_token, &self.address)?)
    }

    /// Every event this escrow emitted, oldest first.
    pub fn events(&self, host: &Host) -> Vec<EscrowEvent> {
        host.events_from(&self.address)
            .filter_map(EscrowEvent::from_record)
            .collect()
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn key(&self, host: &Host) -> Result<ContractKey, EscrowError> {
        Ok(host.contract_key::<EscrowCode>(&self.address)?)
    }

    fn pay(
        &self,
        ctx: &mut Context<'_>,
        key: &ContractKey,
        asset: AssetKind,
        to: Address,
        amount: u64,
    ) -> Result<(), EscrowError> {
        if amount == 0 {
            return Ok(());
        }
        let paid = match asset {
            AssetKind::Native => ctx.pay_native(key, &to, amount),
            AssetKind::Token => ctx.pay_tokens(key, &self.terms.traded_token, &to, amount),
        };
        paid.map_err(EscrowError::ExternalTransferFailed)?;
        debug!(escrow = %self.address, %asset, %to, amount, "payout");
        Ok(())
    }

    fn log_failure(&self, operation: &str, caller: &Address, error: &EscrowError) {
        match error {
            EscrowError::ExternalTransferFailed(_) | EscrowError::Host(_) => {
                warn!(escrow = %self.address, %caller, %error, "{} rolled back", operation)
            }
            _ => debug!(escrow = %self.address, %caller, %error, "{} rejected", operation),
        }
    }
}

fn other(asset: AssetKind) -> AssetKind {
    match asset {
        AssetKind::Native => AssetKind::Token,
        AssetKind::Token => AssetKind::Native,
    }
}

fn load(host: &Host, address: &Address) -> Result<EscrowRecord, EscrowError> {
    host.storage_get(address, RECORD_KEY)?
        .ok_or(EscrowError::NotFound(*address))
}

fn validate(host: &Host, creator: &Address, agreement: &Agreement) -> Result<(), EscrowError> {
    let invalid = |reason: &str| -> Result<(), EscrowError> {
        Err(EscrowError::InvalidAgreement {
            reason: reason.to_string(),
        })
    };

    if agreement.agreed_ether == 0 {
        return invalid("agreed native amount must be positive");
    }
    if agreement.agreed_tokens == 0 {
        return invalid("agreed token amount must be positive");
    }
    if agreement.trade_partner.is_zero() {
        return invalid("trade partner must not be the zero address");
    }
    if agreement.trade_partner == *creator {
        return invalid("creator cannot trade with themselves");
    }
    if agreement.trade_partner == TokenEscrow::predict_address(host, creator) {
        return invalid("trade partner cannot be the escrow itself");
    }
    if host.token(&agreement.traded_token).is_err() {
        return invalid("no token ledger at the traded token address");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Deposit watcher
// ---------------------------------------------------------------------------

/// Receive hook of an escrow address.
///
/// Announces every deposit with a `Funded` event while the escrow is open,
/// and refuses deposits once it is terminal or of a token it does not trade.
struct DepositWatcher {
    escrow: Address,
}

impl DepositWatcher {
    fn new(escrow: Address) -> Self {
        Self { escrow }
    }
}

impl Receiver for DepositWatcher {
    fn on_receive(&mut self, ctx: &mut Context<'_>, receipt: &Receipt) -> Result<(), String> {
        let record = load(ctx.host(), &self.escrow).map_err(|e| e.to_string())?;
        if record.state.is_terminal() {
            return Err(format!("escrow is {}", record.state));
        }
        if receipt.asset == AssetKind::Token && receipt.token != Some(record.terms.traded_token) {
            return Err("escrow does not trade this token".to_string());
        }

        let key = ctx
            .contract_key::<EscrowCode>(&self.escrow)
            .map_err(|e| e.to_string())?;
        EscrowEvent::Funded {
            depositor: receipt.from,
            asset: receipt.asset,
            amount: receipt.amount,
        }
        .emit(ctx, &key)
        .map_err(|e| e.to_string())?;

        debug!(escrow = %self.escrow, depositor = %receipt.from, asset = %receipt.asset, amount = receipt.amount, "deposit received");
        Ok(())
    }
}
