//! End-to-end flows through the public host API: configuration, token
//! issuance, transfers with receive hooks, nested atomic frames and the
//! event trail.

use swap_ledger::config::HostConfig;
use swap_ledger::events::{ApprovalPayload, TransferPayload};
use swap_ledger::logging::init_logging;
use swap_ledger::{Address, AssetKind, Context, Host, HostError, LedgerError, Receipt, TokenMetadata};

fn setup() -> (Host, Address, Address, Address) {
    let config = HostConfig::from_json(r#"{ "network": "integration" }"#).unwrap();
    init_logging(&config.log_level, config.log_format);

    let mut host = Host::new(config);
    let issuer = Address::from_label("issuer");
    let holder = Address::from_label("holder");
    let token = host.issue_token(&issuer, TokenMetadata::new("TEST TOKEN", "TT", 2), 1_000);
    (host, issuer, holder, token)
}

// ---------------------------------------------------------------------------
// Transfers
// ---------------------------------------------------------------------------

#[test]
fn token_and_native_flow() {
    let (mut host, issuer, holder, token) = setup();
    assert_eq!(host.config().network, "integration");

    host.mint_native(&holder, 500).unwrap();
    host.transfer_native(&holder, &issuer, 200).unwrap();
    host.token_transfer(&token, &issuer, &holder, 300).unwrap();

    assert_eq!(host.native_balance(&issuer), 200);
    assert_eq!(host.native_balance(&holder), 300);
    assert_eq!(host.token_balance(&token, &holder).unwrap(), 300);
    assert_eq!(host.token(&token).unwrap().total_supply(), 1_000);

    let transfers: Vec<TransferPayload> = host
        .events_from(&token)
        .filter(|r| r.topic == "Transfer")
        .map(|r| r.decode().unwrap())
        .collect();
    assert_eq!(
        transfers,
        vec![TransferPayload {
            from: issuer,
            to: holder,
            amount: 300
        }]
    );
}

#[test]
fn failed_transfers_change_nothing() {
    let (mut host, issuer, holder, token) = setup();

    let err = host.token_transfer(&token, &holder, &issuer, 1).unwrap_err();
    assert!(matches!(
        err,
        HostError::Ledger(LedgerError::InsufficientBalance { .. })
    ));
    let err = host
        .token_transfer(&token, &issuer, &Address::ZERO, 1)
        .unwrap_err();
    assert_eq!(err, HostError::Ledger(LedgerError::ZeroAddress));

    assert_eq!(host.token_balance(&token, &issuer).unwrap(), 1_000);
    assert!(host.events_from(&token).all(|r| r.topic != "Transfer"));
}

#[test]
fn approval_is_recorded_and_consumed() -> anyhow::Result<()> {
    let (mut host, issuer, holder, token) = setup();

    host.token_approve(&token, &issuer, &holder, 40)?;
    let approval: ApprovalPayload = host
        .events_from(&token)
        .find(|r| r.topic == "Approval")
        .ok_or_else(|| anyhow::anyhow!("no Approval record"))?
        .decode()?;
    assert_eq!(approval.amount, 40);

    host.token_transfer_from(&token, &holder, &issuer, &holder, 25)?;
    assert_eq!(host.token_allowance(&token, &issuer, &holder)?, 15);
    assert_eq!(host.token_balance(&token, &holder)?, 25);
    Ok(())
}

// ---------------------------------------------------------------------------
// Hooks & Frames
// ---------------------------------------------------------------------------

#[test]
fn hook_sees_each_credit_once() {
    let (mut host, issuer, holder, token) = setup();
    let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));

    let log = std::sync::Arc::clone(&seen);
    host.register_receiver(
        holder,
        Box::new(move |_: &mut Context<'_>, r: &Receipt| -> Result<(), String> {
            log.lock().unwrap().push((r.asset, r.amount));
            Ok(())
        }),
    )
    .unwrap();

    host.mint_native(&issuer, 10).unwrap();
    host.transfer_native(&issuer, &holder, 10).unwrap();
    host.token_transfer(&token, &issuer, &holder, 7).unwrap();
    host.token_transfer(&token, &issuer, &holder, 0).unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![(AssetKind::Native, 10), (AssetKind::Token, 7)]
    );
}

#[test]
fn inner_frame_failure_can_be_absorbed() {
    let (mut host, issuer, holder, token) = setup();

    let outer: Result<(), HostError> = host.atomic(|h| {
        h.token_transfer(&token, &issuer, &holder, 100)?;
        let inner: Result<(), HostError> = h.atomic(|h| {
            h.token_transfer(&token, &issuer, &holder, 100)?;
            Err(HostError::Config("inner abort".into()))
        });
        assert!(inner.is_err());
        assert_eq!(h.depth(), 1);
        Ok(())
    });

    outer.unwrap();
    assert_eq!(host.depth(), 0);
    assert_eq!(host.token_balance(&token, &holder).unwrap(), 100);
}
