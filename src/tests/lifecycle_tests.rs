//! End-to-end lifecycle tests against the scriptable mock ledger.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use solana_sdk::signature::Keypair;

use crate::authority::{AuthorityRegistry, AuthorityRole};
use crate::config::{LifecycleRecord, LifecycleStateStore, NetworkConfig, WalletEntry};
use crate::error::LifecycleError;
use crate::fee::TransferFeeParams;
use crate::gate::PolicyGate;
use crate::ledger::LedgerClient;
use crate::lifecycle::{LifecycleStage, TokenLifecycle, TokenMetadataArgs};
use crate::retry::RetryPolicy;
use crate::test_utils::{MockLedger, SubmitBehavior};
use crate::wallet::WalletManager;

const DECIMALS: u8 = 6;
const UNIT: u64 = 1_000_000; // 10^6

struct Fixture {
    ledger: Arc<MockLedger>,
    lifecycle: TokenLifecycle,
    treasury: WalletManager,
    store_path: std::path::PathBuf,
    _dir: tempfile::TempDir,
}

fn entry(key: solana_sdk::pubkey::Pubkey) -> WalletEntry {
    WalletEntry {
        public_key: key.to_string(),
        keypair_path: None,
    }
}

fn metadata_args() -> TokenMetadataArgs {
    TokenMetadataArgs {
        name: "Stealth Mode Startup".to_string(),
        symbol: "SMS".to_string(),
        uri: "https://example.com/metadata.json".to_string(),
    }
}

fn fixture(approve_gate: bool) -> Fixture {
    fixture_with(approve_gate, None)
}

fn fixture_with(approve_gate: bool, cancel: Option<Arc<AtomicBool>>) -> Fixture {
    let ledger = Arc::new(MockLedger::new());
    let payer = Arc::new(WalletManager::from_keypair(Keypair::new()));
    let treasury = WalletManager::from_keypair(Keypair::new());
    let fee_collector = WalletManager::from_keypair(Keypair::new());

    let mut role_wallets = BTreeMap::new();
    for role in AuthorityRole::ALL {
        role_wallets.insert(role, Arc::new(WalletManager::from_keypair(Keypair::new())));
    }
    let mut authorities = BTreeMap::new();
    for (role, wallet) in &role_wallets {
        authorities.insert(*role, entry(wallet.pubkey()));
    }
    let registry = Arc::new(AuthorityRegistry::new(role_wallets));

    let mut holders = BTreeMap::new();
    holders.insert("treasury".to_string(), entry(treasury.pubkey()));
    holders.insert("feeCollector".to_string(), entry(fee_collector.pubkey()));

    let record = LifecycleRecord {
        network: NetworkConfig {
            endpoint: "http://mock.invalid".to_string(),
            commitment: "confirmed".to_string(),
        },
        payer: entry(payer.pubkey()),
        authorities,
        holders,
        stage: LifecycleStage::Uninitialized,
        token: None,
    };

    let dir = tempfile::tempdir().unwrap();
    let store_path = dir.path().join("lifecycle.json");
    let store = LifecycleStateStore::new(&store_path);
    let gate = if approve_gate {
        Arc::new(PolicyGate::approving())
    } else {
        Arc::new(PolicyGate::declining())
    };

    let ledger_dyn: Arc<dyn LedgerClient> = ledger.clone();
    let mut lifecycle = TokenLifecycle::new(ledger_dyn, registry, payer, gate, store, record)
        .unwrap()
        .with_retry_policy(RetryPolicy::fixed(3, 1, 2.0))
        .with_poll_interval(Duration::from_millis(1));
    if let Some(cancel) = cancel {
        lifecycle = lifecycle.with_cancel_flag(cancel);
    }

    Fixture {
        ledger,
        lifecycle,
        treasury,
        store_path,
        _dir: dir,
    }
}

async fn advance_to_supply_minted(fixture: &mut Fixture) {
    fixture.lifecycle.create_mint(DECIMALS).await.unwrap();
    fixture
        .lifecycle
        .attach_metadata(metadata_args())
        .await
        .unwrap();
    fixture.lifecycle.provision_accounts().await.unwrap();
    fixture
        .lifecycle
        .mint_supply("treasury", 1_000_000_000 * UNIT)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_end_to_end_launch() {
    let mut fixture = fixture(true);

    // Create: decimals fixed, supply starts at zero.
    let mint_address = fixture.lifecycle.create_mint(DECIMALS).await.unwrap();
    let mint = fixture.lifecycle.mint().unwrap();
    assert_eq!(mint.address, mint_address);
    assert_eq!(mint.decimals, DECIMALS);
    assert_eq!(mint.supply, 0);
    assert_eq!(fixture.lifecycle.stage(), LifecycleStage::MintCreated);

    fixture
        .lifecycle
        .attach_metadata(metadata_args())
        .await
        .unwrap();
    assert!(fixture.lifecycle.metadata().unwrap().mutable);
    assert_eq!(fixture.lifecycle.stage(), LifecycleStage::MetadataAttached);

    fixture.lifecycle.provision_accounts().await.unwrap();
    assert_eq!(
        fixture.lifecycle.stage(),
        LifecycleStage::AccountsProvisioned
    );
    assert!(fixture.lifecycle.account("treasury").is_some());
    assert!(fixture.lifecycle.account("feeCollector").is_some());

    // Mint one billion tokens; raw balance is supply * 10^decimals.
    fixture
        .lifecycle
        .mint_supply("treasury", 1_000_000_000 * UNIT)
        .await
        .unwrap();
    assert_eq!(
        fixture.lifecycle.mint().unwrap().supply,
        1_000_000_000 * UNIT
    );
    assert_eq!(
        fixture.lifecycle.account("treasury").unwrap().balance,
        1_000_000_000 * UNIT
    );
    assert_eq!(fixture.lifecycle.stage(), LifecycleStage::SupplyMinted);

    // 500 bps, uncapped: transferring 10,000 tokens nets 9,500 and
    // withholds 500 on the recipient.
    fixture
        .lifecycle
        .configure_fee(TransferFeeParams::new(500, 0).unwrap())
        .await
        .unwrap();
    assert_eq!(fixture.lifecycle.stage(), LifecycleStage::FeeConfigured);

    let treasury_wallet = fixture.treasury.clone();
    fixture
        .lifecycle
        .transfer("treasury", "feeCollector", 10_000 * UNIT, &treasury_wallet)
        .await
        .unwrap();
    let recipient = fixture.lifecycle.account("feeCollector").unwrap();
    assert_eq!(recipient.balance, 9_500 * UNIT);
    assert_eq!(recipient.withheld, 500 * UNIT);
    assert_eq!(
        fixture.lifecycle.account("treasury").unwrap().balance,
        (1_000_000_000 - 10_000) * UNIT
    );

    // Revocation fixes the supply: a further mint attempt dies at signer
    // resolution without building a transaction.
    fixture.lifecycle.revoke_mint_authority().await.unwrap();
    assert_eq!(
        fixture.lifecycle.stage(),
        LifecycleStage::MintAuthorityRevoked
    );

    let submissions_before = fixture.ledger.submission_count();
    let err = fixture
        .lifecycle
        .mint_supply("treasury", UNIT)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LifecycleError::SignerUnavailable {
            role: AuthorityRole::MintAuthority,
            ..
        }
    ));
    assert_eq!(fixture.ledger.submission_count(), submissions_before);

    fixture.lifecycle.immutabilize_metadata().await.unwrap();
    assert!(!fixture.lifecycle.metadata().unwrap().mutable);
    assert_eq!(
        fixture.lifecycle.stage(),
        LifecycleStage::MetadataImmutabilized
    );

    fixture.lifecycle.finalize().unwrap();
    assert_eq!(fixture.lifecycle.stage(), LifecycleStage::Finalized);

    // The persisted record mirrors the terminal state.
    let saved = LifecycleStateStore::new(&fixture.store_path).load().unwrap();
    assert_eq!(saved.stage, LifecycleStage::Finalized);
    let token = saved.token.unwrap();
    assert_eq!(token.decimals, DECIMALS);
    assert_eq!(token.supply, 1_000_000_000 * UNIT);
    assert_eq!(token.authorities[&AuthorityRole::MintAuthority], None);
    assert_eq!(token.authorities[&AuthorityRole::UpdateAuthority], None);
    assert!(token.authorities[&AuthorityRole::FreezeAuthority].is_some());
    assert!(!token.metadata.unwrap().mutable);
}

#[tokio::test]
async fn test_stage_order_is_enforced_before_any_transaction() {
    let mut fixture = fixture(true);

    let err = fixture
        .lifecycle
        .mint_supply("treasury", UNIT)
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Precondition { .. }));
    assert_eq!(fixture.ledger.submission_count(), 0);

    let err = fixture
        .lifecycle
        .attach_metadata(metadata_args())
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Precondition { .. }));
    assert_eq!(fixture.ledger.submission_count(), 0);
}

#[tokio::test]
async fn test_declined_gate_blocks_revocation() {
    let mut fixture = fixture(false);
    advance_to_supply_minted(&mut fixture).await;

    let submissions_before = fixture.ledger.submission_count();
    let err = fixture.lifecycle.revoke_mint_authority().await.unwrap_err();
    assert!(matches!(err, LifecycleError::Declined(_)));
    assert_eq!(fixture.ledger.submission_count(), submissions_before);
    assert_eq!(fixture.lifecycle.stage(), LifecycleStage::SupplyMinted);

    // The authority survives a declined gate.
    fixture.lifecycle.mint_supply("treasury", UNIT).await.unwrap();
}

#[tokio::test]
async fn test_expired_window_rebuilds_with_fresh_reference_point() {
    let mut fixture = fixture(true);
    fixture.ledger.set_window(2);
    fixture.ledger.queue_behavior(SubmitBehavior::NeverLand);

    fixture.lifecycle.create_mint(DECIMALS).await.unwrap();
    assert_eq!(fixture.lifecycle.stage(), LifecycleStage::MintCreated);

    // Two distinct submissions: the expired attempt and the rebuilt one,
    // bound to different reference blockhashes.
    let transactions = fixture.ledger.submitted_transactions();
    assert_eq!(transactions.len(), 2);
    assert_ne!(
        transactions[0].message.recent_blockhash,
        transactions[1].message.recent_blockhash
    );
}

#[tokio::test]
async fn test_transport_errors_are_retried_to_success() {
    let mut fixture = fixture(true);
    fixture
        .ledger
        .queue_behavior(SubmitBehavior::TransportError("connection reset".into()));
    fixture
        .ledger
        .queue_behavior(SubmitBehavior::TransportError("timeout".into()));

    fixture.lifecycle.create_mint(DECIMALS).await.unwrap();
    // Only the third attempt reached the ledger.
    assert_eq!(fixture.ledger.submission_count(), 1);
    assert_eq!(fixture.lifecycle.stage(), LifecycleStage::MintCreated);
}

#[tokio::test]
async fn test_execution_failure_halts_at_last_confirmed_stage() {
    let mut fixture = fixture(true);
    fixture.ledger.queue_behavior(SubmitBehavior::FailExecution(
        "custom program error: 0x1".to_string(),
    ));

    let err = fixture.lifecycle.create_mint(DECIMALS).await.unwrap_err();
    match err {
        LifecycleError::Execution { stage, payload } => {
            assert_eq!(stage, "create_mint");
            assert!(payload.contains("custom program error"));
        }
        other => panic!("expected execution error, got {other:?}"),
    }
    // One submission happened, but the lifecycle did not advance.
    assert_eq!(fixture.ledger.submission_count(), 1);
    assert_eq!(fixture.lifecycle.stage(), LifecycleStage::Uninitialized);
    assert!(fixture.lifecycle.mint().is_none());
}

#[tokio::test]
async fn test_abandoned_wait_is_fatal_and_resyncable() {
    let cancel = Arc::new(AtomicBool::new(true));
    let mut fixture = fixture_with(true, Some(Arc::clone(&cancel)));

    let err = fixture.lifecycle.create_mint(DECIMALS).await.unwrap_err();
    assert!(matches!(err, LifecycleError::Interrupted(_)));
    // The submission went out before the wait was abandoned; resync can
    // still observe its fate.
    assert_eq!(fixture.ledger.submission_count(), 1);
    assert_eq!(fixture.lifecycle.stage(), LifecycleStage::Uninitialized);

    cancel.store(false, Ordering::SeqCst);
}

#[tokio::test]
async fn test_fee_is_configured_at_most_once() {
    let mut fixture = fixture(true);
    advance_to_supply_minted(&mut fixture).await;

    fixture
        .lifecycle
        .configure_fee(TransferFeeParams::new(300, 0).unwrap())
        .await
        .unwrap();

    let err = fixture
        .lifecycle
        .configure_fee(TransferFeeParams::new(100, 0).unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Precondition { .. }));
    assert_eq!(
        fixture.lifecycle.mint().unwrap().transfer_fee,
        Some(TransferFeeParams::new(300, 0).unwrap())
    );
}

#[tokio::test]
async fn test_transfer_without_fee_stage_moves_full_amount() {
    let mut fixture = fixture(true);
    advance_to_supply_minted(&mut fixture).await;

    let treasury_wallet = fixture.treasury.clone();
    fixture
        .lifecycle
        .transfer("treasury", "feeCollector", 1_000 * UNIT, &treasury_wallet)
        .await
        .unwrap();

    let recipient = fixture.lifecycle.account("feeCollector").unwrap();
    assert_eq!(recipient.balance, 1_000 * UNIT);
    assert_eq!(recipient.withheld, 0);
}

#[tokio::test]
async fn test_insufficient_balance_fails_without_submission() {
    let mut fixture = fixture(true);
    advance_to_supply_minted(&mut fixture).await;

    let submissions_before = fixture.ledger.submission_count();
    let treasury_wallet = fixture.treasury.clone();
    let err = fixture
        .lifecycle
        .transfer(
            "treasury",
            "feeCollector",
            2_000_000_000 * UNIT,
            &treasury_wallet,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Execution { .. }));
    assert_eq!(fixture.ledger.submission_count(), submissions_before);
}

#[tokio::test]
async fn test_resume_from_persisted_record() {
    let mut fixture = fixture(true);
    advance_to_supply_minted(&mut fixture).await;

    let mint_address = fixture.lifecycle.mint().unwrap().address;
    let saved = LifecycleStateStore::new(&fixture.store_path).load().unwrap();
    assert_eq!(saved.stage, LifecycleStage::SupplyMinted);

    // A fresh orchestrator hydrated from the record resumes where the
    // previous one stopped.
    let registry = Arc::new(saved.build_registry().unwrap());
    let payer = Arc::new(WalletManager::from_keypair(Keypair::new()));
    let ledger: Arc<dyn LedgerClient> = fixture.ledger.clone();
    let resumed = TokenLifecycle::new(
        ledger,
        registry,
        payer,
        Arc::new(PolicyGate::approving()),
        LifecycleStateStore::new(&fixture.store_path),
        saved,
    )
    .unwrap();

    assert_eq!(resumed.stage(), LifecycleStage::SupplyMinted);
    assert_eq!(resumed.mint().unwrap().address, mint_address);
    assert_eq!(resumed.mint().unwrap().supply, 1_000_000_000 * UNIT);
    assert!(resumed.account("treasury").is_some());
}
