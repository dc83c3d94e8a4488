//! End-to-end payment lifecycle tests over a real store.

use billing_core::{
    Amount, Bill, BillEventKind, BillStatus, DiscountRate, Error as CoreError, MerchantDirectory,
    PayerId, SettlementMode, StoreConfig, Storage,
};
use chrono::{Duration as ChronoDuration, Utc};
use payments::{
    spawn_confirmation_worker, BillIssuer, BillRedeemer, ConfirmationAck, Error, ExpirySweeper,
    PaymentOrchestrator, PaymentsConfig, RecordingProcessor,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;

struct Rig {
    _dir: TempDir,
    storage: Arc<Storage>,
    processor: Arc<RecordingProcessor>,
    directory: MerchantDirectory,
    issuer: BillIssuer,
    redeemer: BillRedeemer,
    orchestrator: Arc<PaymentOrchestrator>,
    config: PaymentsConfig,
}

fn rig() -> Rig {
    rig_with_ttl(300)
}

fn rig_with_ttl(bill_ttl_secs: u64) -> Rig {
    let dir = TempDir::new().unwrap();
    let store_config = StoreConfig {
        data_dir: dir.path().join("db"),
        ..StoreConfig::default()
    };
    let storage = Arc::new(Storage::open(&store_config).unwrap());
    let processor = Arc::new(RecordingProcessor::new());
    let config = PaymentsConfig {
        bill_ttl_secs,
        ..PaymentsConfig::default()
    }
    .with_processor_key(&processor.public_key());
    let orchestrator = Arc::new(
        PaymentOrchestrator::new(storage.clone(), processor.clone(), &config).unwrap(),
    );
    Rig {
        directory: MerchantDirectory::new(storage.clone()),
        issuer: BillIssuer::new(storage.clone(), &config),
        redeemer: BillRedeemer::new(storage.clone()),
        orchestrator,
        processor,
        storage,
        config,
        _dir: dir,
    }
}

fn verified_merchant(rig: &Rig, percent: u8) -> billing_core::Merchant {
    let merchant = rig
        .directory
        .register(
            "Cafe Aurora",
            DiscountRate::new(percent).unwrap(),
            SettlementMode::PlatformManaged,
        )
        .unwrap();
    rig.directory.mark_verified(merchant.merchant_id).unwrap()
}

#[tokio::test]
async fn test_redelivered_confirmations_record_exactly_one_order() {
    let rig = rig();
    let merchant = verified_merchant(&rig, 6);

    let issued = rig
        .issuer
        .issue_bill(merchant.merchant_id, Amount::from_minor(54_000))
        .unwrap();
    assert_eq!(issued.discount_amount, Amount::from_minor(3_240));
    assert_eq!(issued.net_payable, Amount::from_minor(50_760));

    let payer = PayerId::new("payer-1");
    rig.redeemer.redeem_token(&issued.token, &payer).unwrap();
    let intent = rig
        .orchestrator
        .initiate_payment(issued.bill_id, &payer)
        .await
        .unwrap();

    // The processor delivers the same confirmation six times
    let signed = rig
        .processor
        .confirm_success(&intent.processor_reference, intent.net_payable, false)
        .unwrap();
    let (inbox, worker) = spawn_confirmation_worker(rig.orchestrator.clone(), 16);
    for _ in 0..6 {
        inbox.deliver(signed.clone()).await.unwrap();
    }
    drop(inbox);
    worker.await.unwrap();

    let bill = rig.storage.get_bill(issued.bill_id).unwrap();
    assert_eq!(bill.status, BillStatus::Paid);

    let order = rig
        .storage
        .order_for_bill(issued.bill_id)
        .unwrap()
        .unwrap();
    assert_eq!(order.net_paid, Amount::from_minor(50_760));
    assert_eq!(order.payer, payer);
    // 250 bps of 50,760
    assert_eq!(order.platform_fee, Amount::from_minor(1_269));
    // discount + fee + merchant share add back to the register price
    assert_eq!(
        order.discount_amount + order.platform_fee + order.merchant_net(),
        order.gross_amount
    );
    assert_eq!(rig.storage.stats().unwrap().total_orders, 1);
}

#[test]
fn test_concurrent_scans_lock_exactly_once() {
    let rig = rig();
    let merchant = verified_merchant(&rig, 10);
    let issued = rig
        .issuer
        .issue_bill(merchant.merchant_id, Amount::from_minor(10_000))
        .unwrap();

    let redeemer = Arc::new(BillRedeemer::new(rig.storage.clone()));
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let redeemer = redeemer.clone();
            let token = issued.token.clone();
            std::thread::spawn(move || {
                redeemer.redeem_token(&token, &PayerId::new(format!("payer-{}", i)))
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    for lost in results.iter().filter(|r| r.is_err()) {
        assert!(matches!(
            lost,
            Err(Error::Core(CoreError::BillNotActive { .. }))
        ));
    }

    let bill = rig.storage.get_bill(issued.bill_id).unwrap();
    assert_eq!(bill.status, BillStatus::Locked);
    assert!(bill.locked_by.is_some());
}

#[tokio::test]
async fn test_reinitiation_rejoins_the_open_order() {
    let rig = rig();
    let merchant = verified_merchant(&rig, 5);
    let issued = rig
        .issuer
        .issue_bill(merchant.merchant_id, Amount::from_minor(20_000))
        .unwrap();

    let payer = PayerId::new("payer-1");
    rig.redeemer.redeem_token(&issued.token, &payer).unwrap();

    let first = rig
        .orchestrator
        .initiate_payment(issued.bill_id, &payer)
        .await
        .unwrap();
    let second = rig
        .orchestrator
        .initiate_payment(issued.bill_id, &payer)
        .await
        .unwrap();

    assert_eq!(first.processor_reference, second.processor_reference);
    assert_eq!(rig.processor.order_count(), 1);
}

#[tokio::test]
async fn test_only_the_locking_payer_may_initiate() {
    let rig = rig();
    let merchant = verified_merchant(&rig, 5);
    let issued = rig
        .issuer
        .issue_bill(merchant.merchant_id, Amount::from_minor(20_000))
        .unwrap();

    rig.redeemer
        .redeem_token(&issued.token, &PayerId::new("payer-1"))
        .unwrap();

    let err = rig
        .orchestrator
        .initiate_payment(issued.bill_id, &PayerId::new("payer-2"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::SessionMismatch { .. }));
}

#[tokio::test]
async fn test_failed_charge_releases_the_bill_for_retry() {
    let rig = rig();
    let merchant = verified_merchant(&rig, 5);
    let issued = rig
        .issuer
        .issue_bill(merchant.merchant_id, Amount::from_minor(20_000))
        .unwrap();
    let net = issued.net_payable;

    let first_payer = PayerId::new("payer-1");
    rig.redeemer.redeem_token(&issued.token, &first_payer).unwrap();
    let first_intent = rig
        .orchestrator
        .initiate_payment(issued.bill_id, &first_payer)
        .await
        .unwrap();

    let failure = rig
        .processor
        .confirm_failure(&first_intent.processor_reference, net, "card declined")
        .unwrap();
    assert_eq!(
        rig.orchestrator.confirm_payment(&failure).unwrap(),
        ConfirmationAck::Released
    );

    let released = rig.storage.get_bill(issued.bill_id).unwrap();
    assert_eq!(released.status, BillStatus::Active);
    assert_eq!(released.failure_count, 1);
    assert!(released.processor_reference.is_none());

    // Redelivery of the failure is acknowledged without another release
    assert_eq!(
        rig.orchestrator.confirm_payment(&failure).unwrap(),
        ConfirmationAck::Duplicate
    );

    // A second payer picks the bill up and gets a fresh order
    let second_payer = PayerId::new("payer-2");
    rig.redeemer.redeem_token(&issued.token, &second_payer).unwrap();
    let second_intent = rig
        .orchestrator
        .initiate_payment(issued.bill_id, &second_payer)
        .await
        .unwrap();
    assert_ne!(
        first_intent.processor_reference,
        second_intent.processor_reference
    );
    assert_eq!(rig.processor.order_count(), 2);

    // A success for the dead first checkout cannot pay the bill
    let stale = rig
        .processor
        .confirm_success(&first_intent.processor_reference, net, false)
        .unwrap();
    assert!(matches!(
        rig.orchestrator.confirm_payment(&stale).unwrap_err(),
        Error::Core(CoreError::BillNotActive { .. })
    ));

    let signed = rig
        .processor
        .confirm_success(&second_intent.processor_reference, net, false)
        .unwrap();
    assert!(matches!(
        rig.orchestrator.confirm_payment(&signed).unwrap(),
        ConfirmationAck::Recorded(_)
    ));

    let order = rig
        .storage
        .order_for_bill(issued.bill_id)
        .unwrap()
        .unwrap();
    assert_eq!(order.payer, second_payer);
    assert_eq!(order.processor_reference, second_intent.processor_reference);
    assert_eq!(rig.storage.stats().unwrap().total_orders, 1);
}

#[tokio::test]
async fn test_forged_confirmations_never_reach_the_ledger() {
    let rig = rig();
    let merchant = verified_merchant(&rig, 5);
    let issued = rig
        .issuer
        .issue_bill(merchant.merchant_id, Amount::from_minor(20_000))
        .unwrap();

    let payer = PayerId::new("payer-1");
    rig.redeemer.redeem_token(&issued.token, &payer).unwrap();
    let intent = rig
        .orchestrator
        .initiate_payment(issued.bill_id, &payer)
        .await
        .unwrap();

    // Signed by an imposter key
    let imposter = RecordingProcessor::new();
    let forged = imposter
        .confirm_success(&intent.processor_reference, intent.net_payable, false)
        .unwrap();
    assert!(matches!(
        rig.orchestrator.confirm_payment(&forged).unwrap_err(),
        Error::Core(CoreError::InvalidSignature)
    ));

    // Right key, wrong amount
    let short = rig
        .processor
        .confirm_success(&intent.processor_reference, Amount::from_minor(1), false)
        .unwrap();
    assert!(matches!(
        rig.orchestrator.confirm_payment(&short).unwrap_err(),
        Error::Core(CoreError::AmountMismatch { .. })
    ));

    let bill = rig.storage.get_bill(issued.bill_id).unwrap();
    assert_eq!(bill.status, BillStatus::Locked);
    assert!(rig.storage.order_for_bill(issued.bill_id).unwrap().is_none());
}

#[tokio::test]
async fn test_expired_bills_reject_every_path_and_get_swept() {
    let rig = rig_with_ttl(1);
    let merchant = verified_merchant(&rig, 5);

    // One bill nobody scans, one locked mid-checkout
    let untouched = rig
        .issuer
        .issue_bill(merchant.merchant_id, Amount::from_minor(5_000))
        .unwrap();
    let abandoned = rig
        .issuer
        .issue_bill(merchant.merchant_id, Amount::from_minor(7_000))
        .unwrap();
    let payer = PayerId::new("payer-1");
    rig.redeemer.redeem_token(&abandoned.token, &payer).unwrap();
    let intent = rig
        .orchestrator
        .initiate_payment(abandoned.bill_id, &payer)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(1_200)).await;

    // Scanning after expiry flips the bill and reports it expired
    let err = rig
        .redeemer
        .redeem_token(&untouched.token, &payer)
        .unwrap_err();
    assert!(matches!(err, Error::Core(CoreError::BillExpired(_))));
    assert_eq!(
        rig.storage.get_bill(untouched.bill_id).unwrap().status,
        BillStatus::Expired
    );

    // The sweeper catches the locked one nobody came back to
    let sweeper = ExpirySweeper::new(rig.storage.clone(), &rig.config);
    let report = sweeper.sweep_once(Utc::now()).unwrap();
    assert!(report.expired >= 1);
    assert_eq!(
        rig.storage.get_bill(abandoned.bill_id).unwrap().status,
        BillStatus::Expired
    );

    // Initiation is refused and the straggling confirmation leaves
    // only an audit event behind
    let err = rig
        .orchestrator
        .initiate_payment(abandoned.bill_id, &payer)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Core(CoreError::BillExpired(_))));

    let late = rig
        .processor
        .confirm_success(&intent.processor_reference, intent.net_payable, false)
        .unwrap();
    assert!(matches!(
        rig.orchestrator.confirm_payment(&late).unwrap_err(),
        Error::Core(CoreError::BillNotActive { .. })
    ));
    assert!(rig.storage.order_for_bill(abandoned.bill_id).unwrap().is_none());

    let events = rig.storage.bill_events(abandoned.bill_id).unwrap();
    assert_eq!(events.last().unwrap().kind, BillEventKind::LateConfirmation);

    // A second pass has nothing left to do
    let report = sweeper.sweep_once(Utc::now()).unwrap();
    assert_eq!(report.scanned, 0);
}

#[test]
fn test_suspension_beats_an_in_flight_issuance() {
    let rig = rig();
    let merchant = verified_merchant(&rig, 5);

    // Snapshot taken while the merchant was still eligible
    let now = Utc::now();
    let stale_snapshot = Bill {
        bill_id: Uuid::now_v7(),
        merchant_id: merchant.merchant_id,
        gross_amount: Amount::from_minor(1_000),
        discount_rate: merchant.discount_rate,
        discount_amount: Amount::from_minor(50),
        net_payable: Amount::from_minor(950),
        status: BillStatus::Active,
        created_at: now,
        expires_at: now + ChronoDuration::seconds(300),
        locked_at: None,
        locked_by: None,
        processor_reference: None,
        paid_at: None,
        failure_count: 0,
    };

    rig.directory.suspend(merchant.merchant_id).unwrap();

    // The insert re-reads the merchant transactionally and refuses
    let err = rig.storage.insert_bill(&stale_snapshot).unwrap_err();
    assert!(matches!(err, CoreError::MerchantNotEligible { .. }));
    assert!(matches!(
        rig.issuer
            .issue_bill(merchant.merchant_id, Amount::from_minor(1_000)),
        Err(Error::Core(CoreError::MerchantNotEligible { .. }))
    ));
}

#[test]
fn test_token_for_the_wrong_merchant_is_malformed() {
    let rig = rig();
    let merchant = verified_merchant(&rig, 5);
    let other = rig
        .directory
        .register(
            "Imposter Kiosk",
            DiscountRate::new(5).unwrap(),
            SettlementMode::PlatformManaged,
        )
        .unwrap();
    let issued = rig
        .issuer
        .issue_bill(merchant.merchant_id, Amount::from_minor(3_000))
        .unwrap();

    // Re-encode the stored bill under the wrong merchant
    let mut crafted = rig.storage.get_bill(issued.bill_id).unwrap();
    crafted.merchant_id = other.merchant_id;
    let wrong = billing_core::token::encode_token(&crafted).unwrap();

    let err = rig
        .redeemer
        .redeem_token(&wrong, &PayerId::new("payer-1"))
        .unwrap_err();
    assert!(matches!(err, Error::Core(CoreError::MalformedToken(_))));
    assert_eq!(
        rig.storage.get_bill(issued.bill_id).unwrap().status,
        BillStatus::Active
    );
}

#[test]
fn test_merchants_cannot_cancel_foreign_bills() {
    let rig = rig();
    let merchant = verified_merchant(&rig, 5);
    let rival = {
        let m = rig
            .directory
            .register(
                "Rival Bar",
                DiscountRate::new(5).unwrap(),
                SettlementMode::PlatformManaged,
            )
            .unwrap();
        rig.directory.mark_verified(m.merchant_id).unwrap()
    };
    let issued = rig
        .issuer
        .issue_bill(merchant.merchant_id, Amount::from_minor(3_000))
        .unwrap();

    let err = rig
        .issuer
        .cancel_bill(rival.merchant_id, issued.bill_id)
        .unwrap_err();
    assert!(matches!(err, Error::Core(CoreError::BillNotFound(_))));

    let cancelled = rig.issuer.cancel_bill(merchant.merchant_id, issued.bill_id).unwrap();
    assert_eq!(cancelled.status, BillStatus::Cancelled);
    assert!(matches!(
        rig.redeemer
            .redeem_token(&issued.token, &PayerId::new("payer-1"))
            .unwrap_err(),
        Error::Core(CoreError::BillNotActive { .. })
    ));
}
