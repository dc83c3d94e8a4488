// Checkout Demo - walks one bill through the full payment flow:
// issue -> scan -> hosted checkout -> signed confirmation -> order,
// then shows redelivery being absorbed and the expiry sweeper working.

use billing_core::{
    Amount, DiscountRate, MerchantDirectory, PayerId, SettlementMode, StoreConfig, Storage,
};
use chrono::Utc;
use payments::{
    spawn_confirmation_worker, BillIssuer, BillRedeemer, ExpirySweeper, PaymentOrchestrator,
    PaymentsConfig, RecordingProcessor,
};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    println!("\n🧾 =================================================================");
    println!("🧾 Scanpay - QR Bill Checkout Demo");
    println!("🧾 =================================================================\n");

    let data_dir = std::env::temp_dir().join(format!("scanpay-demo-{}", Uuid::new_v4()));
    let store_config = StoreConfig {
        data_dir: data_dir.clone(),
        ..StoreConfig::default()
    };
    let storage = Arc::new(Storage::open(&store_config)?);
    info!(path = %data_dir.display(), "Billing store opened");

    // The processor publishes its verification key; the platform pins it
    let processor = Arc::new(RecordingProcessor::new());
    let config = PaymentsConfig::default().with_processor_key(&processor.public_key());

    let directory = MerchantDirectory::new(storage.clone());
    let issuer = BillIssuer::new(storage.clone(), &config);
    let redeemer = BillRedeemer::new(storage.clone());
    let orchestrator = Arc::new(PaymentOrchestrator::new(
        storage.clone(),
        processor.clone(),
        &config,
    )?);
    let (inbox, worker) = spawn_confirmation_worker(orchestrator.clone(), config.inbox_capacity);

    // Step 1: Merchant onboarding
    let merchant = directory.register(
        "Cafe Aurora",
        DiscountRate::new(6)?,
        SettlementMode::PlatformManaged,
    )?;
    directory.mark_verified(merchant.merchant_id)?;
    println!("✅ Merchant onboarded: Cafe Aurora (6% discount)");

    // Step 2: The register rings up 540.00
    let issued = issuer.issue_bill(merchant.merchant_id, Amount::from_minor(54_000))?;
    println!(
        "✅ Bill issued: gross {} | discount {} | payable {}",
        issued.gross_amount, issued.discount_amount, issued.net_payable
    );
    println!("   QR token: {}", issued.token);

    // Step 3: The payer scans the QR code
    let payer = PayerId::new("payer-demo");
    let redeemed = redeemer.redeem_token(&issued.token, &payer)?;
    println!(
        "✅ Scanned by payer: pay {} to {} (was {})",
        redeemed.net_payable, redeemed.merchant_name, redeemed.gross_amount
    );

    // Step 4: Hosted checkout opens at the processor
    let intent = orchestrator.initiate_payment(issued.bill_id, &payer).await?;
    println!(
        "✅ Checkout opened: reference {} for {}",
        intent.processor_reference, intent.net_payable
    );

    // Step 5: The processor confirms - delivered three times, applied once
    let signed = processor.confirm_success(&intent.processor_reference, intent.net_payable, false)?;
    for _ in 0..3 {
        inbox.deliver(signed.clone()).await?;
    }
    drop(inbox);
    worker.await?;

    let order = storage
        .order_for_bill(issued.bill_id)?
        .ok_or_else(|| anyhow::anyhow!("order not recorded"))?;
    println!(
        "✅ Payment recorded once: order {} | charged {} | fee {} | merchant gets {}",
        order.order_id,
        order.net_paid,
        order.platform_fee,
        order.merchant_net()
    );

    // Step 6: A bill nobody pays gets swept
    let ephemeral = PaymentsConfig {
        bill_ttl_secs: 0,
        ..config.clone()
    };
    let short_lived = BillIssuer::new(storage.clone(), &ephemeral)
        .issue_bill(merchant.merchant_id, Amount::from_minor(1_200))?;
    let sweeper = ExpirySweeper::new(storage.clone(), &config);
    let report = sweeper.sweep_once(Utc::now())?;
    println!(
        "✅ Sweeper pass: {} due, {} expired (bill {})",
        report.scanned, report.expired, short_lived.bill_id
    );

    let stats = storage.stats()?;
    println!(
        "\n📊 Store: {} merchants, {} bills, {} orders",
        stats.total_merchants, stats.total_bills, stats.total_orders
    );
    println!("\n🎉 Demo complete.\n");

    drop(directory);
    drop(issuer);
    drop(redeemer);
    drop(sweeper);
    drop(orchestrator);
    match Arc::try_unwrap(storage) {
        Ok(storage) => storage.close()?,
        Err(_) => info!("Storage still shared; skipping close"),
    }
    std::fs::remove_dir_all(&data_dir).ok();

    Ok(())
}
