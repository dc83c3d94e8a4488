//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `merchants` - Merchant records (key: merchant_id)
//! - `bills` - Bills across their lifecycle (key: bill_id)
//! - `orders` - Immutable payment orders (key: order_id)
//! - `settlements` - Per-merchant settlement statements (key: settlement_id)
//! - `bill_events` - Audit trail (key: bill_id || event_id)
//! - `indices` - Secondary indices, namespaced by a two-letter prefix
//!
//! All lifecycle transitions run as pessimistic transactions: the
//! governing row is read with `get_for_update_cf`, checked, rewritten,
//! and committed together with its indices and audit event. Concurrent
//! writers serialize on the row lock, so exactly one of two racing
//! redemptions wins.

use crate::{
    config::StoreConfig,
    error::{Error, Result},
    types::{
        Bill, BillEvent, BillEventKind, BillStatus, Merchant, Order, PayerId, Settlement,
        SettlementStatus,
    },
};
use chrono::{DateTime, Utc};
use rocksdb::{
    BlockBasedOptions, BoundColumnFamily, Cache, ColumnFamilyDescriptor, Direction, IteratorMode,
    MultiThreaded, Options, Transaction, TransactionDB, TransactionDBOptions,
};
use std::sync::Arc;
use uuid::Uuid;

/// Column family names
const CF_MERCHANTS: &str = "merchants";
const CF_BILLS: &str = "bills";
const CF_ORDERS: &str = "orders";
const CF_SETTLEMENTS: &str = "settlements";
const CF_BILL_EVENTS: &str = "bill_events";
const CF_INDICES: &str = "indices";

/// Result of applying a success confirmation to a bill
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// The order was written and the bill is now Paid
    Recorded,
    /// The same processor reference was already recorded; nothing written
    Duplicate,
}

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<TransactionDB<MultiThreaded>>,
}

impl Storage {
    /// Open or create database
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let path = &config.data_dir;

        // Create directory if not exists
        std::fs::create_dir_all(path)?;

        // Database options
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        // Tuning from config
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_mb * 1024 * 1024);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        let cache = Cache::new_lru_cache(config.rocksdb.block_cache_mb * 1024 * 1024);
        let mut block_opts = BlockBasedOptions::default();
        block_opts.set_block_cache(&cache);
        db_opts.set_block_based_table_factory(&block_opts);

        // Column family descriptors
        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_MERCHANTS, Self::cf_options_records()),
            ColumnFamilyDescriptor::new(CF_BILLS, Self::cf_options_records()),
            ColumnFamilyDescriptor::new(CF_ORDERS, Self::cf_options_records()),
            ColumnFamilyDescriptor::new(CF_SETTLEMENTS, Self::cf_options_records()),
            ColumnFamilyDescriptor::new(CF_BILL_EVENTS, Self::cf_options_events()),
            ColumnFamilyDescriptor::new(CF_INDICES, Self::cf_options_indices()),
        ];

        // Open database
        let db = TransactionDB::open_cf_descriptors(
            &db_opts,
            &TransactionDBOptions::default(),
            path,
            cf_descriptors,
        )?;

        tracing::info!(path = ?path, "Opened billing store");

        Ok(Self { db: Arc::new(db) })
    }

    // Column family options

    fn cf_options_records() -> Options {
        let mut opts = Options::default();
        // Records are frequently read back, use LZ4 for speed
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_events() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts.set_bottommost_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_indices() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        // Indices benefit from bloom filters
        let mut block_opts = BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false); // 10 bits per key
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    // Helper: get column family handle

    fn cf_handle(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    // Merchant operations

    /// Put merchant (registration)
    pub fn put_merchant(&self, merchant: &Merchant) -> Result<()> {
        let cf = self.cf_handle(CF_MERCHANTS)?;
        let value = bincode::serialize(merchant)?;
        self.db.put_cf(&cf, merchant.merchant_id.as_bytes(), value)?;

        tracing::debug!(
            merchant_id = %merchant.merchant_id,
            display_name = %merchant.display_name,
            "Merchant stored"
        );

        Ok(())
    }

    /// Get merchant by ID
    pub fn get_merchant(&self, merchant_id: Uuid) -> Result<Merchant> {
        let cf = self.cf_handle(CF_MERCHANTS)?;
        let value = self
            .db
            .get_cf(&cf, merchant_id.as_bytes())?
            .ok_or(Error::MerchantNotFound(merchant_id))?;
        let merchant: Merchant = bincode::deserialize(&value)?;
        Ok(merchant)
    }

    /// All registered merchant IDs
    pub fn merchant_ids(&self) -> Result<Vec<Uuid>> {
        let cf = self.cf_handle(CF_MERCHANTS)?;
        let iter = self.db.iterator_cf(&cf, IteratorMode::Start);

        let mut ids = Vec::new();
        for item in iter {
            let (key, _) = item?;
            if key.len() >= 16 {
                let id_bytes: [u8; 16] = key[..16].try_into().unwrap();
                ids.push(Uuid::from_bytes(id_bytes));
            }
        }
        Ok(ids)
    }

    /// Read-modify-write a merchant under its row lock
    pub fn update_merchant<F>(&self, merchant_id: Uuid, apply: F) -> Result<Merchant>
    where
        F: FnOnce(&mut Merchant) -> Result<()>,
    {
        let cf = self.cf_handle(CF_MERCHANTS)?;
        let txn = self.db.transaction();

        let value = txn
            .get_for_update_cf(&cf, merchant_id.as_bytes(), true)?
            .ok_or(Error::MerchantNotFound(merchant_id))?;
        let mut merchant: Merchant = bincode::deserialize(&value)?;

        apply(&mut merchant)?;
        merchant.updated_at = Utc::now();

        txn.put_cf(&cf, merchant_id.as_bytes(), bincode::serialize(&merchant)?)?;
        txn.commit()?;

        Ok(merchant)
    }

    // Bill operations

    /// Insert a freshly issued bill.
    ///
    /// The issuing merchant is re-read inside the transaction so a
    /// racing suspension cannot slip a bill past the eligibility gate.
    pub fn insert_bill(&self, bill: &Bill) -> Result<()> {
        let cf_merchants = self.cf_handle(CF_MERCHANTS)?;
        let cf_bills = self.cf_handle(CF_BILLS)?;
        let cf_indices = self.cf_handle(CF_INDICES)?;
        let txn = self.db.transaction();

        let value = txn
            .get_for_update_cf(&cf_merchants, bill.merchant_id.as_bytes(), true)?
            .ok_or(Error::MerchantNotFound(bill.merchant_id))?;
        let merchant: Merchant = bincode::deserialize(&value)?;
        if !merchant.can_issue() {
            return Err(Error::MerchantNotEligible {
                merchant_id: merchant.merchant_id,
                status: merchant.compliance_status,
            });
        }

        txn.put_cf(&cf_bills, bill.bill_id.as_bytes(), bincode::serialize(bill)?)?;
        txn.put_cf(
            &cf_indices,
            Self::index_key_expiry(bill.expires_at, bill.bill_id),
            &[],
        )?;
        self.append_event_txn(
            &txn,
            &BillEvent::record(bill.bill_id, BillEventKind::Issued, bill.created_at, None),
        )?;
        txn.commit()?;

        tracing::debug!(
            bill_id = %bill.bill_id,
            merchant_id = %bill.merchant_id,
            net_payable = %bill.net_payable,
            "Bill stored"
        );

        Ok(())
    }

    /// Get bill by ID
    pub fn get_bill(&self, bill_id: Uuid) -> Result<Bill> {
        let cf = self.cf_handle(CF_BILLS)?;
        let value = self
            .db
            .get_cf(&cf, bill_id.as_bytes())?
            .ok_or(Error::BillNotFound(bill_id))?;
        let bill: Bill = bincode::deserialize(&value)?;
        Ok(bill)
    }

    /// Claim an Active bill for a payer (Active -> Locked).
    ///
    /// A bill whose expiry has already passed is flipped to Expired in
    /// the same transaction and reported as `BillExpired`. Any other
    /// state is `BillNotActive`; of two racing payers exactly one gets
    /// the lock.
    pub fn lock_bill(&self, bill_id: Uuid, payer: &PayerId, now: DateTime<Utc>) -> Result<Bill> {
        let cf = self.cf_handle(CF_BILLS)?;
        let txn = self.db.transaction();

        let value = txn
            .get_for_update_cf(&cf, bill_id.as_bytes(), true)?
            .ok_or(Error::BillNotFound(bill_id))?;
        let mut bill: Bill = bincode::deserialize(&value)?;

        match bill.status {
            BillStatus::Active | BillStatus::Locked if bill.is_expired_at(now) => {
                bill.status = BillStatus::Expired;
                txn.put_cf(&cf, bill_id.as_bytes(), bincode::serialize(&bill)?)?;
                self.append_event_txn(
                    &txn,
                    &BillEvent::record(
                        bill_id,
                        BillEventKind::Expired,
                        now,
                        Some("expired at redemption".to_string()),
                    ),
                )?;
                txn.commit()?;
                Err(Error::BillExpired(bill_id))
            }
            BillStatus::Active => {
                bill.status = BillStatus::Locked;
                bill.locked_at = Some(now);
                bill.locked_by = Some(payer.clone());
                txn.put_cf(&cf, bill_id.as_bytes(), bincode::serialize(&bill)?)?;
                self.append_event_txn(
                    &txn,
                    &BillEvent::record(
                        bill_id,
                        BillEventKind::Locked,
                        now,
                        Some(payer.as_str().to_string()),
                    ),
                )?;
                txn.commit()?;

                tracing::debug!(bill_id = %bill_id, payer = %payer, "Bill locked");
                Ok(bill)
            }
            BillStatus::Expired => Err(Error::BillExpired(bill_id)),
            status => Err(Error::BillNotActive { bill_id, status }),
        }
    }

    /// Release a Locked bill after a failed payment attempt
    /// (Locked -> Active). Idempotent for bills already back in Active.
    pub fn release_bill(&self, bill_id: Uuid, reason: &str, now: DateTime<Utc>) -> Result<Bill> {
        let cf = self.cf_handle(CF_BILLS)?;
        let txn = self.db.transaction();

        let value = txn
            .get_for_update_cf(&cf, bill_id.as_bytes(), true)?
            .ok_or(Error::BillNotFound(bill_id))?;
        let mut bill: Bill = bincode::deserialize(&value)?;

        match bill.status {
            BillStatus::Locked => {
                bill.status = BillStatus::Active;
                bill.locked_at = None;
                bill.locked_by = None;
                bill.processor_reference = None;
                bill.failure_count += 1;
                txn.put_cf(&cf, bill_id.as_bytes(), bincode::serialize(&bill)?)?;
                self.append_event_txn(
                    &txn,
                    &BillEvent::record(
                        bill_id,
                        BillEventKind::PaymentFailed,
                        now,
                        Some(reason.to_string()),
                    ),
                )?;
                txn.commit()?;

                tracing::debug!(
                    bill_id = %bill_id,
                    failure_count = bill.failure_count,
                    "Bill released for retry"
                );
                Ok(bill)
            }
            // Duplicate failure delivery after an earlier release
            BillStatus::Active => Ok(bill),
            status => Err(Error::BillNotActive { bill_id, status }),
        }
    }

    /// Attach the hosted-checkout order reference to a Locked bill.
    ///
    /// Idempotent when the same reference is already attached. The
    /// `pr|` index entry is kept for the life of the bill so duplicate
    /// confirmations keep resolving after a release.
    pub fn attach_processor_reference(
        &self,
        bill_id: Uuid,
        reference: &str,
        now: DateTime<Utc>,
    ) -> Result<Bill> {
        let cf_bills = self.cf_handle(CF_BILLS)?;
        let cf_indices = self.cf_handle(CF_INDICES)?;
        let txn = self.db.transaction();

        let value = txn
            .get_for_update_cf(&cf_bills, bill_id.as_bytes(), true)?
            .ok_or(Error::BillNotFound(bill_id))?;
        let mut bill: Bill = bincode::deserialize(&value)?;

        if bill.status != BillStatus::Locked {
            return Err(Error::BillNotActive {
                bill_id,
                status: bill.status,
            });
        }

        match bill.processor_reference.as_deref() {
            Some(existing) if existing == reference => return Ok(bill),
            Some(existing) => {
                return Err(Error::Other(format!(
                    "Bill {} already holds reference {}",
                    bill_id, existing
                )));
            }
            None => {}
        }

        bill.processor_reference = Some(reference.to_string());
        txn.put_cf(&cf_bills, bill_id.as_bytes(), bincode::serialize(&bill)?)?;
        txn.put_cf(
            &cf_indices,
            Self::index_key_reference(reference),
            bill_id.as_bytes(),
        )?;
        self.append_event_txn(
            &txn,
            &BillEvent::record(
                bill_id,
                BillEventKind::CheckoutOpened,
                now,
                Some(reference.to_string()),
            ),
        )?;
        txn.commit()?;

        Ok(bill)
    }

    /// Apply a success confirmation: Locked -> Paid plus the order row
    /// and its indices, all in one transaction.
    ///
    /// Replayed confirmations for an already-Paid bill with the same
    /// processor reference return `Duplicate` without writing.
    pub fn record_payment(&self, order: &Order) -> Result<RecordOutcome> {
        let cf_bills = self.cf_handle(CF_BILLS)?;
        let cf_orders = self.cf_handle(CF_ORDERS)?;
        let cf_indices = self.cf_handle(CF_INDICES)?;
        let txn = self.db.transaction();

        let value = txn
            .get_for_update_cf(&cf_bills, order.bill_id.as_bytes(), true)?
            .ok_or(Error::BillNotFound(order.bill_id))?;
        let mut bill: Bill = bincode::deserialize(&value)?;

        match bill.status {
            BillStatus::Locked => {
                // A stale reference means this confirmation belongs to a
                // released attempt, not the checkout currently in flight
                if bill.processor_reference.as_deref() != Some(order.processor_reference.as_str()) {
                    return Err(Error::BillNotActive {
                        bill_id: order.bill_id,
                        status: bill.status,
                    });
                }

                bill.status = BillStatus::Paid;
                bill.paid_at = Some(order.paid_at);
                txn.put_cf(&cf_bills, order.bill_id.as_bytes(), bincode::serialize(&bill)?)?;

                txn.put_cf(
                    &cf_orders,
                    order.order_id.as_bytes(),
                    bincode::serialize(order)?,
                )?;
                txn.put_cf(
                    &cf_indices,
                    Self::index_key_bill_order(order.bill_id),
                    order.order_id.as_bytes(),
                )?;
                txn.put_cf(
                    &cf_indices,
                    Self::index_key_merchant_order(order.merchant_id, order.order_id),
                    &[],
                )?;
                txn.put_cf(
                    &cf_indices,
                    Self::index_key_payer_order(&order.payer, order.order_id),
                    &[],
                )?;
                txn.put_cf(
                    &cf_indices,
                    Self::index_key_unsettled(order.merchant_id, order.order_id),
                    &[],
                )?;
                self.append_event_txn(
                    &txn,
                    &BillEvent::record(
                        order.bill_id,
                        BillEventKind::Paid,
                        order.paid_at,
                        Some(order.processor_reference.clone()),
                    ),
                )?;
                txn.commit()?;

                tracing::info!(
                    bill_id = %order.bill_id,
                    order_id = %order.order_id,
                    net_paid = %order.net_paid,
                    reference = %order.processor_reference,
                    "Payment recorded"
                );
                Ok(RecordOutcome::Recorded)
            }
            BillStatus::Paid => {
                let existing = self
                    .order_for_bill(order.bill_id)?
                    .ok_or(Error::OrderNotFound(order.order_id))?;
                if existing.processor_reference == order.processor_reference {
                    Ok(RecordOutcome::Duplicate)
                } else {
                    Err(Error::BillNotActive {
                        bill_id: order.bill_id,
                        status: BillStatus::Paid,
                    })
                }
            }
            status => Err(Error::BillNotActive {
                bill_id: order.bill_id,
                status,
            }),
        }
    }

    /// Flip a stale bill to Expired (Active | Locked -> Expired).
    ///
    /// Returns `Ok(None)` when the bill is already terminal. The
    /// expiry-ladder entry is removed in the same transaction.
    pub fn expire_bill(&self, bill_id: Uuid, now: DateTime<Utc>) -> Result<Option<Bill>> {
        let cf_bills = self.cf_handle(CF_BILLS)?;
        let cf_indices = self.cf_handle(CF_INDICES)?;
        let txn = self.db.transaction();

        let value = txn
            .get_for_update_cf(&cf_bills, bill_id.as_bytes(), true)?
            .ok_or(Error::BillNotFound(bill_id))?;
        let mut bill: Bill = bincode::deserialize(&value)?;

        if bill.status.is_terminal() {
            return Ok(None);
        }

        bill.status = BillStatus::Expired;
        txn.put_cf(&cf_bills, bill_id.as_bytes(), bincode::serialize(&bill)?)?;
        txn.delete_cf(&cf_indices, Self::index_key_expiry(bill.expires_at, bill_id))?;
        self.append_event_txn(
            &txn,
            &BillEvent::record(bill_id, BillEventKind::Expired, now, None),
        )?;
        txn.commit()?;

        Ok(Some(bill))
    }

    /// Withdraw an Active bill (Active -> Cancelled)
    pub fn cancel_bill(&self, bill_id: Uuid, now: DateTime<Utc>) -> Result<Bill> {
        let cf = self.cf_handle(CF_BILLS)?;
        let txn = self.db.transaction();

        let value = txn
            .get_for_update_cf(&cf, bill_id.as_bytes(), true)?
            .ok_or(Error::BillNotFound(bill_id))?;
        let mut bill: Bill = bincode::deserialize(&value)?;

        if bill.status != BillStatus::Active {
            return Err(Error::BillNotActive {
                bill_id,
                status: bill.status,
            });
        }

        bill.status = BillStatus::Cancelled;
        txn.put_cf(&cf, bill_id.as_bytes(), bincode::serialize(&bill)?)?;
        self.append_event_txn(
            &txn,
            &BillEvent::record(bill_id, BillEventKind::Cancelled, now, None),
        )?;
        txn.commit()?;

        tracing::debug!(bill_id = %bill_id, "Bill cancelled");
        Ok(bill)
    }

    /// Look up the bill a processor reference was attached to
    pub fn find_bill_by_processor_reference(&self, reference: &str) -> Result<Bill> {
        let cf = self.cf_handle(CF_INDICES)?;
        let value = self
            .db
            .get_cf(&cf, Self::index_key_reference(reference))?
            .ok_or_else(|| Error::UnknownReference(reference.to_string()))?;

        if value.len() != 16 {
            return Err(Error::Storage(format!(
                "Corrupt reference index entry for {}",
                reference
            )));
        }
        let id_bytes: [u8; 16] = value[..16].try_into().unwrap();
        self.get_bill(Uuid::from_bytes(id_bytes))
    }

    // Order reads

    /// Get order by ID
    pub fn get_order(&self, order_id: Uuid) -> Result<Order> {
        let cf = self.cf_handle(CF_ORDERS)?;
        let value = self
            .db
            .get_cf(&cf, order_id.as_bytes())?
            .ok_or(Error::OrderNotFound(order_id))?;
        let order: Order = bincode::deserialize(&value)?;
        Ok(order)
    }

    /// The order recorded for a paid bill, if any
    pub fn order_for_bill(&self, bill_id: Uuid) -> Result<Option<Order>> {
        let cf = self.cf_handle(CF_INDICES)?;
        let value = self.db.get_cf(&cf, Self::index_key_bill_order(bill_id))?;

        match value {
            Some(bytes) if bytes.len() == 16 => {
                let id_bytes: [u8; 16] = bytes[..16].try_into().unwrap();
                Ok(Some(self.get_order(Uuid::from_bytes(id_bytes))?))
            }
            Some(_) => Err(Error::Storage(format!(
                "Corrupt order index entry for bill {}",
                bill_id
            ))),
            None => Ok(None),
        }
    }

    /// Orders recorded for a merchant with `paid_at` in `[from, to)`
    pub fn orders_by_merchant(
        &self,
        merchant_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Order>> {
        let mut prefix = b"mo|".to_vec();
        prefix.extend_from_slice(merchant_id.as_bytes());

        let mut orders = Vec::new();
        for order_id in self.scan_index_suffix_ids(&prefix)? {
            let order = self.get_order(order_id)?;
            if order.paid_at >= from && order.paid_at < to {
                orders.push(order);
            }
        }
        Ok(orders)
    }

    /// All orders a payer has completed
    pub fn orders_by_payer(&self, payer: &PayerId) -> Result<Vec<Order>> {
        let mut prefix = b"po|".to_vec();
        prefix.extend_from_slice(payer.as_str().as_bytes());
        prefix.push(b'|');

        let mut orders = Vec::new();
        for order_id in self.scan_index_suffix_ids(&prefix)? {
            orders.push(self.get_order(order_id)?);
        }
        Ok(orders)
    }

    /// Settlement-pending orders for a merchant paid before the cutoff.
    ///
    /// No lower bound: an order that missed its own period (late
    /// confirmation, skipped pass) is swept into the next one instead
    /// of being orphaned.
    pub fn unsettled_orders(&self, merchant_id: Uuid, before: DateTime<Utc>) -> Result<Vec<Order>> {
        let mut prefix = b"uo|".to_vec();
        prefix.extend_from_slice(merchant_id.as_bytes());

        let mut orders = Vec::new();
        for order_id in self.scan_index_suffix_ids(&prefix)? {
            let order = self.get_order(order_id)?;
            if order.paid_at < before {
                orders.push(order);
            }
        }
        Ok(orders)
    }

    // Settlement operations

    /// Persist a settlement and attach it to every included order.
    ///
    /// Each order is locked and checked; an order that already belongs
    /// to a settlement aborts the whole unit with `AlreadySettled`.
    pub fn create_settlement(&self, settlement: &Settlement) -> Result<()> {
        let cf_orders = self.cf_handle(CF_ORDERS)?;
        let cf_settlements = self.cf_handle(CF_SETTLEMENTS)?;
        let cf_indices = self.cf_handle(CF_INDICES)?;
        let txn = self.db.transaction();

        for &order_id in &settlement.order_ids {
            let value = txn
                .get_for_update_cf(&cf_orders, order_id.as_bytes(), true)?
                .ok_or(Error::OrderNotFound(order_id))?;
            let mut order: Order = bincode::deserialize(&value)?;

            if order.settlement_id.is_some() {
                return Err(Error::AlreadySettled(order_id));
            }
            order.settlement_id = Some(settlement.settlement_id);

            txn.put_cf(&cf_orders, order_id.as_bytes(), bincode::serialize(&order)?)?;
            txn.delete_cf(
                &cf_indices,
                Self::index_key_unsettled(settlement.merchant_id, order_id),
            )?;
        }

        txn.put_cf(
            &cf_settlements,
            settlement.settlement_id.as_bytes(),
            bincode::serialize(settlement)?,
        )?;
        txn.put_cf(
            &cf_indices,
            Self::index_key_merchant_settlement(settlement.merchant_id, settlement.settlement_id),
            &[],
        )?;
        txn.commit()?;

        tracing::info!(
            settlement_id = %settlement.settlement_id,
            merchant_id = %settlement.merchant_id,
            orders = settlement.order_count(),
            payable_total = %settlement.payable_total,
            method = ?settlement.payout_method,
            fallback = settlement.fallback_applied,
            "Settlement created"
        );

        Ok(())
    }

    /// Record the payout for a settlement (Pending -> Paid)
    pub fn mark_settlement_paid(
        &self,
        settlement_id: Uuid,
        payout_reference: &str,
        now: DateTime<Utc>,
    ) -> Result<Settlement> {
        let cf = self.cf_handle(CF_SETTLEMENTS)?;
        let txn = self.db.transaction();

        let value = txn
            .get_for_update_cf(&cf, settlement_id.as_bytes(), true)?
            .ok_or(Error::UnknownSettlement(settlement_id))?;
        let mut settlement: Settlement = bincode::deserialize(&value)?;

        if settlement.status == SettlementStatus::Paid {
            return Err(Error::AlreadyPaid(settlement_id));
        }

        settlement.status = SettlementStatus::Paid;
        settlement.payout_reference = Some(payout_reference.to_string());
        settlement.paid_at = Some(now);

        txn.put_cf(
            &cf,
            settlement_id.as_bytes(),
            bincode::serialize(&settlement)?,
        )?;
        txn.commit()?;

        tracing::info!(
            settlement_id = %settlement_id,
            payout_reference = %payout_reference,
            "Settlement paid"
        );

        Ok(settlement)
    }

    /// Get settlement by ID
    pub fn get_settlement(&self, settlement_id: Uuid) -> Result<Settlement> {
        let cf = self.cf_handle(CF_SETTLEMENTS)?;
        let value = self
            .db
            .get_cf(&cf, settlement_id.as_bytes())?
            .ok_or(Error::UnknownSettlement(settlement_id))?;
        let settlement: Settlement = bincode::deserialize(&value)?;
        Ok(settlement)
    }

    /// Settlements computed for a merchant, oldest first
    pub fn settlements_by_merchant(&self, merchant_id: Uuid) -> Result<Vec<Settlement>> {
        let mut prefix = b"ms|".to_vec();
        prefix.extend_from_slice(merchant_id.as_bytes());

        let mut settlements = Vec::new();
        for settlement_id in self.scan_index_suffix_ids(&prefix)? {
            settlements.push(self.get_settlement(settlement_id)?);
        }
        Ok(settlements)
    }

    // Audit events

    /// Append an audit event that is not tied to a state transition
    /// (late confirmations)
    pub fn append_bill_event(&self, event: &BillEvent) -> Result<()> {
        let cf = self.cf_handle(CF_BILL_EVENTS)?;
        let key = Self::event_key(event.bill_id, event.event_id);
        self.db.put_cf(&cf, key, bincode::serialize(event)?)?;
        Ok(())
    }

    /// Audit trail for a bill, oldest first
    pub fn bill_events(&self, bill_id: Uuid) -> Result<Vec<BillEvent>> {
        let cf = self.cf_handle(CF_BILL_EVENTS)?;
        let prefix = bill_id.as_bytes().to_vec();
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(&prefix, Direction::Forward));

        let mut events = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            let event: BillEvent = bincode::deserialize(&value)?;
            events.push(event);
        }
        Ok(events)
    }

    fn append_event_txn(
        &self,
        txn: &Transaction<'_, TransactionDB<MultiThreaded>>,
        event: &BillEvent,
    ) -> Result<()> {
        let cf = self.cf_handle(CF_BILL_EVENTS)?;
        let key = Self::event_key(event.bill_id, event.event_id);
        txn.put_cf(&cf, key, bincode::serialize(event)?)?;
        Ok(())
    }

    // Expiry ladder

    /// Bills whose ladder entry is due at `now`, oldest first.
    ///
    /// Entries are keyed by big-endian expiry seconds, so the scan
    /// stops at the first entry in the future.
    pub fn stale_bill_ids(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Uuid>> {
        let cf = self.cf_handle(CF_INDICES)?;
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(b"be|", Direction::Forward));
        let cutoff = now.timestamp().max(0) as u64;

        let mut ids = Vec::new();
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(b"be|") || ids.len() >= limit {
                break;
            }
            if key.len() != 3 + 8 + 16 {
                continue;
            }
            let ts_bytes: [u8; 8] = key[3..11].try_into().unwrap();
            if u64::from_be_bytes(ts_bytes) > cutoff {
                break;
            }
            let id_bytes: [u8; 16] = key[11..27].try_into().unwrap();
            ids.push(Uuid::from_bytes(id_bytes));
        }
        Ok(ids)
    }

    /// Drop the ladder entry for a bill that reached a terminal state
    /// by another path than expiry
    pub fn clear_expiry_entry(&self, bill: &Bill) -> Result<()> {
        let cf = self.cf_handle(CF_INDICES)?;
        self.db
            .delete_cf(&cf, Self::index_key_expiry(bill.expires_at, bill.bill_id))?;
        Ok(())
    }

    // Index key helpers

    fn index_key_reference(reference: &str) -> Vec<u8> {
        let mut key = b"pr|".to_vec();
        key.extend_from_slice(reference.as_bytes());
        key
    }

    fn index_key_bill_order(bill_id: Uuid) -> Vec<u8> {
        let mut key = b"bo|".to_vec();
        key.extend_from_slice(bill_id.as_bytes());
        key
    }

    fn index_key_merchant_order(merchant_id: Uuid, order_id: Uuid) -> Vec<u8> {
        let mut key = b"mo|".to_vec();
        key.extend_from_slice(merchant_id.as_bytes());
        key.extend_from_slice(order_id.as_bytes());
        key
    }

    fn index_key_payer_order(payer: &PayerId, order_id: Uuid) -> Vec<u8> {
        let mut key = b"po|".to_vec();
        key.extend_from_slice(payer.as_str().as_bytes());
        key.push(b'|'); // Separator
        key.extend_from_slice(order_id.as_bytes());
        key
    }

    fn index_key_unsettled(merchant_id: Uuid, order_id: Uuid) -> Vec<u8> {
        let mut key = b"uo|".to_vec();
        key.extend_from_slice(merchant_id.as_bytes());
        key.extend_from_slice(order_id.as_bytes());
        key
    }

    fn index_key_expiry(expires_at: DateTime<Utc>, bill_id: Uuid) -> Vec<u8> {
        let mut key = b"be|".to_vec();
        key.extend_from_slice(&(expires_at.timestamp().max(0) as u64).to_be_bytes());
        key.extend_from_slice(bill_id.as_bytes());
        key
    }

    fn index_key_merchant_settlement(merchant_id: Uuid, settlement_id: Uuid) -> Vec<u8> {
        let mut key = b"ms|".to_vec();
        key.extend_from_slice(merchant_id.as_bytes());
        key.extend_from_slice(settlement_id.as_bytes());
        key
    }

    fn event_key(bill_id: Uuid, event_id: Uuid) -> Vec<u8> {
        let mut key = bill_id.as_bytes().to_vec();
        key.extend_from_slice(event_id.as_bytes());
        key
    }

    /// Scan an index prefix and return the trailing 16-byte IDs
    fn scan_index_suffix_ids(&self, prefix: &[u8]) -> Result<Vec<Uuid>> {
        let cf = self.cf_handle(CF_INDICES)?;
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(prefix, Direction::Forward));

        let mut ids = Vec::new();
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            if key.len() >= prefix.len() + 16 {
                let id_bytes: [u8; 16] = key[key.len() - 16..].try_into().unwrap();
                ids.push(Uuid::from_bytes(id_bytes));
            }
        }
        Ok(ids)
    }

    // Statistics

    /// Get storage statistics
    pub fn stats(&self) -> Result<StorageStats> {
        Ok(StorageStats {
            total_merchants: self.count_cf(CF_MERCHANTS)?,
            total_bills: self.count_cf(CF_BILLS)?,
            total_orders: self.count_cf(CF_ORDERS)?,
            total_settlements: self.count_cf(CF_SETTLEMENTS)?,
        })
    }

    fn count_cf(&self, name: &str) -> Result<u64> {
        let cf = self.cf_handle(name)?;
        let mut count = 0u64;
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            item?;
            count += 1;
        }
        Ok(count)
    }

    /// Close database (graceful shutdown)
    pub fn close(self) -> Result<()> {
        drop(self.db);
        tracing::info!("Billing store closed gracefully");
        Ok(())
    }
}

/// Storage statistics
#[derive(Debug, Clone)]
pub struct StorageStats {
    /// Registered merchants
    pub total_merchants: u64,
    /// Bills across all states
    pub total_bills: u64,
    /// Recorded orders
    pub total_orders: u64,
    /// Settlement statements
    pub total_settlements: u64,
}
