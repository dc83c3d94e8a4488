//! Core types for the billing platform
//!
//! Everything that crosses the storage boundary lives here: bills and
//! their lifecycle, merchants and compliance state, immutable payment
//! orders, settlement statements, and the audit events appended next to
//! every bill transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Discount percentages a merchant may be configured with.
///
/// Rates are whole percentages validated server-side on every
/// configuration change; callers never supply a rate at issuance.
pub const ALLOWED_DISCOUNT_RATES: [u8; 9] = [2, 3, 5, 6, 8, 10, 12, 15, 20];

/// Monetary amount in minor currency units.
///
/// All money on the platform is an integer count of minor units.
/// Fractions never occur; rounding happens exactly once, in the
/// discount calculator.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Amount(i64);

impl Amount {
    /// Zero
    pub const ZERO: Amount = Amount(0);

    /// Wrap a count of minor units
    pub fn from_minor(units: i64) -> Self {
        Self(units)
    }

    /// The count of minor units
    pub fn minor(&self) -> i64 {
        self.0
    }

    /// True for amounts strictly above zero
    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }
}

impl std::ops::Add for Amount {
    type Output = Amount;

    fn add(self, rhs: Amount) -> Amount {
        Amount(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Amount {
    type Output = Amount;

    fn sub(self, rhs: Amount) -> Amount {
        Amount(self.0 - rhs.0)
    }
}

impl std::iter::Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Amount {
        iter.fold(Amount::ZERO, |acc, a| acc + a)
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whole-percent discount rate drawn from the platform's allowed set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DiscountRate(u8);

impl DiscountRate {
    /// Validate and wrap a whole-percent rate
    pub fn new(percent: u8) -> Result<Self> {
        if ALLOWED_DISCOUNT_RATES.contains(&percent) {
            Ok(Self(percent))
        } else {
            Err(Error::InvalidRate(percent))
        }
    }

    /// The rate as a whole percentage
    pub fn percent(&self) -> u8 {
        self.0
    }
}

impl std::fmt::Display for DiscountRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// Opaque reference to an authenticated payer
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PayerId(String);

impl PayerId {
    /// Create a new payer reference
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Bill lifecycle states.
///
/// Transitions are forward-only; the single backward edge is
/// Locked -> Active when a payment attempt fails before expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum BillStatus {
    /// Issued and scannable
    Active = 1,
    /// Claimed by a payer; checkout in progress
    Locked = 2,
    /// Payment confirmed; an order exists
    Paid = 3,
    /// Expiry passed without payment
    Expired = 4,
    /// Withdrawn by the merchant before redemption
    Cancelled = 5,
}

impl BillStatus {
    /// Terminal states accept no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BillStatus::Paid | BillStatus::Expired | BillStatus::Cancelled
        )
    }
}

/// A scannable request for one discounted payment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bill {
    /// Unique bill ID (UUIDv7, time-ordered)
    pub bill_id: Uuid,
    /// Issuing merchant
    pub merchant_id: Uuid,
    /// Amount before discount, minor units
    pub gross_amount: Amount,
    /// Rate applied at issuance
    pub discount_rate: DiscountRate,
    /// Server-computed discount, minor units
    pub discount_amount: Amount,
    /// Amount the payer will be charged, minor units
    pub net_payable: Amount,
    /// Current lifecycle state
    pub status: BillStatus,
    /// Issuance time
    pub created_at: DateTime<Utc>,
    /// Hard expiry; stale bills are swept to Expired
    pub expires_at: DateTime<Utc>,
    /// When the current lock was taken
    pub locked_at: Option<DateTime<Utc>>,
    /// Payer session holding the lock
    pub locked_by: Option<PayerId>,
    /// Hosted-checkout order reference at the processor, once opened
    pub processor_reference: Option<String>,
    /// When payment was confirmed
    pub paid_at: Option<DateTime<Utc>>,
    /// Failed payment attempts recorded against this bill
    pub failure_count: u32,
}

impl Bill {
    /// True once the wall clock has reached the bill's expiry
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Merchant verification states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ComplianceStatus {
    /// Registered, awaiting review
    PendingReview = 1,
    /// Approved for issuance
    Verified = 2,
    /// Review failed
    Rejected = 3,
    /// Suspended by the platform; issuance blocked
    Suspended = 4,
}

/// How a merchant's funds reach the merchant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SettlementMode {
    /// Platform collects and pays out on a settlement schedule
    PlatformManaged = 1,
    /// Processor splits funds to the merchant at transaction time
    Direct = 2,
}

/// A registered merchant.
///
/// Merchants are never deleted; suspension blocks issuance while
/// preserving history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Merchant {
    /// Unique merchant ID
    pub merchant_id: Uuid,
    /// Name shown to payers on redemption
    pub display_name: String,
    /// Discount rate applied to this merchant's bills
    pub discount_rate: DiscountRate,
    /// Configured settlement mode
    pub settlement_mode: SettlementMode,
    /// Payout destination, required for direct payouts
    pub payout_account: Option<String>,
    /// Verification state
    pub compliance_status: ComplianceStatus,
    /// Direct-payout eligibility; revoked on split failures
    pub direct_payout_ok: bool,
    /// Registration time
    pub created_at: DateTime<Utc>,
    /// Last administrative change
    pub updated_at: DateTime<Utc>,
}

impl Merchant {
    /// Whether new bills may be issued for this merchant
    pub fn can_issue(&self) -> bool {
        self.compliance_status == ComplianceStatus::Verified
    }

    /// Whether settlement may pay this merchant through the direct route
    pub fn direct_payout_eligible(&self) -> bool {
        self.compliance_status == ComplianceStatus::Verified
            && self.settlement_mode == SettlementMode::Direct
            && self.direct_payout_ok
            && self.payout_account.is_some()
    }
}

/// Immutable record of one completed discounted payment.
///
/// Written exactly once when a success confirmation lands. The only
/// field that changes afterwards is `settlement_id`, set once when the
/// order enters a settlement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Unique order ID (UUIDv7)
    pub order_id: Uuid,
    /// Bill this order settles
    pub bill_id: Uuid,
    /// Merchant paid
    pub merchant_id: Uuid,
    /// Payer who completed checkout
    pub payer: PayerId,
    /// Bill amount before discount, minor units
    pub gross_amount: Amount,
    /// Discount granted, minor units
    pub discount_amount: Amount,
    /// Platform fee carved from the charged amount, minor units
    pub platform_fee: Amount,
    /// Amount actually charged to the payer, minor units
    pub net_paid: Amount,
    /// Processor transaction reference
    pub processor_reference: String,
    /// Settlement mode in effect when the payment completed
    pub settlement_mode: SettlementMode,
    /// Settlement this order belongs to, set exactly once
    pub settlement_id: Option<Uuid>,
    /// Confirmation time
    pub paid_at: DateTime<Utc>,
}

impl Order {
    /// What the merchant is owed for this order
    pub fn merchant_net(&self) -> Amount {
        self.net_paid - self.platform_fee
    }
}

/// Settlement statement lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SettlementStatus {
    /// Computed, awaiting payout
    Pending = 1,
    /// Payout executed and referenced
    Paid = 2,
}

/// Per-merchant payout statement for one settlement period
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settlement {
    /// Unique settlement ID (UUIDv7)
    pub settlement_id: Uuid,
    /// Merchant being paid
    pub merchant_id: Uuid,
    /// Period start (inclusive)
    pub period_start: DateTime<Utc>,
    /// Period end (exclusive)
    pub period_end: DateTime<Utc>,
    /// Orders included, each attached exactly once
    pub order_ids: Vec<Uuid>,
    /// Sum of merchant net over the included orders, minor units
    pub payable_total: Amount,
    /// Route used for this statement
    pub payout_method: SettlementMode,
    /// True when a Direct merchant was settled platform-managed
    pub fallback_applied: bool,
    /// Statement state
    pub status: SettlementStatus,
    /// External payout reference, once paid
    pub payout_reference: Option<String>,
    /// Computation time
    pub created_at: DateTime<Utc>,
    /// When the payout was recorded
    pub paid_at: Option<DateTime<Utc>>,
}

impl Settlement {
    /// Number of orders included in this statement
    pub fn order_count(&self) -> usize {
        self.order_ids.len()
    }
}

/// Kinds of audit events recorded against a bill
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum BillEventKind {
    /// Bill created
    Issued = 1,
    /// Redeemed and locked by a payer
    Locked = 2,
    /// Hosted-checkout order opened at the processor
    CheckoutOpened = 3,
    /// Payment attempt failed; bill released for retry
    PaymentFailed = 4,
    /// Payment confirmed; order recorded
    Paid = 5,
    /// Flipped to expired
    Expired = 6,
    /// Withdrawn by the merchant
    Cancelled = 7,
    /// Success confirmation arrived after the bill left LOCKED
    LateConfirmation = 8,
}

/// Audit event appended in the same transaction as a bill transition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillEvent {
    /// Unique event ID (UUIDv7, time-ordered)
    pub event_id: Uuid,
    /// Bill the event belongs to
    pub bill_id: Uuid,
    /// What happened
    pub kind: BillEventKind,
    /// When it happened
    pub at: DateTime<Utc>,
    /// Free-form context (failure reasons, references)
    pub detail: Option<String>,
}

impl BillEvent {
    /// Build an event for a bill
    pub fn record(
        bill_id: Uuid,
        kind: BillEventKind,
        at: DateTime<Utc>,
        detail: Option<String>,
    ) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            bill_id,
            kind,
            at,
            detail,
        }
    }
}

/// Ed25519 signature bytes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature(#[serde(with = "serde_bytes")] [u8; 64]);

impl Signature {
    /// Wrap raw signature bytes
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    /// The raw signature bytes
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    /// Verify this signature over a message with the given public key
    pub fn verify(&self, message: &[u8], public_key: &[u8; 32]) -> bool {
        crate::crypto::verify_signature(message, self, public_key)
    }
}
