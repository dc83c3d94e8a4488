//! Discount and fee arithmetic
//!
//! All money math on the platform funnels through this module. Amounts
//! are integer minor units; both the discount and the platform fee use
//! round-half-up, computed in integer arithmetic so results are exact
//! and reproducible on every node.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{Amount, DiscountRate};

/// Server-computed split of a bill's gross amount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountBreakdown {
    /// Amount before discount
    pub gross: Amount,
    /// Rate applied
    pub rate: DiscountRate,
    /// Discount granted
    pub discount: Amount,
    /// Amount the payer pays
    pub net_payable: Amount,
}

/// Split a gross amount into discount and payable parts.
///
/// discount = gross * rate / 100, rounded half-up. The identity
/// `discount + net_payable == gross` holds for every valid input.
pub fn breakdown(gross: Amount, rate: DiscountRate) -> Result<DiscountBreakdown> {
    if !gross.is_positive() {
        return Err(Error::InvalidAmount(gross.minor()));
    }
    let discount = Amount::from_minor(round_half_up(
        gross.minor() as i128 * rate.percent() as i128,
        100,
    ));
    Ok(DiscountBreakdown {
        gross,
        rate,
        discount,
        net_payable: gross - discount,
    })
}

/// Platform fee in basis points of the charged amount, rounded half-up.
///
/// Snapshotted onto the order at confirmation time, so later fee
/// changes never rewrite recorded history.
pub fn platform_fee(net_paid: Amount, fee_bps: u32) -> Amount {
    Amount::from_minor(round_half_up(
        net_paid.minor() as i128 * fee_bps as i128,
        10_000,
    ))
}

/// Integer round-half-up division for non-negative numerators
fn round_half_up(numerator: i128, denominator: i128) -> i64 {
    ((numerator + denominator / 2) / denominator) as i64
}
