//! Property-based tests for billing invariants
//!
//! These tests use proptest to verify critical invariants:
//! - Discount identity: discount + net_payable == gross, always
//! - Round-half-up exactness of the integer discount rule
//! - Accounting identity: discount + fee + merchant net == gross
//! - Token round-trips; tampered tokens never decode

use billing_core::{
    discount::{breakdown, platform_fee},
    token::{decode_token, encode_token},
    types::ALLOWED_DISCOUNT_RATES,
    Amount, Bill, BillStatus, DiscountRate, Error,
};
use chrono::{DateTime, Duration, Utc};
use proptest::prelude::*;
use uuid::Uuid;

/// Strategy for valid gross amounts in minor units
fn gross_strategy() -> impl Strategy<Value = Amount> {
    (1i64..1_000_000_000i64).prop_map(Amount::from_minor)
}

/// Strategy for allowed discount rates
fn rate_strategy() -> impl Strategy<Value = DiscountRate> {
    prop::sample::select(&ALLOWED_DISCOUNT_RATES[..])
        .prop_map(|percent| DiscountRate::new(percent).unwrap())
}

/// Strategy for fee rates in basis points
fn fee_bps_strategy() -> impl Strategy<Value = u32> {
    0u32..=10_000
}

/// Strategy for bills carrying arbitrary IDs and expiries
fn bill_strategy() -> impl Strategy<Value = Bill> {
    (
        any::<[u8; 16]>(),
        any::<[u8; 16]>(),
        0i64..=4_102_444_800i64,
        gross_strategy(),
        rate_strategy(),
    )
        .prop_map(|(bill_bytes, merchant_bytes, expiry_secs, gross, rate)| {
            let split = breakdown(gross, rate).unwrap();
            let expires_at = DateTime::<Utc>::from_timestamp(expiry_secs, 0).unwrap();
            Bill {
                bill_id: Uuid::from_bytes(bill_bytes),
                merchant_id: Uuid::from_bytes(merchant_bytes),
                gross_amount: gross,
                discount_rate: rate,
                discount_amount: split.discount,
                net_payable: split.net_payable,
                status: BillStatus::Active,
                created_at: expires_at - Duration::minutes(5),
                expires_at,
                locked_at: None,
                locked_by: None,
                processor_reference: None,
                paid_at: None,
                failure_count: 0,
            }
        })
}

const TOKEN_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: discount + net_payable == gross for every valid input
    #[test]
    fn prop_discount_identity(gross in gross_strategy(), rate in rate_strategy()) {
        let split = breakdown(gross, rate).unwrap();
        prop_assert_eq!(split.discount + split.net_payable, gross);
        prop_assert!(split.discount.minor() >= 0);
        prop_assert!(split.net_payable.minor() >= 0);
    }

    /// Property: the discount is the exact round-half-up of gross * rate / 100
    #[test]
    fn prop_discount_rounds_half_up(gross in gross_strategy(), rate in rate_strategy()) {
        let split = breakdown(gross, rate).unwrap();
        let product = gross.minor() as i128 * rate.percent() as i128;
        let diff = split.discount.minor() as i128 * 100 - product;

        // Within half a unit of the true quotient, ties away from zero
        prop_assert!(diff > -50 && diff <= 50);
        if product % 100 == 50 {
            prop_assert_eq!(diff, 50);
        }
    }

    /// Property: non-positive gross amounts are rejected
    #[test]
    fn prop_non_positive_gross_rejected(units in -1_000_000i64..=0, rate in rate_strategy()) {
        let err = breakdown(Amount::from_minor(units), rate).unwrap_err();
        prop_assert!(matches!(err, Error::InvalidAmount(_)));
    }

    /// Property: the platform fee never exceeds the charged amount
    #[test]
    fn prop_fee_bounded_by_net(gross in gross_strategy(), rate in rate_strategy(), bps in fee_bps_strategy()) {
        let split = breakdown(gross, rate).unwrap();
        let fee = platform_fee(split.net_payable, bps);
        prop_assert!(fee.minor() >= 0);
        prop_assert!(fee <= split.net_payable);
    }

    /// Property: discount + fee + merchant net always reassemble the gross
    #[test]
    fn prop_accounting_identity(gross in gross_strategy(), rate in rate_strategy(), bps in fee_bps_strategy()) {
        let split = breakdown(gross, rate).unwrap();
        let fee = platform_fee(split.net_payable, bps);
        let merchant_net = split.net_payable - fee;
        prop_assert_eq!(split.discount + fee + merchant_net, gross);
    }

    /// Property: tokens round-trip through encode and decode
    #[test]
    fn prop_token_roundtrip(bill in bill_strategy()) {
        let token = encode_token(&bill).unwrap();
        let payload = decode_token(&token).unwrap();
        prop_assert_eq!(payload.bill_id, bill.bill_id);
        prop_assert_eq!(payload.merchant_id, bill.merchant_id);
        prop_assert_eq!(payload.expires_at, bill.expires_at.timestamp());
    }

    /// Property: flipping any single character makes a token malformed
    #[test]
    fn prop_tampered_token_rejected(bill in bill_strategy(), position in any::<prop::sample::Index>(), replacement in any::<prop::sample::Index>()) {
        let token = encode_token(&bill).unwrap();
        let mut chars: Vec<u8> = token.into_bytes();
        let at = position.index(chars.len());
        let substitute = TOKEN_ALPHABET[replacement.index(TOKEN_ALPHABET.len())];
        prop_assume!(chars[at] != substitute);
        chars[at] = substitute;
        let tampered = String::from_utf8(chars).unwrap();

        let err = decode_token(&tampered).unwrap_err();
        prop_assert!(matches!(err, Error::MalformedToken(_)));
    }
}

mod scenario_tests {
    use super::*;

    #[test]
    fn six_percent_of_54000_is_exact() {
        let split = breakdown(
            Amount::from_minor(54_000),
            DiscountRate::new(6).unwrap(),
        )
        .unwrap();
        assert_eq!(split.discount, Amount::from_minor(3_240));
        assert_eq!(split.net_payable, Amount::from_minor(50_760));

        let fee = platform_fee(split.net_payable, 250);
        assert_eq!(fee, Amount::from_minor(1_269));
        assert_eq!(
            split.discount + fee + (split.net_payable - fee),
            Amount::from_minor(54_000)
        );
    }

    #[test]
    fn every_allowed_rate_holds_identity_on_awkward_grosses() {
        for &percent in &ALLOWED_DISCOUNT_RATES {
            let rate = DiscountRate::new(percent).unwrap();
            for gross in [1, 7, 33, 99, 101, 54_000, 999_999_937] {
                let split = breakdown(Amount::from_minor(gross), rate).unwrap();
                assert_eq!(
                    split.discount + split.net_payable,
                    Amount::from_minor(gross),
                    "identity failed for gross {} at {}",
                    gross,
                    rate
                );
            }
        }
    }
}
