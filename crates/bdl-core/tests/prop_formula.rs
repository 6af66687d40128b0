// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// PROPERTY-BASED TESTS — bdl-core formulas
//
// Curve math invariants that must hold for every input, not just the
// hand-picked regression values in the unit tests.
// Run: cargo test --release -p bdl-core --test prop_formula
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use bdl_core::formula::{purchase_amount, purchase_return, sale_amount, sale_return};
use bdl_core::{mul_div, Dec, UNITS_PER_COIN};
use proptest::prelude::*;

// ─────────────────────────────────────────────────────────────────
// ROUND TRIPS
// ─────────────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Linear curve: buying then pricing the minted amount is exact when
    /// supply is a multiple of reserve.
    #[test]
    fn prop_linear_round_trip_exact(
        reserve in 1u128..=1_000_000 * UNITS_PER_COIN,
        k in 1u128..=50,
        x in 1u128..=1_000_000 * UNITS_PER_COIN,
    ) {
        let supply = reserve * k;
        let minted = purchase_return(supply, reserve, 100, x);
        prop_assert_eq!(purchase_amount(supply, reserve, 100, minted), x);
    }

    /// Non-linear curve: round trip is off by at most one unit while the
    /// reserve price of one curve unit stays below one native unit.
    #[test]
    fn prop_curve_round_trip_within_one_unit(
        supply in 1_000u128 * UNITS_PER_COIN..=1_000_000_000 * UNITS_PER_COIN,
        k in 100u128..=10_000,
        crr in 10u8..=99,
        frac in 1u64..=1_000_000,
    ) {
        let reserve = supply / k;
        let x = (mul_div(reserve, frac as u128, 1_000_000).unwrap()).max(1);
        let minted = purchase_return(supply, reserve, crr, x);
        let paid = purchase_amount(supply, reserve, crr, minted);
        prop_assert!(paid.abs_diff(x) <= 1, "x {} paid {}", x, paid);
    }
}

// ─────────────────────────────────────────────────────────────────
// SALE BOUNDS
// ─────────────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_sale_return_never_exceeds_reserve(
        supply in 1u128..=u64::MAX as u128,
        reserve in 0u128..=u64::MAX as u128,
        crr in 1u8..=100,
        amount in 0u128..=u64::MAX as u128,
    ) {
        prop_assert!(sale_return(supply, reserve, crr, amount) <= reserve);
    }

    #[test]
    fn prop_sale_return_monotone(
        supply in UNITS_PER_COIN..=1_000_000 * UNITS_PER_COIN,
        reserve in UNITS_PER_COIN..=1_000_000 * UNITS_PER_COIN,
        crr in 1u8..=100,
        a in 0u64..=1_000_000,
        b in 0u64..=1_000_000,
    ) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let lo = mul_div(supply, lo as u128, 1_000_000).unwrap();
        let hi = mul_div(supply, hi as u128, 1_000_000).unwrap();
        prop_assert!(sale_return(supply, reserve, crr, lo) <= sale_return(supply, reserve, crr, hi));
    }

    #[test]
    fn prop_sale_amount_never_exceeds_supply(
        supply in 1u128..=u64::MAX as u128,
        reserve in 1u128..=u64::MAX as u128,
        crr in 1u8..=100,
        amount in 0u128..=u64::MAX as u128,
    ) {
        prop_assert!(sale_amount(supply, reserve, crr, amount) <= supply);
    }
}

// ─────────────────────────────────────────────────────────────────
// DECIMALS
// ─────────────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn prop_dec_string_round_trip(raw in any::<i64>()) {
        let d = Dec::from_raw(raw as i128 * 1_000);
        let back: Dec = d.to_string().parse().unwrap();
        prop_assert_eq!(back, d);
    }

    #[test]
    fn prop_mul_trunc_bounded_by_amount(pct in 0u64..=100, amount in any::<u64>()) {
        let d = Dec::percent(pct);
        let out = d.mul_trunc(amount as u128);
        prop_assert!(out <= amount as u128);
        prop_assert!(d.mul_ceil(amount as u128) - out <= 1);
    }
}
