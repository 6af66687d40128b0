//! Fuzz target: bonding-curve formulas
//!
//! Verifies:
//! 1. None of the four formulas panic on arbitrary curve parameters
//! 2. sale_return never releases more than the reserve
//!    and sale_amount never burns more than the supply
//! 3. Buying then immediately selling the minted coins gains at most one unit
//!
//! Run: cargo +nightly fuzz run fuzz_formula

#![no_main]
use arbitrary::Arbitrary;
use bdl_core::formula::{purchase_amount, purchase_return, sale_amount, sale_return};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct FuzzCurveInput {
    supply: u64,
    reserve: u64,
    crr: u8,
    amount: u64,
}

fuzz_target!(|input: FuzzCurveInput| {
    let supply = input.supply as u128;
    let reserve = input.reserve as u128;
    let amount = input.amount as u128;
    let crr = input.crr;

    let released = sale_return(supply, reserve, crr, amount);
    assert!(released <= reserve, "sale_return exceeds reserve");

    assert!(sale_amount(supply, reserve, crr, amount) <= supply);
    let _ = purchase_amount(supply, reserve, crr, amount);

    let minted = purchase_return(supply, reserve, crr, amount);
    if let (Some(s), Some(r)) = (supply.checked_add(minted), reserve.checked_add(amount)) {
        let back = sale_return(s, r, crr, minted);
        assert!(back <= amount + 1, "round trip through the curve gained reserve");
    }
});
