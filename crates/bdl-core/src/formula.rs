// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// BONDLINE - BONDING CURVE FORMULAS
//
// Converts between a curve coin's supply/reserve and native stake value.
// - crr == 100 is linear and uses exact integer division
// - every other ratio runs on 100-digit fixed point over big integers
// - results are truncated toward zero; the rounding is part of the protocol
//
// No floating point anywhere: all nodes must agree bit for bit.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::mul_div;
use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{Signed, ToPrimitive, Zero};
use std::sync::OnceLock;

/// Fractional decimal digits carried by the curve arithmetic.
pub const PRECISION_DIGITS: u32 = 100;

/// Constant reserve ratio at which the curve degenerates to a straight line.
pub const LINEAR_CRR: u8 = 100;

fn scale() -> &'static BigInt {
    static SCALE: OnceLock<BigInt> = OnceLock::new();
    SCALE.get_or_init(|| BigInt::from(10u32).pow(PRECISION_DIGITS))
}

fn ln2() -> &'static Fixed {
    static LN2: OnceLock<Fixed> = OnceLock::new();
    LN2.get_or_init(|| Fixed(atanh_ln(&(scale() * 2u32))))
}

fn big(v: u128) -> BigInt {
    BigInt::from(v)
}

/// Fixed-point number: the wrapped integer is `value * 10^PRECISION_DIGITS`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Fixed(BigInt);

impl Fixed {
    fn one() -> Self {
        Fixed(scale().clone())
    }

    fn ratio(num: &BigInt, den: &BigInt) -> Self {
        Fixed(num * scale() / den)
    }

    fn add(&self, rhs: &Fixed) -> Fixed {
        Fixed(&self.0 + &rhs.0)
    }

    fn sub(&self, rhs: &Fixed) -> Fixed {
        Fixed(&self.0 - &rhs.0)
    }

    fn mul(&self, rhs: &Fixed) -> Fixed {
        Fixed(&self.0 * &rhs.0 / scale())
    }

    fn mul_ratio(&self, num: u32, den: u32) -> Fixed {
        Fixed(&self.0 * num / den)
    }

    /// `floor(self * n)` as an integer, clamped to `0..=u128::MAX`.
    fn scale_to_u128(&self, n: u128) -> u128 {
        if self.0.is_negative() {
            return 0;
        }
        (&self.0 * big(n) / scale()).to_u128().unwrap_or(u128::MAX)
    }

    fn powi(&self, mut n: u32) -> Fixed {
        let mut base = self.clone();
        let mut acc = Fixed::one();
        while n > 0 {
            if n & 1 == 1 {
                acc = acc.mul(&base);
            }
            n >>= 1;
            if n > 0 {
                base = base.mul(&base);
            }
        }
        acc
    }

    /// Natural log for `self > 0`.
    fn ln(&self) -> Fixed {
        let s = scale();
        let two_s = s * 2u32;
        let mut m = self.0.clone();
        let mut k: i64 = 0;
        while m >= two_s {
            m >>= 1;
            k += 1;
        }
        while &m < s {
            m <<= 1;
            k -= 1;
        }
        let ln_m = Fixed(atanh_ln(&m));
        ln_m.add(&Fixed(&ln2().0 * k))
    }

    fn exp(&self) -> Fixed {
        let s = scale();
        let half: BigInt = s / 2u32;
        let mut r = self.0.clone();
        let mut halvings = 0u32;
        while r.abs() > half {
            r /= 2u32;
            halvings += 1;
        }

        let mut sum = s.clone();
        let mut term = s.clone();
        let mut i = 1u32;
        loop {
            term = &term * &r / (s * i);
            if term.is_zero() {
                break;
            }
            sum += &term;
            i += 1;
        }

        let mut out = Fixed(sum);
        for _ in 0..halvings {
            out = out.mul(&out);
        }
        out
    }

    /// `self^(num/den)` for `self >= 0`.
    fn pow_ratio(&self, num: u32, den: u32) -> Fixed {
        if self.0.is_zero() {
            return Fixed(BigInt::zero());
        }
        let g = num.gcd(&den);
        let (num, den) = (num / g, den / g);
        if den == 1 {
            return self.powi(num);
        }
        self.ln().mul_ratio(num, den).exp()
    }
}

/// `ln(m)` for `m` in `[1, 2)` (fixed-point raw value), via
/// `ln(m) = 2 * atanh((m - 1) / (m + 1))`.
fn atanh_ln(m: &BigInt) -> BigInt {
    let s = scale();
    let z = (m - s) * s / (m + s);
    let z2 = &z * &z / s;
    let mut term = z;
    let mut sum = BigInt::zero();
    let mut n = 1u32;
    while !term.is_zero() {
        sum += &term / n;
        term = &term * &z2 / s;
        n += 2;
    }
    sum * 2u32
}

fn valid_crr(crr: u8) -> bool {
    crr > 0 && crr <= LINEAR_CRR
}

/// Curve coins minted for depositing `deposit` reserve:
/// `supply * ((1 + deposit / reserve)^(crr / 100) - 1)`.
pub fn purchase_return(supply: u128, reserve: u128, crr: u8, deposit: u128) -> u128 {
    if deposit == 0 || supply == 0 || reserve == 0 || !valid_crr(crr) {
        return 0;
    }
    if crr == LINEAR_CRR {
        return mul_div(deposit, supply, reserve).unwrap_or(u128::MAX);
    }
    let base = Fixed::ratio(&(big(reserve) + big(deposit)), &big(reserve));
    base.pow_ratio(crr as u32, 100)
        .sub(&Fixed::one())
        .scale_to_u128(supply)
}

/// Reserve that must be deposited to mint `amount` curve coins:
/// `reserve * ((1 + amount / supply)^(100 / crr) - 1)`.
pub fn purchase_amount(supply: u128, reserve: u128, crr: u8, amount: u128) -> u128 {
    if amount == 0 || supply == 0 || reserve == 0 || !valid_crr(crr) {
        return 0;
    }
    if crr == LINEAR_CRR {
        return mul_div(amount, reserve, supply).unwrap_or(u128::MAX);
    }
    let base = Fixed::ratio(&(big(supply) + big(amount)), &big(supply));
    base.pow_ratio(100, crr as u32)
        .sub(&Fixed::one())
        .scale_to_u128(reserve)
}

/// Reserve released for burning `amount` curve coins:
/// `reserve * (1 - (1 - amount / supply)^(100 / crr))`.
///
/// Selling the whole supply (or more) returns the whole reserve.
pub fn sale_return(supply: u128, reserve: u128, crr: u8, amount: u128) -> u128 {
    if amount == 0 {
        return 0;
    }
    if amount >= supply {
        return reserve;
    }
    if reserve == 0 || !valid_crr(crr) {
        return 0;
    }
    if crr == LINEAR_CRR {
        return mul_div(amount, reserve, supply).unwrap_or(u128::MAX);
    }
    let base = Fixed::ratio(&big(supply - amount), &big(supply));
    Fixed::one()
        .sub(&base.pow_ratio(100, crr as u32))
        .scale_to_u128(reserve)
}

/// Curve coins that must be burned to release `amount` reserve:
/// `supply * (1 - (1 - amount / reserve)^(crr / 100))`.
///
/// Asking for the whole reserve (or more) requires the whole supply.
pub fn sale_amount(supply: u128, reserve: u128, crr: u8, amount: u128) -> u128 {
    if amount == 0 {
        return 0;
    }
    if amount >= reserve {
        return supply;
    }
    if supply == 0 || !valid_crr(crr) {
        return 0;
    }
    if crr == LINEAR_CRR {
        return mul_div(amount, supply, reserve).unwrap_or(u128::MAX);
    }
    let base = Fixed::ratio(&big(reserve - amount), &big(reserve));
    Fixed::one()
        .sub(&base.pow_ratio(crr as u32, 100))
        .scale_to_u128(supply)
}
