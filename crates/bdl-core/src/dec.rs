use crate::{mul_div, mul_div_ceil};
use displaydoc::Display;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Number of fractional digits carried by [`Dec`].
pub const DEC_PRECISION: usize = 18;
const SCALE: i128 = 1_000_000_000_000_000_000;

/// Signed fixed-point decimal with 18 fractional digits.
///
/// Used for commission rates, slash factors and liveness ratios. Stored and
/// serialized as a decimal string so every node parses the same value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Dec(i128);

#[derive(Clone, Debug, Display, PartialEq, Eq)]
pub enum DecError {
    /// invalid decimal literal "{0}"
    Invalid(String),
    /// decimal "{0}" has more than 18 fractional digits
    TooPrecise(String),
    /// decimal "{0}" overflows
    Overflow(String),
}

impl std::error::Error for DecError {}

impl Dec {
    pub const ZERO: Dec = Dec(0);
    pub const ONE: Dec = Dec(SCALE);

    pub const fn from_raw(raw: i128) -> Self {
        Dec(raw)
    }

    pub const fn raw(self) -> i128 {
        self.0
    }

    pub fn from_int(v: i64) -> Self {
        Dec(v as i128 * SCALE)
    }

    /// `num / den`, truncated. `None` if `den == 0` or the quotient overflows.
    pub fn from_ratio(num: u128, den: u128) -> Option<Self> {
        let raw = mul_div(num, SCALE as u128, den)?;
        i128::try_from(raw).ok().map(Dec)
    }

    /// Percentage helper: `percent(5)` is 0.05.
    pub fn percent(p: u64) -> Self {
        Dec(p as i128 * (SCALE / 100))
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// `floor(amount * self)`. Negative decimals yield 0.
    pub fn mul_trunc(self, amount: u128) -> u128 {
        if self.0 <= 0 {
            return 0;
        }
        mul_div(amount, self.0 as u128, SCALE as u128).unwrap_or(u128::MAX)
    }

    /// `ceil(amount * self)`. Negative decimals yield 0.
    pub fn mul_ceil(self, amount: u128) -> u128 {
        if self.0 <= 0 {
            return 0;
        }
        mul_div_ceil(amount, self.0 as u128, SCALE as u128).unwrap_or(u128::MAX)
    }

    pub fn checked_add(self, rhs: Dec) -> Option<Dec> {
        self.0.checked_add(rhs.0).map(Dec)
    }

    pub fn checked_sub(self, rhs: Dec) -> Option<Dec> {
        self.0.checked_sub(rhs.0).map(Dec)
    }
}

impl fmt::Display for Dec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let scale = SCALE as u128;
        write!(
            f,
            "{}{}.{:0width$}",
            sign,
            abs / scale,
            abs % scale,
            width = DEC_PRECISION
        )
    }
}

impl FromStr for Dec {
    type Err = DecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DecError::Invalid(s.to_string());
        let (negative, body) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let (int_part, frac_part) = match body.split_once('.') {
            Some((i, f)) => (i, f),
            None => (body, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }
        let all_digits = |p: &str| p.bytes().all(|b| b.is_ascii_digit());
        if !all_digits(int_part) || !all_digits(frac_part) {
            return Err(invalid());
        }
        if frac_part.len() > DEC_PRECISION {
            return Err(DecError::TooPrecise(s.to_string()));
        }

        let int_val: i128 = if int_part.is_empty() {
            0
        } else {
            int_part
                .parse()
                .map_err(|_| DecError::Overflow(s.to_string()))?
        };
        let frac_val: i128 = if frac_part.is_empty() {
            0
        } else {
            let padded = format!("{:0<width$}", frac_part, width = DEC_PRECISION);
            padded.parse().map_err(|_| invalid())?
        };

        let raw = int_val
            .checked_mul(SCALE)
            .and_then(|v| v.checked_add(frac_val))
            .ok_or_else(|| DecError::Overflow(s.to_string()))?;
        Ok(Dec(if negative { -raw } else { raw }))
    }
}

impl Serialize for Dec {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Dec {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
