// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// BONDLINE - CORE PRIMITIVES
//
// Shared by the staking engine:
// - Coin / Dec amounts and integer fixed-point helpers
// - bonding curve formulas
// - ordered key-value store abstraction (memory, cache overlay, sled)
// - staking parameters and the error taxonomy
// - bank, curve-coin and NFT collaborators
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};
use serde::{Deserialize, Serialize};

pub mod bank;
pub mod coins;
pub mod dec;
pub mod error;
pub mod formula;
pub mod nft;
pub mod params;
pub mod sled_store;
pub mod store;

pub use dec::Dec;
pub use error::{Result, StakingError};

/// Native coin denomination.
pub const NATIVE_DENOM: &str = "bdl";

/// Smallest units per whole native coin (18 decimals).
pub const UNITS_PER_COIN: u128 = 1_000_000_000_000_000_000;

/// Module account holding coin that backs bonded validators.
pub const BONDED_POOL: &str = "bonded_tokens_pool";

/// Module account holding coin of non-bonded validators and pending unbondings.
pub const NOT_BONDED_POOL: &str = "not_bonded_tokens_pool";

/// Module account holding the reserve behind NFT sub-tokens.
pub const NFT_RESERVE_POOL: &str = "nft_reserve_pool";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Coin {
    pub denom: String,
    pub amount: u128,
}

impl Coin {
    pub fn new(denom: impl Into<String>, amount: u128) -> Self {
        Coin {
            denom: denom.into(),
            amount,
        }
    }

    pub fn zero(denom: impl Into<String>) -> Self {
        Coin::new(denom, 0)
    }

    pub fn is_zero(&self) -> bool {
        self.amount == 0
    }

    pub fn checked_add(&self, amount: u128) -> Option<Coin> {
        self.amount
            .checked_add(amount)
            .map(|a| Coin::new(self.denom.clone(), a))
    }

    pub fn checked_sub(&self, amount: u128) -> Option<Coin> {
        self.amount
            .checked_sub(amount)
            .map(|a| Coin::new(self.denom.clone(), a))
    }
}

impl std::fmt::Display for Coin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.amount, self.denom)
    }
}

/// `floor(a * b / c)` without intermediate overflow. `None` if `c == 0`
/// or the quotient does not fit in u128.
pub fn mul_div(a: u128, b: u128, c: u128) -> Option<u128> {
    if c == 0 {
        return None;
    }
    if let Some(p) = a.checked_mul(b) {
        return Some(p / c);
    }
    (BigUint::from(a) * BigUint::from(b) / BigUint::from(c)).to_u128()
}

/// `ceil(a * b / c)`, same failure cases as [`mul_div`].
pub fn mul_div_ceil(a: u128, b: u128, c: u128) -> Option<u128> {
    if c == 0 {
        return None;
    }
    let num = BigUint::from(a) * BigUint::from(b);
    let den = BigUint::from(c);
    let q = &num / &den;
    let q = if (&num % &den).is_zero() { q } else { q + 1u32 };
    q.to_u128()
}
