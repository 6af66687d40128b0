use crate::dec::Dec;
use crate::error::{Result, StakingError};
use crate::{NATIVE_DENOM, UNITS_PER_COIN};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// `power_reduction` is stored as a decimal string: TOML has no integer
/// wide enough for it.
mod decimal_u128 {
    use super::*;
    use serde::de::Error;

    pub fn serialize<S: Serializer>(val: &u128, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(&val.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<u128, D::Error> {
        let text = String::deserialize(d)?;
        text.parse()
            .map_err(|_| D::Error::custom(format!("power_reduction {:?} is not a u128", text)))
    }
}

/// Global staking parameters. Set at genesis, replaced only by a validated
/// governance update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Params {
    /// Delay between undelegation and release, in seconds.
    pub unbonding_time_secs: u64,
    pub max_validators: u32,
    /// Simultaneous unbonding entries per delegator/validator pair.
    pub max_entries: u32,
    /// Delegation records (fungible + NFT) per validator after eviction.
    pub max_delegations: u32,
    pub bond_denom: String,
    /// Stake units per unit of consensus voting power.
    #[serde(with = "decimal_u128")]
    pub power_reduction: u128,
    /// Bonded set size at height 0.
    pub initial_validators: u32,
    /// One extra bonded slot per this many blocks. 0 disables the ramp.
    pub blocks_per_extra_validator: u64,
    pub slash_fraction_double_sign: Dec,
    pub slash_fraction_downtime: Dec,
    pub signed_blocks_window: u64,
    pub min_signed_per_window: Dec,
}

impl Default for Params {
    fn default() -> Self {
        Params {
            unbonding_time_secs: 30 * 24 * 60 * 60,
            max_validators: 100,
            max_entries: 7,
            max_delegations: 1_000,
            bond_denom: NATIVE_DENOM.to_string(),
            power_reduction: UNITS_PER_COIN,
            initial_validators: 5,
            blocks_per_extra_validator: 7_200,
            slash_fraction_double_sign: Dec::percent(5),
            slash_fraction_downtime: Dec::percent(1),
            signed_blocks_window: 100,
            min_signed_per_window: Dec::percent(50),
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> std::result::Result<T, Box<dyn std::error::Error>>
where
    T::Err: std::error::Error + 'static,
{
    match std::env::var(name) {
        Ok(raw) => Ok(raw.parse()?),
        Err(_) => Ok(default),
    }
}

impl Params {
    /// Load params from TOML file
    pub fn load_from_file(path: &Path) -> std::result::Result<Self, Box<dyn std::error::Error>> {
        let content = fs::read_to_string(path)?;
        let params: Params = toml::from_str(&content)?;
        params.validate()?;
        Ok(params)
    }

    /// Load params from `BDL_*` environment variables, defaulting each unset one
    pub fn load_from_env() -> std::result::Result<Self, Box<dyn std::error::Error>> {
        let d = Params::default();
        let params = Params {
            unbonding_time_secs: env_or("BDL_UNBONDING_TIME_SECS", d.unbonding_time_secs)?,
            max_validators: env_or("BDL_MAX_VALIDATORS", d.max_validators)?,
            max_entries: env_or("BDL_MAX_ENTRIES", d.max_entries)?,
            max_delegations: env_or("BDL_MAX_DELEGATIONS", d.max_delegations)?,
            bond_denom: std::env::var("BDL_BOND_DENOM").unwrap_or(d.bond_denom),
            power_reduction: env_or("BDL_POWER_REDUCTION", d.power_reduction)?,
            initial_validators: env_or("BDL_INITIAL_VALIDATORS", d.initial_validators)?,
            blocks_per_extra_validator: env_or(
                "BDL_BLOCKS_PER_EXTRA_VALIDATOR",
                d.blocks_per_extra_validator,
            )?,
            slash_fraction_double_sign: env_or(
                "BDL_SLASH_FRACTION_DOUBLE_SIGN",
                d.slash_fraction_double_sign,
            )?,
            slash_fraction_downtime: env_or(
                "BDL_SLASH_FRACTION_DOWNTIME",
                d.slash_fraction_downtime,
            )?,
            signed_blocks_window: env_or("BDL_SIGNED_BLOCKS_WINDOW", d.signed_blocks_window)?,
            min_signed_per_window: env_or("BDL_MIN_SIGNED_PER_WINDOW", d.min_signed_per_window)?,
        };
        params.validate()?;
        Ok(params)
    }

    /// Save params to TOML file
    pub fn save_to_file(&self, path: &Path) -> std::result::Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(StakingError::InvalidParams(msg.to_string()));
        if self.bond_denom.is_empty() {
            return invalid("bond_denom cannot be empty");
        }
        if self.max_validators == 0 {
            return invalid("max_validators must be positive");
        }
        if self.max_entries == 0 {
            return invalid("max_entries must be positive");
        }
        if self.max_delegations == 0 {
            return invalid("max_delegations must be positive");
        }
        if self.power_reduction == 0 {
            return invalid("power_reduction must be positive");
        }
        if self.initial_validators == 0 {
            return invalid("initial_validators must be positive");
        }
        if self.signed_blocks_window == 0 {
            return invalid("signed_blocks_window must be positive");
        }
        for (name, frac) in [
            ("slash_fraction_double_sign", self.slash_fraction_double_sign),
            ("slash_fraction_downtime", self.slash_fraction_downtime),
            ("min_signed_per_window", self.min_signed_per_window),
        ] {
            if frac.is_negative() || frac > Dec::ONE {
                return Err(StakingError::InvalidParams(format!(
                    "{} must be within [0, 1]",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Bonded set size permitted at `height`: starts at `initial_validators`,
    /// gains one slot every `blocks_per_extra_validator` blocks, and is capped
    /// at `max_validators`.
    pub fn validator_cap(&self, height: u64) -> u32 {
        if self.blocks_per_extra_validator == 0 {
            return self.max_validators;
        }
        let ramp = (self.initial_validators as u64)
            .saturating_add(height / self.blocks_per_extra_validator);
        ramp.min(self.max_validators as u64) as u32
    }

    /// Maximum missed blocks tolerated inside one signing window.
    pub fn max_missed_blocks(&self) -> u64 {
        let min_signed = self
            .min_signed_per_window
            .mul_ceil(self.signed_blocks_window as u128) as u64;
        self.signed_blocks_window.saturating_sub(min_signed)
    }
}
